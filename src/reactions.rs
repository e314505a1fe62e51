use crate::domain::feedback::FeedbackRecord;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    fn opposite(self) -> Reaction {
        match self {
            Reaction::Like => Reaction::Dislike,
            Reaction::Dislike => Reaction::Like,
        }
    }
}

fn reactors(record: &mut FeedbackRecord, reaction: Reaction) -> &mut Vec<String> {
    match reaction {
        Reaction::Like => &mut record.likes,
        Reaction::Dislike => &mut record.dislikes,
    }
}

/// Flip `actor`'s `reaction` on the record.
///
/// Reacting twice withdraws the reaction. Reacting one way always clears the
/// other, so an actor is never in both `likes` and `dislikes`.
pub fn toggle_reaction(record: &mut FeedbackRecord, actor: &str, reaction: Reaction) {
    let target = reactors(record, reaction);

    if target.iter().any(|a| a == actor) {
        target.retain(|a| a != actor);
        return;
    }

    target.push(actor.to_string());
    reactors(record, reaction.opposite()).retain(|a| a != actor);
}
