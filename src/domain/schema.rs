table! {
    feedback (id) {
        id -> Int4,
        title -> Varchar,
        department -> Varchar,
        concern -> Text,
        possible_solution -> Nullable<Text>,
        submitted_by -> Nullable<Varchar>,
        assigned_to -> Nullable<Varchar>,
        status -> Varchar,
        likes -> Array<Text>,
        dislikes -> Array<Text>,
        approved -> Bool,
        valid_from -> Timestamptz,
        valid_until -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    feedback_comment (id) {
        id -> Int4,
        fk_feedback -> Int4,
        author -> Varchar,
        body -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    mood_entry (id) {
        id -> Int4,
        mood -> Varchar,
        submitted_by -> Varchar,
        department -> Varchar,
        created_at -> Timestamptz,
    }
}

joinable!(feedback_comment -> feedback (fk_feedback));

allow_tables_to_appear_in_same_query!(feedback, feedback_comment, mood_entry);
