//! Aggregate views over moods and feedback for the admin dashboard.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use itertools::Itertools;

use crate::domain::feedback::{FeedbackRecord, FeedbackStatus};
use crate::domain::mood::{Mood, MoodEntry};

//==============================================================================
// Moods
//==============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MoodTally {
    pub good: usize,
    pub fair: usize,
    pub bad: usize,
    pub total: usize,
    /// Weighted share of positive moods, 0 to 100.
    pub score: f64,
}

impl MoodTally {
    fn record(&mut self, mood: Mood) {
        match mood {
            Mood::Good => self.good += 1,
            Mood::Fair => self.fair += 1,
            Mood::Bad => self.bad += 1,
        }
        self.total += 1;
        self.score = self.compute_score();
    }

    fn compute_score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        let weighted = self.good as f64 * Mood::Good.weight()
            + self.fair as f64 * Mood::Fair.weight()
            + self.bad as f64 * Mood::Bad.weight();
        weighted / self.total as f64 * 100.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DepartmentMood {
    pub department: String,
    #[serde(flatten)]
    pub tally: MoodTally,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodReport {
    /// One row per department, in the order departments first appear.
    pub per_department: Vec<DepartmentMood>,
    pub overall: MoodTally,
}

impl MoodReport {
    /// Departments by score, best first. Ties keep first-seen order.
    pub fn ranked(&self) -> Vec<&DepartmentMood> {
        self.per_department
            .iter()
            .sorted_by(|a, b| {
                b.tally
                    .score
                    .partial_cmp(&a.tally.score)
                    .unwrap_or(Ordering::Equal)
            })
            .collect()
    }

    pub fn highest(&self) -> Option<&DepartmentMood> {
        self.ranked().first().cloned()
    }

    pub fn lowest(&self) -> Option<&DepartmentMood> {
        self.ranked().last().cloned()
    }
}

pub fn aggregate_moods(entries: &[MoodEntry]) -> MoodReport {
    let mut report = MoodReport::default();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        let next = report.per_department.len();
        let idx = *positions.entry(entry.department.as_str()).or_insert(next);
        if idx == next {
            report.per_department.push(DepartmentMood {
                department: entry.department.clone(),
                tally: MoodTally::default(),
            });
        }

        report.per_department[idx].tally.record(entry.mood);
        report.overall.record(entry.mood);
    }

    report
}

//==============================================================================
// Feedback
//==============================================================================

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MonthlyResolution {
    /// `YYYY-MM`, local time.
    pub month: String,
    pub resolved: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub status_counts: BTreeMap<&'static str, usize>,
    pub monthly: Vec<MonthlyResolution>,
}

/// Status counts over every record, plus a month-by-month resolved/total
/// series starting on the first of this month one year ago.
pub fn feedback_stats(records: &[FeedbackRecord], now: DateTime<Utc>) -> FeedbackStats {
    let mut status_counts = FeedbackStatus::ALL
        .iter()
        .map(|s| (s.repr(), 0))
        .collect::<BTreeMap<_, _>>();
    for record in records {
        *status_counts.entry(record.status.repr()).or_insert(0) += 1;
    }

    let since = year_ago_month_start(now);
    let mut months: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.created_at >= since) {
        let key = record.created_at.with_timezone(&Local).format("%Y-%m").to_string();
        let counts = months.entry(key).or_insert((0, 0));
        if record.status == FeedbackStatus::Resolved {
            counts.0 += 1;
        }
        counts.1 += 1;
    }

    FeedbackStats {
        status_counts,
        monthly: months
            .into_iter()
            .map(|(month, (resolved, total))| MonthlyResolution {
                month,
                resolved,
                total,
            })
            .collect(),
    }
}

fn year_ago_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    NaiveDate::from_ymd_opt(local.year() - 1, local.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| now - Duration::days(366))
}
