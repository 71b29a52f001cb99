use chrono::NaiveDateTime;
use serde::Serialize;

pub type TicketId = i64;
pub type CategoryId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub id: i64,
    pub raw_value: i64,
    pub ticket_id: TicketId,
    pub category_id: CategoryId,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingCategory {
    pub id: CategoryId,
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: TicketId,
    pub subject: String,
    pub created_at: NaiveDateTime,
}

/// Inclusive window of timestamps. Bucket sequences built from a window are
/// contiguous: each bucket starts 1ns after the previous one ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(with = "crate::period::timestamp")]
    pub from: NaiveDateTime,
    #[serde(with = "crate::period::timestamp")]
    pub to: NaiveDateTime,
}

impl DateRange {
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.from <= at && at <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub category_id: CategoryId,
    pub category_name: String,
    pub score: f64,
    pub rating_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketScores {
    pub ticket_id: TicketId,
    pub subject: String,
    pub categories: Vec<CategoryScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodScore {
    #[serde(flatten)]
    pub period: DateRange,
    pub score: f64,
    pub rating_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScoreOverTime {
    pub category_id: CategoryId,
    pub category_name: String,
    pub periods: Vec<PeriodScore>,
    pub total_score: f64,
    pub total_rating_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improved,
    Declined,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub current: PeriodScore,
    pub previous: PeriodScore,
    pub score_difference: f64,
    pub trend: Trend,
}
