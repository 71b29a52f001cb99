use std::fmt::Write;

use crate::models::{CategoryScoreOverTime, DateRange, PeriodComparison, TicketScores, Trend};
use crate::period::format_timestamp;
use crate::score::{mean, round2};

#[derive(Debug, Clone, PartialEq)]
pub struct TicketSummary {
    pub ticket_id: i64,
    pub subject: String,
    pub average_score: f64,
    pub rated_categories: usize,
}

/// Average over the categories a ticket was actually rated in; tickets with
/// no ratings in the window are left out. Lowest first.
pub fn lowest_scoring_tickets(scores: &[TicketScores]) -> Vec<TicketSummary> {
    let mut summaries: Vec<TicketSummary> = scores
        .iter()
        .filter_map(|ticket| {
            let rated: Vec<f64> = ticket
                .categories
                .iter()
                .filter(|category| category.rating_count > 0)
                .map(|category| category.score)
                .collect();
            if rated.is_empty() {
                return None;
            }
            Some(TicketSummary {
                ticket_id: ticket.ticket_id,
                subject: ticket.subject.clone(),
                average_score: round2(mean(&rated)),
                rated_categories: rated.len(),
            })
        })
        .collect();

    summaries.sort_by(|a, b| {
        a.average_score
            .partial_cmp(&b.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.ticket_id.cmp(&b.ticket_id))
    });
    summaries
}

pub struct ReportInput<'a> {
    pub window: DateRange,
    /// `None` when the window holds no ratings.
    pub overall_score: Option<f64>,
    /// `None` when either window holds no ratings.
    pub change: Option<&'a PeriodComparison>,
    pub categories: &'a [CategoryScoreOverTime],
    pub tickets: &'a [TicketScores],
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Ticket Quality Report");
    let _ = writeln!(
        output,
        "Generated for {} to {}",
        format_timestamp(input.window.from),
        format_timestamp(input.window.to)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall Quality");

    match input.overall_score {
        Some(score) => {
            let _ = writeln!(output, "- Score: {score:.2}");
        }
        None => {
            let _ = writeln!(output, "No ratings recorded for this window.");
        }
    }
    if let Some(change) = input.change {
        let direction = match change.trend {
            Trend::Improved => "up",
            Trend::Declined => "down",
            Trend::Unchanged => "unchanged",
        };
        let _ = writeln!(
            output,
            "- Previous period ({} to {}): {:.2}, {} {:.2}",
            format_timestamp(change.previous.period.from),
            format_timestamp(change.previous.period.to),
            change.previous.score,
            direction,
            change.score_difference
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Trends");

    if input.categories.is_empty() {
        let _ = writeln!(output, "No rating categories defined.");
    } else {
        for category in input.categories {
            let _ = writeln!(
                output,
                "- {}: {:.2} across {} ratings",
                category.category_name, category.total_score, category.total_rating_count
            );
            for period in category.periods.iter().filter(|p| p.rating_count > 0) {
                let _ = writeln!(
                    output,
                    "  - {}: {:.2} ({} ratings)",
                    period.period.from.date(),
                    period.score,
                    period.rating_count
                );
            }
        }
    }

    let lowest = lowest_scoring_tickets(input.tickets);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Scoring Tickets");

    if lowest.is_empty() {
        let _ = writeln!(output, "No tickets rated in this window.");
    } else {
        for ticket in lowest.iter().take(5) {
            let _ = writeln!(
                output,
                "- Ticket {} ({}): {:.2} over {} categories",
                ticket.ticket_id, ticket.subject, ticket.average_score, ticket.rated_categories
            );
        }
    }

    output
}
