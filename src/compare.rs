use chrono::NaiveDateTime;
use tracing::info;

use crate::engine::ScoreEngine;
use crate::error::ScoreResult;
use crate::models::{PeriodComparison, Trend};
use crate::period::{previous_period, validate_range};
use crate::score::round2;
use crate::store::ScoreStore;

impl<S: ScoreStore> ScoreEngine<S> {
    /// Overall score of the window against the equally long window right
    /// before it. `score_difference` is a magnitude; `trend` carries the sign.
    pub async fn period_over_period_change(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> ScoreResult<PeriodComparison> {
        let range = validate_range(from, to)?;
        let previous_range = previous_period(range)?;
        let current = self.overall_period_score(range).await?;
        let previous = self.overall_period_score(previous_range).await?;

        let score_difference = round2((current.score - previous.score).abs());
        let trend = if score_difference == 0.0 {
            Trend::Unchanged
        } else if current.score > previous.score {
            Trend::Improved
        } else {
            Trend::Declined
        };
        info!(
            current = current.score,
            previous = previous.score,
            score_difference,
            ?trend,
            "period over period change"
        );

        Ok(PeriodComparison {
            current,
            previous,
            score_difference,
            trend,
        })
    }
}
