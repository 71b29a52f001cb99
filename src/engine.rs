use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{Fetch, ScoreError, ScoreResult};
use crate::models::{
    CategoryId, CategoryScore, CategoryScoreOverTime, DateRange, PeriodScore, Rating,
    RatingCategory, TicketId, TicketScores,
};
use crate::period::{generate_buckets, validate_range};
use crate::score::{mean, normalize, round2, WeightedTotals};
use crate::store::ScoreStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TicketCategoryKey {
    ticket_id: TicketId,
    category_id: CategoryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CategoryBucketKey {
    category_id: CategoryId,
    bucket: usize,
}

/// A rating joined with the category it was given under.
struct ScoredRating<'a> {
    rating: &'a Rating,
    category: &'a RatingCategory,
}

/// Computes scores from whatever `ScoreStore` it is given. Holds no data
/// between calls; every operation fetches what it needs.
pub struct ScoreEngine<S> {
    store: S,
    fetch_timeout: Duration,
}

impl<S: ScoreStore> ScoreEngine<S> {
    pub fn new(store: S, fetch_timeout: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
        }
    }

    async fn fetch<T, F>(&self, fetch: Fetch, future: F) -> ScoreResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.fetch_timeout, future).await {
            Ok(result) => result.map_err(|source| ScoreError::data_source(fetch, source)),
            Err(elapsed) => Err(ScoreError::data_source(fetch, elapsed)),
        }
    }

    async fn categories(&self) -> ScoreResult<Vec<RatingCategory>> {
        self.fetch(
            Fetch::RatingCategories,
            self.store.fetch_all_rating_categories(),
        )
        .await
    }

    async fn ratings(&self, range: DateRange) -> ScoreResult<Vec<Rating>> {
        let ratings = self
            .fetch(
                Fetch::Ratings,
                self.store.fetch_ratings_created_between(range.from, range.to),
            )
            .await?;
        debug!(count = ratings.len(), "ratings fetched");
        Ok(ratings)
    }

    /// Mean normalized score for every ticket × category pair in the window.
    /// Pairs without ratings score 0.
    pub async fn scores_by_ticket(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> ScoreResult<Vec<TicketScores>> {
        let range = validate_range(from, to)?;
        let span = info_span!("scores_by_ticket", from = %range.from, to = %range.to);
        async move {
            let tickets = self
                .fetch(Fetch::Tickets, self.store.fetch_all_tickets())
                .await?;
            let categories = self.categories().await?;
            let ratings = self.ratings(range).await?;

            let mut scores: HashMap<TicketCategoryKey, Vec<f64>> = HashMap::new();
            for scored in join_categories(&ratings, &categories, range) {
                let key = TicketCategoryKey {
                    ticket_id: scored.rating.ticket_id,
                    category_id: scored.category.id,
                };
                scores
                    .entry(key)
                    .or_default()
                    .push(normalize(scored.rating.raw_value, scored.category.weight));
            }

            let result: Vec<TicketScores> = tickets
                .iter()
                .map(|ticket| TicketScores {
                    ticket_id: ticket.id,
                    subject: ticket.subject.clone(),
                    categories: categories
                        .iter()
                        .map(|category| {
                            let key = TicketCategoryKey {
                                ticket_id: ticket.id,
                                category_id: category.id,
                            };
                            let values = scores.get(&key).map_or(&[][..], Vec::as_slice);
                            CategoryScore {
                                category_id: category.id,
                                category_name: category.name.clone(),
                                score: round2(mean(values)),
                                rating_count: values.len(),
                            }
                        })
                        .collect(),
                })
                .collect();

            info!(
                tickets = tickets.len(),
                categories = categories.len(),
                "scored tickets"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Per-category scores for each daily or weekly bucket of the window.
    pub async fn aggregated_category_scores_over_time(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> ScoreResult<Vec<CategoryScoreOverTime>> {
        let range = validate_range(from, to)?;
        let span = info_span!("category_scores_over_time", from = %range.from, to = %range.to);
        async move {
            let categories = self.categories().await?;
            let ratings = self.ratings(range).await?;
            let buckets = generate_buckets(range);

            let mut grouped: HashMap<CategoryBucketKey, Vec<f64>> = HashMap::new();
            for scored in join_categories(&ratings, &categories, range) {
                let Some(bucket) = bucket_index(&buckets, scored.rating.created_at) else {
                    continue;
                };
                let key = CategoryBucketKey {
                    category_id: scored.category.id,
                    bucket,
                };
                grouped
                    .entry(key)
                    .or_default()
                    .push(normalize(scored.rating.raw_value, scored.category.weight));
            }

            let result: Vec<CategoryScoreOverTime> = categories
                .iter()
                .map(|category| {
                    let periods: Vec<PeriodScore> = buckets
                        .iter()
                        .enumerate()
                        .map(|(bucket, period)| {
                            let key = CategoryBucketKey {
                                category_id: category.id,
                                bucket,
                            };
                            let values = grouped.get(&key).map(Vec::as_slice).unwrap_or(&[]);
                            PeriodScore {
                                period: *period,
                                score: round2(mean(values)),
                                rating_count: values.len(),
                            }
                        })
                        .collect();
                    summarize_category(category, periods)
                })
                .collect();

            info!(
                buckets = buckets.len(),
                categories = categories.len(),
                "aggregated category scores"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Weighted mean of every rating in the window on the 0–100 scale.
    pub async fn overall_quality_score(
        &self,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> ScoreResult<f64> {
        let range = validate_range(from, to)?;
        Ok(self.overall_period_score(range).await?.score)
    }

    pub(crate) async fn overall_period_score(&self, range: DateRange) -> ScoreResult<PeriodScore> {
        let span = info_span!("overall_quality_score", from = %range.from, to = %range.to);
        async move {
            let categories = self.categories().await?;
            let ratings = self.ratings(range).await?;

            let mut totals = WeightedTotals::default();
            for scored in join_categories(&ratings, &categories, range) {
                totals.add(scored.rating.raw_value, scored.category.weight);
            }

            let score = totals.score().ok_or(ScoreError::EmptyResult {
                from: range.from,
                to: range.to,
            })?;
            info!(score, ratings = totals.count, "overall quality score");
            Ok(PeriodScore {
                period: range,
                score,
                rating_count: totals.count,
            })
        }
        .instrument(span)
        .await
    }
}

/// Pairs each in-window rating with its category, dropping ratings whose
/// category is not in the catalog.
fn join_categories<'a>(
    ratings: &'a [Rating],
    categories: &'a [RatingCategory],
    range: DateRange,
) -> impl Iterator<Item = ScoredRating<'a>> + 'a {
    let by_id: HashMap<CategoryId, &'a RatingCategory> =
        categories.iter().map(|category| (category.id, category)).collect();
    ratings
        .iter()
        .filter(move |rating| range.contains(rating.created_at))
        .filter_map(move |rating| match by_id.get(&rating.category_id) {
            Some(category) => Some(ScoredRating { rating, category }),
            None => {
                warn!(
                    rating_id = rating.id,
                    category_id = rating.category_id,
                    "rating references unknown category"
                );
                None
            }
        })
}

/// Buckets are sorted and contiguous, so the owner is the last bucket that
/// starts at or before `at`.
fn bucket_index(buckets: &[DateRange], at: NaiveDateTime) -> Option<usize> {
    let after = buckets.partition_point(|bucket| bucket.from <= at);
    let index = after.checked_sub(1)?;
    buckets[index].contains(at).then_some(index)
}

/// `total_score` is the plain mean of every bucket score, empty buckets
/// included as 0.
fn summarize_category(category: &RatingCategory, periods: Vec<PeriodScore>) -> CategoryScoreOverTime {
    let scores: Vec<f64> = periods.iter().map(|period| period.score).collect();
    let total_rating_count = periods.iter().map(|period| period.rating_count).sum();
    CategoryScoreOverTime {
        category_id: category.id,
        category_name: category.name.clone(),
        total_score: round2(mean(&scores)),
        total_rating_count,
        periods,
    }
}
