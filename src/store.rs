use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;

use crate::models::{Rating, RatingCategory, Ticket};

/// Read-only access to the ticket, category and rating data the scores are
/// computed from.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn fetch_all_tickets(&self) -> anyhow::Result<Vec<Ticket>>;
    async fn fetch_all_rating_categories(&self) -> anyhow::Result<Vec<RatingCategory>>;
    /// Ratings with `from <= created_at <= to`.
    async fn fetch_ratings_created_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<Rating>>;
}

#[async_trait]
impl<S: ScoreStore + ?Sized> ScoreStore for Arc<S> {
    async fn fetch_all_tickets(&self) -> anyhow::Result<Vec<Ticket>> {
        (**self).fetch_all_tickets().await
    }

    async fn fetch_all_rating_categories(&self) -> anyhow::Result<Vec<RatingCategory>> {
        (**self).fetch_all_rating_categories().await
    }

    async fn fetch_ratings_created_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<Rating>> {
        (**self).fetch_ratings_created_between(from, to).await
    }
}

/// Keeps the category catalog for `ttl` before asking the inner store again.
/// Tickets and ratings always pass through.
pub struct CachedCategories<S> {
    inner: S,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Arc<Vec<RatingCategory>>)>>,
}

impl<S> CachedCategories<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }

    fn fresh(&self) -> Option<Arc<Vec<RatingCategory>>> {
        let guard = self.cached.lock().ok()?;
        match guard.as_ref() {
            Some((stored_at, categories)) if stored_at.elapsed() < self.ttl => {
                Some(Arc::clone(categories))
            }
            _ => None,
        }
    }

    fn store(&self, categories: Vec<RatingCategory>) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some((Instant::now(), Arc::new(categories)));
        }
    }
}

#[async_trait]
impl<S: ScoreStore> ScoreStore for CachedCategories<S> {
    async fn fetch_all_tickets(&self) -> anyhow::Result<Vec<Ticket>> {
        self.inner.fetch_all_tickets().await
    }

    async fn fetch_all_rating_categories(&self) -> anyhow::Result<Vec<RatingCategory>> {
        if let Some(categories) = self.fresh() {
            debug!(count = categories.len(), "rating categories served from cache");
            return Ok(categories.as_ref().clone());
        }
        let categories = self.inner.fetch_all_rating_categories().await?;
        self.store(categories.clone());
        Ok(categories)
    }

    async fn fetch_ratings_created_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<Rating>> {
        self.inner.fetch_ratings_created_between(from, to).await
    }
}
