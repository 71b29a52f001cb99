use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, SubsecRound};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::models::{Rating, RatingCategory, Ticket};
use crate::period::{format_timestamp, parse_timestamp};
use crate::store::ScoreStore;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url {database_url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open the ratings database")?;
    info!(database_url, "connected to database");
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    let categories = [
        (1, "Spelling", 1.0),
        (2, "Grammar", 0.7),
        (3, "GDPR", 1.2),
        (4, "Randomness", 0.5),
    ];
    for (id, name, weight) in categories {
        sqlx::query(
            r#"
            INSERT INTO rating_categories (id, name, weight)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, weight = excluded.weight
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(weight)
        .execute(pool)
        .await?;
    }

    let tickets = [
        (1, "Refund not received", "2019-07-15T08:30:00"),
        (2, "Cannot reset password", "2019-07-16T11:05:00"),
        (3, "Invoice shows wrong VAT", "2019-07-17T07:45:00"),
    ];
    for (id, subject, created_at) in tickets {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, subject, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(subject)
        .bind(created_at)
        .execute(pool)
        .await?;
    }

    let ratings = [
        (1, 4, 1, 1, "2019-07-16T09:10:00"),
        (2, 3, 1, 2, "2019-07-16T09:10:00"),
        (3, 5, 2, 3, "2019-07-16T13:40:00"),
        (4, 2, 2, 4, "2019-07-16T13:40:00"),
        (5, 5, 1, 1, "2019-07-17T10:00:00"),
        (6, 3, 1, 2, "2019-07-17T11:00:00"),
        (7, 1, 3, 3, "2019-07-17T15:20:00"),
        (8, 4, 3, 4, "2019-07-17T15:20:00"),
    ];
    for (id, rating, ticket_id, category_id, created_at) in ratings {
        sqlx::query(
            r#"
            INSERT INTO ratings (id, rating, ticket_id, rating_category_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(rating)
        .bind(ticket_id)
        .bind(category_id)
        .bind(created_at)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Imports ratings together with their ticket and category. Rows whose rating
/// id already exists are skipped.
pub async fn import_csv(pool: &SqlitePool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        rating_id: i64,
        ticket_id: i64,
        ticket_subject: String,
        category: String,
        weight: f64,
        rating: i64,
        created_at: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let created_at = parse_timestamp(&row.created_at)
            .with_context(|| format!("row {}: bad created_at {:?}", line + 1, row.created_at))?;
        anyhow::ensure!(
            row.weight > 0.0,
            "row {}: category weight must be positive",
            line + 1
        );

        let category_id: i64 = sqlx::query(
            r#"
            INSERT INTO rating_categories (name, weight)
            VALUES (?, ?)
            ON CONFLICT (name) DO UPDATE SET weight = excluded.weight
            RETURNING id
            "#,
        )
        .bind(&row.category)
        .bind(row.weight)
        .fetch_one(pool)
        .await?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO tickets (id, subject, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.ticket_id)
        .bind(&row.ticket_subject)
        .bind(format_timestamp(created_at))
        .execute(pool)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO ratings (id, rating, ticket_id, rating_category_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.rating_id)
        .bind(row.rating)
        .bind(row.ticket_id)
        .bind(category_id)
        .bind(format_timestamp(created_at))
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// `created_at` is stored as `YYYY-MM-DDTHH:MM:SS` text, so a lower bound
/// with a fraction of a second starts at the next whole second.
fn lower_bound_text(from: NaiveDateTime) -> String {
    let whole = from.trunc_subsecs(0);
    if whole == from {
        format_timestamp(from)
    } else {
        whole
            .checked_add_signed(Duration::seconds(1))
            .map_or_else(|| format_timestamp(whole), format_timestamp)
    }
}

fn read_timestamp(row: &SqliteRow, column: &str) -> anyhow::Result<NaiveDateTime> {
    let text: String = row.try_get(column)?;
    parse_timestamp(&text).with_context(|| format!("bad {column} value {text:?}"))
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreStore for SqliteStore {
    async fn fetch_all_tickets(&self) -> anyhow::Result<Vec<Ticket>> {
        let rows = sqlx::query("SELECT id, subject, created_at FROM tickets ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<Ticket> {
                Ok(Ticket {
                    id: row.try_get("id")?,
                    subject: row.try_get("subject")?,
                    created_at: read_timestamp(row, "created_at")?,
                })
            })
            .collect()
    }

    async fn fetch_all_rating_categories(&self) -> anyhow::Result<Vec<RatingCategory>> {
        let rows = sqlx::query("SELECT id, name, weight FROM rating_categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> anyhow::Result<RatingCategory> {
                Ok(RatingCategory {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    weight: row.try_get("weight")?,
                })
            })
            .collect()
    }

    async fn fetch_ratings_created_between(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> anyhow::Result<Vec<Rating>> {
        let rows = sqlx::query(
            r#"
            SELECT id, rating, ticket_id, rating_category_id, created_at
            FROM ratings
            WHERE created_at BETWEEN ? AND ?
            ORDER BY created_at, id
            "#,
        )
        .bind(lower_bound_text(from))
        .bind(format_timestamp(to))
        .fetch_all(&self.pool)
        .await?;
        debug!(rows = rows.len(), %from, %to, "loaded ratings");

        rows.iter()
            .map(|row| -> anyhow::Result<Rating> {
                Ok(Rating {
                    id: row.try_get("id")?,
                    raw_value: row.try_get("rating")?,
                    ticket_id: row.try_get("ticket_id")?,
                    category_id: row.try_get("rating_category_id")?,
                    created_at: read_timestamp(row, "created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::engine::ScoreEngine;
    use crate::error::ScoreError;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        init_db(&pool).await.expect("migrations");
        pool
    }

    fn ts(value: &str) -> NaiveDateTime {
        parse_timestamp(value).expect("valid timestamp")
    }

    #[test]
    fn lower_bound_rounds_fractions_up() {
        assert_eq!(lower_bound_text(ts("2019-07-16T00:00:59")), "2019-07-16T00:00:59");
        let fractional = ts("2019-07-16T00:00:59") + Duration::nanoseconds(999_999_999);
        assert_eq!(lower_bound_text(fractional), "2019-07-16T00:01:00");
    }

    #[tokio::test]
    async fn seeded_database_answers_store_queries() {
        let pool = memory_pool().await;
        seed(&pool).await.expect("seed");
        seed(&pool).await.expect("seeding twice is harmless");
        let store = SqliteStore::new(pool);

        let tickets = store.fetch_all_tickets().await.expect("tickets");
        let categories = store.fetch_all_rating_categories().await.expect("categories");
        let ratings = store
            .fetch_ratings_created_between(ts("2019-07-17T00:00:00"), ts("2019-07-17T23:59:00"))
            .await
            .expect("ratings");

        assert_eq!(tickets.len(), 3);
        assert_eq!(categories.len(), 4);
        assert_eq!(categories[2].name, "GDPR");
        assert_eq!(ratings.len(), 4);
        assert!(ratings.iter().all(|r| r.created_at.date().to_string() == "2019-07-17"));
    }

    #[tokio::test]
    async fn rating_bounds_are_inclusive() {
        let pool = memory_pool().await;
        seed(&pool).await.expect("seed");
        let store = SqliteStore::new(pool);

        let ratings = store
            .fetch_ratings_created_between(ts("2019-07-17T10:00:00"), ts("2019-07-17T11:00:00"))
            .await
            .expect("ratings");

        let ids: Vec<i64> = ratings.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[tokio::test]
    async fn engine_runs_end_to_end_on_sqlite() {
        let pool = memory_pool().await;
        seed(&pool).await.expect("seed");
        let engine = ScoreEngine::new(SqliteStore::new(pool), StdDuration::from_secs(5));
        let from = Some(ts("2019-07-17T00:00:00"));
        let to = Some(ts("2019-07-17T23:59:00"));

        let by_ticket = engine.scores_by_ticket(from, to).await.expect("by ticket");
        assert_eq!(by_ticket.len(), 3);
        assert!(by_ticket.iter().all(|t| t.categories.len() == 4));
        assert_eq!(by_ticket[0].categories[0].score, 100.0);
        assert_eq!(by_ticket[0].categories[1].score, 60.0);

        let change = engine
            .period_over_period_change(from, to)
            .await
            .expect("change");
        assert_eq!(change.previous.rating_count, 4);
        assert_eq!(change.current.rating_count, 4);

        let empty = engine
            .overall_quality_score(Some(ts("2020-01-01T00:00:00")), Some(ts("2020-01-02T00:00:00")))
            .await;
        assert!(matches!(empty, Err(ScoreError::EmptyResult { .. })));
    }

    #[tokio::test]
    async fn imports_csv_once() {
        let pool = memory_pool().await;
        let mut file = std::env::temp_dir();
        file.push(format!("ratings-import-{}.csv", std::process::id()));
        {
            let mut out = std::fs::File::create(&file).expect("temp csv");
            writeln!(out, "rating_id,ticket_id,ticket_subject,category,weight,rating,created_at")
                .expect("header");
            writeln!(out, "10,7,Login loop,Tone,1.5,4,2019-07-20T08:00:00").expect("row");
            writeln!(out, "11,7,Login loop,Accuracy,1.0,2,2019-07-20T09:30:00").expect("row");
        }

        let first = import_csv(&pool, &file).await.expect("import");
        let second = import_csv(&pool, &file).await.expect("re-import");
        std::fs::remove_file(&file).ok();

        assert_eq!(first, 2);
        assert_eq!(second, 0);
        let store = SqliteStore::new(pool);
        let categories = store.fetch_all_rating_categories().await.expect("categories");
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Tone", "Accuracy"]);
        assert_eq!(store.fetch_all_tickets().await.expect("tickets").len(), 1);
    }
}
