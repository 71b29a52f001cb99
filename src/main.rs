use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

mod compare;
mod config;
mod db;
mod engine;
mod error;
mod models;
mod period;
mod report;
mod score;
mod store;
mod telemetry;

use crate::config::AppConfig;
use crate::engine::ScoreEngine;
use crate::error::{ScoreError, ScoreResult};
use crate::store::{CachedCategories, ScoreStore};

#[derive(Parser)]
#[command(name = "ticket-quality-scores")]
#[command(about = "Quality scores for support tickets from their ratings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Window {
    /// Window start, YYYY-MM-DDTHH:MM:SS
    #[arg(long, value_parser = period::parse_timestamp)]
    from: Option<NaiveDateTime>,
    /// Window end (inclusive), YYYY-MM-DDTHH:MM:SS
    #[arg(long, value_parser = period::parse_timestamp)]
    to: Option<NaiveDateTime>,
    /// Whole days instead of timestamps: YYYY-MM-DD or YYYY-MM-DD..YYYY-MM-DD
    #[arg(long, conflicts_with_all = ["from", "to"])]
    period: Option<String>,
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Window {
    fn bounds(&self) -> anyhow::Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        match &self.period {
            Some(text) => {
                let range = period::parse_period(text, "..")?;
                Ok((Some(range.from), Some(range.to)))
            }
            None => Ok((self.from, self.to)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo tickets, categories and ratings
    Seed,
    /// Import ratings from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score every ticket in every category
    ByTicket(Window),
    /// Category scores per day or week
    OverTime(Window),
    /// Weighted quality score across all ratings
    Overall(Window),
    /// Overall score against the preceding window of equal length
    Change(Window),
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        window: Window,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

/// Maps "no ratings in the window" to `None`; every other error stays an error.
fn allow_empty<T>(result: ScoreResult<T>) -> ScoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ScoreError::EmptyResult { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;
    telemetry::init(&config.log_level)?;

    let pool = db::connect(&config.database_url).await?;
    let store: Arc<dyn ScoreStore> = if config.category_cache_ttl.is_zero() {
        Arc::new(db::SqliteStore::new(pool.clone()))
    } else {
        info!(ttl_secs = config.category_cache_ttl.as_secs(), "category cache enabled");
        Arc::new(CachedCategories::new(
            db::SqliteStore::new(pool.clone()),
            config.category_cache_ttl,
        ))
    };
    let engine = ScoreEngine::new(store, config.fetch_timeout);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} ratings from {}.", csv.display());
        }
        Commands::ByTicket(window) => {
            let (from, to) = window.bounds()?;
            let scores = engine.scores_by_ticket(from, to).await?;
            if window.json {
                return print_json(&scores);
            }
            for ticket in &scores {
                let line: Vec<String> = ticket
                    .categories
                    .iter()
                    .map(|c| format!("{} {:.2}", c.category_name, c.score))
                    .collect();
                println!(
                    "- Ticket {} ({}): {}",
                    ticket.ticket_id,
                    ticket.subject,
                    line.join(", ")
                );
            }
        }
        Commands::OverTime(window) => {
            let (from, to) = window.bounds()?;
            let categories = engine.aggregated_category_scores_over_time(from, to).await?;
            if window.json {
                return print_json(&categories);
            }
            for category in &categories {
                println!(
                    "{}: {:.2} across {} ratings",
                    category.category_name, category.total_score, category.total_rating_count
                );
                for bucket in &category.periods {
                    println!(
                        "  - {} to {}: {:.2} ({} ratings)",
                        period::format_timestamp(bucket.period.from),
                        period::format_timestamp(bucket.period.to),
                        bucket.score,
                        bucket.rating_count
                    );
                }
            }
        }
        Commands::Overall(window) => {
            let (from, to) = window.bounds()?;
            let score = allow_empty(engine.overall_quality_score(from, to).await)?;
            if window.json {
                return print_json(&serde_json::json!({ "overall_score": score }));
            }
            match score {
                Some(score) => println!("Overall quality score: {score:.2}"),
                None => println!("No ratings found for this window."),
            }
        }
        Commands::Change(window) => {
            let (from, to) = window.bounds()?;
            let change = allow_empty(engine.period_over_period_change(from, to).await)?;
            if window.json {
                return print_json(&change);
            }
            match change {
                Some(change) => println!(
                    "Current {:.2} ({} ratings), previous {:.2} ({} ratings), difference {:.2} ({:?})",
                    change.current.score,
                    change.current.rating_count,
                    change.previous.score,
                    change.previous.rating_count,
                    change.score_difference,
                    change.trend
                ),
                None => println!("Not enough ratings to compare periods."),
            }
        }
        Commands::Report { window, out } => {
            let (from, to) = window.bounds()?;
            let range = period::validate_range(from, to)?;
            let tickets = engine.scores_by_ticket(from, to).await?;
            let categories = engine.aggregated_category_scores_over_time(from, to).await?;
            let overall_score = allow_empty(engine.overall_quality_score(from, to).await)?;
            let change = allow_empty(engine.period_over_period_change(from, to).await)?;
            let report = report::build_report(&report::ReportInput {
                window: range,
                overall_score,
                change: change.as_ref(),
                categories: &categories,
                tickets: &tickets,
            });
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
