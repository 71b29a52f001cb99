use chrono::NaiveDateTime;

/// Which collaborator fetch failed, so errors say where they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    Tickets,
    RatingCategories,
    Ratings,
}

impl std::fmt::Display for Fetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Fetch::Tickets => "tickets",
            Fetch::RatingCategories => "rating categories",
            Fetch::Ratings => "ratings",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("invalid range: {0}")]
    InvalidRange(&'static str),
    #[error("failed to fetch {fetch}: {source}")]
    DataSource {
        fetch: Fetch,
        #[source]
        source: anyhow::Error,
    },
    #[error("no ratings between {from} and {to}")]
    EmptyResult {
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
}

impl ScoreError {
    pub fn data_source(fetch: Fetch, source: impl Into<anyhow::Error>) -> Self {
        Self::DataSource {
            fetch,
            source: source.into(),
        }
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;
