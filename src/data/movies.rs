use super::StoreError;
use crate::validator::{self, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::SystemTime;

/// Running time in whole minutes, carried over the wire as `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl std::str::FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || "invalid runtime format".to_string();
        let (n, unit) = s.split_once(' ').ok_or_else(invalid)?;
        if unit != "mins" {
            return Err(invalid());
        }
        n.parse::<i32>().map(Runtime).map_err(|_| invalid())
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: SystemTime,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl Runtime {
    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Movie {
    pub fn new(title: String, year: i32, runtime: Runtime, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: SystemTime::now(),
            title,
            year,
            runtime,
            genres,
            version: 1,
        }
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= 500,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= 1888, "year", "must be greater than 1888");
    v.check(
        movie.year <= current_year(),
        "year",
        "must not be in the future",
    );

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        movie.genres.len() <= 5,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        validator::unique(&movie.genres),
        "genres",
        "must not contain duplicate values",
    );
}

/// UTC calendar year of the wall clock.
fn current_year() -> i32 {
    let stamp = humantime::format_rfc3339_seconds(SystemTime::now()).to_string();
    stamp.get(..4).and_then(|y| y.parse().ok()).unwrap_or(i32::MAX)
}

/// Listing filter. Empty fields match everything.
#[derive(Debug, Clone)]
pub struct MovieFilter {
    pub title: String,
    pub genres: Vec<String>,
    pub page: usize,
    pub page_size: usize,
}

impl Default for MovieFilter {
    fn default() -> Self {
        Self {
            title: String::new(),
            genres: Vec::new(),
            page: 1,
            page_size: 20,
        }
    }
}

pub fn validate_filter(v: &mut Validator, f: &MovieFilter) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(
        f.page <= 10_000_000,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(f.page_size <= 100, "page_size", "must be a maximum of 100");
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: Movie) -> Result<Movie, StoreError>;

    async fn get(&self, id: i64) -> Result<Movie, StoreError>;

    /// Store `movie` if its version still matches the stored one; the stored
    /// copy comes back with the version bumped.
    async fn update(&self, movie: Movie) -> Result<Movie, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn list(&self, filter: &MovieFilter) -> Result<Vec<Movie>, StoreError>;
}
