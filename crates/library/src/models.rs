//! Snapshot data model.
//!
//! A [`Snapshot`] is the canonical, persisted view of one user's collections:
//! three fixed buckets of [`Item`]s plus per-status counts. Image references
//! inside it are reached through [`Snapshot::images`] and
//! [`Snapshot::images_mut`] rather than by walking the JSON.

use serde::{Deserialize, Serialize};
use shelf_images::{ImageRef, LocalRef};
use shelf_upstream::{Category, RawRecord, Status};
use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::OffsetDateTime;

/// What a record is, after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kind {
    Movie,
    TvShow,
    Book,
}
impl Kind {
    pub const ALL: [Kind; 3] = [Kind::Movie, Kind::TvShow, Kind::Book];

    /// Human-readable name of a status for this kind.
    pub fn label(&self, status: Status) -> &'static str {
        match (self, status) {
            (Kind::Movie | Kind::TvShow, Status::Done) => "watched",
            (Kind::Movie | Kind::TvShow, Status::Doing) => "watching",
            (Kind::Movie | Kind::TvShow, Status::Mark) => "want to watch",
            (Kind::Book, Status::Done) => "read",
            (Kind::Book, Status::Doing) => "reading",
            (Kind::Book, Status::Mark) => "want to read",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Movie => "movie",
            Kind::TvShow => "tv",
            Kind::Book => "book",
        }
    }
}
impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
impl FromStr for Kind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "movies" => Ok(Kind::Movie),
            "tv" | "tvshow" | "tvshows" | "tv-show" | "tv-shows" => Ok(Kind::TvShow),
            "book" | "books" => Ok(Kind::Book),
            _ => Err(format!("unknown kind: {s}")),
        }
    }
}

/// One media record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    /// Opaque upstream timestamp.
    pub mark_time: String,
    pub comment: String,
    pub rating: f64,
    pub status: Status,
    pub kind: Kind,
    pub image: ImageRef,
}
impl Item {
    pub fn from_record(record: &RawRecord, status: Status, kind: Kind) -> Self {
        let image = match record.image() {
            "" => ImageRef::default(),
            url => ImageRef::uncached(url),
        };
        Self {
            name: record.title().to_string(),
            mark_time: record.create_time().to_string(),
            comment: record.comment().to_string(),
            rating: record.rating(),
            status,
            kind,
            image,
        }
    }
}

/// Item counts per status within one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub done: u64,
    pub doing: u64,
    pub mark: u64,
}
impl StatusCounts {
    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Done => self.done,
            Status::Doing => self.doing,
            Status::Mark => self.mark,
        }
    }

    fn increment(&mut self, status: Status) {
        match status {
            Status::Done => self.done += 1,
            Status::Doing => self.doing += 1,
            Status::Mark => self.mark += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.done + self.doing + self.mark
    }
}

/// Counts per kind × status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub movies: StatusCounts,
    pub tv_shows: StatusCounts,
    pub books: StatusCounts,
}
impl Stats {
    pub fn compute(items: &Items) -> Self {
        let mut stats = Self::default();
        for item in items.iter() {
            stats.of_mut(item.kind).increment(item.status);
        }
        stats
    }

    pub fn of(&self, kind: Kind) -> &StatusCounts {
        match kind {
            Kind::Movie => &self.movies,
            Kind::TvShow => &self.tv_shows,
            Kind::Book => &self.books,
        }
    }

    fn of_mut(&mut self, kind: Kind) -> &mut StatusCounts {
        match kind {
            Kind::Movie => &mut self.movies,
            Kind::TvShow => &mut self.tv_shows,
            Kind::Book => &mut self.books,
        }
    }

    pub fn total(&self, kind: Kind) -> u64 {
        self.of(kind).total()
    }
}

/// The three fixed item buckets, each in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Items {
    pub movies: Vec<Item>,
    pub tv_shows: Vec<Item>,
    pub books: Vec<Item>,
}
impl Items {
    pub fn bucket(&self, kind: Kind) -> &[Item] {
        match kind {
            Kind::Movie => &self.movies,
            Kind::TvShow => &self.tv_shows,
            Kind::Book => &self.books,
        }
    }

    fn bucket_mut(&mut self, kind: Kind) -> &mut Vec<Item> {
        match kind {
            Kind::Movie => &mut self.movies,
            Kind::TvShow => &mut self.tv_shows,
            Kind::Book => &mut self.books,
        }
    }

    /// Append to the bucket matching the item's kind.
    pub fn push(&mut self, item: Item) {
        self.bucket_mut(item.kind).push(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.movies.iter().chain(&self.tv_shows).chain(&self.books)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.movies.iter_mut().chain(&mut self.tv_shows).chain(&mut self.books)
    }

    pub fn len(&self) -> usize {
        self.movies.len() + self.tv_shows.len() + self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical per-user aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub uid: String,
    pub stats: Stats,
    pub items: Items,
    #[serde(with = "time::serde::rfc3339")]
    pub built_at: OffsetDateTime,
}
impl Snapshot {
    /// Wrap freshly reconciled items, computing their stats.
    pub fn new(uid: impl Into<String>, items: Items) -> Self {
        Self { uid: uid.into(), stats: Stats::compute(&items), items, built_at: OffsetDateTime::now_utc() }
    }

    /// Items of one kind, optionally narrowed to one status.
    pub fn items(&self, kind: Kind, status: Option<Status>) -> impl Iterator<Item = &Item> {
        self.items.bucket(kind).iter().filter(move |item| status.is_none_or(|status| item.status == status))
    }

    /// Every non-empty image reference, in bucket order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.items.iter().map(|item| &item.image).filter(|image| !image.is_empty())
    }

    pub fn images_mut(&mut self) -> impl Iterator<Item = &mut ImageRef> {
        self.items.iter_mut().map(|item| &mut item.image).filter(|image| !image.is_empty())
    }

    /// Point each image at its resolved local reference, returning how many
    /// references actually changed. Sources are never touched.
    pub fn apply_images(&mut self, resolved: &HashMap<String, LocalRef>) -> usize {
        let mut changed = 0;
        for image in self.images_mut() {
            if let Some(local) = resolved.get(&image.source)
                && *local != image.local
            {
                image.local = local.clone();
                changed += 1;
            }
        }
        changed
    }
}

/// A single subject looked up by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    pub id: String,
    pub category: Category,
    pub name: String,
    pub rating: f64,
    pub image: ImageRef,
}
