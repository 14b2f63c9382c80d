//! Wire models for the upstream collection API.
//!
//! Upstream payloads are loosely typed: any field may be missing or `null`,
//! so everything optional is an [`Option`] here and the accessors collapse
//! absent values to empty strings, empty slices or zero.

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Marker the upstream puts in a movie record's subtitle or genres when the
/// record is actually a TV series.
pub const DEFAULT_TV_MARKER: &str = "电视剧";

/// Collection category as understood by the upstream API.
///
/// TV shows are not a category of their own upstream; they are filed under
/// [`Movie`](Self::Movie).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Book,
}
impl Category {
    /// Every category, in reconciliation order.
    pub const ALL: [Category; 2] = [Category::Movie, Category::Book];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Book => "book",
        }
    }
}
impl FromStr for Category {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "movie" | "movies" => Self::Movie,
            "book" | "books" => Self::Book,
            _ => exn::bail!(ErrorKind::Unknown {
                field: "category",
                value: s.to_string()
            }),
        })
    }
}
impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Collection status bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Watched / read.
    Done,
    /// Currently watching / reading.
    Doing,
    /// Marked for later.
    Mark,
}
impl Status {
    /// Every status, in reconciliation order.
    pub const ALL: [Status; 3] = [Status::Done, Status::Doing, Status::Mark];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Done => "done",
            Status::Doing => "doing",
            Status::Mark => "mark",
        }
    }
}
impl FromStr for Status {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "done" => Self::Done,
            "doing" => Self::Doing,
            "mark" => Self::Mark,
            _ => exn::bail!(ErrorKind::Unknown {
                field: "status",
                value: s.to_string()
            }),
        })
    }
}
impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One page request against a (uid, category, status) collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub uid: String,
    pub category: Category,
    pub status: Status,
    pub offset: u64,
    pub limit: u64,
}

/// One page of a collection, as returned by the upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Total number of records the upstream *claims* the collection holds.
    #[serde(default)]
    pub total: u64,
    #[serde(default, rename = "interests")]
    pub records: Vec<RawRecord>,
}

/// A user's mark on one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub rating: Option<RawRating>,
    #[serde(default)]
    pub subject: Option<RawSubject>,
}
impl RawRecord {
    /// A record for a subject with the given title and nothing else.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            subject: Some(RawSubject {
                title: Some(title.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.subject_mut().pic = Some(RawPicture { normal: Some(url.into()) });
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subject_mut().card_subtitle = Some(subtitle.into());
        self
    }

    pub fn with_genres(mut self, genres: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subject_mut().genres = Some(genres.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_mark(mut self, create_time: impl Into<String>, comment: impl Into<String>, rating: f64) -> Self {
        self.create_time = Some(create_time.into());
        self.comment = Some(comment.into());
        self.rating = Some(RawRating { value: Some(rating) });
        self
    }

    fn subject_mut(&mut self) -> &mut RawSubject {
        self.subject.get_or_insert_with(RawSubject::default)
    }

    pub fn title(&self) -> &str {
        self.subject.as_ref().map(RawSubject::title).unwrap_or_default()
    }

    pub fn image(&self) -> &str {
        self.subject.as_ref().map(RawSubject::image).unwrap_or_default()
    }

    pub fn subtitle(&self) -> &str {
        self.subject.as_ref().map(RawSubject::subtitle).unwrap_or_default()
    }

    pub fn genres(&self) -> &[String] {
        self.subject.as_ref().map(RawSubject::genres).unwrap_or_default()
    }

    pub fn create_time(&self) -> &str {
        self.create_time.as_deref().unwrap_or_default()
    }

    pub fn comment(&self) -> &str {
        self.comment.as_deref().unwrap_or_default()
    }

    pub fn rating(&self) -> f64 {
        self.rating.as_ref().and_then(|r| r.value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRating {
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPicture {
    #[serde(default)]
    pub normal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSubject {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pic: Option<RawPicture>,
    /// Free-text line such as "2019 / USA / Drama"; also where the upstream
    /// reveals that a "movie" is actually a TV series.
    #[serde(default)]
    pub card_subtitle: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}
impl RawSubject {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn image(&self) -> &str {
        self.pic.as_ref().and_then(|pic| pic.normal.as_deref()).unwrap_or_default()
    }

    pub fn subtitle(&self) -> &str {
        self.card_subtitle.as_deref().unwrap_or_default()
    }

    pub fn genres(&self) -> &[String] {
        self.genres.as_deref().unwrap_or_default()
    }
}

/// Single subject lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetail {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pic: Option<RawPicture>,
    #[serde(default)]
    pub rating: Option<RawRating>,
}
impl RawDetail {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn image(&self) -> &str {
        self.pic.as_ref().and_then(|pic| pic.normal.as_deref()).unwrap_or_default()
    }

    pub fn rating(&self) -> f64 {
        self.rating.as_ref().and_then(|r| r.value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PAGE: &str = r#"{
        "count": 2,
        "start": 0,
        "total": 117,
        "interests": [
            {
                "comment": "slow but worth it",
                "rating": {"count": 1, "max": 5, "value": 4},
                "create_time": "2024-03-02 21:14:09",
                "status": "done",
                "subject": {
                    "title": "Stalker",
                    "card_subtitle": "1979 / Soviet Union / Drama Sci-Fi",
                    "genres": ["Drama", "Sci-Fi"],
                    "pic": {"large": "https://img.example/l/p1.webp", "normal": "https://img.example/m/p1.webp"}
                }
            },
            {
                "comment": null,
                "rating": null,
                "create_time": "2024-03-01 09:00:00",
                "subject": {"title": "Untitled", "pic": null}
            }
        ]
    }"#;

    #[test]
    fn test_decode_page() {
        let page: Page = serde_json::from_str(PAGE).unwrap();
        assert_eq!(page.total, 117);
        assert_eq!(page.records.len(), 2);

        let first = &page.records[0];
        assert_eq!(first.title(), "Stalker");
        assert_eq!(first.image(), "https://img.example/m/p1.webp");
        assert_eq!(first.rating(), 4.0);
        assert_eq!(first.genres(), ["Drama".to_string(), "Sci-Fi".to_string()]);
        assert_eq!(first.create_time(), "2024-03-02 21:14:09");

        let second = &page.records[1];
        assert_eq!(second.comment(), "");
        assert_eq!(second.rating(), 0.0);
        assert_eq!(second.image(), "");
        assert_eq!(second.subtitle(), "");
        assert!(second.genres().is_empty());
    }

    #[test]
    fn test_decode_empty_object() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page, Page::default());
    }

    #[test]
    fn test_decode_detail() {
        let detail: RawDetail = serde_json::from_str(
            r#"{"title": "Solaris", "pic": {"normal": "https://img.example/m/p2.jpg"}, "rating": {"value": 8.1}}"#,
        )
        .unwrap();
        assert_eq!(detail.title(), "Solaris");
        assert_eq!(detail.image(), "https://img.example/m/p2.jpg");
        assert_eq!(detail.rating(), 8.1);
    }

    #[test]
    fn test_builder() {
        let record = RawRecord::titled("Dune")
            .with_image("https://img.example/dune.jpg")
            .with_subtitle("2021 / USA")
            .with_genres(["Sci-Fi"])
            .with_mark("2024-01-01 00:00:00", "loud", 5.0);
        assert_eq!(record.title(), "Dune");
        assert_eq!(record.image(), "https://img.example/dune.jpg");
        assert_eq!(record.subtitle(), "2021 / USA");
        assert_eq!(record.comment(), "loud");
        assert_eq!(record.rating(), 5.0);
    }

    #[rstest]
    #[case("movie", Category::Movie)]
    #[case("Books", Category::Book)]
    #[case(" book ", Category::Book)]
    fn test_category_from_str(#[case] input: &str, #[case] expected: Category) {
        assert_eq!(input.parse::<Category>().unwrap(), expected);
    }

    #[rstest]
    #[case("done", Status::Done)]
    #[case("DOING", Status::Doing)]
    #[case("mark", Status::Mark)]
    fn test_status_from_str(#[case] input: &str, #[case] expected: Status) {
        assert_eq!(input.parse::<Status>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_values() {
        assert!("music".parse::<Category>().is_err());
        let err = "wish".parse::<Status>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unknown { field: "status", .. }));
    }
}
