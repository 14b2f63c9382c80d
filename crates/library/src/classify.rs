//! Movie / TV show classification.
//!
//! The upstream files TV series under the movie category. The only hint is
//! free text: a marker in the card subtitle or in the genre list.

use crate::models::Kind;
use shelf_upstream::{Category, DEFAULT_TV_MARKER, RawRecord};

/// Decides the [`Kind`] of a record fetched under a given category.
pub trait Classifier: Send + Sync {
    fn classify(&self, category: Category, record: &RawRecord) -> Kind;
}

/// Classifies a movie record as a TV show when any marker appears in its
/// subtitle (substring) or equals one of its genres. Book records are always
/// books.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl MarkerClassifier {
    /// Empty markers are dropped; with none left, nothing is a TV show.
    pub fn new(markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let markers = markers.into_iter().map(Into::into).filter(|m: &String| !m.is_empty()).collect();
        Self { markers }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    fn is_tv(&self, record: &RawRecord) -> bool {
        let subtitle = record.subtitle();
        let genres = record.genres();
        self.markers.iter().any(|marker| subtitle.contains(marker.as_str()) || genres.iter().any(|g| g == marker))
    }
}
impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new([DEFAULT_TV_MARKER])
    }
}

impl Classifier for MarkerClassifier {
    fn classify(&self, category: Category, record: &RawRecord) -> Kind {
        match category {
            Category::Book => Kind::Book,
            Category::Movie if self.is_tv(record) => Kind::TvShow,
            Category::Movie => Kind::Movie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RawRecord::titled("Stalker").with_subtitle("1979 / 苏联 / 剧情 科幻"), Kind::Movie)]
    #[case(RawRecord::titled("Fargo").with_subtitle("2014 / 美国 / 电视剧 犯罪"), Kind::TvShow)]
    #[case(RawRecord::titled("Chernobyl").with_genres(["剧情", "电视剧"]), Kind::TvShow)]
    #[case(RawRecord::titled("Dune").with_genres(["科幻电视剧节"]), Kind::Movie)]
    #[case(RawRecord::titled("Untitled"), Kind::Movie)]
    fn test_default_markers(#[case] record: RawRecord, #[case] expected: Kind) {
        assert_eq!(MarkerClassifier::default().classify(Category::Movie, &record), expected);
    }

    #[test]
    fn test_default_marker_is_shared() {
        assert_eq!(MarkerClassifier::default().markers(), [DEFAULT_TV_MARKER]);
    }

    #[test]
    fn test_books_are_never_tv() {
        let record = RawRecord::titled("Script").with_subtitle("电视剧 剧本");
        assert_eq!(MarkerClassifier::default().classify(Category::Book, &record), Kind::Book);
    }

    #[test]
    fn test_custom_markers() {
        let classifier = MarkerClassifier::new(["TV Series", ""]);
        assert_eq!(classifier.markers().len(), 1);
        let record = RawRecord::titled("Fargo").with_subtitle("2014 / USA / TV Series");
        assert_eq!(classifier.classify(Category::Movie, &record), Kind::TvShow);
        let record = RawRecord::titled("Fargo").with_subtitle("2014 / 美国 / 电视剧");
        assert_eq!(classifier.classify(Category::Movie, &record), Kind::Movie);
    }

    #[test]
    fn test_no_markers() {
        let classifier = MarkerClassifier::new(Vec::<String>::new());
        let record = RawRecord::titled("Fargo").with_genres(["电视剧"]);
        assert_eq!(classifier.classify(Category::Movie, &record), Kind::Movie);
    }
}
