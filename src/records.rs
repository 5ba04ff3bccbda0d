//! Raw input records, one per line of the source dumps.
//!
//! The dumps encode most scalar fields as strings (`"ratings_count": "12"`),
//! occasionally as bare numbers. Scalars are therefore read leniently into
//! `Option<String>` and coerced at write time with [`parse_count`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// One line of `authors.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorRecord {
    /// Externally supplied stable identifier.
    #[serde(deserialize_with = "required_scalar")]
    pub author_id: String,
    /// Display name.
    pub name: String,
    /// Average rating, kept as text.
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub average_rating: Option<String>,
    /// Number of text reviews, as supplied.
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub text_reviews_count: Option<String>,
    /// Number of ratings, as supplied.
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub ratings_count: Option<String>,
}

/// Author reference nested in a book record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorRef {
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub role: Option<String>,
}

/// Shelf tally nested in a book record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PopularShelf {
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub count: Option<String>,
    pub name: String,
}

/// One line of `books.json`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BookRecord {
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub isbn: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub isbn13: Option<String>,
    /// Mandatory for insertion; records without it are skipped by the writer.
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<AuthorRef>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub publication_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub publisher: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub num_pages: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub language_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub text_reviews_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub ratings_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub average_rating: Option<String>,
    /// Series identifiers; stored as an opaque JSON string.
    #[serde(default)]
    pub series: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub popular_shelves: Vec<PopularShelf>,
}

/// The slice of a book line the thumbhash pass needs.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ImageRecord {
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub isbn: Option<String>,
}

/// Returns the trimmed value when it is present and non-empty.
#[must_use]
pub fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Coerces a numeric string for an INTEGER column.
///
/// Missing or blank input is `None`. Input that is not a base-10 integer is
/// also `None`, with a warning naming `field`; it is never written as a
/// sentinel value.
#[must_use]
pub fn parse_count(field: &'static str, raw: Option<&String>) -> Option<i64> {
    let value = non_empty(raw)?;
    match value.parse::<i64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(field, value, "invalid integer, storing NULL");
            None
        }
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn lenient_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(_) | Value::Object(_) => Err(serde::de::Error::custom(
            "expected a string, number, boolean or null",
        )),
        other => Ok(scalar_to_string(other)),
    }
}

fn required_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_scalar(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a non-null identifier"))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_author_record_parses_goodreads_line() {
        let line = r#"{"average_rating": "3.98", "author_id": "604031", "text_reviews_count": "7", "name": "Ronald J. Fields", "ratings_count": "49"}"#;
        let author: AuthorRecord = serde_json::from_str(line).unwrap();

        assert_eq!(author.author_id, "604031");
        assert_eq!(author.name, "Ronald J. Fields");
        assert_eq!(author.average_rating.as_deref(), Some("3.98"));
        assert_eq!(parse_count("ratings_count", author.ratings_count.as_ref()), Some(49));
    }

    #[test]
    fn test_author_record_accepts_numeric_id() {
        let author: AuthorRecord =
            serde_json::from_str(r#"{"author_id": 17, "name": "X", "ratings_count": 5}"#).unwrap();

        assert_eq!(author.author_id, "17");
        assert_eq!(author.ratings_count.as_deref(), Some("5"));
    }

    #[test]
    fn test_author_record_without_id_fails() {
        let result = serde_json::from_str::<AuthorRecord>(r#"{"name": "Nobody"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_book_record_parses_nested_structures() {
        let line = r#"{
            "isbn": "0312853122", "title": "W.C. Fields: A Life on Film",
            "authors": [{"author_id": "604031", "role": ""}],
            "series": ["189911"],
            "popular_shelves": [{"count": "3", "name": "to-read"}],
            "num_pages": "256", "publication_year": "1984"
        }"#;
        let book: BookRecord = serde_json::from_str(line).unwrap();

        assert_eq!(book.isbn.as_deref(), Some("0312853122"));
        assert_eq!(book.authors.len(), 1);
        assert_eq!(book.authors[0].author_id.as_deref(), Some("604031"));
        assert_eq!(book.series.as_ref().map(Vec::len), Some(1));
        assert_eq!(book.popular_shelves[0].name, "to-read");
    }

    #[test]
    fn test_book_record_null_collections_become_empty() {
        let book: BookRecord =
            serde_json::from_str(r#"{"title": "T", "authors": null, "popular_shelves": null}"#)
                .unwrap();

        assert!(book.authors.is_empty());
        assert!(book.popular_shelves.is_empty());
        assert!(book.series.is_none());
    }

    #[test]
    fn test_book_record_missing_title_still_parses() {
        let book: BookRecord = serde_json::from_str(r#"{"isbn": "1"}"#).unwrap();
        assert!(book.title.is_none());
    }

    #[test]
    fn test_parse_count_policy() {
        assert_eq!(parse_count("f", Some(&"12".to_string())), Some(12));
        assert_eq!(parse_count("f", Some(&" 7 ".to_string())), Some(7));
        assert_eq!(parse_count("f", Some(&String::new())), None);
        assert_eq!(parse_count("f", Some(&"12abc".to_string())), None);
        assert_eq!(parse_count("f", Some(&"n/a".to_string())), None);
        assert_eq!(parse_count("f", None), None);
    }

    #[test]
    fn test_non_empty_trims_blank_values() {
        assert_eq!(non_empty(Some(&"  ".to_string())), None);
        assert_eq!(non_empty(Some(&"abc".to_string())), Some("abc"));
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_image_record_ignores_extra_fields() {
        let record: ImageRecord = serde_json::from_str(
            r#"{"image_url": "https://x/y.jpg", "isbn": "1", "authors": [], "num_pages": "3"}"#,
        )
        .unwrap();

        assert_eq!(record.image_url.as_deref(), Some("https://x/y.jpg"));
        assert!(record.title.is_none());
    }
}
