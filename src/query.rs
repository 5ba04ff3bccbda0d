//! Read side of the catalog: filtered, paginated book listings and detail
//! lookups.
//!
//! Every filter value is bound as a parameter.

use serde::Serialize;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::db::Database;
use crate::records::PopularShelf;

/// Books per page.
pub const ITEMS_PER_PAGE: u32 = 28;

/// Goodreads placeholder cover; treated as "no image".
pub const EMPTY_IMAGE_URL: &str =
    "https://s.gr-assets.com/assets/nophoto/book/111x148-bcc042a9c91a29c1d680899eff700a03.png";

/// Earliest publication year ever listed.
pub const MIN_YEAR: i64 = 1950;

/// Latest publication year ever listed.
pub const MAX_YEAR: i64 = 2023;

/// Upper bound on the page-count filter.
pub const MAX_PAGES: i64 = 1000;

const ENGLISH_CODES: [&str; 3] = ["eng", "en-US", "en-GB"];

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Filters for [`fetch_books_page`] and [`count_books`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    /// 1-based page; missing or zero means the first page.
    pub page: Option<u32>,
    /// Latest publication year, clamped to `MIN_YEAR..=MAX_YEAR`.
    pub year: Option<i64>,
    /// Minimum average rating.
    pub rating: Option<f64>,
    /// Language code; `en` matches every English variant.
    pub language: Option<String>,
    /// Maximum page count, capped at [`MAX_PAGES`].
    pub pages: Option<i64>,
    /// Whitespace-separated terms that must all appear in the title.
    pub search: Option<String>,
    /// Comma-separated ISBNs.
    pub isbn: Option<String>,
}

impl SearchParams {
    /// The requested page, never less than 1.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

/// One entry in a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BookSummary {
    pub id: i64,
    pub title: String,
    pub image_url: Option<String>,
    pub thumbhash: Option<String>,
}

/// Full book view with decoded nested lists and author names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookDetail {
    pub id: i64,
    pub isbn: Option<String>,
    pub title: String,
    pub publication_year: Option<i64>,
    pub publisher: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub num_pages: Option<i64>,
    pub language_code: Option<String>,
    pub text_reviews_count: Option<i64>,
    pub ratings_count: Option<i64>,
    pub average_rating: Option<String>,
    pub series: Vec<Value>,
    pub created_at: Option<i64>,
    pub thumbhash: Option<String>,
    pub popular_shelves: Vec<PopularShelf>,
    pub authors: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: i64,
    isbn: Option<String>,
    title: String,
    publication_year: Option<i64>,
    publisher: Option<String>,
    image_url: Option<String>,
    description: Option<String>,
    num_pages: Option<i64>,
    language_code: Option<String>,
    text_reviews_count: Option<i64>,
    ratings_count: Option<i64>,
    average_rating: Option<String>,
    series: Option<String>,
    created_at: Option<i64>,
    thumbhash: Option<String>,
    popular_shelves: Option<String>,
}

/// Appends the WHERE clause for `params`.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, params: &SearchParams) {
    let max_year = params.year.map_or(MAX_YEAR, |year| year.clamp(MIN_YEAR, MAX_YEAR));
    builder
        .push(" WHERE publication_year >= ")
        .push_bind(MIN_YEAR)
        .push(" AND publication_year <= ")
        .push_bind(max_year);

    if let Some(rating) = params.rating {
        builder
            .push(" AND CAST(average_rating AS REAL) >= ")
            .push_bind(rating);
    }

    match params.language.as_deref().map(str::trim) {
        Some("en") => {
            builder.push(" AND language_code IN (");
            let mut codes = builder.separated(", ");
            for code in ENGLISH_CODES {
                codes.push_bind(code);
            }
            codes.push_unseparated(")");
        }
        Some(code) if !code.is_empty() => {
            builder
                .push(" AND language_code = ")
                .push_bind(code.to_string());
        }
        _ => {}
    }

    let max_pages = params.pages.map_or(MAX_PAGES, |pages| pages.min(MAX_PAGES));
    builder.push(" AND num_pages <= ").push_bind(max_pages);

    builder
        .push(" AND image_url IS NOT NULL AND image_url != ")
        .push_bind(EMPTY_IMAGE_URL);

    if let Some(search) = &params.search {
        for term in search.split_whitespace() {
            builder
                .push(" AND title_tsv LIKE ")
                .push_bind(format!("%{term}%"));
        }
    }

    if let Some(isbn) = &params.isbn {
        let isbns: Vec<String> = isbn
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        if !isbns.is_empty() {
            builder.push(" AND isbn IN (");
            let mut list = builder.separated(", ");
            for id in isbns {
                list.push_bind(id);
            }
            list.push_unseparated(")");
        }
    }
}

/// Returns up to [`ITEMS_PER_PAGE`] matching books ordered by id.
///
/// # Errors
///
/// Returns [`QueryError::Database`] if the query fails.
#[instrument(skip(db))]
pub async fn fetch_books_page(
    db: &Database,
    params: &SearchParams,
) -> Result<Vec<BookSummary>, QueryError> {
    let offset = i64::from(params.page() - 1) * i64::from(ITEMS_PER_PAGE);

    let mut builder = QueryBuilder::new("SELECT id, title, image_url, thumbhash FROM books");
    push_filters(&mut builder, params);
    builder
        .push(" ORDER BY id LIMIT ")
        .push_bind(i64::from(ITEMS_PER_PAGE))
        .push(" OFFSET ")
        .push_bind(offset);

    let books = builder
        .build_query_as::<BookSummary>()
        .fetch_all(db.pool())
        .await?;
    Ok(books)
}

/// Counts every book matching `params`, ignoring the page.
///
/// # Errors
///
/// Returns [`QueryError::Database`] if the query fails.
#[instrument(skip(db))]
pub async fn count_books(db: &Database, params: &SearchParams) -> Result<i64, QueryError> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM books");
    push_filters(&mut builder, params);
    let count = builder
        .build_query_scalar::<i64>()
        .fetch_one(db.pool())
        .await?;
    Ok(count)
}

/// Loads one book with its authors, or `None` if no book has that id.
///
/// # Errors
///
/// Returns [`QueryError::Database`] if a query fails.
#[instrument(skip(db))]
pub async fn fetch_book(db: &Database, id: i64) -> Result<Option<BookDetail>, QueryError> {
    let row = sqlx::query_as::<_, BookRow>(
        r"SELECT id, isbn, title, publication_year, publisher, image_url, description,
                 num_pages, language_code, text_reviews_count, ratings_count, average_rating,
                 series, created_at, thumbhash, popular_shelves
          FROM books WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db.pool())
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let authors = sqlx::query_scalar::<_, String>(
        r"SELECT a.name FROM book_to_author ba
          JOIN authors a ON a.id = ba.author_id
          WHERE ba.book_id = ?
          ORDER BY a.name",
    )
    .bind(id)
    .fetch_all(db.pool())
    .await?;

    Ok(Some(BookDetail {
        id: row.id,
        isbn: row.isbn,
        title: row.title,
        publication_year: row.publication_year,
        publisher: row.publisher,
        image_url: row.image_url,
        description: row.description,
        num_pages: row.num_pages,
        language_code: row.language_code,
        text_reviews_count: row.text_reviews_count,
        ratings_count: row.ratings_count,
        average_rating: row.average_rating,
        series: decode_list(id, "series", row.series.as_deref()),
        created_at: row.created_at,
        thumbhash: row.thumbhash,
        popular_shelves: decode_list(id, "popular_shelves", row.popular_shelves.as_deref()),
        authors,
    }))
}

/// Decodes a JSON list column; NULL or invalid JSON is an empty list.
fn decode_list<T: serde::de::DeserializeOwned>(
    book_id: i64,
    field: &'static str,
    raw: Option<&str>,
) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(book_id, field, error = %e, "stored JSON column is not a valid list");
        Vec::new()
    })
}
