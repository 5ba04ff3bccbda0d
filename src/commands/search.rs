//! Read-side command handlers: list matching books and show one book.

use anyhow::{Context, Result, bail};
use bookshelf_core::db::Database;
use bookshelf_core::query::{
    BookSummary, ITEMS_PER_PAGE, SearchParams, count_books, fetch_book, fetch_books_page,
};

use crate::app_config::Settings;
use crate::cli::SearchArgs;

impl From<&SearchArgs> for SearchParams {
    fn from(args: &SearchArgs) -> Self {
        Self {
            page: args.page,
            year: args.year,
            rating: args.rating,
            language: args.language.clone(),
            pages: args.pages,
            search: args.query.clone(),
            isbn: args.isbn.clone(),
        }
    }
}

async fn open_database(settings: &Settings) -> Result<Database> {
    Database::new_with_options(&settings.database_path, settings.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database '{}'",
                settings.database_path.display()
            )
        })
}

pub async fn run_init_command(settings: &Settings) -> Result<()> {
    let db = open_database(settings).await?;
    db.close().await;
    println!("Database ready at {}", settings.database_path.display());
    Ok(())
}

pub async fn run_search_command(settings: &Settings, args: &SearchArgs) -> Result<()> {
    let params = SearchParams::from(args);
    let db = open_database(settings).await?;

    let books = fetch_books_page(&db, &params).await;
    let total = count_books(&db, &params).await;
    db.close().await;
    let books = books.context("Failed to fetch books")?;
    let total = total.context("Failed to count books")?;

    for book in &books {
        println!("{}", render_search_row(book));
    }
    let pages = u64::try_from(total)
        .unwrap_or(0)
        .div_ceil(u64::from(ITEMS_PER_PAGE))
        .max(1);
    println!(
        "{} of {total} books (page {} of {pages})",
        books.len(),
        params.page()
    );
    Ok(())
}

pub async fn run_show_command(settings: &Settings, id: i64) -> Result<()> {
    let db = open_database(settings).await?;
    let book = fetch_book(&db, id).await;
    db.close().await;

    let Some(book) = book.context("Failed to load book")? else {
        bail!("No book with id {id}");
    };
    println!("{}", serde_json::to_string_pretty(&book)?);
    Ok(())
}

fn render_search_row(book: &BookSummary) -> String {
    let marker = if book.thumbhash.is_some() { "#" } else { " " };
    format!(
        "{:>8} {marker} {}  {}",
        book.id,
        book.title,
        book.image_url.as_deref().unwrap_or("-")
    )
}
