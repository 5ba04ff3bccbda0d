//! Transactional batch writers.
//!
//! Each writer owns its transaction boundary: a batch commits as a whole or
//! is rolled back as a whole. [`AuthorWriter`] and [`BookWriter`] implement
//! [`crate::ingest::BatchConsumer`] directly; [`ThumbhashWriter`] is driven
//! by the enrichment worker once all fetches for a batch are done.

mod authors;
mod books;
mod error;
mod thumbhash;

pub use authors::AuthorWriter;
pub use books::BookWriter;
pub use error::{WriteError, WriteErrorKind};
pub use thumbhash::{EnrichmentResult, ThumbhashWriter};
