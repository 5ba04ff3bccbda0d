//! Error types for batch writes.

use std::fmt;

use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

/// SQLite primary result codes the driver reacts to.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_CONSTRAINT: i64 = 19;

/// Why a batch was rolled back, as far as the pipeline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// Another writer held the database, or no pooled connection freed up
    /// in time. The same batch may succeed on a later run.
    Contention,
    /// The data itself was rejected (NOT NULL, UNIQUE, FK, CHECK, trigger).
    Rejected,
    /// The pool is closed or the file cannot be reached.
    Unavailable,
    /// Anything else, including JSON encoding failures.
    Other,
}

impl WriteErrorKind {
    /// Classifies a sqlx failure.
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::Contention,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) => Self::Unavailable,
            sqlx::Error::Database(db) => Self::from_database(db.as_ref()),
            _ => Self::Other,
        }
    }

    fn from_database(db: &dyn DatabaseError) -> Self {
        if !matches!(db.kind(), ErrorKind::Other) {
            return Self::Rejected;
        }
        // Extended result codes keep the primary code in the low byte.
        match db.code().and_then(|code| code.parse::<i64>().ok()) {
            Some(code) => match code & 0xff {
                SQLITE_BUSY | SQLITE_LOCKED => Self::Contention,
                SQLITE_CONSTRAINT => Self::Rejected,
                _ => Self::Other,
            },
            None => Self::Other,
        }
    }

    /// Whether retrying the batch later could succeed unchanged.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Contention)
    }
}

impl fmt::Display for WriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Contention => "contention",
            Self::Rejected => "rejected",
            Self::Unavailable => "unavailable",
            Self::Other => "other",
        })
    }
}

/// Errors that abort a batch. The surrounding transaction is rolled back.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("database error ({kind}): {source}")]
    Database {
        kind: WriteErrorKind,
        #[source]
        source: sqlx::Error,
    },

    /// A nested structure could not be encoded for its JSON column.
    #[error("failed to encode {field} as JSON: {source}")]
    Encode {
        /// The column being encoded.
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for WriteError {
    fn from(source: sqlx::Error) -> Self {
        Self::Database {
            kind: WriteErrorKind::from_sqlx(&source),
            source,
        }
    }
}

impl WriteError {
    #[must_use]
    pub fn kind(&self) -> WriteErrorKind {
        match self {
            Self::Database { kind, .. } => *kind,
            Self::Encode { .. } => WriteErrorKind::Other,
        }
    }
}
