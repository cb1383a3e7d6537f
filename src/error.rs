// Error taxonomy for extraction, message sources and storage

use thiserror::Error;

use crate::record::TransactionCategory;

/// Recoverable failure while pulling a field out of a message body.
///
/// A required field failing makes the whole message fall back to the
/// default fields; an optional field failing only resets that field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("not a number: {text:?}")]
    Normalization { text: String },

    #[error("marker {marker:?} not found")]
    MarkerNotFound { marker: String },

    #[error("expected {expected} word(s) after {marker:?}, found {found}")]
    MissingTokens {
        marker: String,
        expected: usize,
        found: usize,
    },
}

/// The message source could not be read at all. Fatal to an ingestion run.
#[derive(Error, Debug)]
pub enum SourceReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed SMS backup XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("malformed CSV export: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed JSON export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported message source: {0}")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Why an ingestion run stopped early.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("message source failed after {seen} message(s): {source}")]
    Source {
        seen: usize,
        #[source]
        source: SourceReadError,
    },

    #[error("storing {category} record dated {date:?} failed: {source}")]
    Storage {
        category: TransactionCategory,
        date: String,
        #[source]
        source: StorageError,
    },

    /// Opening, closing or committing the import run itself failed
    #[error("import bookkeeping failed: {0}")]
    Import(#[from] StorageError),
}
