// MoMo Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod amount;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod record;
pub mod source;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use amount::normalize;
pub use classifier::{classify, ClassificationRule, Classifier};
pub use config::Config;
pub use db::{
    Transaction, ImportRun, ImportSummary, SqliteStore,
    open_database, setup_database, get_all_transactions, get_person_transactions,
    get_transactions_by_type, get_transaction_stats, verify_count,
    start_import, finish_import, import_messages, get_imports,
};
pub use error::{ExtractionError, IngestError, SourceReadError, StorageError};
pub use extractor::{extract, extract_or_default, Boundary, Field, SliceRule, Take};
pub use ingest::{ingest, IngestReport, Ingestor, RecordSink, StoragePolicy};
pub use record::{
    build, BuildOutcome, ExtractedFields, RawMessage, RecordBuilder,
    TransactionCategory, TransactionRecord,
};
pub use source::{detect_format, load_messages, parse_csv, parse_json, parse_xml, SourceFormat};
pub use stats::{person_summary, top_counterparties, type_stats, ChartData, PersonSummary, TypeStat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
