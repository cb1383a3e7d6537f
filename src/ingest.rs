// 📥 Ingestion Driver
// Message source → record builder → sink, one message at a time

use serde::Serialize;

use crate::error::{IngestError, SourceReadError, StorageError};
use crate::record::{BuildOutcome, RawMessage, RecordBuilder, TransactionRecord};

/// RecordSink - where valid records go
///
/// The sink owns identity and any uniqueness it wants; the driver never
/// deduplicates.
pub trait RecordSink {
    fn store(&mut self, record: TransactionRecord) -> Result<(), StorageError>;
}

/// In-memory sink
impl RecordSink for Vec<TransactionRecord> {
    fn store(&mut self, record: TransactionRecord) -> Result<(), StorageError> {
        self.push(record);
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn store(&mut self, record: TransactionRecord) -> Result<(), StorageError> {
        (**self).store(record)
    }
}

/// What to do when the sink rejects a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoragePolicy {
    /// Log it and carry on with the next message
    Skip,
    /// Stop the run and return the error
    #[default]
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestReport {
    pub seen: usize,
    /// Records the sink took without error. A deduplicating sink may have
    /// written fewer rows than this.
    pub accepted: usize,
    pub unclassified: usize,
    pub failed: usize,
    pub no_amount: usize,
    pub storage_errors: usize,
}

impl IngestReport {
    /// Messages that did not end up in the sink
    pub fn skipped(&self) -> usize {
        self.seen - self.accepted
    }
}

pub struct Ingestor {
    builder: RecordBuilder,
    policy: StoragePolicy,
}

impl Ingestor {
    pub fn new(builder: RecordBuilder) -> Self {
        Ingestor {
            builder,
            policy: StoragePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StoragePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pull messages until the source is exhausted or fails.
    ///
    /// A message that cannot be extracted is counted and skipped; a source
    /// error ends the run.
    pub fn run<I, S>(&self, messages: I, mut sink: S) -> Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = Result<RawMessage, SourceReadError>>,
        S: RecordSink,
    {
        let mut report = IngestReport::default();

        for message in messages {
            let message = message.map_err(|source| IngestError::Source {
                seen: report.seen,
                source,
            })?;
            report.seen += 1;

            let record = match self.builder.outcome(&message) {
                BuildOutcome::Built(record) => record,
                BuildOutcome::Unclassified => {
                    report.unclassified += 1;
                    continue;
                }
                BuildOutcome::Failed { .. } => {
                    report.failed += 1;
                    continue;
                }
                BuildOutcome::NoAmount(_) => {
                    report.no_amount += 1;
                    continue;
                }
            };

            let category = record.category();
            let date = record.date.clone();

            if let Err(source) = sink.store(record) {
                match self.policy {
                    StoragePolicy::Skip => {
                        tracing::warn!(category = %category, date = %date, "Skipping record: {}", source);
                        report.storage_errors += 1;
                    }
                    StoragePolicy::Abort => {
                        return Err(IngestError::Storage {
                            category,
                            date,
                            source,
                        })
                    }
                }
            } else {
                report.accepted += 1;
            }
        }

        tracing::info!(
            seen = report.seen,
            accepted = report.accepted,
            unclassified = report.unclassified,
            failed = report.failed,
            "Ingestion finished"
        );

        Ok(report)
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(RecordBuilder::default())
    }
}

/// Ingest already-loaded messages with the built-in rules
pub fn ingest<I, S>(messages: I, sink: S) -> Result<IngestReport, IngestError>
where
    I: IntoIterator<Item = RawMessage>,
    S: RecordSink,
{
    Ingestor::default().run(messages.into_iter().map(Ok), sink)
}

// ============================================================================
// TESTS
// ============================================================================
