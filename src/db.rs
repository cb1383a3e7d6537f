use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{IngestError, SourceReadError, StorageError};
use crate::ingest::{IngestReport, Ingestor, RecordSink};
use crate::record::{ExtractedFields, RawMessage, TransactionCategory, TransactionRecord};
use crate::stats::TypeStat;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Persisted transaction: the record plus the row id the store assigned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: i64,
    #[serde(flatten)]
    pub record: TransactionRecord,
}

/// One `import` run, kept for the audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRun {
    pub import_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub seen: i64,
    pub stored: i64,
    pub skipped: i64,
}

impl ToSql for TransactionCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

impl FromSql for TransactionCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Compute fingerprint for duplicate detection across re-imports.
///
/// `occurrence` numbers identical records within one run: two real
/// transactions with the same fields in the same second both get a row,
/// and re-importing the export maps them back onto those same rows.
pub fn fingerprint(record: &TransactionRecord, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}|{}|{}",
        record.date,
        record.fields.category.label(),
        record.fields.amount,
        record.fields.counterparty_name,
        record.fields.phone_number,
        record.fields.balance_after,
        occurrence
    ));
    format!("{:x}", hasher.finalize())
}

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases stay in "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            amount REAL NOT NULL,
            type TEXT NOT NULL,
            date TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            balance_after REAL NOT NULL,
            import_id TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS imports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id TEXT UNIQUE NOT NULL,
            source TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            seen INTEGER NOT NULL DEFAULT 0,
            stored INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprint ON transactions(fingerprint)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SINK
// ============================================================================

/// RecordSink backed by the `transactions` table
pub struct SqliteStore<'c> {
    conn: &'c Connection,
    import_id: Option<String>,
    inserted: usize,
    duplicates: usize,
    occurrences: HashMap<String, usize>,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteStore {
            conn,
            import_id: None,
            inserted: 0,
            duplicates: 0,
            occurrences: HashMap::new(),
        }
    }

    /// Tag every stored row with the import run it came from
    pub fn for_import(mut self, import_id: &str) -> Self {
        self.import_id = Some(import_id.to_string());
        self
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Records already present from an earlier import
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

impl RecordSink for SqliteStore<'_> {
    fn store(&mut self, record: TransactionRecord) -> Result<()> {
        let first = fingerprint(&record, 0);
        let occurrence = self.occurrences.entry(first.clone()).or_insert(0);
        let key = match *occurrence {
            0 => first,
            n => fingerprint(&record, n),
        };
        *occurrence += 1;

        let result = self.conn.execute(
            "INSERT INTO transactions (
                fingerprint, name, amount, type, date, phone_number, balance_after, import_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key,
                record.fields.counterparty_name,
                record.fields.amount,
                record.fields.category,
                record.date,
                record.fields.phone_number,
                record.fields.balance_after,
                self.import_id,
            ],
        );

        match result {
            Ok(_) => {
                self.inserted += 1;
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!(date = %record.date, name = %record.name(), "Duplicate transaction skipped");
                self.duplicates += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// QUERIES
// ============================================================================

const SELECT_TRANSACTIONS: &str =
    "SELECT id, name, amount, type, date, phone_number, balance_after FROM transactions";

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        record: TransactionRecord {
            fields: ExtractedFields {
                counterparty_name: row.get(1)?,
                amount: row.get(2)?,
                category: row.get(3)?,
                phone_number: row.get(5)?,
                balance_after: row.get(6)?,
            },
            date: row.get(4)?,
        },
    })
}

fn query_transactions<P: Params>(conn: &Connection, filter: &str, params: P) -> Result<Vec<Transaction>> {
    let sql = format!("{} {} ORDER BY date DESC, id DESC", SELECT_TRANSACTIONS, filter);
    let mut stmt = conn.prepare(&sql)?;

    let transactions = stmt
        .query_map(params, map_transaction)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(transactions)
}

/// All transactions, newest date first
pub fn get_all_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    query_transactions(conn, "", [])
}

pub fn get_person_transactions(conn: &Connection, name: &str) -> Result<Vec<Transaction>> {
    query_transactions(conn, "WHERE name = ?1", [name])
}

pub fn get_transactions_by_type(
    conn: &Connection,
    category: TransactionCategory,
) -> Result<Vec<Transaction>> {
    query_transactions(conn, "WHERE type = ?1", [category])
}

/// Count and total per transaction type
pub fn get_transaction_stats(conn: &Connection) -> Result<Vec<TypeStat>> {
    let mut stmt = conn.prepare(
        "SELECT type, COUNT(*) as count, SUM(amount) as total
         FROM transactions
         GROUP BY type
         ORDER BY type",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(TypeStat {
                category: row.get(0)?,
                count: row.get(1)?,
                total: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(stats)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// IMPORT LOG
// ============================================================================

/// Register a new import run and return its id
pub fn start_import(conn: &Connection, source: &str) -> Result<String> {
    let import_id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO imports (import_id, source, started_at) VALUES (?1, ?2, ?3)",
        params![import_id, source, Utc::now().to_rfc3339()],
    )?;

    Ok(import_id)
}

pub fn finish_import(conn: &Connection, import_id: &str, report: &IngestReport, duplicates: usize) -> Result<()> {
    let stored = report.accepted.saturating_sub(duplicates);

    conn.execute(
        "UPDATE imports
         SET finished_at = ?1, seen = ?2, stored = ?3, skipped = ?4
         WHERE import_id = ?5",
        params![
            Utc::now().to_rfc3339(),
            report.seen as i64,
            stored as i64,
            (report.seen - stored) as i64,
            import_id,
        ],
    )?;

    Ok(())
}

/// Counts for one committed import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub import_id: String,
    pub report: IngestReport,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Run one import inside a single SQLite transaction.
///
/// The `imports` row, the new transactions and the final counts commit
/// together. A run that fails leaves nothing behind in either table.
pub fn import_messages<I>(
    conn: &mut Connection,
    source: &str,
    ingestor: &Ingestor,
    messages: I,
) -> std::result::Result<ImportSummary, IngestError>
where
    I: IntoIterator<Item = std::result::Result<RawMessage, SourceReadError>>,
{
    let tx = conn.transaction().map_err(StorageError::from)?;
    let import_id = start_import(&tx, source)?;

    let mut store = SqliteStore::new(&tx).for_import(&import_id);
    let report = ingestor.run(messages, &mut store)?;
    let (inserted, duplicates) = (store.inserted(), store.duplicates());

    finish_import(&tx, &import_id, &report, duplicates)?;
    tx.commit().map_err(StorageError::from)?;

    Ok(ImportSummary {
        import_id,
        report,
        inserted,
        duplicates,
    })
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn map_import(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    let started_at: String = row.get(2)?;
    let started_at = DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(ImportRun {
        import_id: row.get(0)?,
        source: row.get(1)?,
        started_at,
        finished_at: parse_time(row.get(3)?),
        seen: row.get(4)?,
        stored: row.get(5)?,
        skipped: row.get(6)?,
    })
}

/// Import runs, most recent first
pub fn get_imports(conn: &Connection) -> Result<Vec<ImportRun>> {
    let mut stmt = conn.prepare(
        "SELECT import_id, source, started_at, finished_at, seen, stored, skipped
         FROM imports
         ORDER BY id DESC",
    )?;

    let imports = stmt
        .query_map([], map_import)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(imports)
}

pub fn get_import(conn: &Connection, import_id: &str) -> Result<Option<ImportRun>> {
    let import = conn
        .query_row(
            "SELECT import_id, source, started_at, finished_at, seen, stored, skipped
             FROM imports
             WHERE import_id = ?1",
            [import_id],
            map_import,
        )
        .optional()?;

    Ok(import)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::record::RawMessage;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn messages() -> Vec<RawMessage> {
        vec![
            RawMessage::new(
                "You have received 5,000 RWF from John Doe (0788123456). Your new balance: 20,000 RWF",
                "2024-05-01 10:00:00",
            ),
            RawMessage::new(
                "Your payment of 2,500 RWF to John Smith has been completed. Your new balance: 17,500 RWF",
                "2024-05-03 09:00:00",
            ),
            RawMessage::new(
                "You have received 1,000 RWF from John Doe (0788123456). Your new balance: 18,500 RWF",
                "2024-05-02 12:00:00",
            ),
            RawMessage::new("Your account statement is ready", "2024-05-04 08:00:00"),
        ]
    }

    #[test]
    fn test_store_and_read_back() {
        let conn = setup();
        let mut store = SqliteStore::new(&conn);

        let report = ingest(messages(), &mut store).unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(store.inserted(), 3);
        assert_eq!(verify_count(&conn).unwrap(), 3);

        let all = get_all_transactions(&conn).unwrap();
        let dates: Vec<&str> = all.iter().map(|t| t.record.date.as_str()).collect();
        assert_eq!(
            dates,
            vec!["2024-05-03 09:00:00", "2024-05-02 12:00:00", "2024-05-01 10:00:00"]
        );

        let payment = &all[0].record;
        assert_eq!(payment.category(), TransactionCategory::Payment);
        assert_eq!(payment.name(), "John Smith");
        assert_eq!(payment.fields.balance_after, 17500.0);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let conn = setup();

        let mut first = SqliteStore::new(&conn);
        ingest(messages(), &mut first).unwrap();

        let mut second = SqliteStore::new(&conn);
        let report = ingest(messages(), &mut second).unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.duplicates(), 3);
        assert_eq!(verify_count(&conn).unwrap(), 3);
    }

    #[test]
    fn test_person_and_type_queries() {
        let conn = setup();
        ingest(messages(), SqliteStore::new(&conn)).unwrap();

        let john = get_person_transactions(&conn, "John Doe").unwrap();
        assert_eq!(john.len(), 2);
        assert_eq!(john[0].record.amount(), 1000.0);

        let payments = get_transactions_by_type(&conn, TransactionCategory::Payment).unwrap();
        assert_eq!(payments.len(), 1);
        assert!(get_transactions_by_type(&conn, TransactionCategory::Withdrawal)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_transaction_stats() {
        let conn = setup();
        ingest(messages(), SqliteStore::new(&conn)).unwrap();

        let stats = get_transaction_stats(&conn).unwrap();

        assert_eq!(
            stats,
            vec![
                TypeStat {
                    category: TransactionCategory::Incoming,
                    count: 2,
                    total: 6000.0,
                },
                TypeStat {
                    category: TransactionCategory::Payment,
                    count: 1,
                    total: 2500.0,
                },
            ]
        );
    }

    #[test]
    fn test_category_stored_as_label() {
        let conn = setup();
        ingest(
            vec![RawMessage::new(
                "*113*R*A bank deposit of 40,000 RWF has been added. Your NEW BALANCE :40,400 RWF.",
                "2024-05-05",
            )],
            SqliteStore::new(&conn),
        )
        .unwrap();

        let label: String = conn
            .query_row("SELECT type FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(label, "Bank Deposit");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let record = crate::record::build(&messages()[0]).unwrap();

        let hash1 = fingerprint(&record, 0);
        let hash2 = fingerprint(&record.clone(), 0);

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert_ne!(hash1, fingerprint(&record, 1));
    }

    #[test]
    fn test_identical_transactions_same_second_both_kept() {
        let conn = setup();
        let twice = || {
            vec![
                RawMessage::new("You have received 500 RWF from Jane Smith", "2024-05-01 10:00:00"),
                RawMessage::new("You have received 500 RWF from Jane Smith", "2024-05-01 10:00:00"),
            ]
        };

        let mut first = SqliteStore::new(&conn);
        ingest(twice(), &mut first).unwrap();
        assert_eq!(first.inserted(), 2);
        assert_eq!(verify_count(&conn).unwrap(), 2);

        // Same export again maps onto the same two rows
        let mut second = SqliteStore::new(&conn);
        ingest(twice(), &mut second).unwrap();
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.duplicates(), 2);
        assert_eq!(verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_import_log() {
        let conn = setup();
        let import_id = start_import(&conn, "sms-2024.xml").unwrap();

        let mut store = SqliteStore::new(&conn).for_import(&import_id);
        let report = ingest(messages(), &mut store).unwrap();
        let duplicates = store.duplicates();
        finish_import(&conn, &import_id, &report, duplicates).unwrap();

        let run = get_import(&conn, &import_id).unwrap().expect("import should be logged");
        assert_eq!(run.source, "sms-2024.xml");
        assert_eq!(run.seen, 4);
        assert_eq!(run.stored, 3);
        assert_eq!(run.skipped, 1);
        assert!(run.finished_at.is_some());

        let tagged: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transactions WHERE import_id = ?1",
                [&import_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tagged, 3);

        assert_eq!(get_imports(&conn).unwrap().len(), 1);
        assert!(get_import(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_import_messages_commits_run() {
        let mut conn = setup();

        let summary = import_messages(
            &mut conn,
            "sms-2024.xml",
            &Ingestor::default(),
            messages().into_iter().map(Ok),
        )
        .unwrap();

        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.report.seen, 4);

        let run = get_import(&conn, &summary.import_id).unwrap().unwrap();
        assert_eq!(run.stored, 3);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_failed_import_leaves_no_run_behind() {
        let mut conn = setup();
        let truncated = messages()
            .into_iter()
            .take(2)
            .map(Ok)
            .chain(std::iter::once(Err(SourceReadError::UnsupportedFormat(
                "truncated".to_string(),
            ))));

        let err = import_messages(&mut conn, "broken.xml", &Ingestor::default(), truncated).unwrap_err();

        assert!(matches!(err, IngestError::Source { seen: 2, .. }));
        assert!(get_imports(&conn).unwrap().is_empty());
        assert_eq!(verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_storage_failure_rolls_back_import_row() {
        let mut conn = setup();
        // Inserts now fail with "no such table", not a constraint violation
        conn.execute_batch("DROP TABLE transactions").unwrap();

        let err = import_messages(
            &mut conn,
            "sms-2024.xml",
            &Ingestor::default(),
            messages().into_iter().map(Ok),
        )
        .unwrap_err();

        assert!(matches!(err, IngestError::Storage { .. }));
        assert!(get_imports(&conn).unwrap().is_empty());
    }
}
