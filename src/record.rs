// 📨 Records - raw SMS in, transaction record out
// Classifier + extractor + timestamp, with the "amount > 0" validity policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::Classifier;
use crate::error::ExtractionError;
use crate::extractor::extract;

// ============================================================================
// CORE TYPES
// ============================================================================

/// TransactionCategory - what kind of mobile-money movement a message reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionCategory {
    Incoming,
    Payment,
    Transfer,
    #[serde(rename = "Bank Deposit")]
    BankDeposit,
    Withdrawal,
    Other,
}

impl TransactionCategory {
    pub const ALL: [TransactionCategory; 6] = [
        TransactionCategory::Incoming,
        TransactionCategory::Payment,
        TransactionCategory::Transfer,
        TransactionCategory::BankDeposit,
        TransactionCategory::Withdrawal,
        TransactionCategory::Other,
    ];

    /// Label used in the database and on the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            TransactionCategory::Incoming => "Incoming",
            TransactionCategory::Payment => "Payment",
            TransactionCategory::Transfer => "Transfer",
            TransactionCategory::BankDeposit => "Bank Deposit",
            TransactionCategory::Withdrawal => "Withdrawal",
            TransactionCategory::Other => "Other",
        }
    }
}

impl Default for TransactionCategory {
    fn default() -> Self {
        TransactionCategory::Other
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransactionCategory {
    type Err = String;

    /// Accepts "Bank Deposit", "BankDeposit", "bank_deposit", "bank-deposit"...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        TransactionCategory::ALL
            .into_iter()
            .find(|category| category.label().replace(' ', "").to_lowercase() == key)
            .ok_or_else(|| format!("unknown transaction type: {}", s))
    }
}

/// RawMessage - one SMS as the source hands it over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub body: String,
    /// Source-supplied, copied verbatim into the record
    pub timestamp: String,
}

impl RawMessage {
    pub fn new(body: impl Into<String>, timestamp: impl Into<String>) -> Self {
        RawMessage {
            body: body.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// ExtractedFields - best-effort fields pulled out of a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub counterparty_name: String,
    pub amount: f64,
    pub category: TransactionCategory,
    pub phone_number: String,
    pub balance_after: f64,
}

impl ExtractedFields {
    /// The value set every field falls back to
    pub fn unknown() -> Self {
        ExtractedFields {
            counterparty_name: "Unknown".to_string(),
            amount: 0.0,
            category: TransactionCategory::Other,
            phone_number: String::new(),
            balance_after: 0.0,
        }
    }
}

impl Default for ExtractedFields {
    fn default() -> Self {
        Self::unknown()
    }
}

/// TransactionRecord - what gets persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(flatten)]
    pub fields: ExtractedFields,
    pub date: String,
}

impl TransactionRecord {
    pub fn name(&self) -> &str {
        &self.fields.counterparty_name
    }

    pub fn amount(&self) -> f64 {
        self.fields.amount
    }

    pub fn category(&self) -> TransactionCategory {
        self.fields.category
    }
}

// ============================================================================
// RECORD BUILDER
// ============================================================================

/// What happened to a single message
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built(TransactionRecord),
    /// No classification rule matched
    Unclassified,
    /// Classified, but a required field could not be extracted
    Failed {
        category: TransactionCategory,
        error: ExtractionError,
    },
    /// Extraction went through but produced no positive amount
    NoAmount(TransactionCategory),
}

impl BuildOutcome {
    pub fn into_record(self) -> Option<TransactionRecord> {
        match self {
            BuildOutcome::Built(record) => Some(record),
            _ => None,
        }
    }
}

pub struct RecordBuilder {
    classifier: Classifier,
}

impl RecordBuilder {
    pub fn new(classifier: Classifier) -> Self {
        RecordBuilder { classifier }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classify, extract and apply the validity policy, keeping the reason
    /// when no record comes out.
    pub fn outcome(&self, message: &RawMessage) -> BuildOutcome {
        let category = self.classifier.classify(&message.body);
        if category == TransactionCategory::Other {
            return BuildOutcome::Unclassified;
        }

        let fields = match extract(&message.body, category) {
            Ok(fields) => fields,
            Err(error) => {
                tracing::warn!(
                    category = %category,
                    body = %message.body,
                    "Error parsing message: {}",
                    error
                );
                return BuildOutcome::Failed { category, error };
            }
        };

        if fields.amount > 0.0 {
            BuildOutcome::Built(TransactionRecord {
                fields,
                date: message.timestamp.clone(),
            })
        } else {
            BuildOutcome::NoAmount(category)
        }
    }

    /// Record for this message, or None when it should not be persisted
    pub fn build(&self, message: &RawMessage) -> Option<TransactionRecord> {
        self.outcome(message).into_record()
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new(Classifier::default())
    }
}

/// Build with the built-in classification rules
pub fn build(message: &RawMessage) -> Option<TransactionRecord> {
    RecordBuilder::default().build(message)
}

// ============================================================================
// TESTS
// ============================================================================
