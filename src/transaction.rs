// Transaction model - import rows and the narrow record the detector reads

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix for ids generated for rows that arrive without one
pub const SYNTHETIC_ID_PREFIX: &str = "import-";

/// Transaction as parsed from an import file or loaded from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,

    /// Free-form kind, e.g. "income" or "expense"
    #[serde(rename = "type", default)]
    pub kind: String,

    pub amount: f64,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub payment_method: String,

    pub date: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Transaction {
    /// Minimal constructor; optional fields start empty
    pub fn new(id: impl Into<String>, amount: f64, date: DateTime<Utc>) -> Self {
        Transaction {
            id: id.into(),
            kind: String::new(),
            amount,
            category: String::new(),
            payment_method: String::new(),
            date,
            description: None,
            tags: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_payment_method(mut self, payment_method: impl Into<String>) -> Self {
        self.payment_method = payment_method.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Description or "" when absent
    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// True for expense-like kinds; used to sign amounts in OFX
    pub fn is_expense(&self) -> bool {
        matches!(
            self.kind.to_lowercase().as_str(),
            "expense" | "debit" | "withdrawal"
        )
    }

    /// Whether this id was generated during parsing
    pub fn has_synthetic_id(&self) -> bool {
        self.id.starts_with(SYNTHETIC_ID_PREFIX)
    }

    /// Content fingerprint stored alongside each row and its audit event.
    /// Synthetic ids are left out so a re-parsed row hashes the same; it is
    /// never used to refuse an insert.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}",
            self.date.timestamp_millis(),
            self.amount,
            self.kind,
            self.description_or_empty()
        ));
        if !self.has_synthetic_id() {
            hasher.update(self.id.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Narrow view handed to the duplicate detector
    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord::from(self)
    }
}

/// Generate an id for a row that has none
pub fn synthetic_id() -> String {
    format!("{}{}", SYNTHETIC_ID_PREFIX, uuid::Uuid::new_v4())
}

/// The only shape the duplicate detector sees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub amount: f64,

    /// Milliseconds since the Unix epoch
    pub date: i64,

    #[serde(default)]
    pub description: Option<String>,
}

impl TransactionRecord {
    pub fn new(id: impl Into<String>, amount: f64, date: i64) -> Self {
        TransactionRecord {
            id: id.into(),
            amount,
            date,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Date as UTC, if the timestamp is representable
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.date).single()
    }
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        TransactionRecord {
            id: tx.id.clone(),
            amount: tx.amount,
            date: tx.date.timestamp_millis(),
            description: tx.description.clone(),
        }
    }
}

/// Convert a batch for the detector
pub fn to_records(transactions: &[Transaction]) -> Vec<TransactionRecord> {
    transactions.iter().map(TransactionRecord::from).collect()
}
