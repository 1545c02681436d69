use crate::transaction::Transaction;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Persistence injected into the import pipeline.
///
/// The detector and parsers never touch storage directly; callers hand them
/// the records a store returns and commit through it afterwards.
pub trait TransactionStore {
    /// Every stored transaction
    fn all_transactions(&self) -> Result<Vec<Transaction>>;

    /// Insert transactions, skipping ids already stored. Rows with equal
    /// content but distinct ids are all kept. Returns the number inserted.
    fn insert_transactions(&mut self, transactions: &[Transaction]) -> Result<usize>;

    fn count(&self) -> Result<usize>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Vec-backed store for tests and one-shot CLI runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    transactions: Vec<Transaction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(transactions: Vec<Transaction>) -> Self {
        MemoryStore { transactions }
    }
}

impl TransactionStore for MemoryStore {
    fn all_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions.clone())
    }

    fn insert_transactions(&mut self, transactions: &[Transaction]) -> Result<usize> {
        let mut ids: HashSet<String> = self.transactions.iter().map(|t| t.id.clone()).collect();

        let mut inserted = 0;
        for tx in transactions {
            if !ids.insert(tx.id.clone()) {
                debug!("Skipping already stored transaction {}", tx.id);
                continue;
            }
            self.transactions.push(tx.clone());
            inserted += 1;
        }

        Ok(inserted)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.transactions.len())
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        setup_database(&conn)?;
        info!("Opened transaction store at {}", db_path.display());
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn events_for_entity(&self, entity_id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, entity_id)
    }
}

impl TransactionStore for SqliteStore {
    fn all_transactions(&self) -> Result<Vec<Transaction>> {
        get_all_transactions(&self.conn)
    }

    fn insert_transactions(&mut self, transactions: &[Transaction]) -> Result<usize> {
        insert_transactions(&mut self.conn, transactions)
    }

    fn count(&self) -> Result<usize> {
        Ok(verify_count(&self.conn)? as usize)
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            fingerprint TEXT NOT NULL,
            type TEXT NOT NULL,
            amount REAL NOT NULL,
            category TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            date TEXT NOT NULL,
            date_millis INTEGER NOT NULL,
            description TEXT,
            tags TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_date ON transactions(date_millis)",
        [],
    )?;

    // Lookup only; equal content under different ids is legal
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fingerprint ON transactions(fingerprint)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert inside one SQL transaction. A unique-id violation counts as an
/// already-stored row; any other error rolls the batch back.
pub fn insert_transactions(conn: &mut Connection, transactions: &[Transaction]) -> Result<usize> {
    let sql_tx = conn.transaction()?;
    let mut inserted = 0;
    let mut duplicates = 0;

    for tx in transactions {
        let tags_json = serde_json::to_string(&tx.tags)?;
        let fingerprint = tx.fingerprint();

        let result = sql_tx.execute(
            "INSERT INTO transactions (
                id, fingerprint, type, amount, category, payment_method,
                date, date_millis, description, tags
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                tx.id,
                fingerprint,
                tx.kind,
                tx.amount,
                tx.category,
                tx.payment_method,
                tx.date.to_rfc3339(),
                tx.date.timestamp_millis(),
                tx.description,
                tags_json,
            ],
        );

        match result {
            Ok(_) => {
                inserted += 1;

                let event = Event::new(
                    "transaction_added",
                    &tx.id,
                    serde_json::json!({
                        "amount": tx.amount,
                        "type": tx.kind,
                        "description": tx.description,
                        "fingerprint": fingerprint,
                    }),
                    "importer",
                );
                insert_event(&sql_tx, &event)?;
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    sql_tx.commit()?;

    info!("Inserted {} transactions, skipped {} already stored", inserted, duplicates);

    Ok(inserted)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_id, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub fn get_events_for_entity(conn: &Connection, entity_id: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_id, data, actor
         FROM events
         WHERE entity_id = ?1
         ORDER BY row_id",
    )?;

    let events = stmt
        .query_map(params![entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_str: String = row.get(4)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                event_type: row.get(2)?,
                entity_id: row.get(3)?,
                data: serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null),
                actor: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn get_all_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, type, amount, category, payment_method, date, description, tags
         FROM transactions
         ORDER BY date_millis DESC, row_id",
    )?;

    let transactions = stmt
        .query_map([], |row| {
            let date_str: String = row.get(5)?;
            let tags_json: String = row.get(7)?;

            let date = DateTime::parse_from_rfc3339(&date_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;

            Ok(Transaction {
                id: row.get(0)?,
                kind: row.get(1)?,
                amount: row.get(2)?,
                category: row.get(3)?,
                payment_method: row.get(4)?,
                date,
                description: row.get(6)?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

    Ok(count)
}
