// 📥 Import Session - parse → detect duplicates → review → selective commit

use crate::db::TransactionStore;
use crate::deduplication::{DedupOptions, DeduplicationEngine, DuplicateMatch};
use crate::parser::parse_path;
use crate::transaction::{to_records, Transaction};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One incoming transaction awaiting the user's decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub transaction: Transaction,

    /// Why the record looks like a duplicate, if it does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateMatch>,

    /// "Include in import" checkbox
    pub selected: bool,
}

impl ReviewItem {
    pub fn is_flagged(&self) -> bool {
        self.duplicate.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub parsed: usize,
    pub flagged: usize,
    pub selected: usize,
    pub inserted: usize,
}

impl ImportSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} parsed, {} flagged as duplicates, {} selected, {} inserted",
            self.parsed, self.flagged, self.selected, self.inserted
        )
    }
}

/// Review state for one import. Flagged records start unselected, everything
/// else starts selected; the user may override either way before commit.
#[derive(Debug, Clone)]
pub struct ImportSession {
    items: Vec<ReviewItem>,
}

impl ImportSession {
    pub fn new(existing: &[Transaction], incoming: Vec<Transaction>, options: DedupOptions) -> Self {
        let engine = DeduplicationEngine::with_options(options);
        let mut matches = engine.find_duplicates(&to_records(existing), &to_records(&incoming));

        let items: Vec<ReviewItem> = incoming
            .into_iter()
            .map(|transaction| {
                let duplicate = matches.remove(&transaction.id);
                ReviewItem {
                    reason: duplicate.as_ref().map(DuplicateMatch::reason),
                    selected: duplicate.is_none(),
                    duplicate,
                    transaction,
                }
            })
            .collect();

        let session = ImportSession { items };
        info!(
            "Import session: {} incoming, {} flagged as possible duplicates",
            session.len(),
            session.flagged_count()
        );
        session
    }

    /// Review incoming records against everything in the store
    pub fn against_store(
        store: &dyn TransactionStore,
        incoming: Vec<Transaction>,
        options: DedupOptions,
    ) -> Result<Self> {
        let existing = store.all_transactions()?;
        Ok(Self::new(&existing, incoming, options))
    }

    /// Parse an import file (format detected) and review it against the store
    pub fn from_file(
        store: &dyn TransactionStore,
        file_path: &Path,
        options: DedupOptions,
    ) -> Result<Self> {
        let incoming = parse_path(file_path)?;
        Self::against_store(store, incoming, options)
    }

    pub fn items(&self) -> &[ReviewItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ReviewItem> {
        self.items
    }

    pub fn get(&self, index: usize) -> Option<&ReviewItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn flagged_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_flagged()).count()
    }

    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|i| i.selected).count()
    }

    /// Flip the checkbox at `index`; returns the new state
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        self.items.get_mut(index).map(|item| {
            item.selected = !item.selected;
            item.selected
        })
    }

    /// Set the checkbox of every item with this id; returns whether any matched
    pub fn set_selected(&mut self, id: &str, selected: bool) -> bool {
        let mut found = false;
        for item in self.items.iter_mut().filter(|i| i.transaction.id == id) {
            item.selected = selected;
            found = true;
        }
        found
    }

    pub fn select_all(&mut self) {
        self.items.iter_mut().for_each(|i| i.selected = true);
    }

    pub fn deselect_all(&mut self) {
        self.items.iter_mut().for_each(|i| i.selected = false);
    }

    pub fn selected_transactions(&self) -> Vec<Transaction> {
        self.items
            .iter()
            .filter(|i| i.selected)
            .map(|i| i.transaction.clone())
            .collect()
    }

    /// Write the selected records to the store
    pub fn commit(&self, store: &mut dyn TransactionStore) -> Result<ImportSummary> {
        let selected = self.selected_transactions();
        let inserted = store.insert_transactions(&selected)?;

        let summary = ImportSummary {
            parsed: self.len(),
            flagged: self.flagged_count(),
            selected: selected.len(),
            inserted,
        };
        info!("Import committed: {}", summary.summary());

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn tx(id: &str, amount: f64, day: u32, description: &str) -> Transaction {
        Transaction::new(id, amount, Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap())
            .with_kind("expense")
            .with_description(description)
    }

    fn store() -> MemoryStore {
        MemoryStore::with_transactions(vec![
            tx("e1", 15.99, 1, "Netflix Subscription"),
            tx("e2", 64.20, 3, "Grocery Outlet"),
        ])
    }

    fn incoming() -> Vec<Transaction> {
        vec![
            tx("e2", 64.20, 3, "Grocery Outlet"),
            tx("i1", 15.99, 2, "NETFLIX SUBSCRIPTION"),
            tx("i2", 250.00, 20, "Car repair"),
        ]
    }

    #[test]
    fn test_flagged_records_start_unselected() {
        let session = ImportSession::against_store(&store(), incoming(), DedupOptions::default()).unwrap();

        assert_eq!(session.len(), 3);
        assert_eq!(session.flagged_count(), 2);

        let items = session.items();
        assert_eq!(items[0].reason.as_deref(), Some("Exact ID match"));
        assert!(!items[0].selected);
        assert!(items[1].reason.as_deref().unwrap().starts_with("Possible duplicate"));
        assert!(!items[1].selected);
        assert_eq!(items[2].reason, None);
        assert!(items[2].selected);
    }

    #[test]
    fn test_commit_inserts_only_selected() {
        let mut store = store();
        let session = ImportSession::against_store(&store, incoming(), DedupOptions::default()).unwrap();

        let summary = session.commit(&mut store).unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(store.count().unwrap(), 3);
        let ids: Vec<String> = store.all_transactions().unwrap().into_iter().map(|t| t.id).collect();
        assert!(ids.contains(&"i2".to_string()));
        assert!(!ids.contains(&"i1".to_string()));
    }

    #[test]
    fn test_user_can_override_selection() {
        let mut store = store();
        let mut session = ImportSession::against_store(&store, incoming(), DedupOptions::default()).unwrap();

        assert_eq!(session.toggle(1), Some(true));
        assert!(session.set_selected("i2", false));
        assert!(!session.set_selected("missing", true));
        assert_eq!(session.toggle(99), None);

        let summary = session.commit(&mut store).unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.inserted, 1);
        assert!(store.all_transactions().unwrap().iter().any(|t| t.id == "i1"));
    }

    #[test]
    fn test_select_all_still_skips_stored_ids() {
        let mut store = store();
        let mut session = ImportSession::against_store(&store, incoming(), DedupOptions::default()).unwrap();

        session.select_all();
        let summary = session.commit(&mut store).unwrap();

        assert_eq!(summary.selected, 3);
        // e2 is already in the store
        assert_eq!(summary.inserted, 2);

        session.deselect_all();
        assert_eq!(session.selected_count(), 0);
    }

    #[test]
    fn test_overridden_flagged_row_is_committed() {
        let mut store = crate::db::SqliteStore::open_in_memory().unwrap();
        let coffee = || {
            let mut tx = tx("", 4.50, 1, "Coffee");
            tx.id = crate::transaction::synthetic_id();
            tx
        };
        store.insert_transactions(&[coffee()]).unwrap();

        let mut session = ImportSession::against_store(&store, vec![coffee()], DedupOptions::default()).unwrap();
        assert_eq!(session.items()[0].reason.as_deref(), Some("Possible duplicate (score 1.00)"));
        assert_eq!(session.selected_count(), 0);

        session.select_all();
        let summary = session.commit(&mut store).unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_identical_rows_in_one_file_both_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coffee.csv");
        std::fs::write(
            &path,
            "id,type,amount,category,paymentMethod,date,description,tags\n\
             \"\",\"expense\",\"4.50\",\"\",\"\",\"2024-05-01\",\"Coffee\",\"\"\n\
             \"\",\"expense\",\"4.50\",\"\",\"\",\"2024-05-01\",\"Coffee\",\"\"\n",
        )
        .unwrap();
        let mut store = crate::db::SqliteStore::open_in_memory().unwrap();

        let session = ImportSession::from_file(&store, &path, DedupOptions::default()).unwrap();
        let summary = session.commit(&mut store).unwrap();

        assert_eq!(summary.flagged, 0);
        assert_eq!(summary.selected, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_from_file_parses_and_reviews() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.csv");
        crate::export::export_file(&incoming(), &path, crate::parser::ImportFormat::Csv).unwrap();

        let session = ImportSession::from_file(&store(), &path, DedupOptions::default()).unwrap();

        assert_eq!(session.len(), 3);
        assert_eq!(session.selected_count(), 1);
    }
}
