// Import Reconciliation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod deduplication;
pub mod export;
pub mod import;
pub mod logging;
pub mod parser;
pub mod similarity;
pub mod transaction;

// Re-export commonly used types
pub use config::{Config, LogFormat};
pub use db::{MemoryStore, SqliteStore, TransactionStore};
pub use deduplication::{
    detect_fuzzy_duplicates, DedupOptions, DeduplicationEngine, DuplicateMatch, MatchScore,
    MatchStrategy,
};
pub use export::{export_csv, export_csv_string, export_file, export_ofx, export_ofx_string};
pub use import::{ImportSession, ImportSummary, ReviewItem};
pub use parser::{
    detect_format, get_parser, parse_path, CsvParser, ImportFormat, ImportParser, OfxParser,
};
pub use similarity::{levenshtein_distance, similarity};
pub use transaction::{Transaction, TransactionRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
