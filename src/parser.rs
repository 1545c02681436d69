// 🏗️ Parser Framework
// One trait, two import formats (CSV, OFX), plus format detection

use crate::transaction::{synthetic_id, Transaction};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Column order of the CSV interchange format
pub const CSV_HEADERS: [&str; 8] = [
    "id",
    "type",
    "amount",
    "category",
    "paymentMethod",
    "date",
    "description",
    "tags",
];

/// Separator inside the `tags` column
pub const TAG_SEPARATOR: char = ';';

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportFormat {
    Csv,
    Ofx,
}

impl ImportFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            ImportFormat::Csv => "CSV",
            ImportFormat::Ofx => "OFX",
        }
    }

    /// File extension used on export
    pub fn extension(&self) -> &str {
        match self {
            ImportFormat::Csv => "csv",
            ImportFormat::Ofx => "ofx",
        }
    }
}

/// ImportParser - turns an import file into well-typed transactions.
///
/// Field-level problems (bad date, bad amount, missing id) degrade to safe
/// defaults with a warning; only structural problems are errors.
pub trait ImportParser: Send + Sync {
    fn parse_reader(&self, reader: &mut dyn Read) -> Result<Vec<Transaction>>;

    fn format(&self) -> ImportFormat;

    fn parse_str(&self, input: &str) -> Result<Vec<Transaction>> {
        let mut bytes = input.as_bytes();
        self.parse_reader(&mut bytes)
    }

    fn parse_file(&self, file_path: &Path) -> Result<Vec<Transaction>> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        let mut reader = BufReader::new(file);

        let transactions = self
            .parse_reader(&mut reader)
            .with_context(|| format!("Failed to parse {}", file_path.display()))?;

        debug!(
            "Parsed {} {} transactions from {}",
            transactions.len(),
            self.format().name(),
            file_path.display()
        );
        Ok(transactions)
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect import format from the file extension, falling back to content.
pub fn detect_format(file_path: &Path) -> Result<ImportFormat> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => return Ok(ImportFormat::Csv),
        "ofx" | "qfx" => return Ok(ImportFormat::Ofx),
        _ => {}
    }

    let mut head = Vec::with_capacity(512);
    File::open(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?
        .take(512)
        .read_to_end(&mut head)?;

    detect_format_from_content(&String::from_utf8_lossy(&head)).ok_or_else(|| {
        anyhow!(
            "Could not detect import format of {}",
            file_path.display()
        )
    })
}

/// Sniff the first bytes of an import file
pub fn detect_format_from_content(head: &str) -> Option<ImportFormat> {
    let upper = head.trim_start().to_uppercase();
    if upper.starts_with("OFXHEADER") || upper.contains("<OFX>") {
        return Some(ImportFormat::Ofx);
    }

    let first_line = head.trim_start().lines().next().unwrap_or("");
    let has_amount_column = first_line
        .split(',')
        .any(|h| h.trim().trim_matches('"').eq_ignore_ascii_case("amount"));
    if has_amount_column {
        return Some(ImportFormat::Csv);
    }

    None
}

/// Get the parser for a format
pub fn get_parser(format: ImportFormat) -> Box<dyn ImportParser> {
    match format {
        ImportFormat::Csv => Box::new(CsvParser::new()),
        ImportFormat::Ofx => Box::new(OfxParser::new()),
    }
}

/// Detect the format of a file and parse it
pub fn parse_path(file_path: &Path) -> Result<Vec<Transaction>> {
    let format = detect_format(file_path)?;
    get_parser(format).parse_file(file_path)
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Parse an ISO-8601 timestamp. Accepts RFC 3339, naive date-times (taken as
/// UTC) and bare dates (midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a date or fall back to now; never fails the import
fn resolve_date(value: &str, line: usize) -> DateTime<Utc> {
    parse_date(value).unwrap_or_else(|| {
        warn!("Line {}: unparseable date {:?}, using current time", line, value);
        Utc::now()
    })
}

/// Parse an amount like "45.99", "-1,200.00" or "$3.50"; bad values become 0
fn resolve_amount(value: &str, line: usize) -> f64 {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    match cleaned.parse::<f64>() {
        Ok(amount) if amount.is_finite() => amount,
        _ => {
            warn!("Line {}: unparseable amount {:?}, using 0", line, value);
            0.0
        }
    }
}

/// OFX amounts carry no thousands separators but may use a comma as the
/// decimal point, so a lone comma with no period is the decimal point
fn resolve_ofx_amount(value: &str, line: usize) -> f64 {
    let trimmed = value.trim();
    if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
        return resolve_amount(&trimmed.replacen(',', ".", 1), line);
    }
    resolve_amount(trimmed, line)
}

/// Split the `tags` column, dropping empty segments
pub fn split_tags(value: &str) -> Vec<String> {
    value
        .split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// CSV PARSER
// ============================================================================

/// Reads the `id,type,amount,category,paymentMethod,date,description,tags`
/// interchange format. Columns are looked up by name, so missing optional
/// columns and short rows are fine.
#[derive(Debug, Default)]
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        CsvParser
    }

    fn column_index(headers: &StringRecord) -> HashMap<String, usize> {
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect()
    }

    fn parse_record(
        columns: &HashMap<String, usize>,
        record: &StringRecord,
        line: usize,
    ) -> Transaction {
        let field = |name: &str| csv_field(columns, record, name);

        // Ids are opaque; only a missing one is replaced
        let id = match field("id") {
            "" => synthetic_id(),
            id => id.to_string(),
        };

        let description = field("description");

        Transaction {
            id,
            kind: field("type").to_string(),
            amount: resolve_amount(field("amount"), line),
            category: field("category").to_string(),
            payment_method: field("paymentMethod").to_string(),
            date: resolve_date(field("date"), line),
            description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
            tags: split_tags(field("tags")),
        }
    }
}

fn csv_field<'a>(columns: &HashMap<String, usize>, record: &'a StringRecord, name: &str) -> &'a str {
    columns
        .get(&name.to_lowercase())
        .and_then(|&i| record.get(i))
        .unwrap_or("")
}

impl ImportParser for CsvParser {
    fn parse_reader(&self, reader: &mut dyn Read) -> Result<Vec<Transaction>> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .context("Failed to read CSV header row")?
            .clone();
        let columns = Self::column_index(&headers);

        if !columns.contains_key("amount") {
            bail!("CSV header is missing the 'amount' column: {:?}", headers);
        }

        let mut transactions = Vec::new();

        for (idx, result) in csv_reader.records().enumerate() {
            let line = idx + 2; // 1-indexed + header row
            let record = result.with_context(|| format!("Failed to parse CSV line {}", line))?;

            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            transactions.push(Self::parse_record(&columns, &record, line));
        }

        Ok(transactions)
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Csv
    }
}

// ============================================================================
// OFX PARSER
// ============================================================================

/// Reads `<STMTTRN>` entries from OFX 1.x (SGML, closing tags optional) and
/// OFX 2.x (XML) statements.
#[derive(Debug, Default)]
pub struct OfxParser;

impl OfxParser {
    pub fn new() -> Self {
        OfxParser
    }

    /// Leading `YYYYMMDD[HHMMSS]` of an OFX date; fraction and `[tz]` ignored
    pub fn parse_ofx_date(value: &str) -> Option<DateTime<Utc>> {
        let digits: String = value
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();

        if digits.len() >= 14 {
            NaiveDateTime::parse_from_str(&digits[..14], "%Y%m%d%H%M%S")
                .ok()
                .map(|naive| naive.and_utc())
        } else if digits.len() >= 8 {
            NaiveDate::parse_from_str(&digits[..8], "%Y%m%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        } else {
            None
        }
    }

    fn parse_block(tag_re: &Regex, block: &str, line: usize) -> Transaction {
        let mut fields: HashMap<String, String> = HashMap::new();
        for cap in tag_re.captures_iter(block) {
            let value = unescape_sgml(cap[2].trim());
            fields.entry(cap[1].to_uppercase()).or_insert(value);
        }

        let get = |key: &str| ofx_field(&fields, key);

        let signed_amount = resolve_ofx_amount(get("TRNAMT"), line);
        let kind = if signed_amount < 0.0 { "expense" } else { "income" };

        let date = Self::parse_ofx_date(get("DTPOSTED")).unwrap_or_else(|| {
            warn!("OFX entry {}: unparseable DTPOSTED {:?}, using current time", line, get("DTPOSTED"));
            Utc::now()
        });

        let id = match get("FITID") {
            "" => synthetic_id(),
            fitid => fitid.to_string(),
        };

        let (description, category) = match (get("NAME"), get("MEMO")) {
            ("", "") => (None, String::new()),
            ("", memo) => (Some(memo.to_string()), String::new()),
            (name, memo) => (Some(name.to_string()), memo.to_string()),
        };

        Transaction {
            id,
            kind: kind.to_string(),
            amount: signed_amount.abs(),
            category,
            payment_method: String::new(),
            date,
            description,
            tags: Vec::new(),
        }
    }
}

impl ImportParser for OfxParser {
    fn parse_reader(&self, reader: &mut dyn Read) -> Result<Vec<Transaction>> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .context("Failed to read OFX data")?;

        let start_re = Regex::new(r"(?i)<STMTTRN>").context("invalid STMTTRN pattern")?;
        let end_re = Regex::new(r"(?i)</STMTTRN>|</BANKTRANLIST>").context("invalid end pattern")?;
        let tag_re = Regex::new(r"(?i)<(TRNTYPE|DTPOSTED|TRNAMT|FITID|NAME|MEMO)>([^<\r\n]*)")
            .context("invalid OFX tag pattern")?;

        let starts: Vec<(usize, usize)> = start_re
            .find_iter(&content)
            .map(|m| (m.start(), m.end()))
            .collect();

        if starts.is_empty() && !content.to_uppercase().contains("<OFX>") {
            bail!("Input does not look like an OFX statement");
        }

        let mut transactions = Vec::with_capacity(starts.len());
        for (idx, &(_, body_start)) in starts.iter().enumerate() {
            let body_end = starts
                .get(idx + 1)
                .map(|&(next_start, _)| next_start)
                .unwrap_or(content.len());
            let mut block = &content[body_start..body_end];
            if let Some(end) = end_re.find(block) {
                block = &block[..end.start()];
            }

            transactions.push(Self::parse_block(&tag_re, block, idx + 1));
        }

        Ok(transactions)
    }

    fn format(&self) -> ImportFormat {
        ImportFormat::Ofx
    }
}

fn ofx_field<'a>(fields: &'a HashMap<String, String>, key: &str) -> &'a str {
    fields.get(key).map(String::as_str).unwrap_or("")
}

fn unescape_sgml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// TESTS
// ============================================================================
