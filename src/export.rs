// 📤 Exporters - CSV and OFX writers
// Output is what CsvParser / OfxParser read back

use crate::parser::{ImportFormat, CSV_HEADERS, TAG_SEPARATOR};
use crate::transaction::Transaction;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write the CSV interchange format: a bare header line, then one row per
/// transaction with every field double-quoted.
pub fn export_csv<W: Write>(transactions: &[Transaction], mut writer: W) -> Result<()> {
    writeln!(writer, "{}", CSV_HEADERS.join(",")).context("Failed to write CSV header")?;

    let mut csv_writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);

    let separator = TAG_SEPARATOR.to_string();

    for tx in transactions {
        let amount = tx.amount.to_string();
        let date = tx.date.to_rfc3339_opts(SecondsFormat::Millis, true);
        let tags = tx.tags.join(separator.as_str());

        csv_writer
            .write_record([
                tx.id.as_str(),
                tx.kind.as_str(),
                amount.as_str(),
                tx.category.as_str(),
                tx.payment_method.as_str(),
                date.as_str(),
                tx.description_or_empty(),
                tags.as_str(),
            ])
            .with_context(|| format!("Failed to write transaction {}", tx.id))?;
    }

    csv_writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn export_csv_string(transactions: &[Transaction]) -> Result<String> {
    let mut buffer = Vec::new();
    export_csv(transactions, &mut buffer)?;
    String::from_utf8(buffer).context("CSV output was not valid UTF-8")
}

/// Write an OFX 1.0.2 (SGML) bank statement. Expense amounts are written
/// negative; `MEMO` carries the category.
pub fn export_ofx<W: Write>(transactions: &[Transaction], mut writer: W) -> Result<()> {
    let now = Utc::now().format("%Y%m%d%H%M%S");

    let (start, end) = match (
        transactions.iter().map(|t| t.date).min(),
        transactions.iter().map(|t| t.date).max(),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => (Utc::now(), Utc::now()),
    };

    let mut out = String::new();
    out.push_str("OFXHEADER:100\nDATA:OFXSGML\nVERSION:102\nSECURITY:NONE\nENCODING:USASCII\n");
    out.push_str("CHARSET:1252\nCOMPRESSION:NONE\nOLDFILEUID:NONE\nNEWFILEUID:NONE\n\n");
    out.push_str("<OFX>\n<SIGNONMSGSRSV1>\n<SONRS>\n");
    out.push_str("<STATUS>\n<CODE>0\n<SEVERITY>INFO\n</STATUS>\n");
    out.push_str(&format!("<DTSERVER>{}\n<LANGUAGE>ENG\n</SONRS>\n</SIGNONMSGSRSV1>\n", now));
    out.push_str("<BANKMSGSRSV1>\n<STMTTRNRS>\n<TRNUID>1\n");
    out.push_str("<STATUS>\n<CODE>0\n<SEVERITY>INFO\n</STATUS>\n<STMTRS>\n<CURDEF>USD\n");
    out.push_str(&format!(
        "<BANKTRANLIST>\n<DTSTART>{}\n<DTEND>{}\n",
        start.format("%Y%m%d%H%M%S"),
        end.format("%Y%m%d%H%M%S")
    ));

    for tx in transactions {
        let signed = if tx.is_expense() { -tx.amount.abs() } else { tx.amount };
        let trntype = if signed < 0.0 { "DEBIT" } else { "CREDIT" };

        out.push_str("<STMTTRN>\n");
        out.push_str(&format!("<TRNTYPE>{}\n", trntype));
        out.push_str(&format!("<DTPOSTED>{}[0:GMT]\n", tx.date.format("%Y%m%d%H%M%S")));
        out.push_str(&format!("<TRNAMT>{}\n", signed));
        out.push_str(&format!("<FITID>{}\n", escape_sgml(&tx.id)));
        if let Some(description) = tx.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!("<NAME>{}\n", escape_sgml(&single_line(description))));
        }
        if !tx.category.is_empty() {
            out.push_str(&format!("<MEMO>{}\n", escape_sgml(&single_line(&tx.category))));
        }
        out.push_str("</STMTTRN>\n");
    }

    out.push_str("</BANKTRANLIST>\n</STMTRS>\n</STMTTRNRS>\n</BANKMSGSRSV1>\n</OFX>\n");

    writer
        .write_all(out.as_bytes())
        .context("Failed to write OFX output")?;
    writer.flush().context("Failed to flush OFX output")?;
    Ok(())
}

pub fn export_ofx_string(transactions: &[Transaction]) -> Result<String> {
    let mut buffer = Vec::new();
    export_ofx(transactions, &mut buffer)?;
    String::from_utf8(buffer).context("OFX output was not valid UTF-8")
}

/// Export to a file in the given format
pub fn export_file(transactions: &[Transaction], path: &Path, format: ImportFormat) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let writer = BufWriter::new(file);

    match format {
        ImportFormat::Csv => export_csv(transactions, writer),
        ImportFormat::Ofx => export_ofx(transactions, writer),
    }
    .with_context(|| format!("Failed to export to {}", path.display()))
}

fn escape_sgml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// SGML values end at the line break
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
