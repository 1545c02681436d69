// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use import_reconcile::logging::init_logging;
use import_reconcile::transaction::to_records;
use import_reconcile::{
    detect_fuzzy_duplicates, export_file, parse_path, Config, ImportFormat, ImportSession,
    SqliteStore, TransactionStore,
};

const USAGE: &str = "\
Usage: import-reconcile [--config <path>] <command>

Commands:
  check <existing> <incoming>   Print incoming records that look like duplicates
  import <file>                 Import a CSV/OFX file, skipping flagged records
  review <file>                 Review an import interactively, then commit
  export <out.csv|out.ofx>      Export every stored transaction";

struct Cli {
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut config_path = None;
    let mut command = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config_path = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config_path = Some(PathBuf::from(path));
        } else {
            command.push(arg.clone());
        }
    }

    Ok(Cli { config_path, command })
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let config = Config::load(cli.config_path.as_deref())?;
    init_logging(config.log_format, "info")?;

    let command: Vec<&str> = cli.command.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["check", existing, incoming] => run_check(&config, Path::new(existing), Path::new(incoming)),
        ["import", file] => run_import(&config, Path::new(file)),
        ["review", file] => run_review_mode(&config, Path::new(file)),
        ["export", out] => run_export(&config, Path::new(out)),
        [] | ["help"] | ["--help"] | ["-h"] => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => bail!("Unrecognized arguments: {}\n\n{}", cli.command.join(" "), USAGE),
    }
}

fn run_check(config: &Config, existing_path: &Path, incoming_path: &Path) -> Result<()> {
    let existing = parse_path(existing_path)?;
    let incoming = parse_path(incoming_path)?;

    let flagged = detect_fuzzy_duplicates(
        &to_records(&existing),
        &to_records(&incoming),
        Some(config.dedup),
    );

    // Keep the incoming file's order
    for tx in &incoming {
        if let Some(reason) = flagged.get(&tx.id) {
            println!("{}\t{}", tx.id, reason);
        }
    }

    eprintln!(
        "🔍 {} of {} incoming transactions flagged",
        flagged.len(),
        incoming.len()
    );
    Ok(())
}

fn run_import(config: &Config, file: &Path) -> Result<()> {
    let mut store = SqliteStore::open(&config.database_path)?;

    let session = ImportSession::from_file(&store, file, config.dedup)?;
    let summary = session.commit(&mut store)?;

    println!("✓ {}", summary.summary());
    println!("✓ Database contains {} transactions", store.count()?);
    Ok(())
}

#[cfg(feature = "tui")]
fn run_review_mode(config: &Config, file: &Path) -> Result<()> {
    let mut store = SqliteStore::open(&config.database_path)?;
    let session = ImportSession::from_file(&store, file, config.dedup)?;

    let mut app = ui::App::new(session, file.display().to_string());
    match ui::run_review(&mut app)? {
        ui::ReviewOutcome::Commit => {
            let summary = app.session.commit(&mut store)?;
            println!("✓ {}", summary.summary());
        }
        ui::ReviewOutcome::Cancel => println!("Import cancelled, nothing written"),
    }
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_review_mode(_config: &Config, _file: &Path) -> Result<()> {
    bail!("Review mode needs the `tui` feature; use `import` or the HTTP server instead")
}

fn run_export(config: &Config, out: &Path) -> Result<()> {
    let format = match out.extension().and_then(|e| e.to_str()).map(str::to_lowercase) {
        Some(ext) if ext == "ofx" || ext == "qfx" => ImportFormat::Ofx,
        _ => ImportFormat::Csv,
    };

    let store = SqliteStore::open(&config.database_path)?;
    let transactions = store.all_transactions()?;
    export_file(&transactions, out, format)?;

    println!(
        "✓ Exported {} transactions to {} ({})",
        transactions.len(),
        out.display(),
        format.name()
    );
    Ok(())
}
