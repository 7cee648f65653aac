use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use journalstore::queue::filename_timestamp;
use journalstore::{
    DEFAULT_BUFFER_SIZE, DocumentPath, FileQueue, Journal, JournalConfig, JournaledDocument,
    QueueConfig, Value, document_exists, load_document_contents,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "journal-tool")]
#[command(about = "Inspect and edit journaled documents and file queues")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the recovered document
    Show { base: PathBuf },
    /// Print the value at a path of the recovered document
    Get { base: PathBuf, path: String },
    /// List the commands journaled since the last snapshot
    Journal { base: PathBuf },
    /// Set a JSON value at a path
    Set {
        base: PathBuf,
        path: String,
        json: String,
        #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,
    },
    /// Remove the value at a path
    Delete {
        base: PathBuf,
        path: String,
        #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,
    },
    /// Fold the journal into a fresh snapshot
    Snapshot {
        base: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
        buffer_size: usize,
    },
    /// List queued files, oldest first
    QueueList { dir: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Show { base } => show(&base),
        Command::Get { base, path } => get(&base, &path),
        Command::Journal { base } => list_journal(&base),
        Command::Set {
            base,
            path,
            json,
            buffer_size,
        } => {
            let value = Value::from_json_str(&json)
                .with_context(|| format!("Invalid JSON value '{}'", json))?;
            edit(&base, buffer_size, |doc| doc.set(path.as_str(), value))
        }
        Command::Delete {
            base,
            path,
            buffer_size,
        } => edit(&base, buffer_size, |doc| doc.delete(path.as_str())),
        Command::Snapshot { base, buffer_size } => edit(&base, buffer_size, |doc| doc.snapshot()),
        Command::QueueList { dir } => queue_list(&dir),
    }
}

fn recover(base: &Path) -> Result<Value> {
    if !document_exists(base) {
        return Err(anyhow!("No document found at '{}'", base.display()));
    }
    load_document_contents(base)
        .with_context(|| format!("Failed to recover document '{}'", base.display()))
}

fn show(base: &Path) -> Result<()> {
    let document = recover(base)?;
    println!("{}", document.to_json_pretty()?);
    Ok(())
}

fn get(base: &Path, path: &str) -> Result<()> {
    let parsed = DocumentPath::parse(path).with_context(|| format!("Invalid path '{}'", path))?;
    let document = recover(base)?;
    match journalstore::get_at(&document, parsed.ops()) {
        Some(value) => println!("{}", value.to_json_pretty()?),
        None => return Err(anyhow!("Nothing at '{}'", parsed)),
    }
    Ok(())
}

fn list_journal(base: &Path) -> Result<()> {
    let journal_path = JournalConfig::new(base).journal_path();
    let bytes = fs::read(&journal_path)
        .with_context(|| format!("Failed to read journal '{}'", journal_path.display()))?;
    let journal = Journal::deserialize_all(&bytes);

    println!("Journal: {}", journal_path.display());
    println!("Commands: {}", journal.len());
    for command in &journal {
        if command.is_delete() {
            println!("- delete {}", command.path());
        } else {
            println!("- set {} = {}", command.path(), command.value());
        }
    }
    Ok(())
}

fn edit(
    base: &Path,
    buffer_size: usize,
    change: impl FnOnce(&mut JournaledDocument) -> journalstore::Result<()>,
) -> Result<()> {
    let config = JournalConfig::new(base).buffer_size(buffer_size);
    let mut document = JournaledDocument::open(config)
        .with_context(|| format!("Failed to open document '{}'", base.display()))?;
    change(&mut document)?;
    document.close()?;
    println!("Updated {}", base.display());
    Ok(())
}

fn queue_list(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(anyhow!("'{}' is not a directory", dir.display()));
    }
    let queue = FileQueue::new(QueueConfig::new(dir));
    let files = queue.find_stored_files();

    println!("Queue: {}", dir.display());
    println!("Files: {}", files.len());
    for file in files {
        let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match filename_timestamp(&file) {
            Some(stamp) => println!("- {} ({})", name, stamp.to_rfc3339()),
            None => println!("- {}", name),
        }
    }
    Ok(())
}
