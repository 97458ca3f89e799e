//! Command-line interface for the fileops copy and archive core.
//!
//! Copy, compress and extract run as background operations; copy failures
//! are answered interactively on stdin.

use clap::{Parser, Subcommand};
use fileops::archive::ArchiveFormat;
use fileops::session::{CompressRequest, ExtractRequest, OperationSummary};
use fileops::{
    EngineConfig, ErrorDecision, LocalPlaces, OperationEvent, OperationHandle, Operations,
    OverwritePolicy, PlacesProvider,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "fops")]
#[command(version, about = "Copy files and manage archives from the command line", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy files and directories into a destination directory
    Copy {
        /// Files and directories to copy
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination directory
        #[arg(short, long)]
        to: PathBuf,

        /// Replace existing files even when they are newer
        #[arg(long)]
        overwrite_all: bool,

        /// Copy buffer size in bytes
        #[arg(long)]
        buffer_size: Option<usize>,
    },

    /// Create an archive: zip, tar or gzip
    Compress {
        /// Archive format
        format: ArchiveFormat,

        /// Archive path; the extension is added when missing
        output: PathBuf,

        /// Files and directories to store
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory entry names are relative to (defaults to the first file's parent)
        #[arg(long)]
        parent: Option<PathBuf>,
    },

    /// Unpack an archive
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory (defaults to a directory named after the archive)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Archive format, when the extension does not tell
        #[arg(long)]
        format: Option<ArchiveFormat>,
    },

    /// Find paths matching a case-insensitive pattern
    Find {
        /// Directory to search
        root: PathBuf,

        /// Regular expression matched against the full path
        pattern: String,

        /// Stop after this many matches (0 for no limit)
        #[arg(long, default_value = "100")]
        max: usize,
    },

    /// List root places
    Places,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => run(cli.command, config, cli.json).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => {
            tracing::debug!("no config file given, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

async fn run(command: Commands, mut config: EngineConfig, json: bool) -> CliResult<()> {
    match command {
        Commands::Copy {
            sources,
            to,
            overwrite_all,
            buffer_size,
        } => {
            if overwrite_all {
                config.overwrite = OverwritePolicy::OverwriteAll;
            }
            if let Some(size) = buffer_size {
                config.buffer_size = size;
            }
            let operations = Operations::new(config);
            let task = operations.copy_task(sources, to);
            let handle = operations.start_copy(task)?;
            let summary = drive(handle, json).await?;
            print_summary(&summary, json)
        }
        Commands::Compress {
            format,
            output,
            files,
            parent,
        } => {
            let parent = parent.unwrap_or_else(|| default_parent(&files));
            let operations = Operations::new(config);
            let handle = operations.start_compress(CompressRequest {
                format,
                output,
                parent,
                selection: files,
            })?;
            let summary = drive(handle, json).await?;
            print_summary(&summary, json)
        }
        Commands::Extract {
            archive,
            out,
            format,
        } => {
            let operations = Operations::new(config);
            let handle = operations.start_extract(ExtractRequest {
                archive,
                format,
                destination: out,
            })?;
            let summary = drive(handle, json).await?;
            print_summary(&summary, json)
        }
        Commands::Find { root, pattern, max } => handle_find(&root, &pattern, max, json),
        Commands::Places => handle_places(json),
    }
}

/// Pump events until the operation ends, prompting on copy failures.
async fn drive(mut handle: OperationHandle, json: bool) -> CliResult<OperationSummary> {
    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed}] {pos} entries {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    };

    let interrupted = Arc::new(Notify::new());
    let canceller = handle.canceller();
    let notify = interrupted.clone();
    ctrlc::set_handler(move || {
        canceller.cancel();
        notify.notify_one();
    })?;

    while let Some(event) = handle.next_event().await {
        match event {
            OperationEvent::Progress { path } => {
                spinner.inc(1);
                spinner.set_message(path.display().to_string());
            }
            OperationEvent::ErrorPrompt {
                path,
                message,
                attempt,
            } => {
                spinner.set_draw_target(ProgressDrawTarget::hidden());
                let answer = prompt_operator(path, message, attempt);
                tokio::select! {
                    decision = answer => {
                        handle.decide(decision.unwrap_or(ErrorDecision::Abort)).await?;
                    }
                    _ = interrupted.notified() => handle.cancel(),
                }
                if !json {
                    spinner.set_draw_target(ProgressDrawTarget::stderr());
                }
            }
            OperationEvent::Completed { .. } | OperationEvent::Failed { .. } | OperationEvent::Cancelled => {}
        }
    }

    spinner.finish_and_clear();
    Ok(handle.wait().await?)
}

/// Ask on a detached thread so Ctrl-C can win over a blocked stdin read.
fn prompt_operator(path: PathBuf, message: String, attempt: u32) -> oneshot::Receiver<ErrorDecision> {
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(ask_operator(&path, &message, attempt));
    });
    rx
}

/// Read one decision from stdin. End of input aborts.
fn ask_operator(path: &Path, message: &str, attempt: u32) -> ErrorDecision {
    let stdin = io::stdin();
    let mut stderr = io::stderr();

    loop {
        let _ = writeln!(stderr, "Failed: {} ({})", path.display(), message);
        if attempt > 0 {
            let _ = writeln!(stderr, "  retried {} time(s)", attempt);
        }
        let _ = write!(stderr, "[r]etry, [s]kip, skip [a]ll, abort [x]? ");
        let _ = stderr.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return ErrorDecision::Abort,
            Ok(_) => {}
        }
        match parse_decision(&line) {
            Some(decision) => return decision,
            None => {
                let _ = writeln!(stderr, "Please answer r, s, a or x.");
            }
        }
    }
}

fn parse_decision(input: &str) -> Option<ErrorDecision> {
    match input.trim().to_lowercase().as_str() {
        "r" | "retry" => Some(ErrorDecision::Retry),
        "s" | "skip" => Some(ErrorDecision::Skip),
        "a" | "all" | "skip all" => Some(ErrorDecision::SkipAll),
        "x" | "abort" => Some(ErrorDecision::Abort),
        _ => None,
    }
}

fn default_parent(files: &[PathBuf]) -> PathBuf {
    files
        .first()
        .and_then(|f| f.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_summary(summary: &OperationSummary, json: bool) -> CliResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    match summary {
        OperationSummary::Copy(stats) => {
            println!("Copy complete:");
            println!("  Files copied:     {}", stats.files_copied);
            println!("  Up to date:       {}", stats.files_up_to_date);
            println!("  Skipped:          {}", stats.files_skipped);
            println!("  Directories:      {}", stats.directories);
            println!("  Bytes copied:     {}", stats.bytes_copied);
            println!("  Duration:         {:.2}s", stats.duration.as_secs_f64());
        }
        OperationSummary::Compress(stats) => {
            println!("Created {}", stats.archive.display());
            println!("  Entries:          {}", stats.entries.len());
            println!("  Bytes read:       {}", stats.bytes_read);
            println!("  Duration:         {:.2}s", stats.duration.as_secs_f64());
        }
        OperationSummary::Extract(stats) => {
            println!("Extraction complete:");
            println!("  Files extracted:  {}", stats.files_extracted);
            println!("  Directories:      {}", stats.directories_created);
            println!("  Bytes written:    {}", stats.bytes_written);
            if stats.entries_skipped > 0 {
                println!("  Unsafe skipped:   {}", stats.entries_skipped);
            }
            println!("  Duration:         {:.2}s", stats.duration.as_secs_f64());
        }
    }
    Ok(())
}

fn handle_find(root: &Path, pattern: &str, max: usize, json: bool) -> CliResult<()> {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let flag = cancel_flag.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    let result = fileops::finder::find(root, pattern, max, cancel_flag)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    for path in &result.matches {
        println!("{}", path.display());
    }
    println!("Finished searching ... found {} items", result.matches.len());
    Ok(())
}

#[derive(Serialize)]
struct PlaceRow {
    path: PathBuf,
    kind: String,
}

fn handle_places(json: bool) -> CliResult<()> {
    let rows: Vec<PlaceRow> = LocalPlaces
        .roots()
        .into_iter()
        .map(|path| {
            let kind = fileops::classify(&path)
                .map(|place| place.to_string())
                .unwrap_or_else(|e| e.to_string());
            PlaceRow { path, kind }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!("{:<8} {}", row.kind, row.path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decision() {
        assert_eq!(parse_decision("r\n"), Some(ErrorDecision::Retry));
        assert_eq!(parse_decision(" S "), Some(ErrorDecision::Skip));
        assert_eq!(parse_decision("a"), Some(ErrorDecision::SkipAll));
        assert_eq!(parse_decision("abort"), Some(ErrorDecision::Abort));
        assert_eq!(parse_decision("q"), None);
    }

    #[test]
    fn test_default_parent() {
        assert_eq!(
            default_parent(&[PathBuf::from("/home/u/docs/a.txt")]),
            PathBuf::from("/home/u/docs")
        );
        assert_eq!(default_parent(&[PathBuf::from("a.txt")]), PathBuf::from("."));
    }

    #[test]
    fn test_cli_parses_copy() {
        let cli = Cli::try_parse_from(["fops", "copy", "a", "b", "--to", "dst", "--overwrite-all"]).unwrap();
        match cli.command {
            Commands::Copy {
                sources,
                to,
                overwrite_all,
                ..
            } => {
                assert_eq!(sources.len(), 2);
                assert_eq!(to, PathBuf::from("dst"));
                assert!(overwrite_all);
            }
            _ => panic!("expected copy"),
        }
    }

    #[test]
    fn test_cli_parses_format() {
        let cli = Cli::try_parse_from(["fops", "compress", "tar", "out", "a.txt"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Compress {
                format: ArchiveFormat::Tar,
                ..
            }
        ));
    }
}
