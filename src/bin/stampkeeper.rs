//! # stampkeeper CLI
//!
//! Inventories a directory into a snapshot file and, with `--restore`, puts
//! back the timestamps of files whose content did not change since the
//! previous snapshot.
//!
//! ## Usage
//! ```bash
//! # Record the current state
//! stampkeeper --path ~/Photos --output ~/photos.json
//!
//! # After a sync tool touched everything, undo the timestamp drift
//! stampkeeper --path ~/Photos --output ~/photos.json --restore
//! ```

use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use stampkeeper::utils::format_timestamp;
use parking_lot::Mutex;
use stampkeeper::{
    ProgressInfo, RestorationRecord, Result, RunReport, RunStage, StampKeeperBuilder,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Inventory a directory and undo spurious timestamp drift
#[derive(Parser)]
#[command(name = "stampkeeper")]
#[command(version)]
#[command(about = "Snapshot file fingerprints and timestamps, restore timestamps of unmodified files")]
#[command(long_about = None)]
struct Cli {
    /// Directory to analyze
    #[arg(short, long)]
    path: PathBuf,

    /// Snapshot file to store all extracted properties into
    #[arg(short, long)]
    output: PathBuf,

    /// Restore the timestamps of all unmodified files
    #[arg(short, long)]
    restore: bool,

    /// Number of worker threads (defaults to available parallelism)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Extra ignore patterns (gitignore syntax); `!` negation is rejected
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Show a progress bar while hashing
    #[arg(long)]
    progress: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging: RUST_LOG wins, --verbose raises the default to debug
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let stages = RunStage::sequence(cli.restore);
    let completed = Arc::new(Mutex::new(Vec::<RunStage>::new()));

    match run(cli, Arc::clone(&completed)) {
        Ok(report) => print_report(&report),
        Err(e) => {
            let done = completed.lock();
            let failed = stages
                .iter()
                .copied()
                .find(|stage| !done.contains(stage))
                .unwrap_or(RunStage::Inventory);
            eprintln!("{:<45}{}", format!("{}:", failed.label()).bold(), "[KO]".red().bold());
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }
}

fn print_stage(stage: RunStage) {
    println!(
        "{:<45}{}",
        format!("{}:", stage.label()).bold(),
        "[OK]".green().bold()
    );
}

/// Main command runner
fn run(cli: Cli, completed: Arc<Mutex<Vec<RunStage>>>) -> Result<RunReport> {
    let mut builder = StampKeeperBuilder::new(cli.path, cli.output)
        .restore(cli.restore)
        .ignore_patterns(cli.ignore);
    if let Some(workers) = cli.workers {
        builder = builder.workers(workers);
    }

    let progress = if cli.progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg:<30} [{bar:40.green}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let callback_pb = pb.clone();
        builder = builder.progress(Arc::new(move |info: ProgressInfo| {
            if callback_pb.message() != info.operation {
                callback_pb.reset();
                callback_pb.set_message(info.operation.clone());
            }
            if let Some(total) = info.total {
                callback_pb.set_length(total as u64);
            }
            callback_pb.set_position(info.processed as u64);
        }));
        Some(pb)
    } else {
        None
    };

    let stage_pb = progress.clone();
    builder = builder.on_stage(Arc::new(move |stage: RunStage| {
        completed.lock().push(stage);
        match stage_pb {
            Some(ref pb) => pb.suspend(|| print_stage(stage)),
            None => print_stage(stage),
        }
    }));

    let result = builder.build()?.run();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    result
}

fn print_report(report: &RunReport) {
    if !report.restorations.is_empty() {
        println!("\n{}\n", render_table(&report.restorations));
    }

    for failure in &report.restore_failures {
        println!(
            "  {} {}: {}",
            "could not restore".yellow(),
            failure.path,
            failure.error
        );
    }

    println!(
        "  Files: {}  Restored: {}  Snapshot: {}  Time: {}",
        report.file_count.to_string().cyan(),
        report.restorations.len().to_string().cyan(),
        report.snapshot_path.display().to_string().cyan(),
        format_duration(round_to_millis(report.duration)).to_string().cyan()
    );
    if report.skipped > 0 {
        println!("  Skipped (unreadable): {}", report.skipped.to_string().yellow());
    }
}

fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}

/// Render restorations as a table: file, drifted and restored times
fn render_table(records: &[RestorationRecord]) -> String {
    const HEADERS: [&str; 5] = ["FILE", "CTIME", "RESTORED CTIME", "MTIME", "RESTORED MTIME"];

    let rows: Vec<[String; 5]> = records
        .iter()
        .map(|r| {
            let pair = |changed: bool, new: u64, old: u64| {
                if changed {
                    (format_timestamp(new), format_timestamp(old))
                } else {
                    (String::new(), String::new())
                }
            };
            let (ctime, restored_ctime) = pair(r.ctime_changed, r.new_ctime, r.old_ctime);
            let (mtime, restored_mtime) = pair(r.mtime_changed, r.new_mtime, r.old_mtime);
            [r.path.clone(), ctime, restored_ctime, mtime, restored_mtime]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let border = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{}{}{}", left, segments.join(mid), right)
    };
    let line = |cells: &[String]| {
        let mut out = String::from("│");
        for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
            let pad = width - cell.chars().count();
            let text = if i == 0 {
                format!(" {}{} ", cell, " ".repeat(pad))
            } else {
                let left = pad / 2;
                format!(" {}{}{} ", " ".repeat(left), cell, " ".repeat(pad - left))
            };
            out.push_str(&text.bold().to_string());
            out.push('│');
        }
        out
    };

    let header_cells: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    let mut table = vec![border("┌", "┬", "┐"), line(&header_cells), border("├", "┼", "┤")];
    for row in &rows {
        table.push(line(row));
    }
    table.push(border("└", "┴", "┘"));
    table.join("\n")
}
