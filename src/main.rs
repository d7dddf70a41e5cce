//! Event Sources CLI - classify Schema.org event publishers by region.
//!
//! Usage:
//!   event-sources --lookup domains.csv --data-dir data/parts --output out
//!   event-sources --lookup domains.csv --data-dir data/parts --part part-0.gz --limit 100000
//!   event-sources --lookup domains.csv --data-dir data/parts --config gta.toml --workers 8

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use event_sources::config::PipelineConfig;
use event_sources::pipeline::{Pipeline, RunOptions};
use event_sources::signals::DomainRecord;
use event_sources::{Error, Result};

const SOURCE_EXTENSIONS: [&str; 3] = ["gz", "nq", "txt"];

#[derive(Parser, Debug)]
#[command(name = "event-sources")]
#[command(about = "Find the publishers of Schema.org events relevant to one region")]
struct Args {
    /// Domain lookup table (domain,tld[,part_file] per line)
    #[arg(long)]
    lookup: PathBuf,

    /// Directory holding the N-Quads part files
    #[arg(long)]
    data_dir: PathBuf,

    /// Only process this part file (repeatable)
    #[arg(long = "part")]
    parts: Vec<String>,

    /// Stop after this many events
    #[arg(long)]
    limit: Option<u64>,

    /// Worker threads (defaults to the configured value)
    #[arg(long)]
    workers: Option<usize>,

    /// TOML configuration overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    let records = read_lookup(&args.lookup)?;
    let files = source_files(&args.data_dir)?;
    info!(domains = records.len(), files = files.len(), "inputs loaded");

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        warn!("received Ctrl+C, finishing open windows and stopping");
        cancel_handler.store(true, Ordering::Relaxed);
    })?;

    let mut pipeline = Pipeline::new(config)?;
    pipeline.classify_domains(&records);
    let options = RunOptions { max_events: args.limit, only_files: args.parts, cancel: Some(cancel) };
    let report = pipeline.run(&files, &options);

    fs::create_dir_all(&args.output)?;
    write_json_lines(&args.output.join("classifications.jsonl"), pipeline.classifications())?;
    write_json_lines(&args.output.join("event_samples.jsonl"), pipeline.event_samples())?;
    write_json_lines(&args.output.join("review_queue.jsonl"), pipeline.review_queue())?;
    write_json_pretty(&args.output.join("run_report.json"), &report)?;

    println!("\nEvent Sources Complete!");
    println!("=======================");
    println!("Files processed:  {}", report.files_processed);
    println!("Files failed:     {}", report.files_failed.len());
    println!("Events:           {}", report.stats.events_emitted);
    println!("Malformed lines:  {} ({:.2}%)", report.stats.malformed_lines, report.malformed_percent);
    for (classification, domains) in &report.domains_by_classification {
        println!("{:<17} {}", format!("{}:", classification.as_str()), domains);
    }
    println!("Elapsed time:     {:.2}s", report.elapsed_seconds);
    println!("Output:           {}", args.output.display());

    Ok(())
}

/// Reads `domain,tld[,part_file]` rows. A leading header row is skipped.
fn read_lookup(path: &Path) -> Result<Vec<DomainRecord>> {
    let file = File::open(path).map_err(|e| Error::Source { path: path.to_path_buf(), reason: e.to_string() })?;
    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 2 || fields[0].is_empty() {
            continue;
        }
        if index == 0 && fields[0].eq_ignore_ascii_case("domain") {
            continue;
        }
        let mut record = DomainRecord::new(fields[0], fields[1]);
        record.part_file = fields.get(2).filter(|f| !f.is_empty()).map(|f| f.to_string());
        records.push(record);
    }
    Ok(records)
}

/// Source files in a directory, sorted by name.
fn source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()).is_some_and(|e| SOURCE_EXTENSIONS.contains(&e))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn write_json_lines<T: Serialize>(path: &Path, rows: Vec<&T>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_sources::pipeline::RunReport;

    #[test]
    fn test_run_report_is_written_completely() {
        let dir = PathBuf::from("test_data_cli_report");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("run_report.json");

        let report = RunReport { files_processed: 3, elapsed_seconds: 1.5, ..Default::default() };
        write_json_pretty(&path, &report).unwrap();

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["files_processed"], 3);
        assert_eq!(written["elapsed_seconds"], 1.5);

        fs::remove_dir_all(&dir).unwrap();
    }
}
