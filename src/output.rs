use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{InfoResult, ListResult, PrepareReport, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Machine-readable output: one pretty JSON document per command on stdout.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_prepare(result: &PrepareReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable summaries; progress goes to the log.
pub struct TextOutput;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

impl TextOutput {
    pub fn print_prepare(result: &PrepareReport) {
        let summary = &result.info.summary;
        println!(
            "{CYAN}{}/{} ({}){RESET}",
            result.dataset, result.variant, result.action
        );
        println!(
            "{GREEN}  records: {} of {} rows{RESET}",
            summary.emitted, summary.rows_read
        );
        for (reason, count) in &summary.skipped {
            println!("{YELLOW}  skipped {reason}: {count}{RESET}");
        }
        if let Some(stats) = &result.info.backfill {
            println!(
                "  sequences: {} fetch call(s), {} resolved, {} missing",
                stats.fetch_calls, stats.accessions_resolved, stats.accessions_missing
            );
        }
        println!("  path: {}", result.records_path);
    }

    pub fn print_list(result: &ListResult) {
        if result.datasets.is_empty() {
            println!("no prepared datasets");
            return;
        }
        for entry in &result.datasets {
            println!(
                "{CYAN}{}/{}{RESET}  {} records  {}",
                entry.dataset, entry.variant, entry.records, entry.prepared_at
            );
        }
    }

    pub fn print_info(result: &InfoResult) {
        let info = &result.info;
        println!("{CYAN}{}/{}{RESET} v{}", info.dataset, info.variant, info.version);
        println!("  prepared: {} by {}", info.prepared_at, info.tool);
        println!("  records: {}", info.summary.emitted);
        for (name, url) in &info.sources {
            println!("  {name}: {url}");
        }
        println!("  path: {}", result.records_path);
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
