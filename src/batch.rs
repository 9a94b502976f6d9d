//! Batch orchestration: scan a folder, run one processor over every item,
//! tally the outcomes and hand the lines to a report.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use crate::colors;
use crate::error::{BatchError, FailureCause};
use crate::report::ReportBuilder;
use crate::scanner::{self, BatchItem, ScanParams};

/// Result of processing a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Success { line: String },
    Failure { line: String, cause: FailureCause },
}

impl ItemOutcome {
    pub fn success(line: impl Into<String>) -> Self {
        ItemOutcome::Success { line: line.into() }
    }

    pub fn failure(line: impl Into<String>, cause: FailureCause) -> Self {
        ItemOutcome::Failure {
            line: line.into(),
            cause,
        }
    }

    pub fn line(&self) -> &str {
        match self {
            ItemOutcome::Success { line } | ItemOutcome::Failure { line, .. } => line,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }
}

/// Aggregate over every outcome of one run, in scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    lines: Vec<String>,
    failures: Vec<(String, FailureCause)>,
    success: usize,
    failure: usize,
}

impl BatchResult {
    pub fn record(&mut self, item: &BatchItem, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Success { line } => {
                self.success += 1;
                self.lines.push(line);
            }
            ItemOutcome::Failure { line, cause } => {
                self.failure += 1;
                self.lines.push(line);
                self.failures.push((item.name.clone(), cause));
            }
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// `(item name, cause)` for every failed item.
    pub fn failures(&self) -> &[(String, FailureCause)] {
        &self.failures
    }

    pub fn success_count(&self) -> usize {
        self.success
    }

    pub fn failure_count(&self) -> usize {
        self.failure
    }

    pub fn total(&self) -> usize {
        self.success + self.failure
    }
}

/// 1-based position of an item within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub total: usize,
}

/// One transformation applied to every scanned item.
pub trait ItemProcessor {
    /// Plural noun for report lines, e.g. "images".
    fn noun(&self) -> &str;

    /// Called once after a successful scan, before any item is processed.
    fn prepare(&mut self) -> Result<(), BatchError> {
        Ok(())
    }

    fn process(&mut self, item: &BatchItem, position: Position) -> ItemOutcome;
}

/// What a batch run produced.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// A precondition failed; nothing was touched.
    Cancelled(String),
    Completed {
        report: ReportBuilder,
        result: BatchResult,
    },
}

impl BatchOutcome {
    pub fn render(&self) -> String {
        match self {
            BatchOutcome::Cancelled(reason) => reason.clone(),
            BatchOutcome::Completed { report, .. } => report.render(),
        }
    }

    pub fn result(&self) -> Option<&BatchResult> {
        match self {
            BatchOutcome::Cancelled(_) => None,
            BatchOutcome::Completed { result, .. } => Some(result),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchOutcome::Cancelled(_))
    }
}

/// Drive `processor` over every item matched by `params`.
///
/// A failing item never stops the batch. The only early exits are a missing
/// source folder and a failed `prepare`, both of which come back as
/// `BatchOutcome::Cancelled` without any items touched.
pub fn run_batch<P>(params: &ScanParams, processor: &mut P, mut report: ReportBuilder) -> BatchOutcome
where
    P: ItemProcessor + ?Sized,
{
    let items = match scanner::scan(params) {
        Ok(items) => items,
        Err(err) => return cancel(format!("Operation cancelled: {}", err)),
    };

    if let Err(err) = processor.prepare() {
        return cancel(format!("Operation cancelled: {}", err));
    }

    let noun = processor.noun().to_string();

    if items.is_empty() {
        let message = format!("No {} with a supported extension were found in the source folder.", noun);
        println!("{} {}", "ℹ️".cyan(), message);
        report.line(message);
        return BatchOutcome::Completed {
            report,
            result: BatchResult::default(),
        };
    }

    println!("{} Found {} {}. Processing...", "🔍".color(colors::HEADER), items.len(), noun);
    report.section(format!("Found {} {} to process", items.len(), noun));

    let pb = ProgressBar::new(items.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let total = items.len();
    let mut result = BatchResult::default();
    for (i, item) in items.iter().enumerate() {
        pb.set_message(item.name.clone());
        let outcome = processor.process(item, Position { index: i + 1, total });

        if let ItemOutcome::Failure { cause, .. } = &outcome {
            tracing::warn!("{} failed ({}): {}", item.name, cause.category(), cause);
        }
        // println on a hidden bar drops the line
        let line = console_line(&outcome);
        pb.suspend(|| println!("{}", line));

        report.line(outcome.line().to_string());
        result.record(item, outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();

    report.summary(format!("{} processed successfully", capitalize(&noun)), result.success_count());
    report.summary(format!("{} that failed", capitalize(&noun)), result.failure_count());
    report.summary(format!("Total {} analysed", noun), result.total());

    println!(
        "{} Done: {} succeeded, {} failed, {} total",
        "🎯".color(colors::SUCCESS),
        result.success_count().to_string().color(colors::SUCCESS),
        result.failure_count().to_string().color(colors::WARNING),
        result.total()
    );

    BatchOutcome::Completed { report, result }
}

fn console_line(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Success { line } => format!("{} {}", "✅".green(), line),
        ItemOutcome::Failure { line, .. } => format!("{} {}", "❌".red(), line),
    }
}

fn cancel(reason: String) -> BatchOutcome {
    println!("{} {}", "❌".red(), reason);
    BatchOutcome::Cancelled(reason)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
