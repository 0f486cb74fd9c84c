//! Log sink for run progress and the final summary.

use modsort_core::{FileOutcome, FileResult, ProgressEvent, RunReport};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

/// Log every event until the run drops its sender.
pub async fn log_events(mut events: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = events.recv().await {
        log_event(&event);
    }
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Scan { done, total } => debug!("Classified {}/{}", done, total),
        ProgressEvent::Move { done, total } => debug!("Moved {}/{}", done, total),
        ProgressEvent::FileResult(result) => log_result(result),
        ProgressEvent::Fatal { message } => error!("Aborting: {}", message),
    }
}

fn log_result(result: &FileResult) {
    match &result.outcome {
        FileOutcome::CacheHit { model_type } => {
            info!("{}: {} (cached)", result.name, model_type)
        }
        FileOutcome::Classified { model_type } => info!("{}: {}", result.name, model_type),
        FileOutcome::Unknown => info!("{}: unknown type, leaving in place", result.name),
        FileOutcome::Failed { error } => warn!("{}: {}", result.name, error),
        FileOutcome::Moved { to, renamed: true } => {
            info!("{} -> {} (renamed, name was taken)", result.name, to.display())
        }
        FileOutcome::Moved { to, .. } => info!("{} -> {}", result.name, to.display()),
        FileOutcome::Skipped => debug!("{}: skipped", result.name),
    }
}

/// Print the run summary to stdout.
pub fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!(
        "{} classified, {} unknown, {} moved, {} failed{}",
        summary.classified,
        summary.unknown,
        summary.moved,
        summary.failed,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}
