//! One-shot status query.

use tracing::debug;

use klipperstat_core::StatusFormatter;
use klipperstat_protocol::StatusQuery;

use crate::error::ClientResult;
use crate::orchestrator::Orchestrator;

/// Queries status once and prints one line.
pub async fn run(
    orchestrator: &Orchestrator,
    query: &StatusQuery,
    formatter: &StatusFormatter,
) -> ClientResult<()> {
    let report = orchestrator.query_status(query).await?;
    debug!(
        objects = report.objects.len(),
        elapsed_secs = report.elapsed.as_secs_f64(),
        "Status received"
    );
    println!("{}", formatter.format(&report.snapshot));
    Ok(())
}
