//! Object listing.

use klipperstat_core::{OutputFormat, StatusFormatter};

use crate::error::ClientResult;
use crate::orchestrator::Orchestrator;

/// Handshakes and prints the objects reported by `objects/list`.
pub async fn run(orchestrator: &Orchestrator, formatter: &StatusFormatter) -> ClientResult<()> {
    let mut handshake = orchestrator.handshake().await?;
    handshake.session.close().await;

    println!("{}", formatter.format_objects(&handshake.objects));
    if formatter.output_format() == OutputFormat::Tty {
        println!(
            "Handshake took {:.3}s (attempt {})",
            handshake.elapsed.as_secs_f64(),
            handshake.attempt
        );
    }
    Ok(())
}
