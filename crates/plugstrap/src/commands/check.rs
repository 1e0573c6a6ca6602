//! `plugstrap check`: report drift without installing.

use plugstrap_core::EngineOptions;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::Context;
use crate::cli::{CliError, OkEnvelope};
use crate::render;

/// Run the check command.
///
/// # Errors
///
/// Returns an error if the run is interrupted or the report cannot be
/// serialized.
#[instrument(name = "check", skip_all)]
pub async fn execute_check(
    ctx: &Context,
    json: bool,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let orchestrator = ctx.orchestrator(EngineOptions::from_settings(&ctx.settings), cancel.clone());

    let reports = tokio::select! {
        reports = orchestrator.check(&ctx.plan) => reports,
        () = cancel.cancelled() => return Err(CliError::other("Interrupted")),
    };

    if json {
        let line = serde_json::to_string(&OkEnvelope::new(&reports))
            .map_err(|e| CliError::other(format!("JSON serialization failed: {e}")))?;
        println!("{line}");
    } else {
        print!("{}", render::version_reports(&reports));
    }
    Ok(())
}
