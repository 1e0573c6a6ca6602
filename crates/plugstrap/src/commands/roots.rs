//! `plugstrap roots`: where each installed plugin lives.

use plugstrap_core::EngineOptions;
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::cli::{CliError, OkEnvelope};
use crate::render;

/// Run the roots command. Local probes only; nothing is downloaded.
///
/// # Errors
///
/// Returns an error if the output cannot be serialized.
pub async fn execute_roots(
    ctx: &Context,
    json: bool,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let orchestrator = ctx.orchestrator(EngineOptions::from_settings(&ctx.settings), cancel);
    let roots = render::roots_of(&orchestrator.probe_installed(&ctx.plan).await);

    if json {
        let line = serde_json::to_string(&OkEnvelope::new(&roots))
            .map_err(|e| CliError::other(format!("JSON serialization failed: {e}")))?;
        println!("{line}");
    } else {
        print!("{}", render::install_roots(&roots));
    }
    Ok(())
}
