//! `plugstrap sync`: install missing and outdated plugins.

use plugstrap_core::{EngineOptions, Error, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::{Context, select_plugins};
use crate::cli::{CliError, OkEnvelope};
use crate::render;

/// Flags of the sync command.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Reinstall up-to-date plugins
    pub force_refresh: bool,
    /// Restrict the run to these plugins and their requirements
    pub only: Vec<String>,
    /// Override `engine.max_parallel`
    pub parallel: Option<usize>,
    /// Emit JSON instead of a table
    pub json: bool,
}

impl SyncOptions {
    fn engine_options(&self, ctx: &Context) -> Result<EngineOptions, CliError> {
        let mut options = EngineOptions::from_settings(&ctx.settings);
        options.force_refresh = self.force_refresh;
        if let Some(parallel) = self.parallel {
            if parallel == 0 {
                return Err(CliError::config("--parallel must be at least 1"));
            }
            options.max_parallel = parallel;
        }
        Ok(options)
    }
}

/// Run the sync command.
///
/// # Errors
///
/// Returns a configuration error for bad selections, or a fatal error when a
/// mandatory plugin could not be provisioned. The partial report is printed
/// before a fatal error is returned.
#[instrument(name = "sync", skip_all, fields(force_refresh = options.force_refresh))]
pub async fn execute_sync(
    ctx: Context,
    options: SyncOptions,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let engine = options.engine_options(&ctx)?;
    let plan = select_plugins(ctx.plan.clone(), &options.only)?;
    let orchestrator = ctx.orchestrator(engine, cancel);

    match orchestrator.resolve_plugins(&plan).await {
        Ok(report) => {
            info!(summary = %render::summary_line(report.summary()), "Sync finished");
            print_report(&report, options.json, false)
        }
        Err(Error::FatalPlugin {
            plugin,
            cause,
            report,
        }) => {
            print_report(&report, options.json, true)?;
            Err(CliError::fatal(plugin, cause))
        }
        Err(other) => Err(other.into()),
    }
}

fn print_report(report: &RunReport, json: bool, aborted: bool) -> Result<(), CliError> {
    if json {
        let envelope = if aborted {
            OkEnvelope::aborted(report)
        } else {
            OkEnvelope::new(report)
        };
        let line = serde_json::to_string(&envelope)
            .map_err(|e| CliError::other(format!("JSON serialization failed: {e}")))?;
        println!("{line}");
    } else {
        print!("{}", render::run_report(report));
    }
    Ok(())
}
