//! Command implementations.
//!
//! Every command starts from a [`Context`]: settings, the validated plan and
//! the production services wired to the configured plugins root.

pub mod check;
pub mod list;
pub mod roots;
pub mod sync;

use plugstrap_core::{
    EngineOptions, InstallRoot, Manifest, Orchestrator, Plan, Services, Settings, SourceRegistry,
    StrategyTable,
};
use plugstrap_services::production_services;
use plugstrap_tools_github::GitHubReleaseSource;
use plugstrap_tools_url::DirectUrlSource;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::DEFAULT_MANIFEST;
use crate::cli::{CliError, Commands, GlobalArgs};

/// Everything a command needs to run.
#[derive(Debug)]
pub struct Context {
    /// Loaded settings
    pub settings: Settings,
    /// Validated manifest with resolved strategies
    pub plan: Plan,
    /// Install root
    pub root: InstallRoot,
    /// Production capability services
    pub services: Services,
    /// Release sources
    pub sources: SourceRegistry,
}

impl Context {
    /// Load settings and manifest and wire up services.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unreadable or invalid settings or
    /// manifests.
    pub fn load(args: &GlobalArgs) -> Result<Self, CliError> {
        let settings = Settings::discover(args.config.as_deref())?;
        let manifest = match &args.manifest {
            Some(path) => Manifest::load(path).map_err(|e| match e {
                plugstrap_core::Error::Io { source, .. } => CliError::config_with_help(
                    format!("Could not read manifest {}: {source}", path.display()),
                    "Pass an existing file to --manifest",
                ),
                other => other.into(),
            })?,
            None => Manifest::from_toml(DEFAULT_MANIFEST)?,
        };
        let plan = StrategyTable::builtin().plan(&manifest)?;

        let root = match &args.root {
            Some(dir) => settings.install_root_at(dir),
            None => settings.install_root()?,
        };
        debug!(root = %root.root().display(), plugins = plan.len(), "Loaded context");

        let services = production_services(&settings.network)?;
        let sources = create_registry(&services, &settings);

        Ok(Self {
            settings,
            plan,
            root,
            services,
            sources,
        })
    }

    /// An orchestrator over this context.
    #[must_use]
    pub fn orchestrator(&self, options: EngineOptions, cancel: CancellationToken) -> Orchestrator {
        Orchestrator::new(self.root.clone(), self.services.clone(), self.sources.clone())
            .with_options(options)
            .with_cancellation(cancel)
    }
}

/// Create a source registry with the built-in release sources.
#[must_use]
pub fn create_registry(services: &Services, settings: &Settings) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(GitHubReleaseSource::new(
        services.http.clone(),
        settings.network.github_api_url.clone(),
    ));
    registry.register(DirectUrlSource::new(services.http.clone()));
    registry
}

/// Restrict a plan to the named plugins and everything they require.
///
/// # Errors
///
/// Returns a configuration error naming any plugin the plan does not contain.
pub fn select_plugins(mut plan: Plan, names: &[String]) -> Result<Plan, CliError> {
    if names.is_empty() {
        return Ok(plan);
    }

    let known: BTreeSet<&str> = plan.plugins().map(|p| p.name()).collect();
    if let Some(unknown) = names.iter().find(|n| !known.contains(n.as_str())) {
        return Err(CliError::config_with_help(
            format!("Unknown plugin '{unknown}'"),
            format!(
                "Known plugins: {}",
                known.iter().copied().collect::<Vec<_>>().join(", ")
            ),
        ));
    }

    // Requirements always point at earlier phases, so one backwards pass
    // collects the closure
    let mut keep: BTreeSet<String> = names.iter().cloned().collect();
    for plugin in plan.plugins().collect::<Vec<_>>().into_iter().rev() {
        if keep.contains(plugin.name()) {
            keep.extend(plugin.requires.iter().cloned());
        }
    }

    for phase in &mut plan.phases {
        phase.plugins.retain(|p| keep.contains(p.name()));
    }
    plan.phases.retain(|phase| !phase.plugins.is_empty());
    Ok(plan)
}

/// Run a parsed command.
///
/// # Errors
///
/// Returns the command's error, already mapped for exit-code selection.
pub async fn execute(
    command: Commands,
    args: &GlobalArgs,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let ctx = Context::load(args)?;
    match command {
        Commands::Sync {
            force_refresh,
            only,
            parallel,
            json,
        } => {
            let options = sync::SyncOptions {
                force_refresh,
                only,
                parallel,
                json,
            };
            sync::execute_sync(ctx, options, cancel).await
        }
        Commands::Check { json } => check::execute_check(&ctx, json, cancel).await,
        Commands::List => {
            list::execute_list(&ctx);
            Ok(())
        }
        Commands::Roots { json } => roots::execute_roots(&ctx, json, cancel).await,
    }
}
