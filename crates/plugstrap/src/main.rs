//! plugstrap CLI binary.

#![allow(clippy::print_stderr)]

use clap::Parser;
use plugstrap::cli::{Cli, EXIT_OK, exit_code_for, render_error};
use plugstrap::commands;
use plugstrap::tracing::{TracingConfig, init_tracing};
use tokio_util::sync::CancellationToken;

/// Exit code for SIGINT (128 + signal number 2)
const EXIT_SIGINT: i32 = 130;

fn main() {
    // NOTE: tracing may be unusable during a panic, so print directly
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with --log-level debug for more information.");
    }));

    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    std::process::exit(rt.block_on(run(cli)));
}

async fn run(cli: Cli) -> i32 {
    let config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        filter: None,
    };
    if let Err(e) = init_tracing(config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing plugins already in progress");
            interrupt.cancel();
        }
    });

    let json = cli.json_mode();
    let result = commands::execute(cli.command, &cli.global, cancel.clone()).await;
    match result {
        Ok(()) if cancel.is_cancelled() => EXIT_SIGINT,
        Ok(()) => EXIT_OK,
        Err(err) => {
            render_error(&err, json);
            exit_code_for(&err)
        }
    }
}
