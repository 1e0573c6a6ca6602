//! Production implementations of the plugstrap capability traits.
//!
//! - [`LocalFileSystem`]: directory walking, zip/tar extraction and PE
//!   version metadata
//! - [`TokioProcessRunner`]: child processes with a hard timeout
//! - [`ReqwestHttpClient`]: text fetches and streaming, hashed downloads
//! - [`SystemClock`]: random run ids and wall-clock time
//!
//! [`production_services`] wires all four into a [`Services`] value.

mod archive;
mod clock;
mod fs;
mod http;
mod pe;
mod process;

pub use clock::SystemClock;
pub use fs::LocalFileSystem;
pub use http::ReqwestHttpClient;
pub use process::TokioProcessRunner;

use plugstrap_core::config::NetworkSettings;
use plugstrap_core::{Result, Services};
use std::sync::Arc;

/// Build the production [`Services`] bundle.
///
/// # Errors
///
/// Returns a configuration error if the HTTP client cannot be constructed.
pub fn production_services(network: &NetworkSettings) -> Result<Services> {
    Ok(Services::new(
        Arc::new(LocalFileSystem::new()),
        Arc::new(TokioProcessRunner::new()),
        Arc::new(ReqwestHttpClient::new(network)?),
        Arc::new(SystemClock),
    ))
}
