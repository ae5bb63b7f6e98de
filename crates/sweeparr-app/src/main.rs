#![forbid(unsafe_code)]

//! Binary entrypoint that wires the Sweeparr services together and runs the
//! recurring cleaning passes until shutdown.

use sweeparr_app::{AppResult, run_app};

/// Bootstraps the Sweeparr application and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
