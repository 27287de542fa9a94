//! # Tillbox Terminal Entry Point
//!
//! ```text
//! tillbox-terminal [path/to/terminal.toml]
//! ```
//!
//! Without an argument the platform config directory is used.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    tillbox_terminal::init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);

    match tillbox_terminal::run(config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Terminal exited with error");
            ExitCode::FAILURE
        }
    }
}
