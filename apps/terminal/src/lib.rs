//! # Tillbox Terminal
//!
//! The point-of-sale device process: opens local storage, serves the cart,
//! and runs sync, auto-save and backups in the background.
//!
//! ## Module Organization
//! ```text
//! tillbox_terminal/
//! ├── lib.rs          ◄─── You are here (tracing + run loop)
//! ├── config.rs       ◄─── terminal.toml + TILLBOX_* overrides
//! ├── cart.rs         ◄─── CartEngine: cart editing and commit
//! ├── terminal.rs     ◄─── Terminal: wiring, SaleOutcome, recovery, backups
//! ├── tasks.rs        ◄─── Auto-saver, sync worker, backup timer
//! └── error.rs        ◄─── TerminalError
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Terminal Startup                                  │
//! │                                                                         │
//! │  1. Initialize Logging                                                 │
//! │     • tracing-subscriber with env filter                                │
//! │     • Default: info,tillbox=debug,sqlx=warn (override with RUST_LOG)   │
//! │                                                                         │
//! │  2. Load Configuration                                                 │
//! │     • defaults ◄── terminal.toml ◄── TILLBOX_* environment             │
//! │                                                                         │
//! │  3. Open Terminal                                                      │
//! │     • tillbox.db (WAL), load store, load recovery queue, replay        │
//! │                                                                         │
//! │  4. Start Background Tasks                                             │
//! │                                                                         │
//! │  5. Wait for Ctrl-C, stop tasks, final save                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cart;
pub mod config;
pub mod error;
pub mod tasks;
pub mod terminal;

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use cart::{CartEngine, CommittedSale};
pub use config::TerminalConfig;
pub use error::{TerminalError, TerminalResult};
pub use tasks::BackgroundTasks;
pub use terminal::{Receipt, RejectCode, SaleOutcome, Terminal};

/// Runs the terminal until Ctrl-C.
pub async fn run(config_path: Option<PathBuf>) -> TerminalResult<()> {
    info!("Starting Tillbox terminal");

    let config = TerminalConfig::load(config_path)?;
    info!(
        device_id = %config.device.id,
        sync_mode = %config.sync.mode,
        data_dir = %config.data_dir()?.display(),
        "Configuration loaded"
    );

    let terminal = Terminal::open(config).await?;
    let tasks = terminal.start_background()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    tasks.shutdown().await;
    terminal.shutdown().await
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tillbox_sync=trace` - Trace the sync crate only
/// - Default: info, debug for tillbox crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tillbox=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
