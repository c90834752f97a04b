//! Pairnet record inspector.
//!
//! # Usage
//!
//! ```bash
//! # Summarize a record
//! pairnet-inspect world/pairing.cbor
//!
//! # Migrate a legacy record to the current schema
//! pairnet-inspect world/pairing.cbor --write world/pairing.cbor
//!
//! # Switch a world to independent sessions
//! pairnet-inspect world/pairing.cbor --mode independent --write world/pairing.cbor
//! ```

use std::{
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, ValueEnum};
use pairnet_core::{CoordinatorConfig, SessionMode};
use pairnet_inspect::{Report, load, save};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Global,
    Independent,
}

impl From<Mode> for SessionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Global => Self::Global,
            Mode::Independent => Self::Independent,
        }
    }
}

/// Pairnet record inspector
#[derive(Parser, Debug)]
#[command(name = "pairnet-inspect")]
#[command(about = "Inspect and migrate persisted pairnet records")]
#[command(version)]
struct Args {
    /// Record file to read
    record: PathBuf,

    /// Write the restored record here, in the current schema
    #[arg(short, long)]
    write: Option<PathBuf>,

    /// Switch session mode before writing
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Player ceiling per session
    #[arg(long, default_value = "12")]
    max_session_players: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let config =
        CoordinatorConfig { max_session_players: args.max_session_players, ..Default::default() };
    let mut coordinator = load(&args.record, config)?;

    if let Some(mode) = args.mode {
        coordinator.set_session_mode(mode.into());
        tracing::info!(?mode, "session mode switched");
    }

    write!(io::stdout().lock(), "{}", Report::new(&coordinator))?;

    if let Some(path) = args.write {
        save(&coordinator, &path)?;
        tracing::info!(path = %path.display(), "record written");
    }

    Ok(())
}
