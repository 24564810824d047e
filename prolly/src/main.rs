#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::path::PathBuf;
use std::process::ExitCode;

use prolly::{CodecConfig, NodeSummary, inspect::read_message_file};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prolly=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match CodecConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("Loaded configuration: address_width={}", config.address_width);

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("usage: prolly-inspect <node-file>...");
        return ExitCode::FAILURE;
    }

    let mut failures = 0usize;
    for path in &paths {
        match read_message_file(path) {
            Ok(msg) => {
                if msg.address_width() != usize::from(config.address_width) {
                    tracing::warn!(
                        "{}: address width {} differs from configured {}",
                        path.display(),
                        msg.address_width(),
                        config.address_width
                    );
                }
                println!("{}:", path.display());
                print!("{}", NodeSummary::new(&msg));
            }
            Err(e) => {
                tracing::error!("{e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        tracing::info!("{failures} of {} files invalid", paths.len());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
