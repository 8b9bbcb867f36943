//! Shared entry point for the `ipkbuild` binary: parses arguments, sets up
//! logging, runs the build and reports the produced package.

use crate::cli::{self, BuildConfig};
use crate::package::build_package;
use crate::IpkError;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Public entry for running CLI logic.
pub fn run_cli_app() -> Result<PathBuf, IpkError> {
    let args = cli::run();
    init_logging(&args.log_level);

    let config = args.into_config()?;
    run_build(&config)
}

/// Runs one build. Without an explicit scratch directory a fresh one is
/// created under the system temp dir and removed afterwards.
pub fn run_build(config: &BuildConfig) -> Result<PathBuf, IpkError> {
    if let Some(scratch) = &config.scratch_dir {
        return build_package(&config.metadata, &config.input, scratch, &config.output, config.timestamp);
    }

    let temp = tempfile::Builder::new()
        .prefix("ipkbuild-")
        .tempdir()
        .map_err(|e| IpkError::io(std::env::temp_dir(), e))?;
    let scratch = temp.path().join("ipk");
    let temp_path = temp.path().to_path_buf();

    let result = build_package(&config.metadata, &config.input, &scratch, &config.output, config.timestamp);
    match (result, temp.close()) {
        (result, Ok(())) => result,
        (Ok(_), Err(source)) => Err(IpkError::Cleanup { path: temp_path, source }),
        (Err(primary), Err(cleanup)) => Err(IpkError::CleanupAfterFailure {
            primary: Box::new(primary),
            path: temp_path,
            cleanup,
        }),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // try_init: a subscriber may already be installed when embedded
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
