use crate::common::{PackageMetadata, ScriptKind};
use crate::package::BuildTimestamp;
use crate::IpkError;

use clap::Parser;
use std::path::PathBuf;

/// Environment variable consulted for a pinned build instant.
pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

/// Create IPK packages from a directory tree.
///
/// Package fields are optional at this layer so that a missing one is
/// reported by [`Args::into_config`] as a configuration error.
#[derive(Parser, Debug, Clone)]
#[command(name = "ipkbuild", about, long_about = None, disable_version_flag = true)]
pub struct Args {
    /// Package name.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Package version.
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Package architecture (e.g. `armv7`, `all`).
    #[arg(short = 'a', long)]
    pub arch: Option<String>,

    /// Package dependencies, written verbatim to the `Depends` field.
    #[arg(long)]
    pub depends: Option<String>,

    /// Package maintainer.
    #[arg(long)]
    pub maintainer: Option<String>,

    /// Package description (single line).
    #[arg(long = "desc", visible_alias = "description")]
    pub description: Option<String>,

    /// Pre-installation script path.
    #[arg(long)]
    pub preinst: Option<PathBuf>,

    /// Post-installation script path.
    #[arg(long)]
    pub postinst: Option<PathBuf>,

    /// Pre-remove script path.
    #[arg(long)]
    pub prerm: Option<PathBuf>,

    /// Post-remove script path.
    #[arg(long)]
    pub postrm: Option<PathBuf>,

    /// Root of the tree to install (becomes `data.tar.gz`).
    #[arg(short = 'i', long)]
    pub input: Option<PathBuf>,

    /// Directory the `.ipk` file is written to. Created if missing.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Scratch directory for intermediate files. Must be absent or empty; it is
    /// removed after the build. Defaults to a fresh directory under the system temp dir.
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Build instant as seconds since the Unix epoch. Overrides SOURCE_DATE_EPOCH.
    #[arg(long)]
    pub timestamp: Option<i64>,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// A validated build request.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub metadata: PackageMetadata,
    pub input: PathBuf,
    pub output: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    pub timestamp: BuildTimestamp,
}

impl Args {
    /// Checks required fields and builds the configuration record. Touches
    /// nothing on disk.
    pub fn into_config(self) -> Result<BuildConfig, IpkError> {
        let epoch = get_source_date_epoch_from_opt_or_env(self.timestamp)?;
        self.into_config_at(epoch)
    }

    fn into_config_at(self, epoch: Option<i64>) -> Result<BuildConfig, IpkError> {
        let name = required("name", self.name)?;
        let version = required("version", self.version)?;
        let arch = required("arch", self.arch)?;
        let input = required("input", self.input)?;
        let output = required("output", self.output)?;

        let mut metadata = PackageMetadata::new(name, version, arch)?;
        if let Some(depends) = self.depends {
            metadata = metadata.with_depends(depends)?;
        }
        if let Some(maintainer) = self.maintainer {
            metadata = metadata.with_maintainer(maintainer)?;
        }
        if let Some(description) = self.description {
            metadata = metadata.with_description(description)?;
        }
        let scripts = [
            (ScriptKind::PreInst, self.preinst),
            (ScriptKind::PostInst, self.postinst),
            (ScriptKind::PreRm, self.prerm),
            (ScriptKind::PostRm, self.postrm),
        ];
        for (kind, path) in scripts {
            if let Some(path) = path {
                metadata = metadata.with_script(kind, path);
            }
        }

        let timestamp = match epoch {
            Some(secs) => BuildTimestamp::from_unix(secs)?,
            None => BuildTimestamp::now(),
        };

        Ok(BuildConfig { metadata, input, output, scratch_dir: self.scratch_dir, timestamp })
    }
}

fn required<T>(field: &str, value: Option<T>) -> Result<T, IpkError> {
    value.ok_or_else(|| IpkError::Validation(format!("--{field} is required")))
}

/// Gets the build instant from the `--timestamp` option or the `SOURCE_DATE_EPOCH`
/// environment variable.
///
/// Priority:
/// 1. `--timestamp` command-line argument.
/// 2. `SOURCE_DATE_EPOCH` environment variable (ignored when empty).
/// 3. `Ok(None)`, meaning "use the current clock".
pub fn get_source_date_epoch_from_opt_or_env(timestamp_opt: Option<i64>) -> Result<Option<i64>, IpkError> {
    if let Some(secs) = timestamp_opt {
        return Ok(Some(secs));
    }
    match std::env::var(SOURCE_DATE_EPOCH) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| IpkError::Validation(format!("{SOURCE_DATE_EPOCH} is not an integer: '{value}'"))),
        _ => Ok(None),
    }
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Args {
    Args::parse()
}
