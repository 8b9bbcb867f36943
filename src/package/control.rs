//! Control metadata: the `control` text file and the maintainer scripts
//! staged next to it.

use crate::common::PackageMetadata;
use crate::fsx::set_unix_permissions;
use crate::IpkError;

use std::fs;
use std::path::Path;
use tracing::debug;

/// Name of the metadata file inside `control.tar.gz`.
pub const CONTROL_FILE: &str = "control";

const DATA_FILE_MODE: u32 = 0o644;
const SCRIPT_MODE: u32 = 0o755;
const STAGING_DIR_MODE: u32 = 0o755;

/// Renders the six control fields in their fixed order. Unset optional
/// fields keep their line with an empty value.
pub fn render_control(metadata: &PackageMetadata) -> String {
    let fields = [
        ("Package", Some(metadata.name())),
        ("Version", Some(metadata.version())),
        ("Architecture", Some(metadata.architecture())),
        ("Depends", metadata.depends()),
        ("Maintainer", metadata.maintainer()),
        ("Description", metadata.description()),
    ];
    let mut text = String::new();
    for (key, value) in fields {
        text.push_str(key);
        text.push_str(": ");
        text.push_str(value.unwrap_or(""));
        text.push('\n');
    }
    text
}

/// Fills `dir` with the `control` file and every supplied maintainer script
/// under its canonical name. `dir` is created and must not exist yet.
pub fn stage_control_dir(metadata: &PackageMetadata, dir: &Path) -> Result<(), IpkError> {
    fs::create_dir(dir).map_err(|e| IpkError::io(dir, e))?;
    set_unix_permissions(dir, STAGING_DIR_MODE).map_err(|e| IpkError::io(dir, e))?;

    let control = dir.join(CONTROL_FILE);
    fs::write(&control, render_control(metadata)).map_err(|e| IpkError::io(&control, e))?;
    set_unix_permissions(&control, DATA_FILE_MODE).map_err(|e| IpkError::io(&control, e))?;

    for (kind, source) in metadata.scripts().iter() {
        let target = dir.join(kind.canonical_name());
        fs::copy(source, &target).map_err(|e| IpkError::io(source, e))?;
        set_unix_permissions(&target, SCRIPT_MODE).map_err(|e| IpkError::io(&target, e))?;
        debug!(script = kind.canonical_name(), source = %source.display(), "staged maintainer script");
    }
    Ok(())
}
