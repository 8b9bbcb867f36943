//! Permission mapping for archive entries.
//!
//! Every entry's mode is built from three flags only:
//!
//! ```text
//! mode = (executable ? 0o111 : 0) + (writable ? 0o222 : 0) + (readable ? 0o444 : 0)
//! ```
//!
//! This is not a copy of the host permission bits. On Unix the flags are the
//! owner class of the source mode, and the owner's permissions are applied to
//! owner, group and other alike. On platforms without per-class permissions
//! every file is readable and executable, so a writable file maps to `0o777`.
//! Package consumers rely on exactly this rule; do not "fix" it into a
//! faithful mode copy.

use std::fs::Metadata;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const EXEC_BITS: u32 = 0o111;
pub const WRITE_BITS: u32 = 0o222;
pub const READ_BITS: u32 = 0o444;

/// The three per-entry permission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessFlags {
    pub executable: bool,
    pub writable: bool,
    pub readable: bool,
}

impl AccessFlags {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mode = metadata.permissions().mode();
        Self {
            executable: mode & 0o100 != 0,
            writable: mode & 0o200 != 0,
            readable: mode & 0o400 != 0,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            executable: true,
            writable: !metadata.permissions().readonly(),
            readable: true,
        }
    }

    /// Collapses the flags into the combined mode.
    pub fn mode(self) -> u32 {
        (if self.executable { EXEC_BITS } else { 0 })
            + (if self.writable { WRITE_BITS } else { 0 })
            + (if self.readable { READ_BITS } else { 0 })
    }
}

/// Mode bits for the entry backed by `metadata`.
pub fn entry_mode(metadata: &Metadata) -> u32 {
    AccessFlags::from_metadata(metadata).mode()
}

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_unix_permissions(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// No-op elsewhere: POSIX permission bits are not preserved.
pub fn set_unix_permissions(_path: &std::path::Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
