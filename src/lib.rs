//! # ipkbuild Core Library
//!
//! This crate builds `.ipk` packages: an uncompressed tar holding a
//! `debian-binary` version marker, a gzip-compressed control archive and a
//! gzip-compressed data archive.
//!
//! It is designed to be used by the `ipkbuild` command-line application, but
//! its public API can also be used to build packages programmatically.
//!
//! ## Key Modules
//!
//! - [`archive`]: Walks a directory tree and writes normalized tar entries.
//! - [`package`]: Orchestrates the stages that produce the final `.ipk`.
//! - [`common`]: Package metadata and entry types.
//! - [`fsx`]: The permission model applied to every entry.
//! - [`cli`]: Command-line arguments and configuration validation.
//!
//! ## Examples
//!
//! ```no_run
//! use ipkbuild::package::{build_package, BuildTimestamp};
//! use ipkbuild::PackageMetadata;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), ipkbuild::IpkError> {
//! let metadata = PackageMetadata::new("hello", "1.0", "armv7")?.with_depends("libc")?;
//! let ipk = build_package(
//!     &metadata,
//!     Path::new("rootfs"),
//!     Path::new("/tmp/hello-scratch"),
//!     Path::new("out"),
//!     BuildTimestamp::now(),
//! )?;
//! println!("{}", ipk.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod error;
pub mod package;

pub use common::{PackageMetadata, RootPolicy, ScriptKind};
pub use error::{ErrorKind, IpkError};

// Permission mapping shared by every archive pass
pub mod fsx;
