//! Target registry, package metadata extraction, the `.loads` manifest
//! model, and manifest signing/verification.
//!
//! This is the bottom layer of the loads bundle toolkit: it knows nothing
//! about directories, HTTP, or remote shells, only about the entities that
//! make up a signed upgrade manifest.

pub mod error;
pub mod hash;
pub mod manifest;
pub mod package;
pub mod signer;
pub mod target;
pub mod version;

pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use package::{pkg_info, pkg_info_verified, PkgInfo};
pub use signer::KeySource;
pub use target::Target;
pub use version::{preferred_pkg_filename, version_as_path_fragment};
