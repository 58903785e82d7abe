//! Assembles `.loads` bundle directories from targets and packages, and
//! validates previously-assembled directories against a set of independent,
//! toggleable invariants.

pub mod assemble;
pub mod error;
pub mod validate;

pub use assemble::{build, build_with_deps, BuildOptions, PkgLocator};
pub use error::{Error, Result};
pub use validate::{validate, Checks, ValidationError};
