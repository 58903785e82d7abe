//! The preferred-filename naming rule shared by the assembler and the
//! validator: turn a package's raw version string into a path-safe
//! fragment, then combine it with a target's identity to get the filename
//! that would appear inside an official release.

use crate::error::{self, Result};
use crate::target::Target;
use regex::Regex;
use snafu::OptionExt;

lazy_static::lazy_static! {
    static ref VERSION_RE: Regex =
        Regex::new(r"^([A-Za-z]+\d+\.\d+\.\d+) ([0-9a-fA-F]{11,40})(?: .*)?$").unwrap();
}

/// Convert `"ce9.3.0 92f9c9ac866 something"` into `"ce9_3_0-92f9c9ac866"`.
///
/// Accepts exactly `<letters><d>.<d>.<d> <commit-hex>{11,40}( .*)?`; anything
/// else is a malformed version and fails the caller's build or validation.
pub fn version_as_path_fragment(pkg_version: &str) -> Result<String> {
    let caps = VERSION_RE
        .captures(pkg_version)
        .context(error::MalformedVersionSnafu {
            what: "package version",
            version: pkg_version.to_string(),
        })?;
    let version = &caps[1];
    let commit = &caps[2];
    Ok(format!("{}-{}", version.replace('.', "_"), commit))
}

/// The filename a package for `target` at `pkg_version` would carry inside
/// an official release: the product name (codecs) or target name
/// (peripherals), followed by the version fragment and `suffix`.
///
/// ```text
/// sunrise (codec):      s53200ce9_3_0-92f9c9ac866.pkg
/// pyramid (peripheral):  pyramidce9_3_0-92f9c9ac866.pkg
/// ```
pub fn preferred_pkg_filename(target: &Target, pkg_version: &str, suffix: &str) -> Result<String> {
    let prefix = if target.is_codec {
        &target.product
    } else {
        &target.name
    };
    Ok(format!(
        "{prefix}{}{suffix}",
        version_as_path_fragment(pkg_version)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target;

    #[test]
    fn s1_codec_preferred_filename() {
        let t = target::by_name("sunrise").unwrap();
        let name =
            preferred_pkg_filename(t, "ce9.3.0 92f9c9ac866 something", ".pkg").unwrap();
        assert_eq!(name, "s53200ce9_3_0-92f9c9ac866.pkg");
    }

    #[test]
    fn s2_peripheral_preferred_filename() {
        let t = target::by_name("pyramid").unwrap();
        let name = preferred_pkg_filename(t, "ce9.3.0 92f9c9ac866", ".pkg").unwrap();
        assert_eq!(name, "pyramidce9_3_0-92f9c9ac866.pkg");
    }

    #[test]
    fn rejects_malformed_version() {
        assert!(version_as_path_fragment("not a version").is_err());
        assert!(version_as_path_fragment("ce9.3.0 tooshort").is_err());
        assert!(version_as_path_fragment("ce9.3 92f9c9ac866").is_err());
    }

    #[test]
    fn is_pure_function_of_its_inputs() {
        let t = target::by_name("zenith").unwrap();
        let a = preferred_pkg_filename(t, "ce9.3.0 92f9c9ac866abc", ".loads").unwrap();
        let b = preferred_pkg_filename(t, "ce9.3.0 92f9c9ac866abc", ".loads").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn accepts_commit_hash_length_boundaries() {
        let eleven = "a".repeat(11);
        let forty = "a".repeat(40);
        assert!(version_as_path_fragment(&format!("ce9.3.0 {eleven}")).is_ok());
        assert!(version_as_path_fragment(&format!("ce9.3.0 {forty}")).is_ok());
        assert!(version_as_path_fragment(&format!("ce9.3.0 {}", "a".repeat(10))).is_err());
        assert!(version_as_path_fragment(&format!("ce9.3.0 {}", "a".repeat(41))).is_err());
    }
}
