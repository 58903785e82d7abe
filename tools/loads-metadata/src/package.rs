//! Package (`.pkg`) metadata extraction, with a process-wide memoization
//! cache keyed by `(target name, resolved path)`.

use crate::error::{self, Result};
use crate::hash::sha512;
use crate::target::Target;
use lazy_static::lazy_static;
use serde::Deserialize;
use snafu::{ensure, ResultExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

const PKGEXTRACT: &str = "pkgextract";

/// The three fields a manifest entry needs about a package: version string,
/// the list of internal target names it covers, and its content checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgInfo {
    pub version: String,
    pub targets: Vec<String>,
    pub checksum: String,
}

#[derive(Debug, Deserialize)]
struct PkgLoadsEntry {
    product: String,
    #[allow(dead_code)]
    #[serde(rename = "packageLocation")]
    package_location: String,
    version: String,
    targets: Vec<String>,
    checksum: String,
}

type CacheKey = (String, PathBuf);

lazy_static! {
    static ref CACHE: Mutex<HashMap<CacheKey, PkgInfo>> = Mutex::new(HashMap::new());
}

/// Return metadata for the `.pkg` at `path`, asserting it belongs to
/// `target`. Prefers the fast `<path>.loads` sidecar when it is fresh and
/// matches; otherwise falls back to invoking the external extractor and
/// hashing the file. Results are memoized for the process lifetime.
pub fn pkg_info(target: &Target, path: &Path) -> Result<PkgInfo> {
    let resolved = path
        .canonicalize()
        .context(error::MetadataSnafu { path })?;
    let key: CacheKey = (target.name.clone(), resolved.clone());

    if let Some(cached) = CACHE.lock().expect("cache mutex poisoned").get(&key) {
        return Ok(cached.clone());
    }

    let info = match fast_path(target, path) {
        Ok(info) => info,
        Err(e) => {
            log::warn!("{}, fall back to slow path...", e);
            slow_path(path)?
        }
    };

    CACHE
        .lock()
        .expect("cache mutex poisoned")
        .insert(key, info.clone());
    Ok(info)
}

/// Force the slow (extractor + hash) path, bypassing any `.pkg.loads`
/// sidecar. Used by the assembler's "verify" mode so the produced manifest
/// is provably authoritative for the package's current bytes. Does not
/// consult or populate the memoization cache, since a verify build must
/// re-derive the truth every time.
pub fn pkg_info_verified(path: &Path) -> Result<PkgInfo> {
    slow_path(path)
}

fn fast_path(target: &Target, pkg_path: &Path) -> Result<PkgInfo> {
    let loads_path = sidecar_path(pkg_path);
    let pkg_meta = std::fs::metadata(pkg_path).context(error::MetadataSnafu { path: pkg_path })?;
    let loads_meta =
        std::fs::metadata(&loads_path).context(error::MetadataSnafu { path: &loads_path })?;

    ensure!(
        loads_meta.modified().context(error::MetadataSnafu { path: &loads_path })?
            >= pkg_meta.modified().context(error::MetadataSnafu { path: pkg_path })?,
        error::MalformedPkgLoadsSnafu {
            path: loads_path.clone(),
            reason: "sidecar is older than the .pkg it describes".to_string(),
        }
    );

    let bytes = std::fs::read(&loads_path).context(error::ReadSnafu { path: &loads_path })?;
    let mut entries: Vec<PkgLoadsEntry> = serde_json::from_slice(&bytes).map_err(|e| {
        error::Error::MalformedPkgLoads {
            path: loads_path.clone(),
            reason: e.to_string(),
        }
    })?;
    ensure!(
        entries.len() == 1,
        error::MalformedPkgLoadsSnafu {
            path: loads_path.clone(),
            reason: format!("expected exactly one entry, found {}", entries.len()),
        }
    );
    let entry = entries.remove(0);
    ensure!(
        entry.product == target.product,
        error::MalformedPkgLoadsSnafu {
            path: loads_path,
            reason: format!(
                "wrong product: {} != {}",
                target.product, entry.product
            ),
        }
    );

    Ok(PkgInfo {
        version: entry.version,
        targets: entry.targets,
        checksum: entry.checksum,
    })
}

fn slow_path(pkg_path: &Path) -> Result<PkgInfo> {
    let checksum = sha512(pkg_path)?;
    let targets = run_pkgextract(pkg_path, "-T")?
        .trim_end()
        .split(',')
        .map(str::to_string)
        .collect();
    let version = run_pkgextract(pkg_path, "-u")?.trim_end().to_string();
    Ok(PkgInfo {
        version,
        targets,
        checksum,
    })
}

fn run_pkgextract(pkg_path: &Path, flag: &str) -> Result<String> {
    let bin = which::which(PKGEXTRACT).context(error::ToolNotFoundSnafu { name: PKGEXTRACT })?;
    let command = format!("{} {} -f {}", bin.display(), flag, pkg_path.display());
    let output = Command::new(&bin)
        .args([flag, "-f"])
        .arg(pkg_path)
        .output()
        .context(error::SpawnSnafu {
            command: command.clone(),
        })?;
    ensure!(
        output.status.success(),
        error::ExternalToolSnafu {
            command: command.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    );
    String::from_utf8(output.stdout).context(error::ExternalToolOutputSnafu { command })
}

fn sidecar_path(pkg_path: &Path) -> PathBuf {
    let mut name = pkg_path.as_os_str().to_owned();
    name.push(".loads");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target;
    use std::fs;
    use std::io::Write;

    fn write_pkg_loads(pkg_path: &Path, product: &str) {
        let loads_path = sidecar_path(pkg_path);
        let mut f = fs::File::create(&loads_path).unwrap();
        write!(
            f,
            r#"[{{"product":"{product}","packageLocation":"whatever.pkg","version":"ce9.3.0 92f9c9ac866 extra","targets":["a","b"],"checksum":"deadbeef"}}]"#
        )
        .unwrap();
    }

    #[test]
    fn fast_path_adopts_sidecar_fields() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_path = dir.path().join("target.pkg");
        fs::write(&pkg_path, b"pkg bytes").unwrap();
        write_pkg_loads(&pkg_path, "Pyramid");

        let target = target::by_name("pyramid").unwrap();
        let info = pkg_info(target, &pkg_path).unwrap();
        assert_eq!(info.version, "ce9.3.0 92f9c9ac866 extra");
        assert_eq!(info.targets, vec!["a", "b"]);
        assert_eq!(info.checksum, "deadbeef");
    }

    #[test]
    fn fast_path_rejected_on_product_mismatch_falls_back_and_errors_without_pkgextract() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_path = dir.path().join("target.pkg");
        fs::write(&pkg_path, b"pkg bytes").unwrap();
        write_pkg_loads(&pkg_path, "WrongProduct");

        let target = target::by_name("pyramid").unwrap();
        // Sidecar product mismatches, so we fall back to the slow path; since
        // pkgextract is not installed in the test environment, that fails too.
        assert!(pkg_info(target, &pkg_path).is_err());
    }

    #[test]
    fn stale_sidecar_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_path = dir.path().join("target.pkg");
        let loads_path = sidecar_path(&pkg_path);
        fs::write(&loads_path, b"[]").unwrap();
        // Sleep so the .pkg is unambiguously newer than its sidecar.
        std::thread::sleep(std::time::Duration::from_millis(10));
        fs::write(&pkg_path, b"pkg bytes").unwrap();

        let target = target::by_name("pyramid").unwrap();
        assert!(fast_path(target, &pkg_path).is_err());
    }
}
