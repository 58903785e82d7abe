//! Independent, toggleable invariant checks over an assembled bundle
//! directory. Each failed check is *yielded*, not raised: callers decide
//! whether to count, log, or short-circuit on the resulting stream.

use loads_metadata::signer;
use loads_metadata::target::Target;
use loads_metadata::{manifest::Manifest, package, preferred_pkg_filename, KeySource};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One failed invariant, with enough context to locate and explain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub check: &'static str,
    pub context: PathBuf,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed check {} in {}: {}",
            self.check,
            self.context.display(),
            self.message
        )
    }
}

/// Which checks to run; all on by default via [`Checks::default`].
#[derive(Debug, Clone)]
pub struct Checks {
    pub loads_has_codec: bool,
    pub loads_filename: bool,
    pub loads_signed: bool,
    pub product_exists: bool,
    pub pkg_relative: bool,
    pub pkg_filename: bool,
    pub pkg_inside: bool,
    pub pkg_exists: bool,
    pub pkg_external_symlinks: bool,
    pub pkg_attached: bool,
    pub pkg_version: bool,
    pub pkg_targets: bool,
    pub pkg_checksum: bool,
}

impl Default for Checks {
    fn default() -> Self {
        Checks {
            loads_has_codec: true,
            loads_filename: true,
            loads_signed: true,
            product_exists: true,
            pkg_relative: true,
            pkg_filename: true,
            pkg_inside: true,
            pkg_exists: true,
            pkg_external_symlinks: true,
            pkg_attached: true,
            pkg_version: true,
            pkg_targets: true,
            pkg_checksum: true,
        }
    }
}

struct CodecEntry<'a> {
    target: &'a Target,
    filename: String,
    version: String,
}

struct PeripheralEntry<'a> {
    target: &'a Target,
    filename: String,
}

/// Walk `loadsdir` for every `.loads` file and run `checks` against it (plus
/// the bundle-wide `pkg_attached` check once at the end). Verification of
/// `loads_signed` uses `key_source`'s public key.
pub fn validate(
    loadsdir: &Path,
    key_source: &KeySource,
    checks: &Checks,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_pkgs: HashSet<PathBuf> = HashSet::new();

    for entry in WalkDir::new(loadsdir).into_iter().filter_map(|e| e.ok()) {
        if entry.path().extension().map(|e| e == "loads").unwrap_or(false) {
            validate_one_loads(loadsdir, entry.path(), key_source, checks, &mut errors, &mut seen_pkgs);
        }
    }

    if checks.pkg_attached {
        for entry in WalkDir::new(loadsdir).into_iter().filter_map(|e| e.ok()) {
            if entry.path().extension().map(|e| e == "pkg").unwrap_or(false) {
                let resolved = match entry.path().canonicalize() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if !seen_pkgs.contains(&resolved) {
                    errors.push(ValidationError {
                        check: "pkg_attached",
                        context: entry.path().to_path_buf(),
                        message: "Not referenced from any .loads file".to_string(),
                    });
                }
            }
        }
    }

    errors
}

#[allow(clippy::too_many_arguments)]
fn validate_one_loads(
    loadsdir: &Path,
    loads_path: &Path,
    key_source: &KeySource,
    checks: &Checks,
    errors: &mut Vec<ValidationError>,
    seen_pkgs: &mut HashSet<PathBuf>,
) {
    let manifest = match Manifest::parse(loads_path) {
        Ok(m) => m,
        Err(e) => {
            errors.push(ValidationError {
                check: "loads_parse",
                context: loads_path.to_path_buf(),
                message: format!("failed to parse: {e}"),
            });
            return;
        }
    };

    let loadsdir_resolved = loadsdir.canonicalize().ok();
    let mut codecs: Vec<CodecEntry> = Vec::new();
    let mut peripherals: Vec<PeripheralEntry> = Vec::new();

    for me in &manifest {
        let pkg_ref = Path::new(&me.package_location);

        if checks.pkg_relative && (pkg_ref.is_absolute() || me.package_location.contains("://")) {
            errors.push(ValidationError {
                check: "pkg_relative",
                context: loads_path.to_path_buf(),
                message: format!("{} is absolute filename or URL", me.package_location),
            });
        }

        let pkg_path = loads_path.parent().unwrap_or(Path::new(".")).join(pkg_ref);

        if checks.pkg_inside {
            let inside = pkg_path
                .parent()
                .and_then(|p| p.canonicalize().ok())
                .zip(loadsdir_resolved.clone())
                .map(|(p, root)| p.starts_with(&root))
                .unwrap_or(false);
            if !inside {
                errors.push(ValidationError {
                    check: "pkg_inside",
                    context: loads_path.to_path_buf(),
                    message: format!("{} is not within {}", pkg_path.display(), loadsdir.display()),
                });
            }
        }

        if checks.pkg_exists && !pkg_path.is_file() {
            errors.push(ValidationError {
                check: "pkg_exists",
                context: loads_path.to_path_buf(),
                message: format!("{} does not exist as a file", pkg_path.display()),
            });
        }

        let resolved_pkg = pkg_path.canonicalize().ok();
        if checks.pkg_external_symlinks {
            let outside = match (&resolved_pkg, &loadsdir_resolved) {
                (Some(p), Some(root)) => !p.starts_with(root),
                _ => true,
            };
            if outside {
                errors.push(ValidationError {
                    check: "pkg_external_symlinks",
                    context: loads_path.to_path_buf(),
                    message: format!("{} points outside {}", pkg_path.display(), loadsdir.display()),
                });
            }
        }
        if let Some(resolved) = &resolved_pkg {
            seen_pkgs.insert(resolved.clone());
        }

        let target = match loads_metadata::target::by_product(&me.product) {
            Ok(t) => Some(t),
            Err(_) => {
                if checks.product_exists {
                    errors.push(ValidationError {
                        check: "product_exists",
                        context: loads_path.to_path_buf(),
                        message: format!("{} is not a product name", me.product),
                    });
                }
                None
            }
        };

        let filename = pkg_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(target) = target {
            if target.is_codec {
                codecs.push(CodecEntry {
                    target,
                    filename: filename.clone(),
                    version: me.version.clone(),
                });
            } else {
                peripherals.push(PeripheralEntry {
                    target,
                    filename: filename.clone(),
                });
            }
        }

        if let Some(resolved) = &resolved_pkg {
            match package::pkg_info_verified(resolved) {
                Ok(pkg) => {
                    if checks.pkg_version && me.version != pkg.version {
                        errors.push(ValidationError {
                            check: "pkg_version",
                            context: pkg_path.clone(),
                            message: format!("Wrong PKG version ({} != {})", me.version, pkg.version),
                        });
                    }
                    if checks.pkg_targets && me.targets != pkg.targets {
                        errors.push(ValidationError {
                            check: "pkg_targets",
                            context: pkg_path.clone(),
                            message: format!("Wrong PKG targets ({:?} != {:?})", me.targets, pkg.targets),
                        });
                    }
                    if checks.pkg_checksum && me.checksum != pkg.checksum {
                        errors.push(ValidationError {
                            check: "pkg_checksum",
                            context: pkg_path.clone(),
                            message: format!(
                                "Wrong PKG checksum ({} != {})",
                                me.checksum, pkg.checksum
                            ),
                        });
                    }
                }
                Err(_) => {
                    // Extraction failure on this single package suppresses
                    // the three equality checks above for this entry only.
                }
            }
        }
    }

    if checks.loads_has_codec && codecs.is_empty() {
        errors.push(ValidationError {
            check: "loads_has_codec",
            context: loads_path.to_path_buf(),
            message: "No codec targets found in .loads file".to_string(),
        });
    }

    if checks.loads_filename && !codecs.is_empty() {
        if codecs.len() == 1 {
            let pref_name = preferred_pkg_filename(codecs[0].target, &codecs[0].version, ".loads")
                .unwrap_or_else(|e| format!("<unavailable: {e}>"));
            let actual_name = loads_path.file_name().map(|n| n.to_string_lossy().into_owned());
            if actual_name.as_deref() != Some(pref_name.as_str()) {
                errors.push(ValidationError {
                    check: "loads_filename",
                    context: loads_path.to_path_buf(),
                    message: format!(
                        "{} is not the preferred filename ({})",
                        actual_name.unwrap_or_default(),
                        pref_name
                    ),
                });
            }
        } else {
            errors.push(ValidationError {
                check: "loads_filename",
                context: loads_path.to_path_buf(),
                message: "multi-codec super-loads has no defined preferred filename".to_string(),
            });
        }
    }

    if checks.pkg_filename && !codecs.is_empty() {
        let expect_version = &codecs[0].version;
        for (target, filename) in codecs
            .iter()
            .map(|c| (c.target, &c.filename))
            .chain(peripherals.iter().map(|p| (p.target, &p.filename)))
        {
            match preferred_pkg_filename(target, expect_version, ".pkg") {
                Ok(pref_name) if &pref_name != filename => {
                    errors.push(ValidationError {
                        check: "pkg_filename",
                        context: loads_path.to_path_buf(),
                        message: format!("{filename} is not the preferred filename ({pref_name})"),
                    });
                }
                _ => {}
            }
        }
    }

    if checks.loads_signed {
        let sgn_path = sibling_sgn_path(loads_path);
        if !sgn_path.is_file() {
            errors.push(ValidationError {
                check: "loads_signed",
                context: loads_path.to_path_buf(),
                message: format!("{} is missing", sgn_path.display()),
            });
        } else {
            let good = verify_signed(loads_path, &sgn_path, key_source);
            if !good {
                errors.push(ValidationError {
                    check: "loads_signed",
                    context: loads_path.to_path_buf(),
                    message: format!("{} is not a valid signature", sgn_path.display()),
                });
            }
        }
    }
}

fn verify_signed(loads_path: &Path, sgn_path: &Path, key_source: &KeySource) -> bool {
    let sig = match std::fs::read(sgn_path) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let pubkey = match signer::public_key_of(key_source) {
        Ok(k) => k,
        Err(_) => return false,
    };
    signer::verify(loads_path, &sig, &pubkey).unwrap_or(false)
}

fn sibling_sgn_path(loads_path: &Path) -> PathBuf {
    let mut name = loads_path.as_os_str().to_owned();
    name.push(".sgn");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loads_metadata::target;
    use std::fs;

    fn have_openssl() -> bool {
        which::which("openssl").is_ok()
    }

    fn have_pkgextract() -> bool {
        which::which("pkgextract").is_ok()
    }

    #[test]
    fn s4_tampered_package_yields_exactly_one_checksum_error() {
        if !have_openssl() || !have_pkgextract() {
            // Validation's pkg_* equality checks require the external
            // extractor; without it they are suppressed (see
            // `Err(_) => {}` above), so this scenario can't be observed.
            return;
        }
        let dir = tempfile::tempdir().unwrap();

        let pkg_path = dir.path().join("pyramid.pkg");
        fs::write(&pkg_path, b"pkg bytes").unwrap();

        // Ground the manifest in whatever this environment's pkgextract
        // actually reports for the pristine file, rather than a fixture
        // value, so the only post-tamper mismatch is the checksum.
        let Ok(pristine) = package::pkg_info_verified(&pkg_path) else {
            // pkgextract is present but doesn't accept our synthetic bytes
            // as a package; this environment can't host the scenario.
            return;
        };

        let target = target::by_name("pyramid").unwrap();
        let mut manifest = Manifest::new();
        manifest.add(target, &pristine, "pyramid.pkg");
        let loads_path = dir.path().join("whatever.loads");
        manifest.write_to_path(&loads_path).unwrap();

        // Tamper a single byte, preserving length and shape so that any
        // header pkgextract's -T/-u flags depend on stays put and only the
        // checksum moves.
        let mut bytes = fs::read(&pkg_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&pkg_path, &bytes).unwrap();

        let mut checks = Checks::default();
        checks.loads_signed = false;
        checks.loads_has_codec = false;
        checks.loads_filename = false;
        checks.pkg_filename = false;

        let key_source = KeySource::Local {
            key: PathBuf::from("/unused"),
            cert: PathBuf::from("/unused"),
        };
        let errors = validate(dir.path(), &key_source, &checks);

        assert_eq!(errors.len(), 1, "errors: {errors:?}");
        assert_eq!(errors[0].check, "pkg_checksum");
    }

    #[test]
    fn monotonicity_disabling_a_check_never_adds_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bogus.loads"), b"not json").unwrap();

        let key_source = KeySource::Local {
            key: PathBuf::from("/unused"),
            cert: PathBuf::from("/unused"),
        };
        let all_on = validate(dir.path(), &key_source, &Checks::default());
        let mut fewer = Checks::default();
        fewer.loads_signed = false;
        let with_fewer = validate(dir.path(), &key_source, &fewer);
        assert!(with_fewer.len() <= all_on.len());
    }
}
