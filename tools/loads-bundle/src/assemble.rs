//! Materializes a directory of manifest + signature + referenced packages.

use crate::error::{self, Result};
use loads_metadata::signer::KeySource;
use loads_metadata::target::Target;
use loads_metadata::{manifest::Manifest, package, preferred_pkg_filename, signer, PkgInfo};
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};

/// Locates the built `.pkg` for a target name. External collaborator: in the
/// reference toolkit this shells out to the build system's query mode
/// (`build --target <name> --print-target-names -Q`); here it is injected so
/// this crate has no opinion on how a caller's build graph is organized.
pub trait PkgLocator {
    fn locate(&self, target_name: &str) -> Result<PathBuf>;
}

/// Everything `build` needs beyond the target/package lists themselves.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub version: Option<String>,
    pub filenames: Option<Vec<String>>,
    pub loads_name: Option<String>,
    pub symlink: bool,
    pub sign_key: KeySource,
}

impl BuildOptions {
    pub fn new(sign_key: KeySource) -> Self {
        BuildOptions {
            version: None,
            filenames: None,
            loads_name: None,
            symlink: true,
            sign_key,
        }
    }
}

/// Write a `.loads` file plus signature plus package symlinks/copies for
/// `targets`/`pkgs` (parallel lists) into the existing directory `dst`.
/// Returns the path to the written `.loads` file.
pub fn build(dst: &Path, targets: &[&Target], pkgs: &[PathBuf], opts: &BuildOptions) -> Result<PathBuf> {
    ensure!(dst.is_dir(), error::NotADirectorySnafu { path: dst.to_path_buf() });
    ensure!(
        targets.len() == pkgs.len(),
        error::MismatchedCountsSnafu {
            targets: targets.len(),
            pkgs: pkgs.len(),
        }
    );
    for pkg in pkgs {
        ensure!(pkg.is_file(), error::NotAFileSnafu { path: pkg.clone() });
    }

    let infos: Vec<PkgInfo> = targets
        .iter()
        .zip(pkgs.iter())
        .map(|(t, p)| package::pkg_info(t, p).map_err(Into::into))
        .collect::<Result<_>>()?;

    let version = match &opts.version {
        Some(v) => v.clone(),
        None => infos[0].version.clone(),
    };

    let filenames: Vec<String> = match &opts.filenames {
        Some(f) => f.clone(),
        None => targets
            .iter()
            .map(|t| preferred_pkg_filename(t, &version, ".pkg").map_err(Into::into))
            .collect::<Result<_>>()?,
    };

    let loads_name = match &opts.loads_name {
        Some(n) => n.clone(),
        None => preferred_pkg_filename(targets[0], &version, ".loads")?,
    };

    let mut manifest = Manifest::new();
    log::info!("Building loads dir at {} from these sources:", dst.display());
    for ((target, info), fname) in targets.iter().zip(infos.iter()).zip(filenames.iter()) {
        manifest.add(target, info, fname.clone());
        log::info!("{:>16}: {:32} -> {}", target, fname, "<pkg>");
    }

    let loads_path = dst.join(&loads_name);
    manifest.write_to_path(&loads_path)?;

    let sgn_path = sibling_sgn_path(&loads_path);
    signer::sign_to_path(&loads_path, &opts.sign_key, &sgn_path)?;

    for (fname, pkg) in filenames.iter().zip(pkgs.iter()) {
        let tgt = dst.join(fname);
        place(&tgt, pkg, opts.symlink)?;
    }

    Ok(loads_path)
}

/// Build a loads dir for `target` plus its registered dependencies: locate
/// each dependency's package via `locator`, verify all exist, and delegate to
/// [`build`]. `pkg` overrides the lookup for `target` itself (e.g. a
/// freshly-built artifact not yet known to the locator).
pub fn build_with_deps(
    dst: &Path,
    target: &'static Target,
    pkg: Option<PathBuf>,
    locator: &dyn PkgLocator,
    opts: &BuildOptions,
) -> Result<PathBuf> {
    log::info!("Finding dependencies for {}...", target);

    let mut targets = vec![target];
    let mut pkgs = vec![match pkg {
        Some(p) => p,
        None => locator.locate(&target.name)?,
    }];

    for dep_name in &target.deps {
        let dep = loads_metadata::target::by_name(dep_name)?;
        let dep_pkg = locator.locate(dep_name)?;
        targets.push(dep);
        pkgs.push(dep_pkg);
    }

    let mut missing = Vec::new();
    for (t, p) in targets.iter().zip(pkgs.iter()) {
        if !p.is_file() {
            log::warn!("Missing PKG file for {}: {}", t, p.display());
            missing.push((t.name.clone(), p.clone()));
        }
    }
    ensure!(missing.is_empty(), error::MissingDependenciesSnafu { missing });

    build(dst, &targets, &pkgs, opts)
}

fn sibling_sgn_path(loads_path: &Path) -> PathBuf {
    let mut name = loads_path.as_os_str().to_owned();
    name.push(".sgn");
    PathBuf::from(name)
}

fn place(tgt: &Path, src: &Path, symlink: bool) -> Result<()> {
    let result = if symlink {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(src, tgt)
        }
        #[cfg(not(unix))]
        {
            std::fs::copy(src, tgt).map(|_| ())
        }
    } else {
        std::fs::copy(src, tgt).map(|_| ())
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let accepted = if symlink {
                same_target(tgt, src)?
            } else {
                same_bytes(tgt, src)?
            };
            ensure!(
                accepted,
                error::NameCollisionSnafu {
                    dst: tgt.to_path_buf(),
                    src: src.to_path_buf(),
                }
            );
            Ok(())
        }
        Err(e) => {
            if symlink {
                Err(error::Error::Symlink {
                    dst: tgt.to_path_buf(),
                    src: src.to_path_buf(),
                    source: e,
                })
            } else {
                Err(error::Error::Copy {
                    src: src.to_path_buf(),
                    dst: tgt.to_path_buf(),
                    source: e,
                })
            }
        }
    }
}

/// Inode/device identity, for an existing symlink target.
fn same_target(a: &Path, b: &Path) -> Result<bool> {
    let ra = a.canonicalize().context(error::CanonicalizeSnafu { path: a.to_path_buf() })?;
    let rb = b.canonicalize().context(error::CanonicalizeSnafu { path: b.to_path_buf() })?;
    Ok(ra == rb)
}

/// Byte equality, for an existing copy target.
fn same_bytes(a: &Path, b: &Path) -> Result<bool> {
    let ca = std::fs::read(a).context(error::CompareReadSnafu { path: a.to_path_buf() })?;
    let cb = std::fs::read(b).context(error::CompareReadSnafu { path: b.to_path_buf() })?;
    Ok(ca == cb)
}
