use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Destination {} is not an existing directory", path.display()))]
    NotADirectory { path: PathBuf },

    #[snafu(display(
        "build() received {} targets but {} packages; they must pair up",
        targets,
        pkgs
    ))]
    MismatchedCounts { targets: usize, pkgs: usize },

    #[snafu(display("Package path {} is not a file", path.display()))]
    NotAFile { path: PathBuf },

    #[snafu(display(
        "{} already exists in the bundle and does not refer to the same file as {}",
        dst.display(),
        src.display(),
    ))]
    NameCollision { dst: PathBuf, src: PathBuf },

    #[snafu(display("Failed to symlink {} -> {}: {}", dst.display(), src.display(), source))]
    Symlink {
        dst: PathBuf,
        src: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to copy {} -> {}: {}", src.display(), dst.display(), source))]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("One or more dependency packages are missing: {:?}", missing))]
    MissingDependencies {
        missing: Vec<(String, PathBuf)>,
    },

    #[snafu(context(false))]
    Metadata { source: loads_metadata::Error },

    #[snafu(display("Failed to resolve {}: {}", path.display(), source))]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read {} for comparison: {}", path.display(), source))]
    CompareRead {
        path: PathBuf,
        source: std::io::Error,
    },
}
