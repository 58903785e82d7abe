use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to create serve workspace {}: {}", path.display(), source))]
    CreateWorkspace {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to bind listener on {}: {}", addr, source))]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[snafu(display("Server task failed: {}", source))]
    ServerTask { source: tokio::task::JoinError },

    #[snafu(context(false))]
    Bundle { source: loads_bundle::Error },
}
