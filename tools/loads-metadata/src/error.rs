use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unknown target: {}", name))]
    UnknownTarget { name: String },

    #[snafu(display("Unknown product: {}", product))]
    UnknownProduct { product: String },

    #[snafu(display("Target {} depends on unregistered target {}", target, dep))]
    UnregisteredDependency { target: String, dep: String },

    #[snafu(display("More than one target claims product {}", product))]
    DuplicateProduct { product: String },

    #[snafu(display("Failed to read {}: {}", path.display(), source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write {}: {}", path.display(), source))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read metadata for {}: {}", path.display(), source))]
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Malformed manifest {}: {}", path.display(), reason))]
    MalformedManifest { path: PathBuf, reason: String },

    #[snafu(display("Malformed manifest: {}", source))]
    ManifestJson { source: serde_json::Error },

    #[snafu(display("Malformed .pkg.loads sidecar at {}: {}", path.display(), reason))]
    MalformedPkgLoads { path: PathBuf, reason: String },

    #[snafu(display(
        "{} does not match '<letters><d>.<d>.<d> <commit-hex>{{11,40}}...': {:?}",
        what,
        version
    ))]
    MalformedVersion { what: &'static str, version: String },

    #[snafu(display("Failed to locate {} on PATH: {}", name, source))]
    ToolNotFound {
        name: &'static str,
        source: which::Error,
    },

    #[snafu(display("Running `{}` failed: {}", command, source))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("`{}` exited with {}: {}", command, status, stderr))]
    ExternalTool {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[snafu(display("`{}` produced non-UTF8 output: {}", command, source))]
    ExternalToolOutput {
        command: String,
        source: std::string::FromUtf8Error,
    },

    #[snafu(display("Key source missing file {}: {}", path.display(), source))]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to decode base64 signature: {}", source))]
    SignatureBase64 { source: base64::DecodeError },

    #[snafu(display("Remote signing service returned malformed response: {}", reason))]
    SigningServiceResponse { reason: String },

    #[snafu(display("Could not parse `ip route get` output: {}", reason))]
    RouteParse { reason: String },

    #[snafu(display("Failed to resolve {}: {}", peer, source))]
    ResolvePeer {
        peer: String,
        source: std::io::Error,
    },

    #[snafu(display("{} resolved to no addresses", peer))]
    PeerUnresolved { peer: String },
}
