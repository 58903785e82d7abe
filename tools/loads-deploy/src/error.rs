use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unknown install target: {}", name))]
    UnknownTarget { name: String },

    #[snafu(display(
        "Cannot combine remotesupport delivery with target {}: it requires placing a file \
         at {}, which the restricted remotesupport shell does not allow",
        name,
        destpath
    ))]
    RemoteSupportIncompatible { name: String, destpath: String },

    #[snafu(display("{} prefers .loads delivery but has no corresponding loads target", name))]
    NoLoadsSupport { name: String },

    #[snafu(display("Cannot combine .loads delivery with --via"))]
    LoadsViaConflict,

    #[snafu(context(false))]
    Metadata { source: loads_metadata::Error },
}
