//! Install-target registry and remote-shell script/command assembly for
//! delivering an image or loads bundle to a device.

pub mod error;
pub mod install_target;
pub mod script;

pub use error::{Error, Result};
pub use install_target::InstallTarget;
pub use script::{build_ssh_cmd, ssh_address, via_wrap};

/// Which user account (and therefore privilege level) the remote script
/// runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteUser {
    Root,
    RemoteSupport,
}

impl RemoteUser {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteUser::Root => "root",
            RemoteUser::RemoteSupport => "remotesupport",
        }
    }

    pub fn sudo(self) -> &'static str {
        match self {
            RemoteUser::Root => "",
            RemoteUser::RemoteSupport => "sudo",
        }
    }
}

/// Check that a delivery plan is internally consistent before any network
/// activity: a `remotesupport` login can't place files at `destpath`, and
/// `.loads` delivery can't be combined with a jump host.
pub fn check_plan(
    target: &InstallTarget,
    user: RemoteUser,
    use_loads: bool,
    via: Option<&str>,
) -> Result<()> {
    log::info!("Checking delivery plan for {} (user={})", target, user.as_str());
    if user == RemoteUser::RemoteSupport && !target.is_remotesupport_compatible() {
        return error::RemoteSupportIncompatibleSnafu {
            name: target.name.clone(),
            destpath: target.destpath.clone().unwrap_or_default(),
        }
        .fail();
    }
    if use_loads {
        if !target.supports_loads() {
            return error::NoLoadsSupportSnafu {
                name: target.name.clone(),
            }
            .fail();
        }
        if via.is_some() {
            return error::LoadsViaConflictSnafu.fail();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remotesupport_with_destpath_target_is_rejected() {
        let t = install_target::by_name("asterix.apps").unwrap();
        let err = check_plan(t, RemoteUser::RemoteSupport, false, None).unwrap_err();
        assert!(matches!(err, Error::RemoteSupportIncompatible { .. }));
    }

    #[test]
    fn remotesupport_with_whole_image_target_is_accepted() {
        let t = install_target::by_name("asterix").unwrap();
        check_plan(t, RemoteUser::RemoteSupport, false, None).unwrap();
    }

    #[test]
    fn loads_with_via_is_rejected() {
        let t = install_target::by_name("sunrise").unwrap();
        let err = check_plan(t, RemoteUser::Root, true, Some("jumphost")).unwrap_err();
        assert!(matches!(err, Error::LoadsViaConflict));
    }

    #[test]
    fn loads_without_via_is_accepted() {
        let t = install_target::by_name("sunrise").unwrap();
        check_plan(t, RemoteUser::Root, true, None).unwrap();
    }
}
