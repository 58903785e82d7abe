//! The static table of install targets this toolkit knows how to push
//! software to, and the remote-shell scriptlet each one composes into.

use crate::error::{self, Result};
use lazy_static::lazy_static;
use snafu::{ensure, OptionExt};
use std::collections::HashMap;

const DEFAULT_SSH: &str = "ssh";
const INSTALLIMAGE: &str = "/sbin/installimage";

/// An install-target descriptor: what SSH binary to use, where (if
/// anywhere) to place the image on the remote filesystem, and what to run
/// once it's there.
#[derive(Debug, Clone)]
pub struct InstallTarget {
    pub name: String,
    pub description: String,
    pub subtarget: Option<String>,
    pub ssh: String,
    pub destpath: Option<String>,
    pub posthook: Option<String>,
    pub prefer_loads: bool,
    pub loadsname: String,
}

impl std::fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl InstallTarget {
    /// A `remotesupport` login is restricted to a shell where `installimage`
    /// (via sudo) is permitted but arbitrary file placement is not.
    pub fn is_remotesupport_compatible(&self) -> bool {
        self.destpath.is_none()
    }

    /// Whether this target has a corresponding [`loads_metadata::Target`]
    /// registered under `loadsname`, and so can be delivered via a `.loads`
    /// bundle rather than a bare streamed image.
    pub fn supports_loads(&self) -> bool {
        loads_metadata::target::by_name(&self.loadsname).is_ok()
    }

    /// Build the semicolon-joined shell script to run on the remote device,
    /// assuming the target image will be piped into its stdin (when
    /// `destpath` is absent) or has already been placed (when present).
    pub fn remote_script(&self, allow_test_sw: bool, sudo: &str, install_args: &str) -> String {
        let mut script = vec![". /etc/profile".to_string()];
        if allow_test_sw {
            script.push("touch /tmp/allow_test_software".to_string());
        }

        match &self.destpath {
            None => {
                script.push(format!(
                    "{} {} -k /mnt/base/active/rk -f - {}",
                    sudo, INSTALLIMAGE, install_args
                ));
            }
            Some(destpath) => {
                script.push(format!("destpath={destpath}"));
                script.push(r#"cat - >"$destpath.tmp" && mv "$destpath.tmp" "$destpath""#.to_string());
            }
        }

        if let Some(posthook) = &self.posthook {
            script.push(posthook.clone());
        }

        script.join("; ")
    }
}

macro_rules! target {
    ($name:expr, $desc:expr $(, $field:ident = $value:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut t = InstallTarget {
            name: $name.to_string(),
            description: $desc.to_string(),
            subtarget: None,
            ssh: DEFAULT_SSH.to_string(),
            destpath: None,
            posthook: None,
            prefer_loads: false,
            loadsname: $name.to_string(),
        };
        $(t.$field = $value.into();)*
        t
    }};
}

fn target_table() -> Vec<InstallTarget> {
    vec![
        target!("asterix", "Asterix complete image"),
        target!(
            "asterix.apps", "Asterix arm-a8 application code",
            subtarget = Some("/asterix/a8/apps".to_string()),
            destpath = Some("/mnt/base/active/apps.img".to_string()),
            posthook = Some("/bin/mainrestart update".to_string()),
        ),
        target!(
            "asterix.gui", "Asterix GUI code",
            destpath = Some("/mnt/base/active/gui.img.tmp".to_string()),
            posthook = Some(
                "/etc/init.d/S13gui unmount_img > /dev/null 2>&1 && \
                 mv \"$destpath\" \"${destpath%.tmp}\" && \
                 /etc/init.d/S13gui mount_img > /dev/null 2>&1".to_string()
            ),
        ),
        target!("asterix.prodtest", "Asterix prodtest image"),
        target!(
            "asterix.slaveapps",
            "Asterix application code for slave processors, target arm-m3 and c674x, sysbios",
            subtarget = Some("/asterix/slaveapps".to_string()),
            destpath = Some("/mnt/base/active/slaveapps.img".to_string()),
            posthook = Some("/bin/mainrestart update".to_string()),
        ),
        target!("barents", "Barents image"),
        target!("barents.prodtest", "Barents prodtest image"),
        target!("carbon", "Carbon complete image, target tilera linux"),
        target!(
            "carbon.gui", "Carbon GUI code, target tilera linux",
            destpath = Some("/mnt/base/active/fs/gui.img.tmp".to_string()),
            posthook = Some(
                "systemctl stop run-mnt-gui.mount && \
                 mv \"$destpath\" \"${destpath%.tmp}\" && \
                 systemctl start gui.service".to_string()
            ),
        ),
        target!("carbon.prodtest", "Carbon prodtest image, target tilera linux"),
        target!(
            "ce-host", "CE Host VM image, target x86 linux",
            ssh = "vm_ssh",
        ),
        target!("drishti", "Drishti complete image"),
        target!(
            "drishti.apps", "Drishti arm-a9 application code",
            subtarget = Some("/drishti/a9/apps".to_string()),
            destpath = Some("/mnt/base/active/apps.img".to_string()),
        ),
        target!(
            "drishti.gui", "Drishti GUI code",
            destpath = Some("/mnt/base/active/gui.img.tmp".to_string()),
            posthook = Some(
                "/etc/init.d/S13gui unmount_img > /dev/null 2>&1 && \
                 mv \"$destpath\" \"${destpath%.tmp}\" && \
                 /etc/init.d/S13gui mount_img > /dev/null 2>&1".to_string()
            ),
        ),
        target!("drishti.prodtest", "Drishti prodtest image"),
        target!("drishti.qml2", "Drishti + QML2 complete image"),
        target!("halley", "Halley complete image"),
        target!(
            "halley.apps", "Halley arm application code",
            subtarget = Some("/halley/arm/apps".to_string()),
        ),
        target!("idefix", "Idefix complete image"),
        target!("moody", "Moody complete image"),
        target!("pyramid", "Pyramid complete image"),
        target!("pyramid.prodtest", "Pyramid prodtest image"),
        target!("sunrise", "Sunrise complete image", prefer_loads = true),
        target!(
            "sunrise.gui", "Sunrise GUI code",
            destpath = Some("/mnt/base/active/fs/gui.img.tmp".to_string()),
            posthook = Some(
                "touch /mnt/base/active/pkg.modified && \
                 systemctl stop run-mnt-gui.mount && \
                 mv \"$destpath\" \"${destpath%.tmp}\" && \
                 systemctl start gui.service".to_string()
            ),
        ),
        target!("sunrise.prodtest", "Sunrise prodtest image"),
        target!(
            "sunrise.r28n", "Sunrise r28n complete image",
            prefer_loads = true,
            loadsname = "sunrise",
        ),
        target!(
            "sunrise.r28n.gui", "Sunrise r28n GUI code",
            destpath = Some("/mnt/base/active/fs/gui.img.tmp".to_string()),
            posthook = Some(
                "touch /mnt/base/active/pkg.modified && \
                 systemctl stop run-mnt-gui.mount && \
                 mv \"$destpath\" \"${destpath%.tmp}\" && \
                 systemctl start gui.service".to_string()
            ),
        ),
        target!("sunrise.r28n.prodtest", "Sunrise r28n prodtest image"),
        target!("tempo", "Tempo complete image"),
        target!("zenith", "Zenith complete image", prefer_loads = true),
        target!(
            "zenith.gui", "Zenith GUI code",
            destpath = Some("/mnt/base/active/fs/gui.img.tmp".to_string()),
            posthook = Some(
                "touch /mnt/base/active/pkg.modified && \
                 systemctl stop run-mnt-gui.mount && \
                 mv \"$destpath\" \"${destpath%.tmp}\" && \
                 systemctl start gui.service".to_string()
            ),
        ),
        target!("zenith.prodtest", "Zenith prodtest image"),
    ]
}

lazy_static! {
    static ref ORDER: Vec<String> = target_table().into_iter().map(|t| t.name).collect();
    static ref BY_NAME: HashMap<String, InstallTarget> = target_table()
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();
}

/// Look up a registered install target by name.
pub fn by_name(name: &str) -> Result<&'static InstallTarget> {
    BY_NAME.get(name).context(error::UnknownTargetSnafu { name })
}

/// Iterate over every registered install target, in table order.
pub fn iter() -> impl Iterator<Item = &'static InstallTarget> {
    ORDER.iter().map(|name| by_name(name).expect("registry self-consistent"))
}

/// Validate that any target claiming `prefer_loads` actually has loads
/// support, matching the reference table's own startup assertion.
pub fn validate() -> Result<()> {
    for target in BY_NAME.values() {
        if target.prefer_loads {
            ensure!(
                target.supports_loads(),
                error::NoLoadsSupportSnafu { name: target.name.clone() }
            );
        }
    }
    Ok(())
}
