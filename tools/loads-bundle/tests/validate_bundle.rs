use loads_bundle::{validate, Checks};
use loads_metadata::KeySource;
use std::fs;
use std::path::PathBuf;

fn unused_key_source() -> KeySource {
    KeySource::Local {
        key: PathBuf::from("/unused"),
        cert: PathBuf::from("/unused"),
    }
}

#[test]
fn flags_absolute_package_location_and_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let loads_path = dir.path().join("bad.loads");
    fs::write(
        &loads_path,
        r#"[{"product":"Pyramid","packageLocation":"/nonexistent_pkg_xyz.pkg","version":"ce9.3.0 92f9c9ac866","targets":["a"],"checksum":"deadbeef"}]"#,
    )
    .unwrap();

    let mut checks = Checks::default();
    checks.loads_signed = false;
    checks.loads_has_codec = false;
    checks.loads_filename = false;

    let errors = validate(dir.path(), &unused_key_source(), &checks);
    let checks_seen: Vec<&str> = errors.iter().map(|e| e.check).collect();
    assert!(checks_seen.contains(&"pkg_relative"));
    assert!(checks_seen.contains(&"pkg_exists"));
}

#[test]
fn empty_bundle_yields_no_errors() {
    let dir = tempfile::tempdir().unwrap();
    let errors = validate(dir.path(), &unused_key_source(), &Checks::default());
    assert!(errors.is_empty());
}
