//! The `.loads` manifest: an ordered JSON array of package references.

use crate::error::{self, Result};
use crate::package::PkgInfo;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::io::Write;
use std::path::Path;

/// One entry in a `.loads` manifest. Every string field must be non-empty;
/// `targets` must be a non-empty-string list (it may itself be empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub product: String,
    #[serde(rename = "packageLocation")]
    pub package_location: String,
    pub version: String,
    pub targets: Vec<String>,
    pub checksum: String,
}

const CANONICAL_KEYS: &[&str] = &[
    "product",
    "packageLocation",
    "version",
    "targets",
    "checksum",
];

/// An ordered collection of [`ManifestEntry`] values, parsed from or destined
/// for a `.loads` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// A manifest with no entries yet; entries are appended via [`add`](Self::add).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `.loads` file, rejecting anything that isn't exactly an array
    /// of objects with precisely the five canonical keys and non-empty
    /// string/list values.
    pub fn parse(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).context(error::ReadSnafu { path })?;
        let value: Value = serde_json::from_slice(&bytes).context(error::ManifestJsonSnafu)?;
        let array = value
            .as_array()
            .ok_or_else(|| error::Error::MalformedManifest {
                path: path.to_path_buf(),
                reason: "top level value is not a JSON array".to_string(),
            })?;

        let mut entries = Vec::with_capacity(array.len());
        for (i, item) in array.iter().enumerate() {
            entries.push(parse_entry(path, i, item)?);
        }
        Ok(Manifest { entries })
    }

    /// Append an entry describing `pkg`, referencing it from the manifest as
    /// `url` (stored verbatim, typically a bundle-relative filename).
    pub fn add(&mut self, target: &Target, pkg: &PkgInfo, url: impl Into<String>) {
        self.entries.push(ManifestEntry {
            product: target.product.clone(),
            package_location: url.into(),
            version: pkg.version.clone(),
            targets: pkg.targets.clone(),
            checksum: pkg.checksum.clone(),
        });
    }

    /// Write this manifest as a 4-space-indented JSON array, in insertion
    /// order, to `writer`.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let mut ser = serde_json::Serializer::with_formatter(
            WriteAdapter(writer),
            serde_json::ser::PrettyFormatter::with_indent(b"    "),
        );
        self.entries
            .serialize(&mut ser)
            .map_err(|source| error::Error::ManifestJson { source })
    }

    /// Write this manifest to the given file path, creating or truncating it.
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path).context(error::WriteSnafu { path })?;
        self.write(&mut file)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Adapts `&mut impl Write` to `std::io::Write` for serde_json's serializer,
/// since `serde_json::Serializer::with_formatter` wants an owned writer.
struct WriteAdapter<'a, W: Write>(&'a mut W);

impl<'a, W: Write> Write for WriteAdapter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

fn parse_entry(path: &Path, index: usize, item: &Value) -> Result<ManifestEntry> {
    let obj = item.as_object().ok_or_else(|| error::Error::MalformedManifest {
        path: path.to_path_buf(),
        reason: format!("entry {index} is not a JSON object"),
    })?;

    let keys: std::collections::BTreeSet<&str> = obj.keys().map(String::as_str).collect();
    let canonical: std::collections::BTreeSet<&str> = CANONICAL_KEYS.iter().copied().collect();
    if keys != canonical {
        return error::MalformedManifestSnafu {
            path: path.to_path_buf(),
            reason: format!("entry {index} has keys {keys:?}, expected {canonical:?}"),
        }
        .fail();
    }

    let non_empty_str = |key: &str| -> Result<String> {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| error::Error::MalformedManifest {
                path: path.to_path_buf(),
                reason: format!("entry {index} field '{key}' is not a non-empty string"),
            })
    };

    let targets = obj
        .get("targets")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
                .collect::<Option<Vec<String>>>()
        })
        .flatten()
        .ok_or_else(|| error::Error::MalformedManifest {
            path: path.to_path_buf(),
            reason: format!("entry {index} field 'targets' is not a list of non-empty strings"),
        })?;

    Ok(ManifestEntry {
        product: non_empty_str("product")?,
        package_location: non_empty_str("packageLocation")?,
        version: non_empty_str("version")?,
        targets,
        checksum: non_empty_str("checksum")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target;

    fn pkg_info() -> PkgInfo {
        PkgInfo {
            version: "ce9.3.0 92f9c9ac866 extra".to_string(),
            targets: vec!["a".to_string(), "b".to_string()],
            checksum: "deadbeef".to_string(),
        }
    }

    #[test]
    fn round_trip_through_write_and_parse() {
        let mut manifest = Manifest::new();
        let target = target::by_name("pyramid").unwrap();
        manifest.add(target, &pkg_info(), "pyramid.pkg");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.loads");
        manifest.write_to_path(&path).unwrap();

        let parsed = Manifest::parse(&path).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn write_uses_four_space_indent() {
        let mut manifest = Manifest::new();
        let target = target::by_name("pyramid").unwrap();
        manifest.add(target, &pkg_info(), "pyramid.pkg");

        let mut buf = Vec::new();
        manifest.write(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\n    {\n"), "got: {text}");
        assert!(text.contains("\n        \"product\""), "got: {text}");
    }

    #[test]
    fn rejects_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.loads");
        std::fs::write(
            &path,
            r#"[{"product":"p","packageLocation":"l","version":"v","targets":[]}]"#,
        )
        .unwrap();
        assert!(matches!(
            Manifest::parse(&path),
            Err(error::Error::MalformedManifest { .. })
        ));
    }

    #[test]
    fn rejects_non_array_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.loads");
        std::fs::write(&path, r#"{"not":"an array"}"#).unwrap();
        assert!(matches!(
            Manifest::parse(&path),
            Err(error::Error::MalformedManifest { .. })
        ));
    }

    #[test]
    fn rejects_empty_string_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.loads");
        std::fs::write(
            &path,
            r#"[{"product":"","packageLocation":"l","version":"v","targets":["t"],"checksum":"c"}]"#,
        )
        .unwrap();
        assert!(matches!(
            Manifest::parse(&path),
            Err(error::Error::MalformedManifest { .. })
        ));
    }
}
