//! The static table of build targets this toolkit knows how to bundle.
//!
//! A [`Target`] is either a *codec* (a primary product image) or a
//! *peripheral* (a secondary component bundled alongside a codec). The
//! registry is process-wide and immutable; it is derived once from
//! [`TARGET_TABLE`] and validated by `#[cfg(test)] mod tests` below rather
//! than at every lookup.

use crate::error::{self, Result};
use lazy_static::lazy_static;
use snafu::{ensure, OptionExt};
use std::collections::HashMap;

/// An immutable build-target descriptor.
///
/// Equality and hashing are by `name` alone, matching the reference
/// implementation's `Target.__eq__`/`__hash__`.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub product: String,
    pub is_codec: bool,
    pub deps: Vec<String>,
    /// Opaque external identifiers (e.g. CUCM device IDs) carried alongside
    /// the target but not otherwise interpreted by this crate.
    pub external_ids: Vec<u32>,
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Target {}

impl std::hash::Hash for Target {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

macro_rules! target {
    ($name:expr, $product:expr, $is_codec:expr, [$($dep:expr),* $(,)?], [$($id:expr),* $(,)?]) => {
        Target {
            name: $name.to_string(),
            product: $product.to_string(),
            is_codec: $is_codec,
            deps: vec![$($dep.to_string()),*],
            external_ids: vec![$($id),*],
        }
    };
}

fn target_table() -> Vec<Target> {
    vec![
        // Older codecs bundle everything inside the codec.pkg, hence have no deps.
        target!("asterix", "s52010", true, [], [626, 689, 690]),
        target!("asterix.nocrypto", "s52011", true, [], []),
        target!("carbon", "s52020", true, [], [688, 36207, 36208, 36227]),
        target!("drishti", "s52030", true, [], [682]),
        target!("tempo", "s52040", true, [], [36239, 36241]),
        // Newer codecs need their peripherals referenced in their .loads file.
        target!(
            "sunrise",
            "s53200",
            true,
            ["halley", "moody", "pyramid"],
            [36251, 36254, 36255, 36259, 36265]
        ),
        target!(
            "zenith",
            "s53300",
            true,
            ["halley", "moody", "pyramid", "idefix"],
            [36753]
        ),
        // Peripherals: product must match the string returned by the
        // peripheral's own `getPeripheralId()`.
        target!("halley", "Precision 60 Camera", false, [], []),
        target!("moody", "SpeakerTrack 60", false, [], []),
        target!("pyramid", "Pyramid", false, [], []),
        target!("idefix", "Idefix", false, [], []),
    ]
}

lazy_static! {
    static ref ORDER: Vec<String> = target_table().into_iter().map(|t| t.name).collect();
    static ref BY_NAME: HashMap<String, Target> = target_table()
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect();
    static ref BY_PRODUCT: HashMap<String, String> = BY_NAME
        .values()
        .map(|t| (t.product.clone(), t.name.clone()))
        .collect();
}

/// Look up a registered target by its build-target name.
pub fn by_name(name: &str) -> Result<&'static Target> {
    BY_NAME
        .get(name)
        .context(error::UnknownTargetSnafu { name })
}

/// Look up a registered target by its externally-visible product name.
pub fn by_product(product: &str) -> Result<&'static Target> {
    let name = BY_PRODUCT
        .get(product)
        .context(error::UnknownProductSnafu { product })?;
    by_name(name)
}

/// Iterate over every registered target, in table order.
pub fn iter() -> impl Iterator<Item = &'static Target> {
    ORDER
        .iter()
        .map(|name| by_name(name).expect("registry self-consistent"))
}

/// Validate the registry's invariants: every dependency name resolves, and
/// at most one target claims a given product name. Exposed so an embedding
/// CLI can run it as a startup self-check; also exercised by this crate's
/// own tests.
pub fn validate() -> Result<()> {
    let mut seen_products: HashMap<&str, &str> = HashMap::new();
    for target in BY_NAME.values() {
        for dep in &target.deps {
            ensure!(
                BY_NAME.contains_key(dep),
                error::UnregisteredDependencySnafu {
                    target: target.name.clone(),
                    dep: dep.clone(),
                }
            );
        }
        if let Some(existing) = seen_products.insert(&target.product, &target.name) {
            ensure!(
                existing == target.name,
                error::DuplicateProductSnafu {
                    product: target.product.clone(),
                }
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_internally_consistent() {
        validate().unwrap();
    }

    #[test]
    fn resolves_by_name_and_product() {
        let t = by_name("sunrise").unwrap();
        assert_eq!(t.product, "s53200");
        assert!(t.is_codec);
        assert_eq!(t.deps, vec!["halley", "moody", "pyramid"]);

        let same = by_product("s53200").unwrap();
        assert_eq!(t.name, same.name);
    }

    #[test]
    fn peripheral_is_not_codec() {
        let t = by_name("pyramid").unwrap();
        assert!(!t.is_codec);
        assert_eq!(t.product, "Pyramid");
    }

    #[test]
    fn unknown_name_errors() {
        assert!(matches!(
            by_name("nonexistent"),
            Err(error::Error::UnknownTarget { .. })
        ));
    }

    #[test]
    fn iter_covers_whole_table() {
        assert_eq!(iter().count(), target_table().len());
    }
}
