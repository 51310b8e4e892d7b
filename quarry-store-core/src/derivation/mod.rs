//! The derivation model: one immutable record per build action, its
//! textual (ATerm) round-trip, and store path computation.

mod aterm;
mod output;

pub use aterm::{MarshalDerivationError, ParseDerivationError};
pub use output::{output_path_name, DerivationOutput};

use std::collections::{BTreeMap, BTreeSet};

use quarry_utils_hash::Sha256;

use crate::content_address::ContentAddress;
use crate::fingerprint::fixed_ca_output_path;
use crate::references::References;
use crate::store_dir::StoreDir;
use crate::store_path::StorePath;

pub use crate::store_path::DERIVATION_EXT;

/// The name of a derivation's primary output, omitted from store
/// object names.
pub const DEFAULT_OUTPUT_NAME: &str = "out";

/// A single, specific, constant build action.
///
/// Created by the evaluation host, immediately serialized, and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    /// The store directory this derivation belongs to. Every input
    /// must live in it.
    pub dir: StoreDir,
    /// Human-readable name; the `.drv` extension is not part of it.
    pub name: String,
    /// OS/architecture tuple the build runs on. Opaque.
    pub system: String,
    /// Path to the builder executable. May be a store path or a
    /// placeholder string.
    pub builder: String,
    /// Arguments passed to the builder, in invocation order.
    pub args: Vec<String>,
    /// Environment passed to the builder.
    pub env: BTreeMap<String, String>,
    /// Source store objects the build depends on.
    pub input_sources: BTreeSet<StorePath>,
    /// Input derivations, mapped to the output names used.
    pub input_derivations: BTreeMap<StorePath, BTreeSet<String>>,
    /// Outputs the build produces, by output name.
    pub outputs: BTreeMap<String, DerivationOutput>,
}

impl Derivation {
    /// The store paths this derivation references: its input sources
    /// and its input derivations.
    pub fn references(&self) -> References {
        References {
            self_reference: false,
            others: self
                .input_sources
                .iter()
                .chain(self.input_derivations.keys())
                .cloned()
                .collect(),
        }
    }

    /// Serializes to ATerm text.
    pub fn marshal(&self) -> Result<String, MarshalDerivationError> {
        aterm::marshal(self)
    }

    /// Parses ATerm text. `name` is the derivation name as recovered
    /// from the `.drv` store path.
    pub fn parse(
        dir: &StoreDir,
        name: &str,
        input: &str,
    ) -> Result<Derivation, ParseDerivationError> {
        aterm::parse(dir, name, input)
    }

    /// Serializes the derivation and computes its `.drv` store path:
    /// a text-addressed object whose content is the ATerm bytes and
    /// whose references are the derivation's inputs.
    pub fn export(&self) -> Result<(StorePath, String), MarshalDerivationError> {
        let data = self.marshal()?;
        let hash = Sha256::digest(&data);
        let path = fixed_ca_output_path(
            &self.dir,
            &format!("{}{}", self.name, DERIVATION_EXT),
            &ContentAddress::Text(hash),
            &self.references(),
        )
        .map_err(MarshalDerivationError::Path)?;
        Ok((path, data))
    }
}

#[cfg(test)]
mod unittests {
    use quarry_utils_hash::Algorithm;

    use super::*;
    use crate::fingerprint::make_store_path;

    fn zb_store() -> StoreDir {
        StoreDir::new("/zb/store").unwrap()
    }

    fn minimal_fixed_drv() -> Derivation {
        Derivation {
            dir: zb_store(),
            name: "x".into(),
            system: "x86_64-linux".into(),
            builder: "/bin/sh".into(),
            args: vec!["-c".into(), "true".into()],
            env: BTreeMap::new(),
            input_sources: BTreeSet::new(),
            input_derivations: BTreeMap::new(),
            outputs: BTreeMap::from([(
                "out".to_string(),
                DerivationOutput::Fixed(ContentAddress::Text(Sha256::digest("hello\n"))),
            )]),
        }
    }

    #[test]
    fn export_path_is_the_text_address_of_the_aterm_bytes() {
        let drv = minimal_fixed_drv();
        let (path, data) = drv.export().unwrap();
        let expected = make_store_path(
            &zb_store(),
            "text",
            &Algorithm::Sha256.digest(&data),
            "x.drv",
            &References::default(),
        )
        .unwrap();
        assert_eq!(path, expected);
        assert_eq!(path.name(), "x.drv");
    }

    #[test]
    fn export_references_cover_all_inputs() {
        let mut drv = minimal_fixed_drv();
        let src: StorePath = "/zb/store/00000000000000000000000000000000-src"
            .parse()
            .unwrap();
        let dep: StorePath = "/zb/store/11111111111111111111111111111111-dep.drv"
            .parse()
            .unwrap();
        drv.input_sources.insert(src.clone());
        drv.input_derivations
            .insert(dep.clone(), BTreeSet::from(["out".to_string()]));
        let refs = drv.references();
        assert!(!refs.self_reference);
        assert_eq!(refs.others, BTreeSet::from([src, dep]));

        // Different reference sets produce different .drv paths even
        // for identical ATerm prefixes.
        let (with_inputs, _) = drv.export().unwrap();
        let (bare, _) = minimal_fixed_drv().export().unwrap();
        assert_ne!(with_inputs, bare);
    }
}
