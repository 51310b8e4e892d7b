use quarry_utils_hash::Algorithm;

use crate::content_address::{ContentAddress, IngestionMethod};
use crate::fingerprint::{fixed_ca_output_path, FingerprintError};
use crate::references::References;
use crate::store_dir::StoreDir;
use crate::store_path::StorePath;

use super::DEFAULT_OUTPUT_NAME;

/// The content-addressing scheme of one derivation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationOutput {
    /// The output must match this content-address assertion; its store
    /// path is computable without running the build.
    Fixed(ContentAddress),
    /// The output's hash, and therefore its path, is only known once
    /// the build completes. Downstream references use placeholders.
    Floating {
        method: IngestionMethod,
        algorithm: Algorithm,
    },
}

impl DerivationOutput {
    /// Reports whether the output carries an up-front content-address
    /// assertion.
    pub fn is_fixed(&self) -> bool {
        matches!(self, DerivationOutput::Fixed(_))
    }

    /// Reports whether the output's hash is only known after the
    /// build. Exactly the complement of [`is_fixed`].
    ///
    /// [`is_fixed`]: DerivationOutput::is_fixed
    pub fn is_floating(&self) -> bool {
        matches!(self, DerivationOutput::Floating { .. })
    }

    /// The store path of a fixed output; `None` for floating outputs.
    pub fn path(
        &self,
        dir: &StoreDir,
        drv_name: &str,
        output_name: &str,
    ) -> Result<Option<StorePath>, FingerprintError> {
        match self {
            DerivationOutput::Fixed(ca) => {
                let name = output_path_name(drv_name, output_name);
                Ok(Some(fixed_ca_output_path(
                    dir,
                    &name,
                    ca,
                    &References::default(),
                )?))
            }
            DerivationOutput::Floating { .. } => Ok(None),
        }
    }

    /// The `<method><algorithm>` tag serialized into the ATerm form.
    pub(super) fn ca_tag(&self) -> String {
        match self {
            DerivationOutput::Fixed(ca) => ca.ca_tag(),
            DerivationOutput::Floating { method, algorithm } => {
                format!("{}{}", method.prefix(), algorithm)
            }
        }
    }
}

/// Store object name of an output: the derivation name, with
/// `-<output>` appended for outputs other than `out`.
pub fn output_path_name(drv_name: &str, output_name: &str) -> String {
    if output_name == DEFAULT_OUTPUT_NAME {
        drv_name.to_owned()
    } else {
        format!("{drv_name}-{output_name}")
    }
}

#[cfg(test)]
mod unittests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::default_output("hello", "out", "hello")]
    #[case::named_output("hello", "dev", "hello-dev")]
    fn output_names(#[case] drv: &str, #[case] output: &str, #[case] expected: &str) {
        assert_eq!(output_path_name(drv, output), expected);
    }

    #[test]
    fn output_name_flows_into_the_store_path() {
        let dir = StoreDir::new("/zb/store").unwrap();
        let out = DerivationOutput::Fixed(ContentAddress::Recursive(
            Algorithm::Sha256.digest("payload"),
        ));
        let default = out.path(&dir, "hello", "out").unwrap().unwrap();
        let dev = out.path(&dir, "hello", "dev").unwrap().unwrap();
        assert_eq!(default.name(), "hello");
        assert_eq!(dev.name(), "hello-dev");
        assert_ne!(default, dev);
    }

    #[test]
    fn predicates_are_exact_complements() {
        let fixed = DerivationOutput::Fixed(ContentAddress::Flat(
            Algorithm::Sha256.digest("x"),
        ));
        let floating = DerivationOutput::Floating {
            method: IngestionMethod::Recursive,
            algorithm: Algorithm::Sha256,
        };
        assert!(fixed.is_fixed() && !fixed.is_floating());
        assert!(floating.is_floating() && !floating.is_fixed());
    }

    #[test]
    fn floating_outputs_have_no_path() {
        let dir = StoreDir::new("/zb/store").unwrap();
        let floating = DerivationOutput::Floating {
            method: IngestionMethod::Flat,
            algorithm: Algorithm::Sha512,
        };
        assert_eq!(floating.path(&dir, "hello", "out").unwrap(), None);
    }

    #[rstest]
    #[case::flat(IngestionMethod::Flat, Algorithm::Sha256, "sha256")]
    #[case::recursive(IngestionMethod::Recursive, Algorithm::Sha1, "r:sha1")]
    fn floating_ca_tags(
        #[case] method: IngestionMethod,
        #[case] algorithm: Algorithm,
        #[case] expected: &str,
    ) {
        let out = DerivationOutput::Floating { method, algorithm };
        assert_eq!(out.ca_tag(), expected);
    }
}
