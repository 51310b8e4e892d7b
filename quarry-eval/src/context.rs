use std::collections::BTreeSet;

/// Marker prefix on context entries that denote a derivation output
/// rather than an existing store path. Outputs have no content yet, so
/// primitives that materialize bytes refuse to depend on them.
pub const OUTPUT_CONTEXT_PREFIX: &str = "!";

/// A string value together with its store-path dependencies.
///
/// The host interpreter attaches a context to strings that originate
/// from store operations; the context travels through string
/// interpolation on the host side and comes back in here when such a
/// string is used as an input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextString {
    value: String,
    context: BTreeSet<String>,
}

impl ContextString {
    pub fn new(value: impl Into<String>, context: BTreeSet<String>) -> ContextString {
        ContextString {
            value: value.into(),
            context,
        }
    }

    /// A string with no dependencies.
    pub fn plain(value: impl Into<String>) -> ContextString {
        ContextString {
            value: value.into(),
            context: BTreeSet::new(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn context(&self) -> &BTreeSet<String> {
        &self.context
    }

    pub fn into_parts(self) -> (String, BTreeSet<String>) {
        (self.value, self.context)
    }
}
