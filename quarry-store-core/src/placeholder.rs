use quarry_utils_hash::Sha256;

use crate::derivation::DEFAULT_OUTPUT_NAME;
use crate::store_path::{StorePath, DERIVATION_EXT};

/// Placeholder substituted for a derivation's own output path, which
/// is unknown while the derivation is being evaluated. The builder
/// replaces occurrences before running the build.
pub fn hash_placeholder(output_name: &str) -> String {
    let hash = Sha256::digest(format!("nix-output:{output_name}"));
    format!("/{}", hash.to_base32())
}

/// Placeholder for an output of another, not-yet-built derivation.
pub fn unknown_ca_output_placeholder(drv_path: &StorePath, output_name: &str) -> String {
    let drv_name = drv_path
        .name()
        .strip_suffix(DERIVATION_EXT)
        .unwrap_or_else(|| drv_path.name());
    let mut clear_text = format!("nix-upstream-output:{}:{}", drv_path.digest(), drv_name);
    if output_name != DEFAULT_OUTPUT_NAME {
        clear_text.push('-');
        clear_text.push_str(output_name);
    }
    format!("/{}", Sha256::digest(clear_text).to_base32())
}

#[cfg(test)]
mod unittests {
    use super::*;

    #[test]
    fn standard_output_golden_value() {
        let p = hash_placeholder("out");
        assert_eq!(p, "/1rz4g4znpzjwh1xymhjpm42vipw92pr73vdgl6xs1hycac8kf2n9");
        assert_eq!(p.len(), 53);
    }

    #[test]
    fn upstream_output_golden_value() {
        let drv_path: StorePath = "/zb/store/g1w7hy3qg1w7hy3qg1w7hy3qg1w7hy3q-foo.drv"
            .parse()
            .unwrap();
        assert_eq!(
            unknown_ca_output_placeholder(&drv_path, "out"),
            "/0c6rn30q4frawknapgwq386zq358m8r6msvywcvc89n6m5p2dgbz"
        );
    }

    #[test]
    fn non_default_output_gets_a_suffix() {
        let drv_path: StorePath = "/zb/store/g1w7hy3qg1w7hy3qg1w7hy3qg1w7hy3q-foo.drv"
            .parse()
            .unwrap();
        let out = unknown_ca_output_placeholder(&drv_path, "out");
        let dev = unknown_ca_output_placeholder(&drv_path, "dev");
        assert_ne!(out, dev);
        assert_eq!(dev.len(), 53);
    }
}
