//! ATerm serialization and parsing for derivations.
//!
//! The textual form is
//!
//! ```text
//! Derive([(out,path,caTag,hashHex)…],[(drvPath,[outName…])…],[src…],system,builder,[arg…],[(k,v)…])
//! ```
//!
//! Reproducibility hangs on the orderings: outputs by name, input
//! derivations by path, output-name sets and input sources ascending,
//! env by key, and `args` in declaration order. The sorted containers
//! in [`Derivation`] provide all of them for free; `args` stays a
//! `Vec`. Serialization is byte-for-byte compatible with `.drv` files
//! produced by Nix.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use quarry_utils_hash::{Algorithm, Hash};

use crate::content_address::{ContentAddress, IngestionMethod};
use crate::fingerprint::FingerprintError;
use crate::store_dir::StoreDir;
use crate::store_path::{ParseStorePathError, StorePath};

use super::{Derivation, DerivationOutput};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarshalDerivationError {
    #[error("derivation has no name")]
    MissingName,
    #[error("input {path} is outside store directory {dir}")]
    InputOutsideStore { path: StorePath, dir: StoreDir },
    #[error("input derivation {0} does not name a derivation")]
    InputNotDerivation(StorePath),
    #[error("output {output:?}: {source}")]
    OutputPath {
        output: String,
        #[source]
        source: FingerprintError,
    },
    #[error(transparent)]
    Path(FingerprintError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseDerivationError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("at byte {pos}: expected {expected}, got {got:?}")]
    Expected {
        pos: usize,
        expected: String,
        got: String,
    },
    #[error("trailing data after the closing ')'")]
    TrailingData,
    #[error("multiple outputs named {0:?}")]
    DuplicateOutput(String),
    #[error("multiple env entries for {0:?}")]
    DuplicateEnv(String),
    #[error("multiple input derivations for {0}")]
    DuplicateInputDerivation(StorePath),
    #[error("input derivation {0} does not name a derivation")]
    InputNotDerivation(StorePath),
    #[error("output {name:?}: {reason}")]
    InvalidOutput { name: String, reason: String },
    #[error(transparent)]
    StorePath(#[from] ParseStorePathError),
}

// ── Serialization ────────────────────────────────────────────────────

pub(super) fn marshal(drv: &Derivation) -> Result<String, MarshalDerivationError> {
    if drv.name.is_empty() {
        return Err(MarshalDerivationError::MissingName);
    }

    let mut out = String::with_capacity(1024);
    out.push_str("Derive([");

    let mut first = true;
    for (output_name, output) in &drv.outputs {
        if !first {
            out.push(',');
        }
        first = false;
        out.push('(');
        write_string(&mut out, output_name);
        out.push(',');
        match output {
            DerivationOutput::Fixed(ca) => {
                let path = output
                    .path(&drv.dir, &drv.name, output_name)
                    .map_err(|source| MarshalDerivationError::OutputPath {
                        output: output_name.clone(),
                        source,
                    })?
                    .expect("fixed outputs have computable paths");
                write_string(&mut out, path.as_str());
                out.push(',');
                write_string(&mut out, &output.ca_tag());
                out.push(',');
                write_string(&mut out, &ca.hash().to_base16());
            }
            DerivationOutput::Floating { .. } => {
                out.push_str("\"\",");
                write_string(&mut out, &output.ca_tag());
                out.push_str(",\"\"");
            }
        }
        out.push(')');
    }

    out.push_str("],[");
    first = true;
    for (drv_path, output_names) in &drv.input_derivations {
        check_input(drv, drv_path)?;
        if !drv_path.is_derivation() {
            return Err(MarshalDerivationError::InputNotDerivation(drv_path.clone()));
        }
        if !first {
            out.push(',');
        }
        first = false;
        out.push('(');
        write_string(&mut out, drv_path.as_str());
        out.push_str(",[");
        let mut first_name = true;
        for output_name in output_names {
            if !first_name {
                out.push(',');
            }
            first_name = false;
            write_string(&mut out, output_name);
        }
        out.push_str("])");
    }

    out.push_str("],[");
    first = true;
    for src in &drv.input_sources {
        check_input(drv, src)?;
        if !first {
            out.push(',');
        }
        first = false;
        write_string(&mut out, src.as_str());
    }

    out.push_str("],");
    write_string(&mut out, &drv.system);
    out.push(',');
    write_string(&mut out, &drv.builder);

    out.push_str(",[");
    first = true;
    for arg in &drv.args {
        if !first {
            out.push(',');
        }
        first = false;
        write_string(&mut out, arg);
    }

    out.push_str("],[");
    first = true;
    for (key, value) in &drv.env {
        if !first {
            out.push(',');
        }
        first = false;
        out.push('(');
        write_string(&mut out, key);
        out.push(',');
        write_string(&mut out, value);
        out.push(')');
    }
    out.push_str("])");

    Ok(out)
}

fn check_input(drv: &Derivation, path: &StorePath) -> Result<(), MarshalDerivationError> {
    if !drv.dir.contains(path) {
        return Err(MarshalDerivationError::InputOutsideStore {
            path: path.clone(),
            dir: drv.dir.clone(),
        });
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

// ── Parsing ──────────────────────────────────────────────────────────

pub(super) fn parse(
    dir: &StoreDir,
    name: &str,
    input: &str,
) -> Result<Derivation, ParseDerivationError> {
    let mut p = Parser { input, pos: 0 };

    p.expect_str("Derive(")?;
    let outputs = p.parse_outputs()?;
    p.expect_char(',')?;
    let input_derivations = p.parse_input_derivations(dir)?;
    p.expect_char(',')?;
    let input_sources = p.parse_input_sources()?;
    p.expect_char(',')?;
    let system = p.parse_string()?;
    p.expect_char(',')?;
    let builder = p.parse_string()?;
    p.expect_char(',')?;
    let args = p.parse_string_list()?;
    p.expect_char(',')?;
    let env = p.parse_env()?;
    p.expect_char(')')?;
    if p.pos != input.len() {
        return Err(ParseDerivationError::TrailingData);
    }

    Ok(Derivation {
        dir: dir.clone(),
        name: name.to_owned(),
        system,
        builder,
        args,
        env,
        input_sources,
        input_derivations,
        outputs,
    })
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Result<char, ParseDerivationError> {
        self.remaining()
            .chars()
            .next()
            .ok_or(ParseDerivationError::UnexpectedEof(self.pos))
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseDerivationError> {
        let got = self.peek()?;
        if got != expected {
            return Err(ParseDerivationError::Expected {
                pos: self.pos,
                expected: format!("'{expected}'"),
                got: got.to_string(),
            });
        }
        self.advance(expected.len_utf8());
        Ok(())
    }

    fn expect_str(&mut self, expected: &str) -> Result<(), ParseDerivationError> {
        if !self.remaining().starts_with(expected) {
            let got_len = expected.len().min(self.remaining().len());
            let got = self
                .remaining()
                .get(..got_len)
                .unwrap_or(self.remaining())
                .to_string();
            return Err(ParseDerivationError::Expected {
                pos: self.pos,
                expected: format!("{expected:?}"),
                got,
            });
        }
        self.advance(expected.len());
        Ok(())
    }

    fn parse_string(&mut self) -> Result<String, ParseDerivationError> {
        self.expect_char('"')?;
        let mut result = String::new();
        loop {
            let c = self.peek()?;
            self.advance(c.len_utf8());
            match c {
                '"' => return Ok(result),
                '\\' => {
                    let escaped = self.peek()?;
                    self.advance(escaped.len_utf8());
                    match escaped {
                        'n' => result.push('\n'),
                        'r' => result.push('\r'),
                        't' => result.push('\t'),
                        other => result.push(other),
                    }
                }
                other => result.push(other),
            }
        }
    }

    fn parse_list<T>(
        &mut self,
        mut parse_item: impl FnMut(&mut Self) -> Result<T, ParseDerivationError>,
    ) -> Result<Vec<T>, ParseDerivationError> {
        self.expect_char('[')?;
        let mut result = Vec::new();
        if self.peek()? == ']' {
            self.advance(1);
            return Ok(result);
        }
        loop {
            result.push(parse_item(self)?);
            match self.peek()? {
                ',' => self.advance(1),
                ']' => {
                    self.advance(1);
                    return Ok(result);
                }
                c => {
                    return Err(ParseDerivationError::Expected {
                        pos: self.pos,
                        expected: "',' or ']'".to_string(),
                        got: c.to_string(),
                    });
                }
            }
        }
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, ParseDerivationError> {
        self.parse_list(|p| p.parse_string())
    }

    fn parse_outputs(
        &mut self,
    ) -> Result<BTreeMap<String, DerivationOutput>, ParseDerivationError> {
        let items = self.parse_list(|p| {
            p.expect_char('(')?;
            let name = p.parse_string()?;
            p.expect_char(',')?;
            let path = p.parse_string()?;
            p.expect_char(',')?;
            let ca_tag = p.parse_string()?;
            p.expect_char(',')?;
            let hash_hex = p.parse_string()?;
            p.expect_char(')')?;
            let output = decode_output(&name, &path, &ca_tag, &hash_hex)?;
            Ok((name, output))
        })?;

        let mut outputs = BTreeMap::new();
        for (name, output) in items {
            if outputs.insert(name.clone(), output).is_some() {
                return Err(ParseDerivationError::DuplicateOutput(name));
            }
        }
        Ok(outputs)
    }

    fn parse_input_derivations(
        &mut self,
        dir: &StoreDir,
    ) -> Result<BTreeMap<StorePath, BTreeSet<String>>, ParseDerivationError> {
        let items = self.parse_list(|p| {
            p.expect_char('(')?;
            let path_str = p.parse_string()?;
            let drv_path = dir.parse(&path_str)?;
            if !drv_path.is_derivation() {
                return Err(ParseDerivationError::InputNotDerivation(drv_path));
            }
            p.expect_char(',')?;
            let output_names: BTreeSet<String> = p.parse_string_list()?.into_iter().collect();
            p.expect_char(')')?;
            Ok((drv_path, output_names))
        })?;

        let mut input_derivations = BTreeMap::new();
        for (drv_path, output_names) in items {
            if input_derivations
                .insert(drv_path.clone(), output_names)
                .is_some()
            {
                return Err(ParseDerivationError::DuplicateInputDerivation(drv_path));
            }
        }
        Ok(input_derivations)
    }

    fn parse_input_sources(&mut self) -> Result<BTreeSet<StorePath>, ParseDerivationError> {
        let items = self.parse_list(|p| {
            let path_str = p.parse_string()?;
            Ok(StorePath::parse(&path_str)?)
        })?;
        Ok(items.into_iter().collect())
    }

    fn parse_env(&mut self) -> Result<BTreeMap<String, String>, ParseDerivationError> {
        let pairs = self.parse_list(|p| {
            p.expect_char('(')?;
            let key = p.parse_string()?;
            p.expect_char(',')?;
            let value = p.parse_string()?;
            p.expect_char(')')?;
            Ok((key, value))
        })?;

        let mut env = BTreeMap::new();
        for (key, value) in pairs {
            if env.insert(key.clone(), value).is_some() {
                return Err(ParseDerivationError::DuplicateEnv(key));
            }
        }
        Ok(env)
    }
}

enum CaMethod {
    Text,
    Flat,
    Recursive,
}

fn parse_ca_tag(s: &str) -> Result<(CaMethod, Algorithm), String> {
    let (method, rest) = if let Some(rest) = s.strip_prefix("r:") {
        (CaMethod::Recursive, rest)
    } else if let Some(rest) = s.strip_prefix("text:") {
        (CaMethod::Text, rest)
    } else {
        (CaMethod::Flat, s)
    };
    let algorithm = rest.parse().map_err(|e| format!("{e}"))?;
    Ok((method, algorithm))
}

fn decode_output(
    name: &str,
    path: &str,
    ca_tag: &str,
    hash_hex: &str,
) -> Result<DerivationOutput, ParseDerivationError> {
    let invalid = |reason: String| ParseDerivationError::InvalidOutput {
        name: name.to_owned(),
        reason,
    };

    if path.is_empty() && hash_hex.is_empty() {
        let (method, algorithm) = parse_ca_tag(ca_tag).map_err(invalid)?;
        let method = match method {
            CaMethod::Flat => IngestionMethod::Flat,
            CaMethod::Recursive => IngestionMethod::Recursive,
            CaMethod::Text => {
                return Err(invalid("text outputs cannot be floating".to_owned()));
            }
        };
        return Ok(DerivationOutput::Floating { method, algorithm });
    }

    if !hash_hex.is_empty() {
        let (method, algorithm) = parse_ca_tag(ca_tag).map_err(&invalid)?;
        let digest = hex::decode(hash_hex).map_err(|e| invalid(format!("hash: {e}")))?;
        if digest.len() != algorithm.size() {
            return Err(invalid(format!(
                "hash has {} bytes but {algorithm} uses {}",
                digest.len(),
                algorithm.size()
            )));
        }
        let hash = Hash::from_slice(algorithm, &digest).expect("length checked above");
        let ca = match method {
            CaMethod::Flat => ContentAddress::Flat(hash),
            CaMethod::Recursive => ContentAddress::Recursive(hash),
            CaMethod::Text => {
                if algorithm != Algorithm::Sha256 {
                    return Err(invalid("text content addresses use sha256".to_owned()));
                }
                ContentAddress::Text(hash.try_into().expect("checked sha256 above"))
            }
        };
        return Ok(DerivationOutput::Fixed(ca));
    }

    Err(invalid("unknown output type".to_owned()))
}

#[cfg(test)]
mod unittests {
    use rstest::rstest;

    use super::*;

    fn zb_store() -> StoreDir {
        StoreDir::new("/zb/store").unwrap()
    }

    fn floating_drv_text() -> String {
        concat!(
            r#"Derive([("out","","r:sha256","")]"#,
            r#",[("/zb/store/00000000000000000000000000000000-dep.drv",["dev","out"])]"#,
            r#",["/zb/store/11111111111111111111111111111111-src"]"#,
            r#","x86_64-linux","/bin/sh",["-c","true"],[("PATH","/bin")])"#,
        )
        .to_owned()
    }

    #[test]
    fn string_escaping_roundtrip() {
        let mut s = String::new();
        write_string(&mut s, "hello \"world\" \\\n\r\t");
        assert_eq!(s, r#""hello \"world\" \\\n\r\t""#);

        let mut p = Parser { input: &s, pos: 0 };
        assert_eq!(p.parse_string().unwrap(), "hello \"world\" \\\n\r\t");
    }

    #[test]
    fn parse_then_marshal_is_identity_on_marshalled_text() {
        let text = floating_drv_text();
        let drv = parse(&zb_store(), "demo", &text).unwrap();
        assert_eq!(marshal(&drv).unwrap(), text);
    }

    #[test]
    fn marshal_then_parse_is_structural_identity() {
        let text = floating_drv_text();
        let drv = parse(&zb_store(), "demo", &text).unwrap();
        let reparsed = parse(&zb_store(), "demo", &marshal(&drv).unwrap()).unwrap();
        assert_eq!(drv, reparsed);
    }

    #[test]
    fn fixed_outputs_carry_their_computed_path() {
        use quarry_utils_hash::Sha256;

        let mut drv = parse(&zb_store(), "demo", &floating_drv_text()).unwrap();
        drv.outputs.insert(
            "out".into(),
            DerivationOutput::Fixed(ContentAddress::Text(Sha256::digest("hello\n"))),
        );
        let text = marshal(&drv).unwrap();
        let expected_path = drv.outputs["out"]
            .path(&zb_store(), "demo", "out")
            .unwrap()
            .unwrap();
        assert!(text.contains(expected_path.as_str()));
        assert!(text.contains(r#""text:sha256""#));

        let reparsed = parse(&zb_store(), "demo", &text).unwrap();
        assert_eq!(reparsed, drv);
        assert_eq!(marshal(&reparsed).unwrap(), text);
    }

    #[rstest]
    #[case::trailing_data(
        r#"Derive([],[],[],"s","b",[],[])x"#,
        ParseDerivationError::TrailingData
    )]
    #[case::duplicate_output(
        r#"Derive([("out","","sha256",""),("out","","sha256","")],[],[],"s","b",[],[])"#,
        ParseDerivationError::DuplicateOutput("out".into())
    )]
    #[case::duplicate_env(
        r#"Derive([],[],[],"s","b",[],[("k","1"),("k","2")])"#,
        ParseDerivationError::DuplicateEnv("k".into())
    )]
    fn parse_rejections(#[case] input: &str, #[case] expected: ParseDerivationError) {
        assert_eq!(parse(&zb_store(), "demo", input).unwrap_err(), expected);
    }

    #[test]
    fn rejects_cross_directory_input_derivation() {
        let input = concat!(
            r#"Derive([],[("/nix/store/00000000000000000000000000000000-dep.drv",["out"])]"#,
            r#",[],"s","b",[],[])"#,
        );
        let err = parse(&zb_store(), "demo", input).unwrap_err();
        assert!(matches!(
            err,
            ParseDerivationError::StorePath(ParseStorePathError::DirMismatch { .. })
        ));
    }

    #[test]
    fn rejects_non_drv_input_derivation() {
        let input = concat!(
            r#"Derive([],[("/zb/store/00000000000000000000000000000000-dep",["out"])]"#,
            r#",[],"s","b",[],[])"#,
        );
        let err = parse(&zb_store(), "demo", input).unwrap_err();
        assert!(matches!(err, ParseDerivationError::InputNotDerivation(_)));
    }

    #[test]
    fn rejects_input_addressed_output_tuples() {
        let input = concat!(
            r#"Derive([("out","/zb/store/00000000000000000000000000000000-x","","")]"#,
            r#",[],[],"s","b",[],[])"#,
        );
        let err = parse(&zb_store(), "demo", input).unwrap_err();
        assert!(matches!(err, ParseDerivationError::InvalidOutput { .. }));
    }

    #[test]
    fn rejects_wrong_digest_length() {
        let input = r#"Derive([("out","/zb/store/00000000000000000000000000000000-x","sha256","abcd")],[],[],"s","b",[],[])"#;
        let err = parse(&zb_store(), "demo", input).unwrap_err();
        assert!(matches!(err, ParseDerivationError::InvalidOutput { .. }));
    }

    #[test]
    fn marshal_rejects_cross_directory_source() {
        let mut drv = parse(&zb_store(), "demo", &floating_drv_text()).unwrap();
        drv.input_sources.insert(
            "/nix/store/22222222222222222222222222222222-foreign"
                .parse()
                .unwrap(),
        );
        assert!(matches!(
            marshal(&drv).unwrap_err(),
            MarshalDerivationError::InputOutsideStore { .. }
        ));
    }

    #[test]
    fn empty_derivation_shape() {
        let drv = parse(&zb_store(), "demo", r#"Derive([],[],[],"s","b",[],[])"#).unwrap();
        assert_eq!(marshal(&drv).unwrap(), r#"Derive([],[],[],"s","b",[],[])"#);
    }
}
