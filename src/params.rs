//! `KEY=VALUE` parameter parsing.

use std::collections::BTreeMap;

use crate::error::DeployError;

/// Parses `KEY=VALUE` strings into an ordered map. Later duplicates win.
///
/// Values may themselves contain `=`; only the first separator splits.
///
/// # Errors
///
/// Returns [`DeployError::Validation`] when an entry has no `=` or an empty
/// key.
pub fn parse_parameters(raw: &[String]) -> Result<BTreeMap<String, String>, DeployError> {
    let mut parsed = BTreeMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(DeployError::Validation(format!(
                "parameter '{entry}' must have the form KEY=VALUE"
            )));
        };
        let trimmed_key = key.trim();
        if trimmed_key.is_empty() {
            return Err(DeployError::Validation(format!(
                "parameter '{entry}' has an empty key"
            )));
        }
        parsed.insert(trimmed_key.to_owned(), value.trim().to_owned());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| (*item).to_owned()).collect()
    }

    #[rstest]
    fn splits_on_first_separator() {
        let parsed = parse_parameters(&owned(&["Image=repo/app:v1", "Query=a=b"]))
            .expect("parameters should parse");
        assert_eq!(parsed.get("Image").map(String::as_str), Some("repo/app:v1"));
        assert_eq!(parsed.get("Query").map(String::as_str), Some("a=b"));
    }

    #[rstest]
    fn later_duplicates_win() {
        let parsed =
            parse_parameters(&owned(&["k=1", "k=2"])).expect("parameters should parse");
        assert_eq!(parsed.get("k").map(String::as_str), Some("2"));
    }

    #[rstest]
    #[case("novalue")]
    #[case("=value")]
    #[case("  =value")]
    fn rejects_malformed_entries(#[case] entry: &str) {
        let err = parse_parameters(&owned(&[entry])).expect_err("entry should be rejected");
        assert!(matches!(err, DeployError::Validation(_)), "{err:?}");
    }

    #[rstest]
    fn empty_input_yields_empty_map() {
        assert!(parse_parameters(&[]).expect("empty input parses").is_empty());
    }
}
