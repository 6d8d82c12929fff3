//! Translated chunk id derivation.
//!
//! Rules for `derive_id(source, lang)`:
//! 1. `lang` is one or more ASCII alphanumeric subtags joined by `-` or `_`
//!    (`es`, `pt-BR`, `zh_Hant`).
//! 2. If `source` contains `-chunk-`, its first occurrence becomes
//!    `-<lang>-chunk-` (`cc-chunk-7` → `cc-es-chunk-7`).
//! 3. Otherwise the id becomes `<lang>:<source>`.
//!
//! Rule-3 ids never contain `-chunk-`, so the two rules have disjoint images
//! and `source_id` can invert either one unambiguously.

use crate::error::{RaglineError, Result};

const MARKER: &str = "-chunk-";

/// Check a language code against rule 1.
pub fn validate_language(lang: &str) -> Result<()> {
    let valid = !lang.is_empty()
        && lang
            .split(['-', '_'])
            .all(|tag| !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()))
        && !lang.contains("chunk");
    if valid {
        Ok(())
    } else {
        Err(RaglineError::Validation(format!("invalid language code '{lang}'")))
    }
}

/// Derive the id of `source_id` translated into `lang`.
pub fn derive_id(source_id: &str, lang: &str) -> Result<String> {
    validate_language(lang)?;
    if source_id.is_empty() {
        return Err(RaglineError::Validation("source id is empty".into()));
    }
    Ok(match source_id.find(MARKER) {
        Some(pos) => format!("{}-{}{}", &source_id[..pos], lang, &source_id[pos..]),
        None => format!("{lang}:{source_id}"),
    })
}

/// Recover the source id from an id produced by `derive_id(_, lang)`.
///
/// Returns `None` when `derived` was not produced for `lang`.
pub fn source_id(derived: &str, lang: &str) -> Option<String> {
    validate_language(lang).ok()?;
    let candidate = match derived.find(MARKER) {
        Some(pos) => {
            let suffix = format!("-{lang}");
            let head = derived[..pos].strip_suffix(suffix.as_str())?;
            format!("{head}{}", &derived[pos..])
        }
        None => derived.strip_prefix(&format!("{lang}:"))?.to_string(),
    };
    // reject ids that only look derived, e.g. a rule-2 id whose head has no marker
    (derive_id(&candidate, lang).ok()? == derived).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_rule() {
        assert_eq!(derive_id("cc-chunk-7", "es").unwrap(), "cc-es-chunk-7");
        assert_eq!(derive_id("water-bill-chunk-12", "pt-BR").unwrap(), "water-bill-pt-BR-chunk-12");
        // only the first marker is rewritten
        assert_eq!(derive_id("a-chunk-b-chunk-1", "es").unwrap(), "a-es-chunk-b-chunk-1");
    }

    #[test]
    fn test_prefix_rule() {
        assert_eq!(derive_id("page-42", "es").unwrap(), "es:page-42");
        assert_eq!(derive_id("x-chunk", "es").unwrap(), "es:x-chunk");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_id("cc-chunk-7", "es").unwrap();
        let second = derive_id("cc-chunk-7", "es").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_trip() {
        let ids = [
            "cc-chunk-7",
            "a-chunk-b-chunk-1",
            "y-es-chunk",
            "y-chunk-es",
            "es:already",
            "plain",
            "-chunk-",
            "x-es-chunk-1",
            "ünïcode-chunk-3",
        ];
        for lang in ["es", "fr", "pt-BR", "zh_Hant"] {
            for id in ids {
                let derived = derive_id(id, lang).unwrap();
                assert_eq!(source_id(&derived, lang).as_deref(), Some(id), "{id} / {lang}");
            }
        }
    }

    #[test]
    fn test_injective_on_tricky_pairs() {
        // would collide under a naive "-<lang>" suffix rule
        let a = derive_id("y-es-chunk", "es").unwrap();
        let b = derive_id("y-chunk-es", "es").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_inverse_rejects_foreign_ids() {
        assert_eq!(source_id("cc-chunk-7", "es"), None);
        assert_eq!(source_id("cc-fr-chunk-7", "es"), None);
        assert_eq!(source_id("fr:page", "es"), None);
    }

    #[test]
    fn test_invalid_language() {
        for lang in ["", "e s", "es-", "-es", "x-chunk-y", "es:"] {
            assert!(derive_id("cc-chunk-7", lang).is_err(), "{lang:?}");
        }
        assert!(derive_id("", "es").is_err());
    }
}
