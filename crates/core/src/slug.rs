//! Slug derivation.
//!
//! A slug is lowercase ASCII letters, digits and single hyphens, never starting
//! or ending with a hyphen. Diacritics are folded to their base letter; any
//! other character that is not a separator is dropped.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Derive the slug for a display name.
///
/// Total and idempotent: `slugify(&slugify(x)) == slugify(x)`. An input made
/// only of punctuation yields an empty string; rejecting that is up to the
/// caller.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.to_lowercase().nfd() {
        if is_combining_mark(ch) {
            continue;
        }

        if ch.is_ascii_alphanumeric() {
            push_pending_dash(&mut out, &mut pending_dash);
            out.push(ch);
            continue;
        }

        if let Some(folded) = fold_letter(ch) {
            push_pending_dash(&mut out, &mut pending_dash);
            out.push_str(folded);
            continue;
        }

        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }

    out
}

// Leading separators are swallowed because `out` is still empty; trailing
// ones never get flushed.
fn push_pending_dash(out: &mut String, pending_dash: &mut bool) {
    if *pending_dash && !out.is_empty() {
        out.push('-');
    }
    *pending_dash = false;
}

/// Latin letters that have no canonical decomposition.
fn fold_letter(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'ø' => "o",
        'đ' | 'ð' => "d",
        'ł' => "l",
        'þ' => "th",
        'ı' => "i",
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates_words() {
        assert_eq!(slugify("Hot Wheels Pack 2024"), "hot-wheels-pack-2024");
    }

    #[test]
    fn strips_diacritics() {
        assert_eq!(slugify("Café Ñandú"), "cafe-nandu");
        assert_eq!(slugify("Straße Æsir"), "strasse-aesir");
    }

    #[test]
    fn collapses_whitespace_runs_and_trims_edges() {
        assert_eq!(slugify("  Matchbox \t\n  Super   Kings  "), "matchbox-super-kings");
        assert_eq!(slugify("--Tomica--"), "tomica");
    }

    #[test]
    fn drops_special_characters() {
        assert_eq!(slugify("Rock & Roll!"), "rock-roll");
        assert_eq!(slugify("M2 Machines (1:64)"), "m2-machines-164");
        assert_eq!(slugify("Greenlight_Collectibles"), "greenlight-collectibles");
    }

    #[test]
    fn punctuation_only_yields_empty_slug() {
        assert_eq!(slugify("!!! ???"), "");
        assert_eq!(slugify(""), "");
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: applying the generator to its own output changes nothing.
            #[test]
            fn slugify_is_idempotent(name in "\\PC{0,64}") {
                let once = slugify(&name);
                prop_assert_eq!(slugify(&once), once);
            }

            /// Property: output only holds `[a-z0-9-]` with no edge or doubled hyphens.
            #[test]
            fn slugify_output_is_url_safe(name in "\\PC{0,64}") {
                let slug = slugify(&name);
                prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
                prop_assert!(!slug.starts_with('-'));
                prop_assert!(!slug.ends_with('-'));
                prop_assert!(!slug.contains("--"));
            }
        }
    }
}
