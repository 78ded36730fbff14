//! Free-text normalization strategy.
//!
//! Keyword expectations and free-text route patterns never match raw input;
//! they match a normalized form: lowercased, diacritics folded, whitespace
//! runs collapsed to single hyphens. The exact folding rules are locale
//! sensitive, so the algorithm sits behind the [`TextNormalizer`] trait and
//! deployments with other locales can swap in their own.

use std::sync::Arc;

/// Strategy for turning raw message text into the matchable form.
pub trait TextNormalizer: Send + Sync {
    /// Normalizes `text` for keyword and pattern matching.
    fn normalize(&self, text: &str) -> String;
}

/// Shared handle to a normalizer implementation.
pub type SharedNormalizer = Arc<dyn TextNormalizer>;

/// Default normalizer: lowercase, Latin diacritic folding (including the
/// Czech set), and whitespace-to-hyphen tokenization.
///
/// The folding table is deliberately approximate; it covers the Latin-script
/// accents seen in practice and passes everything else through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatinFold;

impl TextNormalizer for LatinFold {
    fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut pending_hyphen = false;
        for c in text.to_lowercase().chars() {
            if c.is_whitespace() {
                if !out.is_empty() {
                    pending_hyphen = true;
                }
                continue;
            }
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            match fold_char(c) {
                Folded::Char(f) => out.push(f),
                Folded::Str(s) => out.push_str(s),
            }
        }
        out
    }
}

enum Folded {
    Char(char),
    Str(&'static str),
}

fn fold_char(c: char) -> Folded {
    let folded = match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ą' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'ě' | 'ę' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'ů' => 'u',
        'ý' | 'ÿ' => 'y',
        'č' | 'ç' | 'ć' => 'c',
        'ď' => 'd',
        'ľ' | 'ĺ' | 'ł' => 'l',
        'ñ' | 'ň' | 'ń' => 'n',
        'ř' => 'r',
        'š' | 'ś' => 's',
        'ť' => 't',
        'ž' | 'ź' | 'ż' => 'z',
        'ß' => return Folded::Str("ss"),
        other => other,
    };
    Folded::Char(folded)
}
