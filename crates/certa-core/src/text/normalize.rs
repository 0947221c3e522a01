//! Text canonicalization for fuzzy quote comparison.
//!
//! Steps run in a fixed order: whitespace collapse, case fold, punctuation
//! strip. When collapsing is enabled, the strip step also collapses the
//! gaps left by removed characters, so the output never contains runs of
//! whitespace.

use crate::config::NormalizeOptions;

/// Normalize `text` according to `options`. Total: empty in, empty out.
pub fn normalize(text: &str, options: NormalizeOptions) -> String {
    let mut out = if options.collapse_whitespace {
        collapse_whitespace(text)
    } else {
        text.to_string()
    };

    if options.fold_case {
        out = out.to_lowercase();
    }

    if options.strip_punctuation {
        out = strip_punctuation(&out, options.collapse_whitespace);
    }

    out
}

/// Collapse whitespace runs to single spaces and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_punctuation(text: &str, keep_collapsed: bool) -> String {
    let stripped: String = text.chars().filter(|c| !is_punctuation(*c)).collect();
    if keep_collapsed {
        collapse_whitespace(&stripped)
    } else {
        stripped
    }
}

/// ASCII punctuation plus the typographic quotes, dashes and ellipsis that
/// model output tends to substitute for their ASCII forms.
fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '\u{2010}'..='\u{2015}'
                | '\u{2018}'..='\u{201F}'
                | '\u{2026}'
                | '\u{00A1}'
                | '\u{00AB}'
                | '\u{00BB}'
                | '\u{00BF}'
        )
}
