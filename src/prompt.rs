// Caption cleanup and prompt assembly.
//
// The captioning model answers with text like "Caption: a man holding a
// cat". Before that text can steer the generation model it loses the
// prefix, any banned term, and the whitespace damage the deletions leave
// behind. Banned-term removal is literal substring deletion, so it can
// clip unrelated words ("deadline" loses its "dead"); the filter errs on
// the side of removing too much.

use crate::config::{BAN_TERMS, SENTINEL};

/// Removes the sentinel character from a customization string.
/// Returns the trimmed remainder and whether the sentinel appeared
/// anywhere in the input (a mid-string sentinel also counts).
pub fn strip_sentinel(custom: &str) -> (String, bool) {
    let seen = custom.contains(SENTINEL);
    let stripped = custom
        .chars()
        .filter(|c| *c != SENTINEL)
        .collect::<String>()
        .trim()
        .to_string();
    (stripped, seen)
}

/// Turns a raw model caption into prompt-safe text.
pub fn clean_caption(raw: &str) -> String {
    let mut text = raw.replace("Caption: ", "").trim().to_string();
    for term in BAN_TERMS {
        text = text.replace(term, "");
    }
    text = text.replace("  ", " ");
    text = text.replace(",,", ", ");
    text.replace(" ,", ", ")
}

/// Final prompt: the cleaned caption plus either the user's customization
/// or the configured addendum. The separator is appended even when the
/// addendum is empty, matching the wire-observed prompts.
pub fn compose_prompt(caption: &str, custom: &str, addendum: &str) -> String {
    if custom.is_empty() {
        format!("{caption}, {addendum}")
    } else {
        format!("{caption}, {custom}")
    }
}
