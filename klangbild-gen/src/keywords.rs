//! Keyword extraction from analysis text
//!
//! Grammar of the analysis text:
//!
//! ```text
//! text    := segment*
//! segment := <label> " (" <position> "): " <list> ";"
//! list    := item ("," item)*
//! ```
//!
//! Everything outside `"): " … ";"` is ignored. A list never spans a line
//! break, items are trimmed and empty items dropped. Text without a single
//! well-formed segment yields no keywords.

use regex::Regex;
use std::sync::OnceLock;

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\): (.*?);").expect("static keyword pattern"))
}

/// Extract the flattened keyword list from analysis text
pub fn extract_keywords(analysis: &str) -> Vec<String> {
    segment_pattern()
        .captures_iter(analysis)
        .filter_map(|caps| caps.get(1))
        .flat_map(|list| list.as_str().split(','))
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}
