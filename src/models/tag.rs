//! Tag model

use serde::{Deserialize, Serialize};

/// A keyword shared across articles. Names are unique and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Longest accepted tag name, matching the `tags.name` column.
pub const MAX_TAG_NAME_LEN: usize = 50;

/// Trim, drop blanks and de-duplicate tag names, keeping first-seen order.
pub fn normalize_tag_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref().trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Split a comma-separated tag field, as submitted by a form.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    normalize_tag_names(raw.split(','))
}
