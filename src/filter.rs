use anyhow::{Context, Result};
use regex::Regex;

/// Matches a keyword even when other characters are inserted between its
/// characters, e.g. "哈囉" also matches "哈哈哈囉" and "哈 ~ 囉".
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keyword: String,
    regex: Regex,
}

impl KeywordFilter {
    pub fn new(keyword: &str) -> Result<Self> {
        let pattern = keyword
            .chars()
            .map(|c| regex::escape(&c.to_string()))
            .collect::<Vec<_>>()
            .join(".*");

        // (?s) so the wildcard also spans line breaks
        let regex = Regex::new(&format!("(?s){}", pattern))
            .with_context(|| format!("Failed to build keyword filter for {:?}", keyword))?;

        Ok(Self {
            keyword: keyword.to_string(),
            regex,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}
