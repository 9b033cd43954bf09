// ============================================================================
// Search Terms - turning caller-supplied names into safe FTS5 / LIKE patterns
// ============================================================================
//
// Drug names arrive as free text ("Humira", "ibuprofen; famotidine",
// "5-FU"). FTS5 has its own query language, so raw text is never spliced
// into a MATCH expression: it is split into letter/digit tokens and each
// token becomes a quoted prefix phrase.
//
// ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, Result};

/// Maximum characters of a search term echoed into logs
const MAX_LOG_LENGTH: usize = 80;

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct SearchTerms {
    raw: String,
    tokens: Vec<String>,
}

impl SearchTerms {
    /// Tokenize a drug or product name. Input with no letters or digits is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim().to_string();
        let tokens: Vec<String> = TOKEN_REGEX
            .find_iter(&raw)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        if tokens.is_empty() {
            return Err(EngineError::InvalidInput(
                "Search name must contain at least one letter or digit".to_string(),
            ));
        }

        Ok(Self { raw, tokens })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// FTS5 MATCH expression: every token as a prefix phrase, all required.
    /// `columns` restricts the match to the named FTS columns.
    pub fn fts_match(&self, columns: Option<&[&str]>) -> String {
        let phrases = self
            .tokens
            .iter()
            .map(|t| format!("\"{}\"*", t))
            .collect::<Vec<_>>()
            .join(" AND ");

        match columns {
            Some(cols) if !cols.is_empty() => format!("{{{}}} : ({})", cols.join(" "), phrases),
            _ => phrases,
        }
    }

    /// Substring pattern for `LIKE ... ESCAPE '\'`
    pub fn like_pattern(&self) -> String {
        let mut escaped = String::with_capacity(self.raw.len() + 2);
        escaped.push('%');
        for c in self.raw.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped.push('%');
        escaped
    }

    /// Single-line, length-capped rendering for log messages
    pub fn for_log(&self) -> String {
        let cleaned: String = self
            .raw
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        if cleaned.chars().count() > MAX_LOG_LENGTH {
            let truncated: String = cleaned.chars().take(MAX_LOG_LENGTH).collect();
            format!("{}...", truncated)
        } else {
            cleaned
        }
    }
}
