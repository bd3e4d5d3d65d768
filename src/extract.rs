//! Named regex patterns run over page text to build the data handed to the template host.
use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::warn;

pub const MAX_MATCHES_PER_PATTERN: usize = 10;

const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("emails", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b"),
    ("phones", r"(\+?1[-.\s]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.\s]?([0-9]{4})"),
    ("currencies", r"\$[\d,]+\.?\d*"),
    ("dates", r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b"),
    ("urls", r"https?://[^\s]+"),
    ("zipCodes", r"\b\d{5}(-\d{4})?\b"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("line {line}: expected `name: pattern`")]
    MissingName { line: usize },
    #[error("line {line}: unsupported flag `{flag}`")]
    UnsupportedFlag { line: usize, flag: char },
    #[error("line {line}: invalid pattern for {name}: {error}")]
    InvalidPattern {
        line: usize,
        name: String,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl Default for PatternSet {
    fn default() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|(name, re)| match Regex::new(re) {
                Ok(re) => Some((name.to_string(), re)),
                Err(e) => {
                    warn!(pattern = name, error = %e, "default pattern failed to compile");
                    None
                }
            })
            .collect();
        Self { patterns }
    }
}

impl PatternSet {
    /// Parses one pattern per line: `name: /regex/flags` or `name: regex`. Names are
    /// lowercased. Bad lines are returned alongside the usable patterns.
    pub fn parse_custom(text: &str) -> (Self, Vec<ExtractError>) {
        let mut patterns = Vec::new();
        let mut errors = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            if raw.trim().is_empty() {
                continue;
            }
            match parse_line(raw, line) {
                Ok(entry) => patterns.push(entry),
                Err(e) => {
                    warn!(error = %e, "custom pattern skipped");
                    errors.push(e);
                }
            }
        }
        (Self { patterns }, errors)
    }

    /// Custom patterns when any are given, otherwise the defaults.
    pub fn from_custom_or_default(text: Option<&str>) -> (Self, Vec<ExtractError>) {
        match text {
            Some(text) if !text.trim().is_empty() => Self::parse_custom(text),
            _ => (Self::default(), Vec::new()),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Matches per pattern, trimmed, de-duplicated in first-seen order and capped. Patterns
    /// with no match are left out.
    pub fn extract(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        for (name, re) in &self.patterns {
            let mut found: Vec<String> = Vec::new();
            for m in re.find_iter(text) {
                let value = m.as_str().trim();
                if value.is_empty() || found.iter().any(|f| f == value) {
                    continue;
                }
                found.push(value.to_string());
                if found.len() == MAX_MATCHES_PER_PATTERN {
                    break;
                }
            }
            if !found.is_empty() {
                out.insert(name.clone(), found);
            }
        }
        out
    }
}

fn parse_line(raw: &str, line: usize) -> Result<(String, Regex), ExtractError> {
    let colon = raw
        .find(':')
        .filter(|&i| i > 0)
        .ok_or(ExtractError::MissingName { line })?;
    let name = raw[..colon].trim().to_lowercase();
    let body = raw[colon + 1..].trim();

    let (pattern, flags) = match body.rfind('/') {
        Some(last) if body.starts_with('/') && last > 0 => (&body[1..last], &body[last + 1..]),
        _ => (body, ""),
    };

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            // Every match is collected anyway.
            'g' => {}
            other => return Err(ExtractError::UnsupportedFlag { line, flag: other }),
        }
    }

    let re = builder.build().map_err(|e| ExtractError::InvalidPattern {
        line,
        name: name.clone(),
        error: e.to_string(),
    })?;
    Ok((name, re))
}
