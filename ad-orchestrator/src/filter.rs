//! Content filter for trend candidates.
//!
//! Rules run in a fixed order: trim, length bounds, sensitive keywords and
//! news-headline patterns, then stripping of characters outside the allowed
//! set. The stripped text is checked against the keyword and headline rules
//! once more. A candidate that fails a rule is dropped, never repaired.

use crate::types::{OrchestratorError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

pub const DEFAULT_DENYLIST: &[&str] = &[
    // violence and crime
    "war", "violence", "shooting", "murder", "kill", "death", "died", "dead", "suicide",
    "bomb", "explosion", "attack", "terrorism", "terrorist", "assault", "abuse", "rape",
    "kidnap", "torture", "weapon", "gun", "knife", "blood", "stabbing", "beaten",
    // politics
    "politics", "election", "trump", "biden", "president", "republican", "democrat", "vote",
    "campaign", "protest", "scandal", "controversy", "impeach", "coup", "fraud", "corruption",
    // disasters
    "tragedy", "disaster", "crash", "accident", "fire", "flood", "hurricane", "earthquake",
    "pandemic", "covid", "virus", "disease", "illness", "hospital", "emergency",
    // sensitive
    "sexual", "porn", "nude", "naked", "sex", "inappropriate", "offensive", "racist",
    "discrimination", "hate", "extremist", "radical", "banned", "illegal", "drugs",
    // news
    "breaking", "urgent", "alert", "warning", "crisis", "investigation", "arrest",
    "charged", "guilty", "sentence", "prison", "jail", "court", "lawsuit", "trial",
    // minors and distress
    "child", "minor", "kid", "baby", "infant", "teen", "student", "school", "young",
    "victim", "injured", "hurt", "pain", "suffering", "sad", "depression", "anxiety",
];

const NEWS_PATTERNS: &[&str] = &[
    r"(?i)^\w+ (says|reports|confirms|denies|announces)\b",
    r"- [A-Z][a-z]+, [A-Z][A-Z]",
    r"(?i)(investigation|incident|reports|breaking|urgent)",
    r"(?i)(arrested|charged|guilty|sentenced)",
    r"(?i)\d+ (killed|injured|dead|hurt)",
];

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub max_per_source: usize,
    pub denylist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 150,
            max_per_source: 10,
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    TooLong,
    Sensitive(String),
    NewsLike,
    EmptyAfterStrip,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooShort => f.write_str("too short"),
            RejectReason::TooLong => f.write_str("too long"),
            RejectReason::Sensitive(word) => write!(f, "sensitive keyword '{}'", word),
            RejectReason::NewsLike => f.write_str("looks like a news headline"),
            RejectReason::EmptyAfterStrip => f.write_str("empty after stripping"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(String),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn accepted(self) -> Option<String> {
        match self {
            Verdict::Accepted(topic) => Some(topic),
            Verdict::Rejected(_) => None,
        }
    }
}

pub struct ContentFilter {
    min_length: usize,
    max_length: usize,
    max_per_source: usize,
    denylist: Option<Regex>,
    news_patterns: Vec<Regex>,
}

impl ContentFilter {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        if config.min_length > config.max_length {
            return Err(OrchestratorError::Config(format!(
                "topic length bounds are inverted ({} > {})",
                config.min_length, config.max_length
            )));
        }
        if config.max_per_source == 0 {
            return Err(OrchestratorError::Config(
                "topics per source must be greater than zero".to_string(),
            ));
        }

        let keywords: Vec<String> = config
            .denylist
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        // Whole words with simple inflections, so "award" survives "war".
        let denylist = if keywords.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})(?:s|es|ed|d|ing)?\b", keywords.join("|"));
            Some(Regex::new(&pattern).map_err(|e| OrchestratorError::Config(e.to_string()))?)
        };

        let news_patterns = NEWS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).map_err(|e| OrchestratorError::Config(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            min_length: config.min_length,
            max_length: config.max_length,
            max_per_source: config.max_per_source,
            denylist,
            news_patterns,
        })
    }

    pub fn check(&self, candidate: &str) -> Verdict {
        let trimmed = candidate.trim();
        let length = trimmed.chars().count();

        // Length bounds
        if length < self.min_length {
            return Verdict::Rejected(RejectReason::TooShort);
        }
        if length > self.max_length {
            return Verdict::Rejected(RejectReason::TooLong);
        }
        // Sensitive keywords and headline shapes
        if let Some(word) = self.sensitive_match(trimmed) {
            return Verdict::Rejected(RejectReason::Sensitive(word));
        }
        if self.looks_like_news(trimmed) {
            return Verdict::Rejected(RejectReason::NewsLike);
        }

        // Character set
        let stripped = strip_disallowed(trimmed);
        if stripped.is_empty() {
            return Verdict::Rejected(RejectReason::EmptyAfterStrip);
        }
        // Stripping can join fragments into a denied word ("wa*r").
        if let Some(word) = self.sensitive_match(&stripped) {
            return Verdict::Rejected(RejectReason::Sensitive(word));
        }
        if self.looks_like_news(&stripped) {
            return Verdict::Rejected(RejectReason::NewsLike);
        }

        Verdict::Accepted(stripped)
    }

    /// Filters one source's candidates, dropping duplicates and keeping at
    /// most `max_per_source` in their original order.
    pub fn filter_batch<I, S>(&self, source: &str, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for candidate in candidates {
            let candidate = candidate.as_ref();
            match self.check(candidate) {
                Verdict::Accepted(topic) => {
                    if seen.insert(topic.to_lowercase()) {
                        accepted.push(topic);
                    }
                }
                Verdict::Rejected(reason) => {
                    debug!("Filtered out topic from {} ({}): {}", source, reason, candidate);
                }
            }
            if accepted.len() >= self.max_per_source {
                break;
            }
        }

        accepted
    }

    pub fn is_sensitive(&self, text: &str) -> bool {
        self.sensitive_match(text).is_some() || self.looks_like_news(text)
    }

    fn sensitive_match(&self, text: &str) -> Option<String> {
        self.denylist
            .as_ref()
            .and_then(|re| re.find(text))
            .map(|m| m.as_str().to_lowercase())
    }

    fn looks_like_news(&self, text: &str) -> bool {
        self.news_patterns.iter().any(|re| re.is_match(text))
    }
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c.is_whitespace() || "'-&.,!?:()#+/".contains(c)
}

fn strip_disallowed(text: &str) -> String {
    text.chars()
        .filter(|c| is_allowed(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
