//! Resource matching
//!
//! Three ways to accept a token's resource: exact equality, an email-style
//! wildcard pattern, or a regular expression.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CheckError;

/// How a resource pattern is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Exact,
    /// `user@domain` with `*` globs in the user part and each domain label
    Wildcard,
    /// Regular expression, anchored at both ends
    Regex,
}

/// A pattern compiled once and matched against many resources
#[derive(Debug, Clone)]
pub struct ResourceMatcher {
    kind: MatchKind,
    pattern: String,
    regex: Option<Regex>,
}

impl ResourceMatcher {
    /// Compile `pattern`; only the regex kind can fail.
    pub fn new(kind: MatchKind, pattern: &str) -> Result<Self, CheckError> {
        let regex = match kind {
            MatchKind::Regex => Some(
                Regex::new(&anchor(pattern)).map_err(|e| CheckError::PatternError(e.to_string()))?,
            ),
            MatchKind::Exact | MatchKind::Wildcard => None,
        };

        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, resource: &str) -> bool {
        match (&self.kind, &self.regex) {
            (MatchKind::Exact, _) => resource == self.pattern,
            (MatchKind::Wildcard, _) => email_match(resource, &self.pattern),
            (MatchKind::Regex, Some(re)) => re.is_match(resource),
            (MatchKind::Regex, None) => false,
        }
    }
}

/// One-shot match of `token_resource` against `pattern`
pub fn resource_match(
    kind: MatchKind,
    token_resource: &str,
    pattern: &str,
) -> Result<bool, CheckError> {
    Ok(ResourceMatcher::new(kind, pattern)?.matches(token_resource))
}

fn anchor(pattern: &str) -> String {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    if !pattern.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(pattern);
    if !pattern.ends_with('$') {
        anchored.push('$');
    }
    anchored
}

/// Anchored `*` glob.
///
/// The first segment must be a prefix, middle segments are found left to
/// right, and the final segment is located by its last occurrence so it
/// lines up with the end of the string.
pub fn wild_match(pattern: &str, s: &str) -> bool {
    let terms: Vec<&str> = pattern.split('*').collect();
    if terms.len() == 1 {
        return pattern == s;
    }

    let last = terms.len() - 1;
    let mut pos = 0usize;

    for (i, term) in terms.iter().enumerate() {
        if term.is_empty() {
            continue;
        }
        let rest = &s[pos..];
        if i == 0 {
            if !rest.starts_with(term) {
                return false;
            }
            pos += term.len();
        } else {
            let found = if i == last {
                rest.rfind(term)
            } else {
                rest.find(term)
            };
            match found {
                Some(offset) => pos += offset + term.len(),
                None => return false,
            }
        }
        if i == last && pos != s.len() {
            return false;
        }
    }

    true
}

/// First two non-empty `@`-separated parts
fn split_address(s: &str) -> Option<(&str, &str)> {
    let mut parts = s.split('@').filter(|p| !p.is_empty());
    Some((parts.next()?, parts.next()?))
}

/// Pair domain labels one to one; a bare `*` label may absorb several.
fn match_labels(pattern: &[&str], domain: &[&str]) -> bool {
    match (pattern.split_first(), domain.split_first()) {
        (None, None) => true,
        (Some((&"*", p_rest)), Some((_, d_rest))) => {
            match_labels(p_rest, d_rest) || match_labels(pattern, d_rest)
        }
        (Some((p, p_rest)), Some((d, d_rest))) => wild_match(p, d) && match_labels(p_rest, d_rest),
        _ => false,
    }
}

/// Email wildcard match: glob the user part, then each domain label.
pub fn email_match(email: &str, pattern: &str) -> bool {
    let Some((pat_user, pat_domain)) = split_address(pattern) else {
        return false;
    };
    let Some((em_user, em_domain)) = split_address(email) else {
        return false;
    };

    if !wild_match(pat_user, em_user) {
        return false;
    }

    let pat_labels: Vec<&str> = pat_domain.split('.').collect();
    let em_labels: Vec<&str> = em_domain.split('.').collect();
    match_labels(&pat_labels, &em_labels)
}
