//! # Auth Validator
//!
//! Loads a YAML token file (`tokens: [{token, subdomains, role}, ...]`)
//! and answers two questions: does a bearer token authorize a
//! subdomain (`validate`), and what role does a token carry (`role`).
//! Subdomain patterns support an exact match, the `"*"` global
//! wildcard, or a shell-style glob (`?`, `*`, `[...]`), mirroring the
//! matching rules of Go's `path.Match` that the original tool used.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::AuthError;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    #[serde(default)]
    pub subdomains: Vec<String>,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct AuthFile {
    #[serde(default)]
    tokens: Vec<TokenEntry>,
}

/// In-memory view of the auth file, keyed by token for O(1) lookup.
#[derive(Debug, Default)]
pub struct AuthValidator {
    entries: HashMap<String, TokenEntry>,
}

impl AuthValidator {
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let data = std::fs::read_to_string(path).map_err(|source| AuthError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: AuthFile = serde_yaml::from_str(&data)?;
        let entries = parsed
            .tokens
            .into_iter()
            .map(|e| (e.token.clone(), e))
            .collect();
        Ok(Self { entries })
    }

    /// True iff `token` is known and at least one of its patterns
    /// matches `subdomain`.
    pub fn validate(&self, token: &str, subdomain: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let Some(entry) = self.entries.get(token) else {
            return false;
        };
        entry
            .subdomains
            .iter()
            .any(|pattern| pattern == "*" || pattern == subdomain || glob_match(pattern, subdomain))
    }

    /// The role associated with `token`, or `""` if the token is unknown.
    pub fn role(&self, token: &str) -> String {
        self.entries
            .get(token)
            .map(|e| e.role.clone())
            .unwrap_or_default()
    }

    /// True iff a token carries the given role.
    pub fn has_role(&self, token: &str, role: &str) -> bool {
        self.role(token) == role
    }
}

/// Shell-style glob match supporting `?`, `*`, and `[...]` character
/// classes — the same surface as Go's `path.Match`, which the original
/// tool relied on for subdomain patterns like `project1-*`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_from(&p, &t)
}

fn match_from(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => match_from(&p[1..], t) || (!t.is_empty() && match_from(p, &t[1..])),
        Some('?') => !t.is_empty() && match_from(&p[1..], &t[1..]),
        Some('[') => {
            let Some(close) = p.iter().position(|&c| c == ']') else {
                // Unterminated class: treat '[' as a literal, matching path.Match's
                // behavior of returning a syntax error — here we just fail closed.
                return false;
            };
            if t.is_empty() {
                return false;
            }
            let (negate, class_start) = if p.get(1) == Some(&'!') { (true, 2) } else { (false, 1) };
            let class = &p[class_start..close];
            let matched = char_in_class(class, t[0]);
            if matched == negate {
                return false;
            }
            match_from(&p[close + 1..], &t[1..])
        }
        Some(&c) => !t.is_empty() && t[0] == c && match_from(&p[1..], &t[1..]),
    }
}

fn char_in_class(class: &[char], c: char) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            if class[i] <= c && c <= class[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if class[i] == c {
                return true;
            }
            i += 1;
        }
    }
    false
}
