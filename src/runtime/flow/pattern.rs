//! Observer name patterns
//!
//! A pattern is a list of glob terms separated by `,`, `;`, `|` or
//! whitespace. `*` matches any run of characters, `?` exactly one.

use regex::Regex;

use crate::runtime::error::{FlowError, FlowResult};

/// Compiled, anchored task-name filter.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile `pattern`.
    pub fn compile(pattern: &str) -> FlowResult<Self> {
        let terms: Vec<String> = pattern
            .split(|c: char| matches!(c, ',' | ';' | '|') || c.is_whitespace())
            .filter(|term| !term.is_empty())
            .map(glob_to_regex)
            .collect();
        if terms.is_empty() {
            return Err(FlowError::validation(format!(
                "empty observer pattern `{}`",
                pattern
            )));
        }

        let regex = Regex::new(&format!("^(?:{})$", terms.join("|"))).map_err(|e| {
            FlowError::validation(format!("invalid observer pattern `{}`: {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether `name` matches one of the terms.
    #[inline]
    pub fn matches(
        &self,
        name: &str,
    ) -> bool {
        self.regex.is_match(name)
    }

    /// The pattern as written.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn glob_to_regex(term: &str) -> String {
    let mut out = String::with_capacity(term.len() * 2);
    let mut literal = String::new();
    for c in term.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}
