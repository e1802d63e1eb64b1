//! Route pattern compilation and matching.
//!
//! A pattern is compiled once, when it is registered, into a [`PathMatcher`]. Compilation is
//! deterministic and all pattern mistakes are reported as [`ConfigError`]s at that point, so
//! matching a request path can only answer "no match" or a [`PathMatch`].
//!
//! # Examples
//!
//! ```
//! use micro_chain::path::{MatchOptions, PathMatcher};
//!
//! let matcher = PathMatcher::compile("/users/:id(\\d+)", MatchOptions::route()).unwrap();
//!
//! let matched = matcher.test("/users/42").unwrap();
//! assert_eq!(matched.decode().unwrap().get("id"), Some("42"));
//!
//! assert!(matcher.test("/users/bob").is_none());
//! ```

mod parser;

use crate::error::{ConfigError, HttpError};
use crate::params::Params;
use parser::Token;
use regex::Regex;
use std::fmt;

const PREFIX_GROUP: &str = "prefix";

/// Options fixed when a pattern is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    /// literal segments compare case sensitively
    pub case_sensitive: bool,
    /// a trailing slash is significant
    pub strict: bool,
    /// `true` matches the whole path, `false` matches a segment aligned prefix
    pub end: bool,
}

impl MatchOptions {
    /// Options for a terminal route: whole path, case insensitive, trailing slash insensitive.
    pub fn route() -> Self {
        Self { case_sensitive: false, strict: false, end: true }
    }

    /// Options for middleware and mounts: prefix match, case insensitive, trailing slash insensitive.
    pub fn prefix() -> Self {
        Self { case_sensitive: false, strict: false, end: false }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// A compiled route pattern.
pub struct PathMatcher {
    pattern: String,
    kind: MatcherKind,
}

enum MatcherKind {
    /// matches every path without consuming anything
    All,
    Regex {
        regex: Regex,
        /// (parameter name, capture group name), in pattern order
        keys: Vec<(String, String)>,
        end: bool,
    },
}

/// A successful match of a request path.
#[derive(Debug)]
pub struct PathMatch<'m, 'p> {
    consumed: usize,
    raw_params: Vec<(&'m str, &'p str)>,
}

impl PathMatcher {
    /// Compiles `pattern` with the given options.
    pub fn compile(pattern: &str, options: MatchOptions) -> Result<Self, ConfigError> {
        if !options.end && (pattern == "/" || pattern.is_empty()) {
            return Ok(Self { pattern: "/".to_owned(), kind: MatcherKind::All });
        }

        let tokens = parser::parse(pattern)?;
        let (source, keys) = to_regex_source(&tokens, options);

        let regex = Regex::new(&source).map_err(|e| match constraint_owner(&tokens) {
            Some(name) => ConfigError::InvalidConstraint { pattern: pattern.to_owned(), name, source: e },
            None => ConfigError::invalid_pattern(pattern, e),
        })?;

        Ok(Self { pattern: pattern.to_owned(), kind: MatcherKind::Regex { regex, keys, end: options.end } })
    }

    /// A matcher for every path, used by middleware registered without a path.
    pub fn all() -> Self {
        Self { pattern: "/".to_owned(), kind: MatcherKind::All }
    }

    /// The pattern this matcher was compiled from
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline]
    pub fn is_match_all(&self) -> bool {
        matches!(self.kind, MatcherKind::All)
    }

    /// Tests `path` against this matcher.
    pub fn test<'m, 'p>(&'m self, path: &'p str) -> Option<PathMatch<'m, 'p>> {
        match &self.kind {
            MatcherKind::All => Some(PathMatch { consumed: 0, raw_params: Vec::new() }),
            MatcherKind::Regex { regex, keys, end } => {
                let captures = regex.captures(path)?;
                let consumed = if *end {
                    path.len()
                } else {
                    captures.name(PREFIX_GROUP).map_or(0, |m| m.end())
                };

                let raw_params = keys
                    .iter()
                    .filter_map(|(name, group)| captures.name(group).map(|value| (name.as_str(), value.as_str())))
                    .collect();

                Some(PathMatch { consumed, raw_params })
            }
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher").field("pattern", &self.pattern).finish_non_exhaustive()
    }
}

impl<'m, 'p> PathMatch<'m, 'p> {
    /// Length of the path prefix consumed by the match; the whole path for terminal routes.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// The captured values before percent-decoding.
    pub fn raw_params(&self) -> &[(&'m str, &'p str)] {
        &self.raw_params
    }

    /// Percent-decodes every captured value exactly once.
    ///
    /// A value which does not decode to UTF-8 is a client error (`400 Bad Request`).
    pub fn decode(&self) -> Result<Params, HttpError> {
        let mut params = Params::empty();
        for (name, raw) in &self.raw_params {
            let value = urlencoding::decode(raw)
                .map_err(|_| HttpError::bad_request(format!("Failed to decode param '{raw}'")))?;
            params.insert(*name, value.into_owned());
        }
        Ok(params)
    }
}

fn to_regex_source(tokens: &[Token], options: MatchOptions) -> (String, Vec<(String, String)>) {
    let mut source = String::with_capacity(64);
    let mut keys = Vec::new();

    if !options.case_sensitive {
        source.push_str("(?i)");
    }
    source.push('^');
    if !options.end {
        source.push_str("(?P<");
        source.push_str(PREFIX_GROUP);
        source.push('>');
    }

    for token in tokens {
        match token {
            Token::Literal(text) => source.push_str(&regex::escape(text)),
            Token::Param { name, constraint, optional, leading_slash } => {
                let group = format!("p{}", keys.len());
                let body = constraint.as_deref().unwrap_or("[^/]+?");
                let capture = format!("(?P<{group}>{body})");
                match (leading_slash, optional) {
                    (true, true) => source.push_str(&format!("(?:/{capture})?")),
                    (true, false) => source.push_str(&format!("/{capture}")),
                    (false, true) => source.push_str(&format!("{capture}?")),
                    (false, false) => source.push_str(&capture),
                }
                keys.push((name.clone(), group));
            }
            Token::Wildcard { name, leading_slash } => {
                let group = format!("p{}", keys.len());
                if *leading_slash {
                    source.push_str(&format!("/(?P<{group}>.+?)"));
                } else {
                    source.push_str(&format!("(?P<{group}>.*?)"));
                }
                keys.push((name.clone(), group));
            }
        }
    }

    if !options.strict {
        let ends_with_slash = matches!(tokens.last(), Some(Token::Literal(text)) if text.ends_with('/'));
        source.push_str(if ends_with_slash { "?" } else { "/?" });
    }

    // a trailing wildcard swallows the rest of the path, so prefixes end with it too
    let ends_with_wildcard = matches!(tokens.last(), Some(Token::Wildcard { .. }));
    if options.end {
        source.push('$');
    } else if ends_with_wildcard {
        source.push_str(")$");
    } else {
        source.push_str(")(?:/|$)");
    }

    (source, keys)
}

fn constraint_owner(tokens: &[Token]) -> Option<String> {
    tokens.iter().find_map(|token| match token {
        Token::Param { name, constraint: Some(constraint), .. } if Regex::new(constraint).is_err() => {
            Some(name.clone())
        }
        _ => None,
    })
}
