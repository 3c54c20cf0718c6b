//! Include/exclude rules applied to every discovered path.
//!
//! Regular expressions are anchored at the start of the path (a pattern
//! must match a prefix, not merely occur somewhere). Globs must match the
//! whole path. Exclusion always wins over inclusion.

use std::path::Path;

use fast_glob::glob_match;
use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Raw rules as supplied on the command line.
#[derive(Clone, Debug, Default)]
pub struct FilterRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub ignore_case: bool,
}

#[derive(Debug)]
enum Matcher {
    Regex(Regex),
    Glob(String),
}

impl Matcher {
    fn regex(pattern: &str, ignore_case: bool) -> Result<Self> {
        RegexBuilder::new(&format!("^(?:{pattern})"))
            .case_insensitive(ignore_case)
            .build()
            .map(Self::Regex)
            .map_err(|e| Error::config(format!("invalid pattern {pattern:?}: {e}")))
    }

    fn glob(pattern: &str, ignore_case: bool) -> Self {
        Self::Glob(if ignore_case { pattern.to_lowercase() } else { pattern.to_owned() })
    }

    fn matches(&self, path: &str, folded: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(path),
            Self::Glob(glob) => glob_match(glob, folded),
        }
    }
}

#[derive(Debug, Default)]
pub struct PathFilter {
    include: Vec<Matcher>,
    exclude: Vec<Matcher>,
    ignore_case: bool,
}

impl PathFilter {
    /// Compiles `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid regular expression.
    pub fn new(rules: &FilterRules) -> Result<Self> {
        let compile = |patterns: &[String], globs: &[String]| -> Result<Vec<Matcher>> {
            let mut matchers = patterns.iter().map(|p| Matcher::regex(p, rules.ignore_case)).collect::<Result<Vec<_>>>()?;
            matchers.extend(globs.iter().map(|g| Matcher::glob(g, rules.ignore_case)));
            Ok(matchers)
        };

        Ok(Self {
            include: compile(&rules.include, &rules.include_globs)?,
            exclude: compile(&rules.exclude, &rules.exclude_globs)?,
            ignore_case: rules.ignore_case,
        })
    }

    /// Returns true when `path` should be uploaded.
    pub fn allows(&self, path: &Path) -> bool {
        let path = path.to_string_lossy().replace('\\', "/");
        let path = path.strip_prefix("./").unwrap_or(&path);
        let folded = if self.ignore_case { path.to_lowercase() } else { path.to_owned() };

        if self.exclude.iter().any(|m| m.matches(path, &folded)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|m| m.matches(path, &folded))
    }
}
