use std::fmt;

use crate::errors::{Result, SweepError};

/// Anchored glob over dotted namespaces
///
/// `*` matches any run of characters (dots included), `?` exactly one.
/// `World.*` matches `World.Characters` but not `World` itself.
#[derive(Clone)]
pub struct NamespacePattern {
    source: String,
    regex: regex_lite::Regex,
}

impl NamespacePattern {
    /// Compile a glob pattern
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` for an empty pattern or one that fails to compile.
    pub fn new(glob: &str) -> Result<Self> {
        if glob.trim().is_empty() {
            return Err(SweepError::InvalidPattern {
                pattern: glob.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let mut expr = String::with_capacity(glob.len() + 8);
        expr.push('^');
        for c in glob.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex_lite::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = regex_lite::Regex::new(&expr).map_err(|e| SweepError::InvalidPattern {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    /// Compile a list of globs, failing on the first bad one
    ///
    /// # Errors
    ///
    /// Returns `InvalidPattern` for the first pattern that does not compile.
    pub fn compile_all<S: AsRef<str>>(globs: &[S]) -> Result<Vec<Self>> {
        globs.iter().map(|g| Self::new(g.as_ref())).collect()
    }

    pub fn matches(&self, namespace: &str) -> bool {
        self.regex.is_match(namespace)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamespacePattern").field(&self.source).finish()
    }
}

impl PartialEq for NamespacePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
