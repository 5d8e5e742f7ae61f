//! Variable expansion for a single scalar.

use tracing::debug;

use crate::error::SubstError;
use crate::interpolate::{Resolution, Template};
use crate::types::{Config, FieldPath};

/// Texts treated as "nothing was substituted".
const EMPTY_FORMS: &[&str] = &["", "\"\"", "''", "\n"];

/// Explicit empty-string literal used when empty results are allowed.
const EMPTY_LITERAL: &str = "\"\"";

pub fn is_empty(text: &str) -> bool {
    EMPTY_FORMS.contains(&text)
}

/// Expands variable references according to a [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    config: &'a Config,
}

impl<'a> Expander<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Resolve one variable name.
    ///
    /// Ineligible names are left verbatim; eligible names take their value
    /// from the explicit values, then the environment, then the empty string.
    pub fn resolve(&self, name: &str) -> Resolution {
        if !self.config.is_eligible(name) {
            return Resolution::Verbatim;
        }
        Resolution::Value(self.config.lookup(name))
    }

    /// Expand `raw`.
    ///
    /// Returns `Ok(None)` when expansion leaves the text unchanged, so the
    /// caller keeps the original node untouched. Otherwise returns the
    /// expanded text with the empty-value policy applied and one trailing
    /// newline removed.
    ///
    /// # Errors
    ///
    /// Returns `SubstError::Syntax` for malformed references and
    /// `SubstError::Empty` when the result is empty and empty values are not
    /// allowed.
    pub fn expand(&self, raw: &str, path: &FieldPath) -> Result<Option<String>, SubstError> {
        let template = Template::parse(raw).map_err(|e| SubstError::Syntax {
            text: trim_newline(raw).to_string(),
            message: e.to_string(),
        })?;
        if !template.has_references() {
            return Ok(None);
        }

        let expanded = template.evaluate(&mut |name: &str| self.resolve(name));
        if expanded == raw {
            return Ok(None);
        }

        let expanded = if is_empty(&expanded) {
            if !self.config.allow_empty {
                return Err(SubstError::Empty {
                    text: trim_newline(raw).to_string(),
                });
            }
            EMPTY_LITERAL.to_string()
        } else {
            expanded
        };

        let result = trim_newline(&expanded).to_string();
        debug!(
            path = %path,
            variables = ?template.variables(),
            from = %trim_newline(raw),
            to = %result,
            "substituted scalar"
        );
        Ok(Some(result))
    }
}

fn trim_newline(text: &str) -> &str {
    text.strip_suffix('\n').unwrap_or(text)
}
