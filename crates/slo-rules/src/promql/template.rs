//! Lazily parsed, shared rule templates.

use once_cell::sync::OnceCell;
use tracing::error;

use crate::error::{Result, RuleError};

use super::ast::Expr;
use super::parser::parse_expr;

/// A fixed PromQL template, parsed on first use and cloned for every rule.
#[derive(Debug)]
pub struct Template {
    source: &'static str,
    parsed: OnceCell<std::result::Result<Expr, String>>,
}

impl Template {
    /// Declares a template.
    #[must_use]
    pub const fn new(source: &'static str) -> Self {
        Self {
            source,
            parsed: OnceCell::new(),
        }
    }

    /// The template source.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        self.source
    }

    /// Returns a fresh copy of the parsed tree.
    ///
    /// A template that does not parse is a defect in this crate and is
    /// reported as `RuleError::Template`.
    pub fn expr(&self) -> Result<Expr> {
        self.parsed
            .get_or_init(|| {
                parse_expr(self.source).map_err(|e| {
                    error!(template = self.source, error = %e, "internal rule template is malformed");
                    e.to_string()
                })
            })
            .clone()
            .map_err(|reason| RuleError::Template {
                template: self.source.to_string(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static GOOD: Template = Template::new("sum(rate(metric[1s]))");
    static BAD: Template = Template::new("sum(rate(metric[1s])");

    #[test]
    fn parses_once_and_hands_out_copies() {
        let mut first = GOOD.expr().unwrap();
        if let Expr::Aggregate(agg) = &mut first {
            agg.op = "max".to_string();
        }
        assert_eq!(GOOD.expr().unwrap().to_string(), "sum(rate(metric[1s]))");
        assert_eq!(GOOD.source(), "sum(rate(metric[1s]))");
    }

    #[test]
    fn malformed_template_is_reported() {
        let err = BAD.expr().unwrap_err();
        assert!(matches!(err, RuleError::Template { ref template, .. } if template == BAD.source()));
        // Cached failure is reported again
        assert!(BAD.expr().is_err());
    }
}
