//! Placeholder substitution on parsed templates.

use std::time::Duration;

use crate::matcher::Matcher;

use super::ast::{Expr, VectorSelector};

/// Selector name standing for the error (or success) metric.
pub const ERROR_METRIC_PLACEHOLDER: &str = "errorMetric";

/// Label of the placeholder matcher that selects a matcher role.
pub const MATCHERS_PLACEHOLDER: &str = "matchers";

/// Value of the placeholder matcher selecting the error matchers.
pub const ERRORS_ROLE: &str = "errors";

/// Number literal standing for the objective target.
pub const TARGET_PLACEHOLDER: f64 = 0.696_969;

/// Substitutes objective specifics into a template tree.
///
/// - a selector named `errorMetric` gets `error_metric`, any other selector
///   gets `metric`
/// - a selector carrying `matchers="errors"` gets `error_matchers`, any other
///   selector gets `matchers`
/// - aggregations that group in the template get `grouping`; an empty
///   grouping removes the clause
/// - ranges become `window` when set
/// - the number `0.696969` becomes `target` when set
#[derive(Debug, Clone, Copy, Default)]
pub struct Replacer<'a> {
    /// Name of the total metric.
    pub metric: &'a str,
    /// Matchers of the total metric.
    pub matchers: &'a [Matcher],
    /// Name of the error or success metric.
    pub error_metric: &'a str,
    /// Matchers of the error or success metric.
    pub error_matchers: &'a [Matcher],
    /// Grouping labels.
    pub grouping: &'a [String],
    /// Range for every range selector.
    pub window: Option<Duration>,
    /// Value for the target placeholder.
    pub target: Option<f64>,
}

impl Replacer<'_> {
    /// Rewrites the expression in place.
    pub fn replace(&self, expr: &mut Expr) {
        match expr {
            Expr::Aggregate(agg) => {
                if !agg.grouping.is_empty() {
                    agg.grouping = self.grouping.to_vec();
                }
                self.replace(&mut agg.expr);
            }
            Expr::Call(call) => {
                for arg in &mut call.args {
                    self.replace(arg);
                }
            }
            Expr::Binary(bin) => {
                self.replace(&mut bin.lhs);
                self.replace(&mut bin.rhs);
            }
            Expr::Paren(inner) => self.replace(inner),
            Expr::Number(value) => {
                if *value == TARGET_PLACEHOLDER {
                    if let Some(target) = self.target {
                        *value = target;
                    }
                }
            }
            Expr::Vector(selector) => self.replace_selector(selector),
            Expr::Matrix(matrix) => {
                if let Some(window) = self.window {
                    matrix.range = window;
                }
                self.replace_selector(&mut matrix.selector);
            }
        }
    }

    fn replace_selector(&self, selector: &mut VectorSelector) {
        let is_errors = selector.name == ERROR_METRIC_PLACEHOLDER;
        selector.name = if is_errors {
            self.error_metric.to_string()
        } else {
            self.metric.to_string()
        };

        let role = selector
            .matchers
            .iter()
            .find(|m| m.name() == MATCHERS_PLACEHOLDER)
            .map(|m| m.value() == ERRORS_ROLE);
        selector.matchers = if role == Some(true) {
            self.error_matchers.to_vec()
        } else {
            self.matchers.to_vec()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchType, METRIC_NAME_LABEL};
    use crate::promql::parse_expr;

    fn total() -> Vec<Matcher> {
        vec![
            Matcher::equal("job", "app"),
            Matcher::equal(METRIC_NAME_LABEL, "http_requests_total"),
        ]
    }

    fn errors() -> Vec<Matcher> {
        vec![
            Matcher::equal("job", "app"),
            Matcher::new(MatchType::Regex, "status", "5..").unwrap(),
            Matcher::equal(METRIC_NAME_LABEL, "http_requests_total"),
        ]
    }

    #[test]
    fn substitutes_roles_window_and_drops_empty_grouping() {
        let mut expr = parse_expr(
            r#"sum by (grouping) (rate(errorMetric{matchers="errors"}[1s])) / sum by (grouping) (rate(metric{matchers="total"}[1s]))"#,
        )
        .unwrap();
        let total = total();
        let errors = errors();
        Replacer {
            metric: "http_requests_total",
            matchers: &total,
            error_metric: "http_requests_total",
            error_matchers: &errors,
            window: Some(Duration::from_secs(300)),
            ..Replacer::default()
        }
        .replace(&mut expr);

        assert_eq!(
            expr.to_string(),
            r#"sum(rate(http_requests_total{job="app",status=~"5.."}[5m])) / sum(rate(http_requests_total{job="app"}[5m]))"#
        );
    }

    #[test]
    fn substitutes_grouping_and_target() {
        let mut expr =
            parse_expr(r#"1 - histogram_fraction(0, 0.696969, sum by (grouping) (rate(metric{matchers="total"}[1s])))"#)
                .unwrap();
        let total = total();
        let grouping = vec!["handler".to_string(), "route".to_string()];
        Replacer {
            metric: "http_requests_total",
            matchers: &total,
            grouping: &grouping,
            window: Some(Duration::from_secs(3600)),
            target: Some(0.5),
            ..Replacer::default()
        }
        .replace(&mut expr);

        assert_eq!(
            expr.to_string(),
            r#"1 - histogram_fraction(0, 0.5, sum by (handler, route) (rate(http_requests_total{job="app"}[1h])))"#
        );
    }

    #[test]
    fn selector_without_placeholder_gets_total_matchers() {
        let mut expr = parse_expr("sum(rate(metric[5m]))").unwrap();
        let total = total();
        Replacer {
            metric: "http_requests_total",
            matchers: &total,
            ..Replacer::default()
        }
        .replace(&mut expr);
        assert_eq!(
            expr.to_string(),
            r#"sum(rate(http_requests_total{job="app"}[5m]))"#
        );
    }
}
