//! Expression tree and its canonical printer.
//!
//! The printer produces the same text as the Prometheus formatter for the
//! node types used here: label matchers are sorted, the `__name__` matcher is
//! folded into the metric name and aggregations print as `sum by (a, b) (x)`.

use std::fmt;
use std::time::Duration;

use crate::duration::format_duration;
use crate::matcher::{METRIC_NAME_LABEL, MatchType, Matcher};

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `sum by (job) (x)`
    Aggregate(AggregateExpr),
    /// `rate(x[5m])`
    Call(Call),
    /// `a / b`
    Binary(Box<BinaryExpr>),
    /// `(x)`
    Paren(Box<Expr>),
    /// `0.99`
    Number(f64),
    /// `up{job="api"}`
    Vector(VectorSelector),
    /// `up{job="api"}[5m]`
    Matrix(MatrixSelector),
}

/// An aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    /// Aggregation operator, e.g. `sum`.
    pub op: String,
    /// Grouping labels.
    pub grouping: Vec<String>,
    /// True for `without (...)`.
    pub without: bool,
    /// The aggregated expression.
    pub expr: Box<Expr>,
}

/// A function call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Function name.
    pub func: String,
    /// Arguments.
    pub args: Vec<Expr>,
}

/// A binary operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    /// Operator.
    pub op: BinaryOp,
    /// Left operand.
    pub lhs: Expr,
    /// Right operand.
    pub rhs: Expr,
    /// True when a comparison carries the `bool` modifier.
    pub return_bool: bool,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `==`
    Eql,
    /// `!=`
    Neq,
    /// `>`
    Gtr,
    /// `<`
    Lss,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `and`
    And,
    /// `or`
    Or,
    /// `unless`
    Unless,
}

impl BinaryOp {
    /// The operator as written in PromQL.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Eql => "==",
            Self::Neq => "!=",
            Self::Gtr => ">",
            Self::Lss => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::And => "and",
            Self::Or => "or",
            Self::Unless => "unless",
        }
    }

    /// Binding strength, higher binds tighter.
    #[must_use]
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And | Self::Unless => 2,
            Self::Eql | Self::Neq | Self::Gtr | Self::Lss | Self::Gte | Self::Lte => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::Mod => 5,
            Self::Pow => 6,
        }
    }

    /// Returns true for comparison operators.
    #[must_use]
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eql | Self::Neq | Self::Gtr | Self::Lss | Self::Gte | Self::Lte
        )
    }

    /// Returns true for right-associative operators.
    #[must_use]
    pub const fn is_right_associative(&self) -> bool {
        matches!(self, Self::Pow)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An instant vector selector.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSelector {
    /// Metric name, may be empty.
    pub name: String,
    /// Label matchers.
    pub matchers: Vec<Matcher>,
    /// Offset modifier, zero when absent.
    pub offset: Duration,
}

/// A range vector selector.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSelector {
    /// The underlying selector.
    pub selector: VectorSelector,
    /// The range.
    pub range: Duration,
}

impl VectorSelector {
    fn fmt_without_offset(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<String> = self
            .matchers
            .iter()
            .filter(|m| {
                !(m.name() == METRIC_NAME_LABEL
                    && m.match_type() == MatchType::Equal
                    && m.value() == self.name
                    && !m.value().is_empty())
            })
            .map(ToString::to_string)
            .collect();

        if labels.is_empty() {
            return f.write_str(&self.name);
        }
        labels.sort();
        write!(f, "{}{{{}}}", self.name, labels.join(","))
    }
}

fn fmt_offset(offset: Duration, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if offset.is_zero() {
        Ok(())
    } else {
        write!(f, " offset {}", format_duration(offset))
    }
}

fn fmt_number(value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.is_infinite() {
        f.write_str(if value > 0.0 { "+Inf" } else { "-Inf" })
    } else if value.is_nan() {
        f.write_str("NaN")
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for VectorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_without_offset(f)?;
        fmt_offset(self.offset, f)
    }
}

impl fmt::Display for MatrixSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.selector.fmt_without_offset(f)?;
        write!(f, "[{}]", format_duration(self.range))?;
        fmt_offset(self.selector.offset, f)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate(agg) => {
                f.write_str(&agg.op)?;
                if agg.without {
                    write!(f, " without ({}) ", agg.grouping.join(", "))?;
                } else if !agg.grouping.is_empty() {
                    write!(f, " by ({}) ", agg.grouping.join(", "))?;
                }
                write!(f, "({})", agg.expr)
            }
            Self::Call(call) => {
                write!(f, "{}(", call.func)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Binary(bin) => {
                let modifier = if bin.return_bool { " bool" } else { "" };
                write!(f, "{} {}{} {}", bin.lhs, bin.op, modifier, bin.rhs)
            }
            Self::Paren(inner) => write!(f, "({inner})"),
            Self::Number(value) => fmt_number(*value, f),
            Self::Vector(selector) => write!(f, "{selector}"),
            Self::Matrix(selector) => write!(f, "{selector}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(name: &str, matchers: Vec<Matcher>) -> VectorSelector {
        VectorSelector {
            name: name.to_string(),
            matchers,
            offset: Duration::ZERO,
        }
    }

    #[test]
    fn vector_selector_sorts_matchers_and_hides_name() {
        let s = selector(
            "http_requests_total",
            vec![
                Matcher::equal("job", "api"),
                Matcher::new(MatchType::Regex, "code", "5..").unwrap(),
                Matcher::equal(METRIC_NAME_LABEL, "http_requests_total"),
            ],
        );
        assert_eq!(s.to_string(), r#"http_requests_total{code=~"5..",job="api"}"#);
    }

    #[test]
    fn vector_selector_without_labels_prints_bare_name() {
        let s = selector("up", vec![Matcher::equal(METRIC_NAME_LABEL, "up")]);
        assert_eq!(s.to_string(), "up");
    }

    #[test]
    fn foreign_name_matcher_is_kept() {
        let s = selector("up", vec![Matcher::equal(METRIC_NAME_LABEL, "down")]);
        assert_eq!(s.to_string(), r#"up{__name__="down"}"#);
    }

    #[test]
    fn matrix_selector_prints_range_then_offset() {
        let mut s = selector("up", vec![]);
        s.offset = Duration::from_secs(60);
        let m = MatrixSelector {
            selector: s,
            range: Duration::from_secs(300),
        };
        assert_eq!(m.to_string(), "up[5m] offset 1m");
    }

    #[test]
    fn aggregate_prints_grouping() {
        let inner = Expr::Vector(selector("up", vec![]));
        let grouped = Expr::Aggregate(AggregateExpr {
            op: "sum".to_string(),
            grouping: vec!["handler".to_string(), "job".to_string()],
            without: false,
            expr: Box::new(inner.clone()),
        });
        assert_eq!(grouped.to_string(), "sum by (handler, job) (up)");

        let plain = Expr::Aggregate(AggregateExpr {
            op: "sum".to_string(),
            grouping: vec![],
            without: false,
            expr: Box::new(inner),
        });
        assert_eq!(plain.to_string(), "sum(up)");
    }

    #[test]
    fn numbers_use_shortest_representation() {
        assert_eq!(Expr::Number(0.995).to_string(), "0.995");
        assert_eq!(Expr::Number(1.0).to_string(), "1");
        assert_eq!(Expr::Number(2_419_200.0).to_string(), "2419200");
        assert_eq!(Expr::Number(f64::INFINITY).to_string(), "+Inf");
    }

    #[test]
    fn binary_with_bool_modifier() {
        let expr = Expr::Binary(Box::new(BinaryExpr {
            op: BinaryOp::Gtr,
            lhs: Expr::Vector(selector("up", vec![])),
            rhs: Expr::Number(0.0),
            return_bool: true,
        }));
        assert_eq!(expr.to_string(), "up > bool 0");
    }
}
