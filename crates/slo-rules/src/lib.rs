//! Service level objective rule compiler.
//!
//! `slo-rules` turns a service level objective into Prometheus recording and
//! alerting rules following the multi-window multi-burn-rate method.
//!
//! # Features
//!
//! - **Four indicator kinds**: request ratios, classic and native histogram
//!   latency, and boolean gauges
//! - **Alerting tiers**: short and long windows scaled from a 28 day reference
//! - **Deterministic output**: identical objectives produce identical rule text
//! - **Prometheus 3 migration**: integer `le` matchers also match float buckets
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use slo_rules::{compile, parse_metric_selector, GenerationOptions, Indicator, Objective};
//!
//! let indicator = Indicator::Ratio {
//!     errors: parse_metric_selector(r#"http_requests_total{job="app",code=~"5.."}"#).unwrap(),
//!     total: parse_metric_selector(r#"http_requests_total{job="app"}"#).unwrap(),
//! };
//! let objective = Objective::builder("http-errors", 0.995, Duration::from_secs(28 * 86_400), indicator)
//!     .build()
//!     .unwrap();
//!
//! let rules = compile(&objective, &GenerationOptions::default()).unwrap();
//! assert_eq!(rules.burnrates.alerts().count(), 4);
//! assert_eq!(
//!     rules.burnrates.rules[0].expr,
//!     r#"sum(rate(http_requests_total{code=~"5..",job="app"}[5m])) / sum(rate(http_requests_total{job="app"}[5m]))"#,
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod compat;
pub mod compile;
pub mod duration;
pub mod error;
pub mod matcher;
pub mod naming;
pub mod promql;
pub mod rules;
pub mod types;
pub mod window;

// Re-export main types at crate root
pub use compat::{convert_le_matcher, convert_le_matchers, format_bucket_bound};
pub use compile::{CompiledRules, compile};
pub use duration::{format_duration, parse_duration};
pub use error::{Result, RuleError};
pub use matcher::{MatchType, Matcher};
pub use rules::{Rule, RuleFile, RuleGroup};
pub use types::{
    Alerting, BurnRateType, DEFAULT_PROPAGATION_PREFIX, GenerationOptions, Indicator, IndicatorKind, Labels,
    Metric, Objective, ObjectiveBuilder,
};
pub use window::{MIN_WINDOW, Severity, Window, WindowPlanner, burnrates_from_windows, windows};

use matcher::METRIC_NAME_LABEL;

/// Parses a metric selector such as `http_requests_total{job="api"}` or
/// `{__name__="up",job="api"}`.
///
/// # Errors
///
/// Returns `RuleError::InvalidSelector` if the text is not a single vector
/// selector.
pub fn parse_metric_selector(selector: &str) -> Result<Metric> {
    let parsed = promql::parse_selector(selector).map_err(|e| RuleError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })?;

    let name = if parsed.name.is_empty() {
        parsed
            .matchers
            .iter()
            .find(|m| m.name() == METRIC_NAME_LABEL && m.match_type() == MatchType::Equal)
            .map(|m| m.value().to_string())
            .unwrap_or_default()
    } else {
        parsed.name
    };

    Ok(Metric::new(name, parsed.matchers).with_offset(parsed.offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_selector() {
        let metric = parse_metric_selector(r#"http_requests_total{job="app",code=~"5.."}"#).unwrap();
        assert_eq!(metric.name(), "http_requests_total");
        assert_eq!(metric.matchers().len(), 3);
        assert_eq!(metric.label_matchers().count(), 2);
    }

    #[test]
    fn takes_name_from_name_matcher() {
        let metric = parse_metric_selector(r#"{__name__="up",job="app"}"#).unwrap();
        assert_eq!(metric.name(), "up");
        assert_eq!(metric.matchers().len(), 2);
    }

    #[test]
    fn keeps_offset() {
        let metric = parse_metric_selector("up offset 5m").unwrap();
        assert_eq!(metric.offset(), std::time::Duration::from_secs(300));
    }

    #[test]
    fn rejects_expressions() {
        for input in ["sum(up)", "up{job=}", "", "up[5m]"] {
            let err = parse_metric_selector(input).unwrap_err();
            assert!(matches!(err, RuleError::InvalidSelector { .. }), "{input}");
        }
    }
}
