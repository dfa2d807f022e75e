//! Indicator-agnostic series shared by every objective.
//!
//! Dashboards can chart `pyrra_availability`, `pyrra_requests:rate5m` and
//! `pyrra_errors:rate5m` without knowing which indicator an objective uses.
//! The availability reads the increase series, so it costs one lookup per
//! evaluation.

use crate::compat::{convert_le_matchers, format_bucket_bound};
use crate::error::{Result, RuleError};
use crate::matcher::{BUCKET_LABEL, METRIC_NAME_LABEL, Matcher};
use crate::naming::{count_name, increase_name, sum_name};
use crate::promql::{Replacer, Template};
use crate::types::{GenerationOptions, Indicator, Objective};

use super::group::{Rule, RuleGroup, common_labels};
use super::{render, with_slo_matcher};

/// Objective target.
pub const OBJECTIVE_RECORD: &str = "pyrra_objective";
/// Objective window in seconds.
pub const WINDOW_RECORD: &str = "pyrra_window";
/// Availability over the objective window.
pub const AVAILABILITY_RECORD: &str = "pyrra_availability";
/// Request rate.
pub const REQUESTS_RECORD: &str = "pyrra_requests:rate5m";
/// Error rate.
pub const ERRORS_RECORD: &str = "pyrra_errors:rate5m";

const INTERVAL: &str = "30s";

static RATIO_AVAILABILITY: Template = Template::new(
    r#"1 - sum(errorMetric{matchers="errors"} or vector(0)) / sum(metric{matchers="total"})"#,
);
static SUCCESS_AVAILABILITY: Template = Template::new(
    r#"sum(errorMetric{matchers="errors"} or vector(0)) / sum(metric{matchers="total"})"#,
);
static NATIVE_AVAILABILITY: Template =
    Template::new(r#"sum(metric{matchers="errors"} or vector(0)) / sum(metric{matchers="total"})"#);
static GAUGE_AVAILABILITY: Template =
    Template::new(r#"sum(errorMetric{matchers="errors"}) / sum(metric{matchers="total"})"#);

static RATE: Template = Template::new(r#"sum(rate(metric{matchers="total"}[5m]))"#);
static RATE_OR_ZERO: Template =
    Template::new(r#"sum(rate(metric{matchers="total"}[5m])) or vector(0)"#);
static RATE_DIFFERENCE: Template = Template::new(
    r#"sum(rate(metric{matchers="total"}[5m])) - sum(rate(errorMetric{matchers="errors"}[5m]))"#,
);
static NATIVE_RATE: Template =
    Template::new(r#"histogram_count(sum(rate(metric{matchers="total"}[5m])))"#);
static NATIVE_ERRORS: Template = Template::new(
    r#"histogram_count(sum(rate(metric{matchers="total"}[5m]))) * (1 - histogram_fraction(0, 0.696969, sum(rate(metric{matchers="total"}[5m]))))"#,
);
static GAUGE_SUM: Template = Template::new(r#"sum(metric{matchers="total"})"#);
static GAUGE_DIFFERENCE: Template =
    Template::new(r#"sum(metric{matchers="total"}) - sum(errorMetric{matchers="errors"})"#);

/// Builds the `<name>-generic` group.
///
/// # Errors
///
/// Returns [`RuleError::GroupingUnsupported`] for grouped objectives: the
/// generic series have no per-group form. Callers skip the group.
pub fn generic_rules(objective: &Objective, options: &GenerationOptions) -> Result<RuleGroup> {
    if !objective.grouping().is_empty() {
        return Err(RuleError::GroupingUnsupported);
    }

    let window = objective.window();
    let slo = objective.name();
    let labels = common_labels(objective, &options.propagation_prefix);

    let mut rules = vec![
        Rule::record(OBJECTIVE_RECORD, objective.target().to_string(), labels.clone()),
        Rule::record(WINDOW_RECORD, window.as_secs().to_string(), labels.clone()),
    ];

    let (availability, requests, errors) = match objective.indicator() {
        Indicator::Ratio { errors, total } => {
            let total_increase = increase_name(total.name(), window);
            let errors_increase = increase_name(errors.name(), window);
            let total_matchers = with_slo_matcher(total.matchers_renamed(&total_increase), slo);
            let error_matchers = with_slo_matcher(errors.matchers_renamed(&errors_increase), slo);

            let availability = render(
                &RATIO_AVAILABILITY,
                &Replacer {
                    metric: &total_increase,
                    matchers: &total_matchers,
                    error_metric: &errors_increase,
                    error_matchers: &error_matchers,
                    ..Replacer::default()
                },
            )?;
            let requests = render(&RATE, &total_replacer(total.name(), total.matchers()))?;
            let errors = render(&RATE_OR_ZERO, &total_replacer(errors.name(), errors.matchers()))?;
            (availability, requests, errors)
        }
        Indicator::Latency { success, total } => {
            let success_matchers = convert_le_matchers(success.matchers(), options);

            let total_increase = increase_name(total.name(), window);
            let success_increase = increase_name(success.name(), window);
            let mut total_matchers = renamed(total.matchers(), &total_increase);
            total_matchers.push(Matcher::equal(BUCKET_LABEL, ""));
            let total_matchers = with_slo_matcher(total_matchers, slo);
            let success_increase_matchers =
                with_slo_matcher(renamed(&success_matchers, &success_increase), slo);

            let availability = render(
                &SUCCESS_AVAILABILITY,
                &Replacer {
                    metric: &total_increase,
                    matchers: &total_matchers,
                    error_metric: &success_increase,
                    error_matchers: &success_increase_matchers,
                    ..Replacer::default()
                },
            )?;
            let requests = render(&RATE, &total_replacer(total.name(), total.matchers()))?;
            let errors = render(
                &RATE_DIFFERENCE,
                &Replacer {
                    metric: total.name(),
                    matchers: total.matchers(),
                    error_metric: success.name(),
                    error_matchers: &success_matchers,
                    ..Replacer::default()
                },
            )?;
            (availability, requests, errors)
        }
        Indicator::LatencyNative { latency, total } => {
            let seconds = latency.as_secs_f64();
            let total_increase = increase_name(total.name(), window);
            let base = with_slo_matcher(total.matchers_renamed(&total_increase), slo);

            let mut success_matchers = base.clone();
            success_matchers.push(Matcher::equal(BUCKET_LABEL, format_bucket_bound(seconds)));
            let mut total_matchers = base;
            total_matchers.push(Matcher::equal(BUCKET_LABEL, ""));

            let availability = render(
                &NATIVE_AVAILABILITY,
                &Replacer {
                    metric: &total_increase,
                    matchers: &total_matchers,
                    error_matchers: &success_matchers,
                    ..Replacer::default()
                },
            )?;
            let requests = render(&NATIVE_RATE, &total_replacer(total.name(), total.matchers()))?;
            let errors = render(
                &NATIVE_ERRORS,
                &Replacer {
                    target: Some(seconds),
                    ..total_replacer(total.name(), total.matchers())
                },
            )?;
            (availability, requests, errors)
        }
        Indicator::BoolGauge { metric } => {
            let count = count_name(metric.name(), window);
            let sum = sum_name(metric.name(), window);
            let count_matchers = with_slo_matcher(metric.matchers_renamed(&count), slo);
            let sum_matchers = with_slo_matcher(metric.matchers_renamed(&sum), slo);
            let replacer = Replacer {
                metric: &count,
                matchers: &count_matchers,
                error_metric: &sum,
                error_matchers: &sum_matchers,
                ..Replacer::default()
            };

            (
                render(&GAUGE_AVAILABILITY, &replacer)?,
                render(&GAUGE_SUM, &replacer)?,
                render(&GAUGE_DIFFERENCE, &replacer)?,
            )
        }
    };

    rules.push(Rule::record(AVAILABILITY_RECORD, availability, labels.clone()));
    rules.push(Rule::record(REQUESTS_RECORD, requests, labels.clone()));
    rules.push(Rule::record(ERRORS_RECORD, errors, labels));

    Ok(RuleGroup::new(format!("{slo}-generic"), INTERVAL, rules))
}

fn total_replacer<'a>(metric: &'a str, matchers: &'a [Matcher]) -> Replacer<'a> {
    Replacer {
        metric,
        matchers,
        ..Replacer::default()
    }
}

fn renamed(matchers: &[Matcher], metric: &str) -> Vec<Matcher> {
    matchers
        .iter()
        .map(|m| {
            if m.name() == METRIC_NAME_LABEL {
                Matcher::equal(METRIC_NAME_LABEL, metric)
            } else {
                m.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::matcher::MatchType;
    use crate::types::Metric;

    const FOUR_WEEKS: Duration = Duration::from_secs(28 * 24 * 3600);

    fn objective(indicator: Indicator) -> Objective {
        Objective::builder("svc", 0.995, FOUR_WEEKS, indicator)
            .label("pyrra.dev/team", "foo")
            .build()
            .unwrap()
    }

    fn exprs(group: &RuleGroup) -> Vec<(&str, &str)> {
        group
            .rules
            .iter()
            .filter_map(|r| r.record.as_deref().map(|name| (name, r.expr.as_str())))
            .collect()
    }

    #[test]
    fn ratio_generic_rules() {
        let indicator = Indicator::Ratio {
            errors: Metric::new(
                "http_requests_total",
                [
                    Matcher::equal("job", "app"),
                    Matcher::new(MatchType::Regex, "code", "5..").unwrap(),
                ],
            ),
            total: Metric::new("http_requests_total", [Matcher::equal("job", "app")]),
        };
        let group = generic_rules(&objective(indicator), &GenerationOptions::default()).unwrap();
        assert_eq!(group.name, "svc-generic");
        assert_eq!(group.interval.as_deref(), Some("30s"));
        assert_eq!(
            exprs(&group),
            [
                ("pyrra_objective", "0.995"),
                ("pyrra_window", "2419200"),
                (
                    "pyrra_availability",
                    r#"1 - sum(http_requests:increase4w{code=~"5..",job="app",slo="svc"} or vector(0)) / sum(http_requests:increase4w{job="app",slo="svc"})"#
                ),
                (
                    "pyrra_requests:rate5m",
                    r#"sum(rate(http_requests_total{job="app"}[5m]))"#
                ),
                (
                    "pyrra_errors:rate5m",
                    r#"sum(rate(http_requests_total{code=~"5..",job="app"}[5m])) or vector(0)"#
                ),
            ]
        );
        assert!(group.rules.iter().all(|r| r.labels["team"] == "foo"));
    }

    #[test]
    fn latency_generic_rules_apply_migration() {
        let indicator = Indicator::Latency {
            success: Metric::new(
                "http_request_duration_seconds_bucket",
                [Matcher::equal("job", "app"), Matcher::equal("le", "1")],
            ),
            total: Metric::new(
                "http_request_duration_seconds_count",
                [Matcher::equal("job", "app")],
            ),
        };
        let options = GenerationOptions {
            enable_prometheus3_migration: true,
            ..GenerationOptions::default()
        };
        let group = generic_rules(&objective(indicator), &options).unwrap();
        let exprs = exprs(&group);
        assert_eq!(
            exprs[2].1,
            r#"sum(http_request_duration_seconds:increase4w{job="app",le=~"1(\\.0)?",slo="svc"} or vector(0)) / sum(http_request_duration_seconds:increase4w{job="app",le="",slo="svc"})"#
        );
        assert_eq!(
            exprs[4].1,
            r#"sum(rate(http_request_duration_seconds_count{job="app"}[5m])) - sum(rate(http_request_duration_seconds_bucket{job="app",le=~"1(\\.0)?"}[5m]))"#
        );
    }

    #[test]
    fn latency_native_generic_rules() {
        let indicator = Indicator::LatencyNative {
            latency: Duration::from_secs(1),
            total: Metric::new("http_request_duration_seconds", [Matcher::equal("job", "app")]),
        };
        let group = generic_rules(&objective(indicator), &GenerationOptions::default()).unwrap();
        let exprs = exprs(&group);
        assert_eq!(
            exprs[2].1,
            r#"sum(http_request_duration_seconds:increase4w{job="app",le="1",slo="svc"} or vector(0)) / sum(http_request_duration_seconds:increase4w{job="app",le="",slo="svc"})"#
        );
        assert_eq!(
            exprs[3].1,
            r#"histogram_count(sum(rate(http_request_duration_seconds{job="app"}[5m])))"#
        );
        assert_eq!(
            exprs[4].1,
            r#"histogram_count(sum(rate(http_request_duration_seconds{job="app"}[5m]))) * (1 - histogram_fraction(0, 1, sum(rate(http_request_duration_seconds{job="app"}[5m]))))"#
        );
    }

    #[test]
    fn latency_native_small_bound_matches_increase_label() {
        let indicator = Indicator::LatencyNative {
            latency: Duration::from_micros(10),
            total: Metric::new("rpc_duration_seconds", [Matcher::equal("job", "app")]),
        };
        let group = generic_rules(&objective(indicator), &GenerationOptions::default()).unwrap();
        let exprs = exprs(&group);
        assert!(
            exprs[2].1.starts_with(r#"sum(rpc_duration_seconds:increase4w{job="app",le="1e-05",slo="svc"}"#),
            "{}",
            exprs[2].1
        );
    }

    #[test]
    fn bool_gauge_generic_rules() {
        let indicator = Indicator::BoolGauge {
            metric: Metric::new("check_success", [Matcher::equal("job", "uptime")]),
        };
        let group = generic_rules(&objective(indicator), &GenerationOptions::default()).unwrap();
        let exprs = exprs(&group);
        assert_eq!(
            exprs[2].1,
            r#"sum(check_success:sum4w{job="uptime",slo="svc"}) / sum(check_success:count4w{job="uptime",slo="svc"})"#
        );
        assert_eq!(exprs[3].1, r#"sum(check_success:count4w{job="uptime",slo="svc"})"#);
        assert_eq!(
            exprs[4].1,
            r#"sum(check_success:count4w{job="uptime",slo="svc"}) - sum(check_success:sum4w{job="uptime",slo="svc"})"#
        );
    }

    #[test]
    fn grouped_objectives_are_unsupported() {
        let indicator = Indicator::BoolGauge {
            metric: Metric::new("check_success", []),
        };
        let objective = Objective::builder("uptime", 0.99, FOUR_WEEKS, indicator)
            .grouping(["instance"])
            .build()
            .unwrap();
        let err = generic_rules(&objective, &GenerationOptions::default()).unwrap_err();
        assert!(err.is_unsupported());
    }
}
