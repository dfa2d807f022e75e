//! Burn-rate recording rules and multi-window multi-burn-rate alerts.
//!
//! One recording rule exists per distinct short or long window of the four
//! tiers. Each tier then alerts when both its short and long burn rate exceed
//! `factor * (1 - target)`.
//!
//! Ratio objectives with dynamic burn rates compare the error ratio of each
//! window against `(N_slo / N_window) * budget_fraction * (1 - target)`
//! instead, where `N` is the request count over the objective window and the
//! alert window. Quiet windows therefore need a higher error ratio to alert.
//! The other indicators keep static thresholds.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::compat::convert_le_matchers;
use crate::duration::format_duration;
use crate::error::Result;
use crate::matcher::{METRIC_NAME_LABEL, Matcher};
use crate::naming::burnrate_name;
use crate::promql::{Replacer, Template};
use crate::types::{BurnRateType, GenerationOptions, Indicator, Objective};
use crate::window::{Window, burnrates_from_windows};

use super::group::{
    Rule, RuleGroup, SLO_LABEL, add_equal_matchers, common_annotations, common_labels,
};
use super::increase::INCREASE;
use super::{remove_grouped, render};

/// Alert raised when the error budget burns too fast.
pub const BURNRATE_ALERT_NAME: &str = "ErrorBudgetBurn";

const INTERVAL: &str = "30s";

static RATIO: Template = Template::new(
    r#"sum by (grouping) (rate(errorMetric{matchers="errors"}[1s])) / sum by (grouping) (rate(metric{matchers="total"}[1s]))"#,
);
static LATENCY: Template = Template::new(
    r#"sum by (grouping) (rate(metric{matchers="total"}[1s])) - sum by (grouping) (rate(errorMetric{matchers="errors"}[1s]))"#,
);
static LATENCY_NATIVE: Template = Template::new(
    r#"1 - histogram_fraction(0, 0.696969, sum by (grouping) (rate(metric{matchers="total"}[1s])))"#,
);
static BOOL_GAUGE: Template = Template::new(
    r#"
    (
      sum by (grouping) (count_over_time(metric{matchers="total"}[1s]))
      -
      sum by (grouping) (sum_over_time(metric{matchers="total"}[1s]))
    )
    /
    sum by (grouping) (count_over_time(metric{matchers="total"}[1s]))
    "#,
);

/// Builds the burn-rate group, named after the objective.
///
/// With `alerting.burnrates` disabled only the recording rules are emitted.
pub fn burnrate_rules(objective: &Objective, options: &GenerationOptions) -> Result<RuleGroup> {
    let tiers = options.window_planner.windows(objective.window());
    let total = objective.indicator().total();
    let prefix = options.propagation_prefix.as_str();

    let mut labels = common_labels(objective, prefix);
    add_equal_matchers(&mut labels, total.matchers());
    remove_grouped(&mut labels, objective.grouping());

    let mut rules = Vec::new();
    for window in burnrates_from_windows(&tiers) {
        rules.push(Rule::record(
            burnrate_name(total.name(), window),
            burnrate_expr(objective, options, window)?,
            labels.clone(),
        ));
    }

    if objective.alerting().burnrates {
        let selector = alert_selector(objective);
        let annotations = common_annotations(objective, prefix);
        for tier in &tiers {
            rules.push(alert(objective, options, tier, &selector, &labels, &annotations)?);
        }
    }

    Ok(RuleGroup::new(objective.name(), INTERVAL, rules))
}

/// The burn-rate expression of the objective over one window.
pub fn burnrate_expr(
    objective: &Objective,
    options: &GenerationOptions,
    window: Duration,
) -> Result<String> {
    let grouping = objective.grouping();
    match objective.indicator() {
        Indicator::Ratio { errors, total } => render(
            &RATIO,
            &Replacer {
                metric: total.name(),
                matchers: total.matchers(),
                error_metric: errors.name(),
                error_matchers: errors.matchers(),
                grouping,
                window: Some(window),
                target: None,
            },
        ),
        Indicator::Latency { success, total } => {
            let success_matchers = convert_le_matchers(success.matchers(), options);
            render(
                &LATENCY,
                &Replacer {
                    metric: total.name(),
                    matchers: total.matchers(),
                    error_metric: success.name(),
                    error_matchers: &success_matchers,
                    grouping,
                    window: Some(window),
                    target: None,
                },
            )
        }
        Indicator::LatencyNative { latency, total } => render(
            &LATENCY_NATIVE,
            &Replacer {
                metric: total.name(),
                matchers: total.matchers(),
                grouping,
                window: Some(window),
                target: Some(latency.as_secs_f64()),
                ..Replacer::default()
            },
        ),
        Indicator::BoolGauge { metric } => render(
            &BOOL_GAUGE,
            &Replacer {
                metric: metric.name(),
                matchers: metric.matchers(),
                grouping,
                window: Some(window),
                ..Replacer::default()
            },
        ),
    }
}

/// Selector the alerts apply to the burn-rate series.
///
/// Regex matchers are only kept for grouped labels: for any other label the
/// recorded series no longer carries it.
fn alert_selector(objective: &Objective) -> String {
    let mut matchers: Vec<String> = objective
        .indicator()
        .total()
        .matchers()
        .iter()
        .filter(|m| m.name() != METRIC_NAME_LABEL)
        .filter(|m| !m.match_type().is_regex() || objective.is_grouped_by(m.name()))
        .map(ToString::to_string)
        .collect();
    matchers.push(Matcher::equal(SLO_LABEL, objective.name()).to_string());
    matchers.sort();
    matchers.join(",")
}

/// The alert condition of one tier.
pub fn alert_expr(
    objective: &Objective,
    options: &GenerationOptions,
    tier: &Window,
    selector: &str,
) -> Result<String> {
    let dynamic = objective.alerting().burn_rate_type == BurnRateType::Dynamic;
    match objective.indicator() {
        Indicator::Ratio { total, .. } if dynamic => {
            let target = objective.target();
            let budget = tier.budget_fraction;
            let increase = |window: Duration| {
                render(
                    &INCREASE,
                    &Replacer {
                        metric: total.name(),
                        matchers: total.matchers(),
                        grouping: objective.grouping(),
                        window: Some(window),
                        ..Replacer::default()
                    },
                )
            };
            let slo_total = increase(objective.window())?;

            let mut conditions = Vec::with_capacity(2);
            for window in [tier.short, tier.long] {
                let ratio = burnrate_expr(objective, options, window)?;
                let window_total = increase(window)?;
                conditions.push(format!(
                    "(({ratio}) > ({slo_total} / {window_total} * {budget:.6} * (1-{target})))"
                ));
            }
            Ok(conditions.join(" and "))
        }
        _ => Ok(static_alert_expr(objective, tier, selector)),
    }
}

fn static_alert_expr(objective: &Objective, tier: &Window, selector: &str) -> String {
    let total = objective.indicator().total();
    let target = objective.target();
    let factor = tier.factor;
    let short = burnrate_name(total.name(), tier.short);
    let long = burnrate_name(total.name(), tier.long);
    format!(
        "{short}{{{selector}}} > ({factor:.0} * (1-{target})) and {long}{{{selector}}} > ({factor:.0} * (1-{target}))"
    )
}

fn alert(
    objective: &Objective,
    options: &GenerationOptions,
    tier: &Window,
    selector: &str,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Result<Rule> {
    let expr = alert_expr(objective, options, tier, selector)?;
    let factor = tier.factor;

    let mut labels = labels.clone();
    labels.insert("short".to_string(), format_duration(tier.short));
    labels.insert("long".to_string(), format_duration(tier.long));
    labels.insert("severity".to_string(), tier.severity.to_string());
    labels.insert(
        "exhaustion".to_string(),
        format_duration(objective.window().div_f64(factor)),
    );

    let mut annotations = annotations.clone();
    annotations.insert("severity".to_string(), tier.severity.to_string());

    Ok(Rule::alert(
        BURNRATE_ALERT_NAME,
        expr,
        format_duration(tier.for_duration),
        labels,
        annotations,
    ))
}
