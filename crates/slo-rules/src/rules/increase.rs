//! Increase rules over the full objective window and absent-metric alerts.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::compat::{convert_le_matchers, format_bucket_bound};
use crate::duration::format_duration;
use crate::error::Result;
use crate::matcher::{BUCKET_LABEL, MatchType, Matcher};
use crate::naming::{count_name, increase_name, sum_name};
use crate::promql::{Replacer, Template};
use crate::types::{GenerationOptions, Indicator, Objective};
use crate::window::Severity;

use super::group::{Rule, RuleGroup, add_equal_matchers, common_annotations, common_labels};
use super::{remove_grouped, render, sorted_labels};

/// Alert raised when an indicator metric has no series.
pub const ABSENT_ALERT_NAME: &str = "SLOMetricAbsent";

pub(super) static INCREASE: Template =
    Template::new(r#"sum by (grouping) (increase(metric{matchers="total"}[1s]))"#);
static COUNT_OVER_TIME: Template =
    Template::new(r#"sum by (grouping) (count_over_time(metric{matchers="total"}[1s]))"#);
static SUM_OVER_TIME: Template =
    Template::new(r#"sum by (grouping) (sum_over_time(metric{matchers="total"}[1s]))"#);
static NATIVE_COUNT: Template =
    Template::new(r#"histogram_count(sum(increase(metric{matchers="total"}[1s])))"#);
static NATIVE_SUCCESS: Template = Template::new(
    r#"histogram_fraction(0, 0.696969, sum(increase(metric{matchers="total"}[1s]))) * histogram_count(sum(increase(metric{matchers="total"}[1s])))"#,
);
static ABSENT: Template = Template::new(r#"absent(metric{matchers="total"}) == 1"#);

const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// Builds the `<name>-increase` group.
///
/// Every indicator metric gets an increase (or count/sum) recording rule over
/// the objective window, plus an absent alert when enabled.
pub fn increase_rules(objective: &Objective, options: &GenerationOptions) -> Result<RuleGroup> {
    let window = objective.window();
    let prefix = options.propagation_prefix.as_str();
    let tiers = options.window_planner.windows(window);
    let absent = AbsentAlerts {
        enabled: objective.alerting().absent,
        for_duration: format_duration(tiers[0].for_duration),
        annotations: common_annotations(objective, prefix),
    };

    let mut rules = Vec::new();
    match objective.indicator() {
        Indicator::Ratio { errors, total } => {
            let grouping = increase_grouping(objective, errors.matchers(), total.matchers());
            let labels = rule_labels(objective, prefix, total.matchers(), &grouping);

            rules.push(increase_record(total.name(), total.matchers(), &grouping, window, &labels)?);
            absent.push(&mut rules, total.name(), total.matchers(), &labels)?;

            if errors.name() != total.name() {
                rules.push(increase_record(errors.name(), errors.matchers(), &grouping, window, &labels)?);
                absent.push(&mut rules, errors.name(), errors.matchers(), &labels)?;
            }
        }
        Indicator::Latency { success, total } => {
            let grouping = increase_grouping(objective, success.matchers(), total.matchers());
            let labels = rule_labels(objective, prefix, total.matchers(), &grouping);
            let success_matchers = convert_le_matchers(success.matchers(), options);

            let le = success
                .matchers()
                .iter()
                .find(|m| m.name() == BUCKET_LABEL)
                .map(|m| m.value().to_string())
                .unwrap_or_default();
            let mut success_labels = labels.clone();
            success_labels.insert(BUCKET_LABEL.to_string(), le);

            rules.push(increase_record(total.name(), total.matchers(), &grouping, window, &labels)?);
            rules.push(increase_record(
                success.name(),
                &success_matchers,
                &grouping,
                window,
                &success_labels,
            )?);
            absent.push(&mut rules, total.name(), total.matchers(), &labels)?;
            absent.push(&mut rules, success.name(), &success_matchers, &success_labels)?;
        }
        Indicator::LatencyNative { latency, total } => {
            let mut labels = common_labels(objective, prefix);
            add_equal_matchers(&mut labels, total.matchers());
            let name = increase_name(total.name(), window);

            let count = render(
                &NATIVE_COUNT,
                &Replacer {
                    metric: total.name(),
                    matchers: total.matchers(),
                    window: Some(window),
                    ..Replacer::default()
                },
            )?;
            rules.push(Rule::record(name.clone(), count, labels.clone()));

            let seconds = latency.as_secs_f64();
            let success = render(
                &NATIVE_SUCCESS,
                &Replacer {
                    metric: total.name(),
                    matchers: total.matchers(),
                    window: Some(window),
                    target: Some(seconds),
                    ..Replacer::default()
                },
            )?;
            let mut success_labels = labels.clone();
            success_labels.insert(BUCKET_LABEL.to_string(), format_bucket_bound(seconds));
            rules.push(Rule::record(name, success, success_labels));

            absent.push(&mut rules, total.name(), total.matchers(), &labels)?;
        }
        Indicator::BoolGauge { metric } => {
            let grouping = sorted_labels(
                objective
                    .grouping()
                    .iter()
                    .map(String::as_str)
                    .chain(metric.label_matchers().map(Matcher::name)),
            );
            let labels = rule_labels(objective, prefix, metric.matchers(), &grouping);
            let replacer = Replacer {
                metric: metric.name(),
                matchers: metric.matchers(),
                grouping: &grouping,
                window: Some(window),
                ..Replacer::default()
            };

            rules.push(Rule::record(
                count_name(metric.name(), window),
                render(&COUNT_OVER_TIME, &replacer)?,
                labels.clone(),
            ));
            rules.push(Rule::record(
                sum_name(metric.name(), window),
                render(&SUM_OVER_TIME, &replacer)?,
                labels.clone(),
            ));
            absent.push(&mut rules, metric.name(), metric.matchers(), &labels)?;
        }
    }

    Ok(RuleGroup::new(
        format!("{}-increase", objective.name()),
        format_duration(increase_interval(window)),
        rules,
    ))
}

/// Evaluation interval of the increase group: 30s below one week, 30s more
/// per started week, at most 4m.
#[must_use]
pub fn increase_interval(window: Duration) -> Duration {
    if window < WEEK {
        return Duration::from_secs(30);
    }
    let weeks = window.as_secs() / WEEK.as_secs();
    Duration::from_secs((30 * (weeks + 1)).min(240))
}

/// Configured grouping, labels only the error matchers select on (never
/// `le`), and labels the total selects by regex.
fn increase_grouping(objective: &Objective, errors: &[Matcher], total: &[Matcher]) -> Vec<String> {
    let error_only = errors
        .iter()
        .map(Matcher::name)
        .filter(|name| *name != BUCKET_LABEL && !total.iter().any(|t| t.name() == *name));
    let regex = total
        .iter()
        .filter(|m| matches!(m.match_type(), MatchType::Regex | MatchType::NotRegex))
        .map(Matcher::name);

    sorted_labels(
        objective
            .grouping()
            .iter()
            .map(String::as_str)
            .chain(error_only)
            .chain(regex),
    )
}

fn rule_labels(
    objective: &Objective,
    prefix: &str,
    matchers: &[Matcher],
    grouping: &[String],
) -> BTreeMap<String, String> {
    let mut labels = common_labels(objective, prefix);
    add_equal_matchers(&mut labels, matchers);
    remove_grouped(&mut labels, grouping);
    labels
}

fn increase_record(
    metric: &str,
    matchers: &[Matcher],
    grouping: &[String],
    window: Duration,
    labels: &BTreeMap<String, String>,
) -> Result<Rule> {
    let expr = render(
        &INCREASE,
        &Replacer {
            metric,
            matchers,
            grouping,
            window: Some(window),
            ..Replacer::default()
        },
    )?;
    Ok(Rule::record(increase_name(metric, window), expr, labels.clone()))
}

struct AbsentAlerts {
    enabled: bool,
    for_duration: String,
    annotations: BTreeMap<String, String>,
}

impl AbsentAlerts {
    fn push(
        &self,
        rules: &mut Vec<Rule>,
        metric: &str,
        matchers: &[Matcher],
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let expr = render(
            &ABSENT,
            &Replacer {
                metric,
                matchers,
                ..Replacer::default()
            },
        )?;
        let mut labels = labels.clone();
        labels.insert("severity".to_string(), Severity::Critical.to_string());
        rules.push(Rule::alert(
            ABSENT_ALERT_NAME,
            expr,
            self.for_duration.clone(),
            labels,
            self.annotations.clone(),
        ));
        Ok(())
    }
}
