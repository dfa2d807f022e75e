//! Multi-window multi-burn-rate tiers.
//!
//! Each objective gets four alerting tiers. Their windows are fixed ratios of
//! a 28 day reference period scaled to the objective window, so a 28d
//! objective alerts on 5m/1h, 30m/6h, 2h/1d and 6h/4d.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Alert severity of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Pages someone.
    Critical,
    /// Opens a ticket.
    Warning,
}

impl Severity {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alerting tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    /// Alert severity.
    pub severity: Severity,
    /// How long both conditions must hold before the alert fires.
    pub for_duration: Duration,
    /// The long burn-rate window.
    pub long: Duration,
    /// The short burn-rate window.
    pub short: Duration,
    /// Burn-rate multiple of the error budget that triggers the alert.
    pub factor: f64,
    /// Share of the error budget a dynamic alert lets the long window burn.
    pub budget_fraction: f64,
}

impl Window {
    /// Returns true if the short window is non-empty and below the long window.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        !self.short.is_zero() && self.short < self.long
    }
}

/// Shortest objective window accepted.
///
/// From here on every tier keeps a non-empty short window below its long
/// window, even after rounding to one millisecond.
pub const MIN_WINDOW: Duration = Duration::from_secs(60);

/// Divisors applied to the objective window, per tier: (for, long, short),
/// followed by the static factor and the dynamic budget fraction.
///
/// A 28d window divided by these gives the reference values, e.g.
/// 28d / 8064 = 5m. The budget fractions burn half the budget per day in the
/// first tier, all of it in four days in the second, then 1/14 per day and
/// 1/7 per four days.
const TIERS: [(Severity, u32, u32, u32, f64, f64); 4] = [
    (Severity::Critical, 28 * 24 * 30, 28 * 24, 28 * 24 * 12, 14.0, 1.0 / 48.0),
    (Severity::Critical, 28 * 24 * 4, 28 * 4, 28 * 24 * 2, 7.0, 1.0 / 16.0),
    (Severity::Warning, 28 * 24, 28, 28 * 12, 2.0, 1.0 / 14.0),
    (Severity::Warning, 28 * 8, 7, 28 * 4, 1.0, 1.0 / 7.0),
];

/// Derives alerting tiers from an objective window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlanner {
    round: Duration,
}

impl Default for WindowPlanner {
    fn default() -> Self {
        Self {
            round: Duration::from_secs(60),
        }
    }
}

impl WindowPlanner {
    /// Creates a planner rounding to the given unit. A zero unit disables rounding.
    #[must_use]
    pub const fn new(round: Duration) -> Self {
        Self { round }
    }

    /// The rounding unit.
    #[must_use]
    pub const fn round(&self) -> Duration {
        self.round
    }

    /// Returns the four tiers for the objective window.
    ///
    /// When rounding to the configured unit would leave a tier with an empty
    /// short window or a short window not shorter than its long window, finer
    /// units (one second, then one millisecond) are tried. Windows below
    /// [`MIN_WINDOW`] may still collapse, see [`checked_windows`](Self::checked_windows).
    #[must_use]
    pub fn windows(&self, slo_window: Duration) -> [Window; 4] {
        let mut candidates = vec![self.round];
        for finer in [Duration::from_secs(1), Duration::from_millis(1)] {
            if !self.round.is_zero() && finer < self.round {
                candidates.push(finer);
            }
        }

        let mut planned = plan(slo_window, self.round);
        for unit in candidates {
            planned = plan(slo_window, unit);
            if planned.iter().all(Window::is_ordered) {
                break;
            }
        }
        planned
    }

    /// Like [`windows`](Self::windows), but `None` if any tier collapsed.
    #[must_use]
    pub fn checked_windows(&self, slo_window: Duration) -> Option<[Window; 4]> {
        let planned = self.windows(slo_window);
        planned.iter().all(Window::is_ordered).then_some(planned)
    }
}

fn plan(slo_window: Duration, unit: Duration) -> [Window; 4] {
    let nanos = slo_window.as_nanos();
    TIERS.map(
        |(severity, for_div, long_div, short_div, factor, budget_fraction)| Window {
            severity,
            for_duration: round_to(nanos / u128::from(for_div), unit),
            long: round_to(nanos / u128::from(long_div), unit),
            short: round_to(nanos / u128::from(short_div), unit),
            factor,
            budget_fraction,
        },
    )
}

/// Rounds to the nearest multiple of `unit`, halfway values away from zero.
fn round_to(nanos: u128, unit: Duration) -> Duration {
    let unit = unit.as_nanos();
    let rounded = if unit == 0 {
        nanos
    } else {
        let remainder = nanos % unit;
        if remainder * 2 >= unit {
            nanos - remainder + unit
        } else {
            nanos - remainder
        }
    };
    from_nanos(rounded)
}

fn from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % 1_000_000_000) as u32)
}

/// Tiers for the objective window rounded to the minute.
#[must_use]
pub fn windows(slo_window: Duration) -> [Window; 4] {
    WindowPlanner::default().windows(slo_window)
}

/// Distinct short and long windows across all tiers, ascending.
///
/// One burn-rate recording rule exists per returned duration.
#[must_use]
pub fn burnrates_from_windows(windows: &[Window]) -> Vec<Duration> {
    let mut burnrates: Vec<Duration> = windows.iter().flat_map(|w| [w.short, w.long]).collect();
    burnrates.sort();
    burnrates.dedup();
    burnrates
}
