//! Bounded change detection over a polled read.
//!
//! Two-phase state machine: acquire a baseline within `baseline_timeout`,
//! then watch for a differing value within `change_window`. Comparison is on
//! the signal's textual form — the contract is "the observed text changed",
//! so two formats of the same magnitude still count as a change. When the
//! window closes, exactly one more immediate read runs before concluding
//! "unchanged": the mutation may have landed in the gap between the last
//! poll and the deadline.

use super::context::Exclusion;
use super::read::{read_signal_now, ReadSpec};
use crate::signal::Signal;
use crate::view::{Query, ViewProvider};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Timing knobs for one observation. The monitored system's update cadence
/// is externally controlled, so all three are tunable.
#[derive(Debug, Clone)]
pub struct ObservePolicy {
    /// How long to wait for a baseline signal to exist at all.
    pub baseline_timeout: Duration,
    /// How long after the baseline a change still counts.
    pub change_window: Duration,
    /// Cadence of the light polling loop.
    pub poll_interval: Duration,
}

impl Default for ObservePolicy {
    fn default() -> Self {
        Self {
            baseline_timeout: Duration::from_secs(10),
            change_window: Duration::from_secs(40),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Terminal result of one observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A value differing from the baseline appeared within the window.
    Changed { baseline: Signal, current: Signal },
    /// The window closed (final re-read included) with only the baseline seen.
    Unchanged { baseline: Signal },
    /// No signal could be obtained within the baseline timeout.
    Unavailable,
}

/// Observation phases. Kept explicit so attempt accounting is inspectable
/// rather than buried in control flow.
enum ObserveState {
    AcquiringBaseline,
    Watching { baseline: Signal },
}

/// Poll `read` at a fixed cadence and classify what happened.
///
/// `read` is invoked once per poll; an absent result during the watch phase
/// is ignored (a transiently unreadable slot is not a change). Returns no
/// later than `baseline_timeout + change_window` plus one poll interval of
/// overrun.
pub async fn observe_change<F, Fut>(mut read: F, policy: &ObservePolicy) -> Outcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<Signal>>,
{
    let mut polls: u32 = 0;
    let mut state = ObserveState::AcquiringBaseline;
    let baseline_deadline = tokio::time::Instant::now() + policy.baseline_timeout;

    loop {
        state = match state {
            ObserveState::AcquiringBaseline => {
                polls += 1;
                match read().await {
                    Some(baseline) => {
                        debug!(%baseline, polls, "baseline acquired");
                        ObserveState::Watching { baseline }
                    }
                    None => {
                        if tokio::time::Instant::now() >= baseline_deadline {
                            debug!(polls, "no baseline within timeout");
                            return Outcome::Unavailable;
                        }
                        tokio::time::sleep(policy.poll_interval).await;
                        ObserveState::AcquiringBaseline
                    }
                }
            }
            ObserveState::Watching { baseline } => {
                let watch_deadline = tokio::time::Instant::now() + policy.change_window;
                loop {
                    if tokio::time::Instant::now() >= watch_deadline {
                        // One last immediate read: the change may have landed
                        // between the final poll and the deadline.
                        polls += 1;
                        if let Some(current) = read().await {
                            if current.text != baseline.text {
                                debug!(%baseline, %current, polls, "changed on final re-read");
                                return Outcome::Changed { baseline, current };
                            }
                        }
                        debug!(%baseline, polls, "window closed without change");
                        return Outcome::Unchanged { baseline };
                    }

                    tokio::time::sleep(policy.poll_interval).await;
                    polls += 1;
                    if let Some(current) = read().await {
                        if current.text != baseline.text {
                            debug!(%baseline, %current, polls, "change observed");
                            return Outcome::Changed { baseline, current };
                        }
                    }
                }
            }
        }
    }
}

/// Observe the first matching slot in the view for a signal change.
///
/// Wires [`observe_change`] to [`read_signal_now`]: the slot is positional
/// (first visible, non-excluded candidate), re-resolved on every poll. A
/// provider failure mid-poll is logged and treated as an absent read so a
/// single hiccup cannot abort the whole observation.
pub async fn observe_signal_change(
    view: &dyn ViewProvider,
    query: &Query,
    spec: &ReadSpec,
    exclusion: Option<&Exclusion>,
    policy: &ObservePolicy,
) -> Outcome {
    observe_change(
        || async {
            match read_signal_now(view, query, spec, exclusion).await {
                Ok(sig) => sig,
                Err(e) => {
                    warn!(error = %e, "read failed mid-poll; treating as absent");
                    None
                }
            }
        },
        policy,
    )
    .await
}
