//! Element location over the view capability.
//!
//! Two modes, per the engine's needs: `wait_present` blocks (bounded) for
//! one-shot gating, while `find_first_visible` re-enumerates the live list on
//! every poll so a stale candidate never wedges the scan. The
//! first-even-if-invisible fallback is deliberate: when visibility detection
//! itself is unreliable on a mutating page, degrading to a best-effort
//! candidate beats stalling.

use super::ProbeError;
use crate::view::{Query, ViewHandle, ViewProvider};
use std::time::Duration;
use tracing::debug;

/// How often the visibility scan re-runs the lookup.
const SCAN_POLL: Duration = Duration::from_millis(250);

/// What to do when no candidate is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Return the first candidate even if invisible; downstream retry copes.
    #[default]
    PreferVisible,
    /// Keep polling for a visible candidate until the deadline.
    VisibleOnly,
}

/// Wait until at least one node matches `query`, returning the first.
pub async fn wait_present(
    view: &dyn ViewProvider,
    query: &Query,
    timeout: Duration,
) -> Result<Box<dyn ViewHandle>, ProbeError> {
    view.wait_for_presence(query, timeout)
        .await
        .map_err(|e| match e {
            crate::view::ViewError::Timeout(d) => ProbeError::Timeout(d),
            other => ProbeError::View(other),
        })
}

/// Return the first visible node matching `query`, re-enumerating on every
/// poll. Staleness of any single candidate is absorbed; the scan moves on.
///
/// With [`FallbackPolicy::PreferVisible`], one complete visibility pass over
/// a non-empty candidate list with no visible hit yields the first candidate
/// immediately — degrading to a best-effort candidate beats stalling out the
/// lookup budget. Polling until the deadline is reserved for empty lookups
/// and [`FallbackPolicy::VisibleOnly`].
pub async fn find_first_visible(
    view: &dyn ViewProvider,
    query: &Query,
    timeout: Duration,
    policy: FallbackPolicy,
) -> Result<Box<dyn ViewHandle>, ProbeError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let mut candidates = view.locate(query).await?;
        let total = candidates.len();
        let mut visible_at = None;

        for (i, candidate) in candidates.iter().enumerate() {
            match candidate.is_visible().await {
                Ok(true) => {
                    visible_at = Some(i);
                    break;
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => {
                    debug!(%query, index = i, "candidate went stale during visibility scan");
                }
                Err(e) => return Err(ProbeError::View(e)),
            }
        }

        if let Some(i) = visible_at {
            return Ok(candidates.swap_remove(i));
        }

        if total > 0 && policy == FallbackPolicy::PreferVisible {
            debug!(%query, total, "no visible candidate; falling back to first");
            return Ok(candidates.remove(0));
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(ProbeError::Timeout(timeout));
        }
        tokio::time::sleep(SCAN_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::fake::{FakeNode, FakeView};

    fn view_with_picks(visibilities: &[bool]) -> FakeView {
        let view = FakeView::new();
        for (i, &visible) in visibilities.iter().enumerate() {
            let pick = FakeNode::new("ms-event-pick");
            pick.set_text(format!("pick-{i}"));
            pick.set_visible(visible);
            view.add_root(pick);
        }
        view
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_visible_skips_hidden() {
        let view = view_with_picks(&[false, true, true]);
        let handle = find_first_visible(
            &view,
            &Query::css("ms-event-pick"),
            Duration::from_secs(5),
            FallbackPolicy::PreferVisible,
        )
        .await
        .unwrap();
        assert!(handle.text().await.unwrap().contains("pick-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_to_first_when_none_visible() {
        let view = view_with_picks(&[false, false]);
        let handle = find_first_visible(
            &view,
            &Query::css("ms-event-pick"),
            Duration::from_secs(2),
            FallbackPolicy::PreferVisible,
        )
        .await
        .unwrap();
        assert!(handle.text().await.unwrap().contains("pick-0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_does_not_wait_out_the_lookup_budget() {
        // All candidates invisible: the fallback must hand back the first one
        // after a single visibility pass, not sit on the lookup timeout.
        let view = view_with_picks(&[false, false]);
        let started = tokio::time::Instant::now();
        let handle = find_first_visible(
            &view,
            &Query::css("ms-event-pick"),
            Duration::from_secs(15),
            FallbackPolicy::PreferVisible,
        )
        .await
        .unwrap();
        assert!(handle.text().await.unwrap().contains("pick-0"));
        assert!(started.elapsed() < SCAN_POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_only_times_out() {
        let view = view_with_picks(&[false]);
        let result = find_first_visible(
            &view,
            &Query::css("ms-event-pick"),
            Duration::from_secs(2),
            FallbackPolicy::VisibleOnly,
        )
        .await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_candidate_absorbed() {
        let view = FakeView::new();
        let broken = FakeNode::new("ms-event-pick");
        broken.fail_all_access();
        let good = FakeNode::new("ms-event-pick");
        good.set_text("good");
        view.add_root(broken);
        view.add_root(good);

        let handle = find_first_visible(
            &view,
            &Query::css("ms-event-pick"),
            Duration::from_secs(5),
            FallbackPolicy::PreferVisible,
        )
        .await
        .unwrap();
        assert_eq!(handle.text().await.unwrap(), "good");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_present_times_out() {
        let view = FakeView::new();
        let result = wait_present(&view, &Query::css("ms-event-pick"), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_present_finds_existing() {
        let view = view_with_picks(&[true]);
        let handle = wait_present(&view, &Query::css("ms-event-pick"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(handle.is_visible().await.unwrap());
    }
}
