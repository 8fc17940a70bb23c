//! Retrying interaction against a volatile candidate list.
//!
//! A click on a live page races the renderer: the target can be replaced
//! between lookup and pointer-down, or an overlay can swallow the event.
//! Each attempt therefore starts from a completely fresh lookup — a handle
//! from a previous attempt is never reused — and only `Stale`/`Intercepted`
//! buy another attempt. Everything else propagates immediately.

use super::locate::{find_first_visible, FallbackPolicy};
use super::ProbeError;
use crate::view::{Interaction, Query, ViewHandle, ViewProvider};
use std::time::Duration;
use tracing::{debug, info};

/// How often the interactability and settlement waits re-check the handle.
const INTERACT_POLL: Duration = Duration::from_millis(100);

/// Retry budget and timing for one click operation.
#[derive(Debug, Clone)]
pub struct ClickPolicy {
    /// Total attempts before giving up with `AllAttemptsExhausted`.
    pub max_attempts: u32,
    /// Presence/visibility lookup budget per attempt.
    pub lookup_timeout: Duration,
    /// How long to wait for the chosen handle to become interactable.
    pub per_attempt_timeout: Duration,
    /// How long to watch the handle settle after the interaction.
    pub settle_timeout: Duration,
    /// What to do when nothing is visible.
    pub fallback: FallbackPolicy,
    /// The interaction to perform.
    pub interaction: Interaction,
}

impl Default for ClickPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lookup_timeout: Duration::from_secs(15),
            per_attempt_timeout: Duration::from_secs(20),
            settle_timeout: Duration::from_secs(2),
            fallback: FallbackPolicy::PreferVisible,
            interaction: Interaction::PointerClick,
        }
    }
}

/// Click the first available node matching `query`, retrying transient
/// failures with a fresh lookup, up to `policy.max_attempts` times.
pub async fn click_first_available(
    view: &dyn ViewProvider,
    query: &Query,
    policy: &ClickPolicy,
) -> Result<(), ProbeError> {
    for attempt in 1..=policy.max_attempts {
        match attempt_once(view, query, policy).await {
            Ok(()) => {
                info!(%query, attempt, "interaction landed");
                return Ok(());
            }
            Err(ProbeError::View(e)) if e.is_transient() => {
                debug!(%query, attempt, error = %e, "attempt failed transiently; re-looking-up");
            }
            Err(other) => return Err(other),
        }
    }
    Err(ProbeError::AllAttemptsExhausted {
        attempts: policy.max_attempts,
    })
}

/// One attempt: fresh lookup, interactability wait, interaction, settlement.
async fn attempt_once(
    view: &dyn ViewProvider,
    query: &Query,
    policy: &ClickPolicy,
) -> Result<(), ProbeError> {
    // Step 1-2: fresh lookup, first visible (or first, best-effort).
    let handle =
        find_first_visible(view, query, policy.lookup_timeout, policy.fallback).await?;

    // Step 3: wait for interactability, then interact.
    wait_interactable(handle.as_ref(), policy.per_attempt_timeout).await?;
    handle.interact(policy.interaction).await?;

    // Step 4: settlement. The view either re-renders the node away (stale)
    // or keeps it visible; both mean the click was taken. Running out the
    // settle window without either is also settled, not an error.
    settle(handle.as_ref(), policy.settle_timeout).await;
    Ok(())
}

/// Poll until the handle is visible, treating that as "interactable".
///
/// Staleness here aborts the attempt (transient, retried by the caller);
/// running out the budget is a hard timeout, as a node that never becomes
/// interactable will not take a click either.
async fn wait_interactable(handle: &dyn ViewHandle, timeout: Duration) -> Result<(), ProbeError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if handle.is_visible().await? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ProbeError::Timeout(timeout));
        }
        tokio::time::sleep(INTERACT_POLL).await;
    }
}

async fn settle(handle: &dyn ViewHandle, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match handle.is_visible().await {
            // Re-rendered and replaced: settled.
            Err(_) => return,
            // Still visible: the view kept the node, also settled.
            Ok(true) => return,
            Ok(false) => {}
        }
        if tokio::time::Instant::now() >= deadline {
            // Quiet DOM, no signal either way. Treated as settled.
            return;
        }
        tokio::time::sleep(INTERACT_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::fake::{FakeNode, FakeView};
    use std::sync::Arc;

    fn quick_policy() -> ClickPolicy {
        ClickPolicy {
            lookup_timeout: Duration::from_secs(2),
            per_attempt_timeout: Duration::from_secs(2),
            settle_timeout: Duration::from_millis(300),
            ..ClickPolicy::default()
        }
    }

    fn pick_query() -> Query {
        Query::css("ms-event-pick")
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_lands_first_try() {
        let view = FakeView::new();
        let pick = FakeNode::new("ms-event-pick");
        view.add_root(Arc::clone(&pick));

        click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap();
        assert_eq!(pick.click_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_settles_via_detach() {
        // The view replaces the node right after the click; that is
        // acceptable settlement, not a failure.
        let view = FakeView::new();
        let pick = FakeNode::new("ms-event-pick");
        pick.detach_on_click();
        view.add_root(Arc::clone(&pick));

        click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap();
        assert_eq!(pick.click_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_retries_through_interception() {
        let view = FakeView::new();
        let pick = FakeNode::new("ms-event-pick");
        pick.intercept_clicks(2);
        view.add_root(Arc::clone(&pick));

        click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap();
        // Two intercepted attempts, success on the third.
        assert_eq!(pick.click_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_succeeds_on_every_k_up_to_max() {
        for k in 1..=3u32 {
            let view = FakeView::new();
            let pick = FakeNode::new("ms-event-pick");
            pick.intercept_clicks(k - 1);
            view.add_root(Arc::clone(&pick));

            click_first_available(&view, &pick_query(), &quick_policy())
                .await
                .unwrap_or_else(|e| panic!("k={k}: {e}"));
            assert_eq!(pick.click_count(), 1, "k={k}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_exhausts_attempts() {
        let view = FakeView::new();
        let pick = FakeNode::new("ms-event-pick");
        pick.intercept_clicks(u32::MAX);
        view.add_root(Arc::clone(&pick));

        let err = click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProbeError::AllAttemptsExhausted { attempts: 3 }
        ));
        assert_eq!(pick.click_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_no_candidates_times_out() {
        let view = FakeView::new();
        let err = click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap_err();
        // Nothing to click is a timeout, not exhaustion: no attempt ever
        // reached the interaction stage.
        assert!(matches!(err, ProbeError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_falls_back_to_invisible_candidate_then_times_out() {
        // Invisible-only candidates: the fallback hands back the first one,
        // but it never becomes interactable, which is a hard timeout.
        let view = FakeView::new();
        let pick = FakeNode::new("ms-event-pick");
        pick.set_visible(false);
        view.add_root(Arc::clone(&pick));

        let err = click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
        assert_eq!(pick.click_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_fresh_lookup_finds_replacement() {
        // First candidate dies on interaction; a later lookup must pick up
        // the replacement node instead.
        let view = FakeView::new();
        let doomed = FakeNode::new("ms-event-pick");
        doomed.intercept_clicks(1);
        doomed.stale_after_ops(3);
        let replacement = FakeNode::new("ms-event-pick");
        view.add_root(Arc::clone(&doomed));
        view.add_root(Arc::clone(&replacement));

        click_first_available(&view, &pick_query(), &quick_policy())
            .await
            .unwrap();
        assert_eq!(replacement.click_count(), 1);
        assert_eq!(doomed.click_count(), 0);
    }
}
