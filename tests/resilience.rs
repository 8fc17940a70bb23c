//! End-to-end engine behavior against the deterministic fake view:
//! the full locate → classify → read → observe pipeline under continuous
//! background mutation and injected staleness.

use liveprobe::probe::{
    click_first_available, observe_signal_change, read_signal_now, ClickPolicy, ObservePolicy,
    Outcome, ProbeError,
};
use liveprobe::site;
use liveprobe::view::fake::{FakeNode, FakeView};
use std::sync::Arc;
use std::time::Duration;

/// A market container with one pick whose odds live in a span.
fn market(name: &str, odds: &str) -> (Arc<FakeNode>, Arc<FakeNode>, Arc<FakeNode>) {
    let container = FakeNode::new("ms-market");
    container.set_text(name);
    let pick = FakeNode::new("ms-event-pick");
    let span = FakeNode::new("span");
    span.set_text(odds);
    FakeNode::attach(&container, &pick);
    FakeNode::attach(&pick, &span);
    (container, pick, span)
}

fn fast_observe() -> ObservePolicy {
    ObservePolicy {
        baseline_timeout: Duration::from_secs(2),
        change_window: Duration::from_secs(8),
        poll_interval: Duration::from_millis(100),
    }
}

#[tokio::test(start_paused = true)]
async fn observe_detects_live_odds_update() {
    let view = Arc::new(FakeView::new());
    let (container, _pick, span) = market("Match Result", "2,10");
    view.add_root(container);

    // Background mutation: the site pushes a new price after ~1.5s.
    let mutating = Arc::clone(&span);
    let pusher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        mutating.set_text("2,20");
    });

    let outcome = observe_signal_change(
        view.as_ref(),
        &site::outcome_query(),
        &site::odds_read_spec(),
        Some(&site::halftime_exclusion()),
        &fast_observe(),
    )
    .await;
    pusher.await.unwrap();

    match outcome {
        Outcome::Changed { baseline, current } => {
            // Locale commas normalize on both sides of the comparison.
            assert_eq!(baseline.text, "2.10");
            assert_eq!(current.text, "2.20");
        }
        other => panic!("expected Changed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn observe_ignores_halftime_market_updates() {
    let view = Arc::new(FakeView::new());
    // Half-time market listed first; its odds swing wildly.
    let (ht, _ht_pick, ht_span) = market("Halftime Result", "5,00");
    let (ft, _ft_pick, _ft_span) = market("Match Result", "1,90");
    view.add_root(ht);
    view.add_root(ft);

    let mutating = Arc::clone(&ht_span);
    let pusher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        mutating.set_text("6,00");
    });

    let outcome = observe_signal_change(
        view.as_ref(),
        &site::outcome_query(),
        &site::odds_read_spec(),
        Some(&site::halftime_exclusion()),
        &fast_observe(),
    )
    .await;
    pusher.await.unwrap();

    // Only the full-time market counts, and it never moved.
    assert_eq!(
        outcome,
        Outcome::Unchanged {
            baseline: liveprobe::signal::extract(Some("1,90")).unwrap()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn observe_survives_candidate_churn() {
    // The baseline pick is torn down mid-watch and replaced by a fresh node
    // with a new price; positional identity means the change is still seen.
    let view = Arc::new(FakeView::new());
    let (container, pick, _span) = market("Match Result", "3,40");
    view.add_root(Arc::clone(&container));

    let churn_view = Arc::clone(&view);
    let old_pick = Arc::clone(&pick);
    let churner = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        old_pick.detach();
        let (fresh, _p, _s) = market("Match Result", "3,55");
        churn_view.add_root(fresh);
    });

    let outcome = observe_signal_change(
        view.as_ref(),
        &site::outcome_query(),
        &site::odds_read_spec(),
        Some(&site::halftime_exclusion()),
        &fast_observe(),
    )
    .await;
    churner.await.unwrap();

    match outcome {
        Outcome::Changed { baseline, current } => {
            assert_eq!(baseline.text, "3.40");
            assert_eq!(current.text, "3.55");
        }
        other => panic!("expected Changed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn observe_unavailable_when_page_never_yields() {
    let view = FakeView::new();
    let outcome = observe_signal_change(
        &view,
        &site::outcome_query(),
        &site::odds_read_spec(),
        None,
        &fast_observe(),
    )
    .await;
    assert_eq!(outcome, Outcome::Unavailable);
}

#[tokio::test(start_paused = true)]
async fn read_now_skips_faulted_candidates() {
    let view = FakeView::new();
    let (container, pick, _span) = market("Match Result", "2,75");
    pick.fail_all_access();
    let (good, _p, _s) = market("Match Result", "1,64");
    view.add_root(container);
    view.add_root(good);

    let sig = read_signal_now(
        &view,
        &site::outcome_query(),
        &site::odds_read_spec(),
        None,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(sig.text, "1.64");
}

#[tokio::test(start_paused = true)]
async fn click_retries_across_rerenders_then_exhausts() {
    let view = FakeView::new();
    let (container, pick, _span) = market("Match Result", "2,10");
    pick.intercept_clicks(u32::MAX);
    view.add_root(container);

    let policy = ClickPolicy {
        lookup_timeout: Duration::from_secs(2),
        per_attempt_timeout: Duration::from_secs(2),
        settle_timeout: Duration::from_millis(200),
        ..ClickPolicy::default()
    };
    let err = click_first_available(&view, &site::outcome_query(), &policy)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProbeError::AllAttemptsExhausted { attempts: 3 }
    ));
}

#[tokio::test(start_paused = true)]
async fn full_flow_click_then_observe() {
    // Select an outcome, then watch the odds move — the shape of the
    // original live-page verification scenario.
    let view = Arc::new(FakeView::new());
    let (container, pick, span) = market("Match Result", "2,10");
    view.add_root(container);

    let policy = ClickPolicy {
        lookup_timeout: Duration::from_secs(2),
        per_attempt_timeout: Duration::from_secs(2),
        settle_timeout: Duration::from_millis(200),
        ..ClickPolicy::default()
    };
    click_first_available(view.as_ref(), &site::outcome_query(), &policy)
        .await
        .unwrap();
    assert_eq!(pick.click_count(), 1);

    let mutating = Arc::clone(&span);
    let pusher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(800)).await;
        mutating.set_text("2,30");
    });

    let outcome = observe_signal_change(
        view.as_ref(),
        &site::outcome_query(),
        &site::odds_read_spec(),
        Some(&site::halftime_exclusion()),
        &fast_observe(),
    )
    .await;
    pusher.await.unwrap();
    assert!(matches!(outcome, Outcome::Changed { .. }));
}
