//! Betting-site specifics, layered on top of the engine.
//!
//! Queries, exclusion tokens, and a handful of page-level flows for the live
//! betting view: cookie-consent dismissal, odds reading/observation presets,
//! and the sport-page-loaded check. Everything here goes through the probe
//! surface; nothing touches handles directly.

use crate::probe::{
    click_first_available, observe_signal_change, read_signal_now, ClickPolicy, Exclusion,
    ObservePolicy, Outcome, ProbeError, ReadSpec, SignalSource,
};
use crate::signal::Signal;
use crate::view::{Interaction, Query, ViewError, ViewProvider, ViewResult};
use std::time::Duration;
use tracing::{debug, info};

/// Outcome "buttons" on the live betting page (Angular custom element).
pub fn outcome_query() -> Query {
    Query::css("ms-event-pick")
}

/// Odds extraction order: raw content, then the accessible label, on the
/// root and then on the usual text-bearing descendants. Intentionally
/// tolerant to markup changes.
pub fn odds_read_spec() -> ReadSpec {
    ReadSpec::new(
        vec![
            SignalSource::Attribute("textContent".to_string()),
            SignalSource::Attribute("aria-label".to_string()),
        ],
        Query::css("span, div, strong, em, b, i, small, p, button"),
    )
}

/// Container shapes that delimit one market on the page.
pub fn market_container_query() -> Query {
    Query::css("ms-option-group, ms-market, section, div")
}

/// Half-time market exclusion, EN and BG tokens.
pub fn halftime_exclusion() -> Exclusion {
    Exclusion::new(
        market_container_query(),
        [
            "halftime",
            "half time",
            "1st half",
            "2nd half",
            "first half",
            "second half",
            "half-time",
            "ht",
            "първо полувреме",
            "второ полувреме",
            "полувреме",
        ],
    )
}

/// OneTrust consent banner.
pub fn cookie_banner_query() -> Query {
    Query::css("#onetrust-banner-sdk")
}

/// The banner's accept button.
pub fn cookie_accept_query() -> Query {
    Query::css("button#onetrust-accept-btn-handler")
}

/// Dismiss the cookie banner if present; absent banner is a no-op success.
///
/// Strategy: short wait for the banner, click accept through the retrying
/// actuator, then wait for the banner to disappear. If every pointer attempt
/// is intercepted (consent overlays animate), fall back to Enter on the
/// button before giving up.
pub async fn accept_cookies_if_present(view: &dyn ViewProvider) -> Result<(), ProbeError> {
    let banner = cookie_banner_query();
    match view
        .wait_for_presence(&banner, Duration::from_secs(10))
        .await
    {
        Ok(_) => {}
        Err(ViewError::Timeout(_)) => {
            debug!("no cookie banner; nothing to do");
            return Ok(());
        }
        Err(e) => return Err(ProbeError::View(e)),
    }

    let accept = cookie_accept_query();
    let result = click_first_available(view, &accept, &ClickPolicy::default()).await;
    if let Err(ProbeError::AllAttemptsExhausted { .. }) = result {
        debug!("pointer clicks intercepted; falling back to Enter");
        let policy = ClickPolicy {
            interaction: Interaction::PressEnter,
            max_attempts: 1,
            ..ClickPolicy::default()
        };
        click_first_available(view, &accept, &policy).await?;
    } else {
        result?;
    }

    wait_gone(view, &banner, Duration::from_secs(10)).await?;
    info!("cookie banner dismissed");
    Ok(())
}

/// Wait until no node matches `query` any more.
async fn wait_gone(
    view: &dyn ViewProvider,
    query: &Query,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let mut gone = true;
        for handle in view.locate(query).await? {
            match handle.is_visible().await {
                Ok(true) => {
                    gone = false;
                    break;
                }
                // Hidden or already torn down both count as gone.
                Ok(false) | Err(_) => {}
            }
        }
        if gone {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ProbeError::Timeout(timeout));
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Click the first available outcome on the live page.
pub async fn select_first_outcome(view: &dyn ViewProvider) -> Result<(), ProbeError> {
    accept_cookies_if_present(view).await?;
    click_first_available(view, &outcome_query(), &ClickPolicy::default()).await
}

/// First visible non-half-time outcome odds, right now.
pub async fn first_outcome_odds(view: &dyn ViewProvider) -> ViewResult<Option<Signal>> {
    read_signal_now(
        view,
        &outcome_query(),
        &odds_read_spec(),
        Some(&halftime_exclusion()),
    )
    .await
}

/// Watch the first non-half-time outcome for an odds change.
pub async fn observe_odds_change(view: &dyn ViewProvider, policy: &ObservePolicy) -> Outcome {
    observe_signal_change(
        view,
        &outcome_query(),
        &odds_read_spec(),
        Some(&halftime_exclusion()),
        policy,
    )
    .await
}

/// Which evidence confirms a sport page loaded. Both are heuristics for a
/// flaky UI, so the precedence stays configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadSignalPolicy {
    /// Check the URL slug first, then the active tab marker.
    #[default]
    UrlThenTab,
    /// Check the active tab marker first, then the URL slug.
    TabThenUrl,
}

/// Convert a sport name to the slug used in site URLs.
///
/// "Ice Hockey" → "ice-hockey": lowercase, strip combining diacritics,
/// collapse non-alphanumeric runs to a single dash, trim edge dashes.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();

    // NFD-style fold for the Latin-1 range the site's sport names use.
    let folded: String = lowered
        .chars()
        .map(|c| match c {
            'à'..='å' => 'a',
            'è'..='ë' => 'e',
            'ì'..='ï' => 'i',
            'ò'..='ö' => 'o',
            'ù'..='ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            _ => c,
        })
        .collect();

    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Check that a sport page is loaded: URL contains `/en/sports/<slug>`, or a
/// tab/header for the sport looks active. Either signal suffices; `policy`
/// orders which is consulted first.
pub async fn is_sport_page_loaded(
    view: &dyn ViewProvider,
    sport_name: &str,
    policy: LoadSignalPolicy,
) -> ViewResult<bool> {
    match policy {
        LoadSignalPolicy::UrlThenTab => {
            Ok(url_confirms(view, sport_name).await? || tab_confirms(view, sport_name).await?)
        }
        LoadSignalPolicy::TabThenUrl => {
            Ok(tab_confirms(view, sport_name).await? || url_confirms(view, sport_name).await?)
        }
    }
}

async fn url_confirms(view: &dyn ViewProvider, sport_name: &str) -> ViewResult<bool> {
    let url = view.current_url().await?.to_lowercase();
    Ok(url.contains(&format!("/en/sports/{}", slugify(sport_name))))
}

async fn tab_confirms(view: &dyn ViewProvider, sport_name: &str) -> ViewResult<bool> {
    // Active tab/header: a node carrying the sport name that is marked
    // active/selected. Selector kept broad on purpose.
    let query = Query::css_with_text(
        ".active, .selected, [aria-selected='true'], h1, h2",
        sport_name,
    );
    for handle in view.locate(&query).await? {
        match handle.is_visible().await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) if e.is_transient() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::fake::{FakeNode, FakeView};
    use std::sync::Arc;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Ice Hockey"), "ice-hockey");
        assert_eq!(slugify("Football"), "football");
    }

    #[test]
    fn test_slugify_collapses_and_trims() {
        assert_eq!(slugify("  Table  Tennis!  "), "table-tennis");
        assert_eq!(slugify("-- E-Sports --"), "e-sports");
    }

    #[test]
    fn test_slugify_diacritics() {
        assert_eq!(slugify("Pétanque"), "petanque");
        assert_eq!(slugify("Fútbol Sala"), "futbol-sala");
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_cookies_absent_banner_is_noop() {
        let view = FakeView::new();
        accept_cookies_if_present(&view).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_cookies_clicks_and_waits_gone() {
        let view = Arc::new(FakeView::new());
        let banner = FakeNode::new("#onetrust-banner-sdk");
        let button = FakeNode::new("button#onetrust-accept-btn-handler");
        button.detach_on_click();
        FakeNode::attach(&banner, &button);
        view.add_root(Arc::clone(&banner));

        // Simulate the site tearing the banner down once accept is clicked.
        let watched_button = Arc::clone(&button);
        let watched_banner = Arc::clone(&banner);
        let teardown = tokio::spawn(async move {
            while watched_button.click_count() == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            watched_banner.detach();
        });

        accept_cookies_if_present(view.as_ref()).await.unwrap();
        teardown.await.unwrap();
        assert_eq!(button.click_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_first_outcome_clicks_pick() {
        let view = FakeView::new();
        let pick = FakeNode::new("ms-event-pick");
        let span = FakeNode::new("span");
        span.set_text("2,10");
        FakeNode::attach(&pick, &span);
        view.add_root(Arc::clone(&pick));

        select_first_outcome(&view).await.unwrap();
        assert_eq!(pick.click_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_outcome_odds_normalized() {
        let view = FakeView::new();
        let market = FakeNode::new("ms-market");
        market.set_text("Match Result");
        let pick = FakeNode::new("ms-event-pick");
        let span = FakeNode::new("span");
        span.set_text("1,95");
        FakeNode::attach(&market, &pick);
        FakeNode::attach(&pick, &span);
        view.add_root(market);

        let sig = first_outcome_odds(&view).await.unwrap().unwrap();
        assert_eq!(sig.text, "1.95");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sport_page_loaded_by_url() {
        let view = FakeView::new();
        view.set_url("https://example.test/en/sports/ice-hockey/live");
        assert!(
            is_sport_page_loaded(&view, "Ice Hockey", LoadSignalPolicy::UrlThenTab)
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sport_page_loaded_by_active_tab() {
        let view = FakeView::new();
        view.set_url("https://example.test/somewhere-else");
        let tab = FakeNode::new("h1");
        tab.set_text("Ice Hockey");
        view.add_root(tab);
        assert!(
            is_sport_page_loaded(&view, "Ice Hockey", LoadSignalPolicy::TabThenUrl)
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sport_page_not_loaded() {
        let view = FakeView::new();
        view.set_url("https://example.test/en/sports/tennis");
        assert!(
            !is_sport_page_loaded(&view, "Ice Hockey", LoadSignalPolicy::UrlThenTab)
                .await
                .unwrap()
        );
    }
}
