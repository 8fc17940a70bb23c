//! CLI subcommand implementations for the `liveprobe` binary.

use crate::probe::{ClickPolicy, ObservePolicy, Outcome};
use crate::site;
use crate::view::chromium::{ChromiumConfig, ChromiumView};
use crate::view::ViewProvider;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

/// Shared options for commands that open a page.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub url: String,
    pub headed: bool,
    pub lang: String,
    pub json: bool,
}

async fn open(opts: &PageOptions) -> Result<ChromiumView> {
    let config = ChromiumConfig {
        headless: !opts.headed,
        lang: opts.lang.clone(),
        ..ChromiumConfig::default()
    };
    let view = ChromiumView::launch(config)
        .await
        .context("failed to launch browser")?;
    view.navigate(&opts.url, Duration::from_secs(30))
        .await
        .with_context(|| format!("failed to open {}", opts.url))?;
    Ok(view)
}

/// `liveprobe click` — click the first available outcome.
pub async fn click(opts: PageOptions, attempts: u32) -> Result<()> {
    let view = open(&opts).await?;
    let policy = ClickPolicy {
        max_attempts: attempts,
        ..ClickPolicy::default()
    };

    site::accept_cookies_if_present(&view).await?;
    crate::probe::click_first_available(&view, &site::outcome_query(), &policy).await?;

    if opts.json {
        println!("{}", serde_json::json!({ "clicked": true }));
    } else {
        println!("Clicked the first available outcome.");
    }
    Box::new(view).close().await.ok();
    Ok(())
}

/// `liveprobe read` — print the current first-outcome odds, if any.
pub async fn read(opts: PageOptions, include_halftime: bool) -> Result<()> {
    let view = open(&opts).await?;
    site::accept_cookies_if_present(&view).await?;

    let exclusion = (!include_halftime).then(site::halftime_exclusion);
    let signal = crate::probe::read_signal_now(
        &view,
        &site::outcome_query(),
        &site::odds_read_spec(),
        exclusion.as_ref(),
    )
    .await?;

    match (&signal, opts.json) {
        (Some(sig), true) => println!("{}", serde_json::to_string(sig)?),
        (Some(sig), false) => println!("{}", sig.text),
        (None, true) => println!("null"),
        (None, false) => println!("no odds currently readable"),
    }
    Box::new(view).close().await.ok();
    Ok(())
}

/// `liveprobe watch` — observe the first outcome for an odds change.
pub async fn watch(
    opts: PageOptions,
    baseline_timeout: u64,
    window: u64,
    poll_ms: u64,
    include_halftime: bool,
) -> Result<()> {
    let view = open(&opts).await?;
    site::accept_cookies_if_present(&view).await?;

    let policy = ObservePolicy {
        baseline_timeout: Duration::from_secs(baseline_timeout),
        change_window: Duration::from_secs(window),
        poll_interval: Duration::from_millis(poll_ms),
    };
    info!(window, poll_ms, "watching for an odds change");

    let exclusion = (!include_halftime).then(site::halftime_exclusion);
    let outcome = crate::probe::observe_signal_change(
        &view,
        &site::outcome_query(),
        &site::odds_read_spec(),
        exclusion.as_ref(),
        &policy,
    )
    .await;

    if opts.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        match &outcome {
            Outcome::Changed { baseline, current } => {
                println!("odds changed: {} -> {}", baseline.text, current.text)
            }
            Outcome::Unchanged { baseline } => {
                println!("odds unchanged at {} for the whole window", baseline.text)
            }
            Outcome::Unavailable => println!("no odds signal could be obtained"),
        }
    }
    Box::new(view).close().await.ok();

    // A vanished signal is worth a non-zero exit in scripted runs.
    if outcome == Outcome::Unavailable {
        anyhow::bail!("signal unavailable");
    }
    Ok(())
}
