//! Stale-tolerant signal reads.
//!
//! A read walks an ordered list of sources (rendered content, then named
//! attributes) on the candidate itself, then the same order across its
//! matching descendants in document order. The view mutates continuously, so
//! any single-node failure degrades that candidate to "nothing" instead of
//! aborting the scan; `read_signal` never surfaces `Stale` to its caller.

use super::context::{is_excluded_context, Exclusion};
use crate::signal::{self, Signal};
use crate::view::{Query, ViewHandle, ViewProvider, ViewResult};
use tracing::debug;

/// One place a signal's text can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalSource {
    /// The node's rendered text.
    Content,
    /// A named attribute (falling through to the DOM property of that name).
    Attribute(String),
}

/// Ordered extraction strategy: sources tried on the candidate root, then on
/// each matching descendant.
#[derive(Debug, Clone)]
pub struct ReadSpec {
    pub sources: Vec<SignalSource>,
    pub descendant_query: Query,
}

impl ReadSpec {
    pub fn new(sources: Vec<SignalSource>, descendant_query: Query) -> Self {
        Self {
            sources,
            descendant_query,
        }
    }
}

async fn source_text(handle: &dyn ViewHandle, source: &SignalSource) -> ViewResult<Option<String>> {
    match source {
        SignalSource::Content => handle.text().await.map(Some),
        SignalSource::Attribute(name) => handle.attribute(name).await,
    }
}

/// Try each source in order on one node; first extractable signal wins.
async fn signal_from_node(handle: &dyn ViewHandle, sources: &[SignalSource]) -> ViewResult<Option<Signal>> {
    for source in sources {
        if let Some(text) = source_text(handle, source).await? {
            if let Some(sig) = signal::extract(Some(&text)) {
                return Ok(Some(sig));
            }
        }
    }
    Ok(None)
}

/// Derive a signal from a candidate and its descendants.
///
/// Guarantee: never returns a view error. Staleness while reading the root
/// yields `None` for the whole candidate (the node is gone; its descendants
/// are too); staleness on one descendant skips just that descendant.
pub async fn read_signal(handle: &dyn ViewHandle, spec: &ReadSpec) -> Option<Signal> {
    match signal_from_node(handle, &spec.sources).await {
        Ok(Some(sig)) => return Some(sig),
        Ok(None) => {}
        Err(e) => {
            debug!(error = %e, "candidate root unreadable; yielding nothing");
            return None;
        }
    }

    let descendants = match handle.descendants(&spec.descendant_query).await {
        Ok(d) => d,
        Err(e) => {
            debug!(error = %e, "descendant enumeration failed; yielding nothing");
            return None;
        }
    };

    for descendant in &descendants {
        match signal_from_node(descendant.as_ref(), &spec.sources).await {
            Ok(Some(sig)) => return Some(sig),
            Ok(None) => {}
            // This descendant re-rendered mid-read; the next may be fine.
            Err(_) => continue,
        }
    }
    None
}

/// First visible, non-excluded candidate's signal, right now — no waiting.
///
/// Candidates are enumerated fresh; visibility and exclusion are computed per
/// cycle and never cached. Returns `Ok(None)` when nothing currently yields a
/// signal. Only non-transient provider failures surface as errors.
pub async fn read_signal_now(
    view: &dyn ViewProvider,
    query: &Query,
    spec: &ReadSpec,
    exclusion: Option<&Exclusion>,
) -> ViewResult<Option<Signal>> {
    let candidates = view.locate(query).await?;
    for candidate in &candidates {
        match candidate.is_visible().await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) if e.is_transient() => continue,
            Err(e) => return Err(e),
        }
        if let Some(ex) = exclusion {
            if is_excluded_context(candidate.as_ref(), ex).await {
                continue;
            }
        }
        if let Some(sig) = read_signal(candidate.as_ref(), spec).await {
            return Ok(Some(sig));
        }
    }
    Ok(None)
}
