//! Excluded-context classification.
//!
//! Decides whether a candidate sits inside a market category the caller wants
//! skipped (e.g. half-time markets) by scanning the text of its nearest
//! container ancestor. Classification is recomputed every poll cycle and any
//! view failure during the walk fails open: a transient error must not
//! silently drop a valid candidate.

use crate::view::{Query, ViewHandle};
use tracing::trace;

/// Which candidates to skip, and where to look for the evidence.
#[derive(Debug, Clone)]
pub struct Exclusion {
    /// Container-like ancestor shapes; the first match up the tree wins.
    pub container_query: Query,
    /// Lower-cased tokens; any substring hit in the container text excludes.
    pub tokens: Vec<String>,
}

impl Exclusion {
    pub fn new(container_query: Query, tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            container_query,
            tokens: tokens.into_iter().map(|t| t.into().to_lowercase()).collect(),
        }
    }
}

/// Rendered text, falling back to the raw `textContent` when empty.
async fn context_text(handle: &dyn ViewHandle) -> Option<String> {
    if let Ok(text) = handle.text().await {
        if !text.trim().is_empty() {
            return Some(text);
        }
    } else {
        return None;
    }
    handle
        .attribute("textContent")
        .await
        .ok()
        .flatten()
        .filter(|t| !t.trim().is_empty())
}

/// True when the candidate's surrounding context contains any excluded token.
///
/// Walks to the nearest container ancestor (first match wins); reads its text,
/// falling back to raw content; with no container, falls back to the
/// immediate parent under the same strategy. Any handle-access failure yields
/// `false` — attempting the candidate anyway beats dropping it over a
/// transient view error.
pub async fn is_excluded_context(handle: &dyn ViewHandle, exclusion: &Exclusion) -> bool {
    if exclusion.tokens.is_empty() {
        return false;
    }

    let mut ctx = match handle.ancestor(&exclusion.container_query).await {
        Ok(Some(container)) => context_text(container.as_ref()).await,
        Ok(None) => None,
        Err(_) => return false,
    };

    if ctx.is_none() {
        ctx = match handle.parent().await {
            Ok(Some(parent)) => context_text(parent.as_ref()).await,
            Ok(None) => None,
            Err(_) => return false,
        };
    }

    let Some(text) = ctx else { return false };
    let lowered = text.to_lowercase();
    let hit = exclusion.tokens.iter().any(|t| lowered.contains(t.as_str()));
    if hit {
        trace!("candidate excluded by surrounding context");
    }
    hit
}
