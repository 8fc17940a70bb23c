//! View abstraction — the capability seam to the live, externally-mutating UI.
//!
//! Defines the `ViewProvider` and `ViewHandle` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide, plus a deterministic
//! in-memory fake for tests). Every handle operation may fail with
//! [`ViewError::Stale`] at any time; the engine layers above are built around
//! that assumption and no handle may be stored across a poll boundary.

pub mod chromium;
pub mod fake;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// How often presence polling re-runs the lookup.
const PRESENCE_POLL: Duration = Duration::from_millis(250);

/// Errors surfaced by the view layer.
///
/// `Stale` and `Intercepted` are always recoverable and are absorbed by the
/// engine's retry boundaries; they never reach the caller of a probe
/// operation. `Timeout` is recoverable at the call site. `Provider` is not.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The handle no longer corresponds to live view state.
    #[error("stale reference to a view node")]
    Stale,
    /// An overlaying element blocked the interaction.
    #[error("interaction intercepted by an overlaying element")]
    Intercepted,
    /// A wait deadline elapsed.
    #[error("view wait timed out after {0:?}")]
    Timeout(Duration),
    /// Anything else from the underlying engine.
    #[error("view provider error: {0}")]
    Provider(String),
}

impl ViewError {
    /// Whether a retry with a fresh lookup can reasonably recover.
    pub fn is_transient(&self) -> bool {
        matches!(self, ViewError::Stale | ViewError::Intercepted)
    }
}

pub type ViewResult<T> = Result<T, ViewError>;

/// A declarative node query: a CSS selector, optionally narrowed to nodes
/// whose rendered text contains a fragment (case-sensitive, as rendered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub css: String,
    pub text_contains: Option<String>,
}

impl Query {
    /// Query by CSS selector alone.
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            css: selector.into(),
            text_contains: None,
        }
    }

    /// Query by CSS selector, keeping only nodes whose text contains `fragment`.
    pub fn css_with_text(selector: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            css: selector.into(),
            text_contains: Some(fragment.into()),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text_contains {
            Some(t) => write!(f, "{} [text~\"{}\"]", self.css, t),
            None => write!(f, "{}", self.css),
        }
    }
}

/// Kinds of interaction a handle supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Realistic pointer sequence: move to the element, pause, click.
    PointerClick,
    /// Press Enter with the element focused. Fallback when a click keeps
    /// getting intercepted (e.g. consent banners under animation overlays).
    PressEnter,
}

/// An opaque, short-lived reference to one node in the live view.
///
/// Every method may return [`ViewError::Stale`]; callers must treat a handle
/// as valid for at most one logical operation.
#[async_trait]
pub trait ViewHandle: Send + Sync {
    /// Whether the node is currently rendered visible.
    async fn is_visible(&self) -> ViewResult<bool>;

    /// Rendered text of the node and its subtree.
    async fn text(&self) -> ViewResult<String>;

    /// Value of an attribute, or `None` if unset.
    async fn attribute(&self, name: &str) -> ViewResult<Option<String>>;

    /// Descendant nodes matching `query`, in document order.
    async fn descendants(&self, query: &Query) -> ViewResult<Vec<Box<dyn ViewHandle>>>;

    /// Nearest ancestor matching `query`, if any.
    async fn ancestor(&self, query: &Query) -> ViewResult<Option<Box<dyn ViewHandle>>>;

    /// Immediate parent node, if any.
    async fn parent(&self) -> ViewResult<Option<Box<dyn ViewHandle>>>;

    /// Perform an interaction against the node.
    ///
    /// May fail with `Stale` or `Intercepted`, both of which the
    /// [`crate::probe::click`] layer recovers from by re-looking-up.
    async fn interact(&self, kind: Interaction) -> ViewResult<()>;
}

/// A live view that can be queried for handles.
#[async_trait]
pub trait ViewProvider: Send + Sync {
    /// Enumerate matching nodes right now, without waiting. An empty result
    /// is not an error; polling callers depend on this returning promptly.
    async fn locate(&self, query: &Query) -> ViewResult<Vec<Box<dyn ViewHandle>>>;

    /// Current URL of the view.
    async fn current_url(&self) -> ViewResult<String>;

    /// Navigate the view to a URL.
    async fn navigate(&self, url: &str, timeout: Duration) -> ViewResult<()>;

    /// Wait until at least one node matches, returning the first.
    ///
    /// Default implementation polls [`locate`](Self::locate) every 250 ms and
    /// fails with [`ViewError::Timeout`] once the deadline passes.
    async fn wait_for_presence(
        &self,
        query: &Query,
        timeout: Duration,
    ) -> ViewResult<Box<dyn ViewHandle>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut found = self.locate(query).await?;
            if !found.is_empty() {
                return Ok(found.remove(0));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ViewError::Timeout(timeout));
            }
            tokio::time::sleep(PRESENCE_POLL).await;
        }
    }

    /// Close the view and release the underlying engine resources.
    async fn close(self: Box<Self>) -> ViewResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_display() {
        assert_eq!(Query::css("ms-event-pick").to_string(), "ms-event-pick");
        assert_eq!(
            Query::css_with_text("a", "A-Z Sports").to_string(),
            "a [text~\"A-Z Sports\"]"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ViewError::Stale.is_transient());
        assert!(ViewError::Intercepted.is_transient());
        assert!(!ViewError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ViewError::Provider("boom".into()).is_transient());
    }
}
