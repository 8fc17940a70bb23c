//! Deterministic in-memory view for tests.
//!
//! Follows the precedent of shipping a non-browser implementation of the
//! provider traits alongside the real one: a tree of [`FakeNode`]s with
//! per-node fault injection (permanent access failure, stale-after-N
//! operations, intercept-the-first-K clicks) so every resilience property of
//! the engine can be exercised without a browser.

use super::{Interaction, Query, ViewError, ViewHandle, ViewProvider, ViewResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Fault configuration for one node.
#[derive(Debug, Default)]
struct Faults {
    /// Every access fails with `Stale`.
    fail_all_access: bool,
    /// Accesses beyond this count fail with `Stale`.
    stale_after_ops: Option<u32>,
    /// The first N click interactions fail with `Intercepted`.
    intercept_clicks: u32,
}

/// One node in the fake view tree. Mutate it from tests to simulate the
/// externally-owned view changing under the engine.
pub struct FakeNode {
    tag: String,
    visible: Mutex<bool>,
    text: Mutex<String>,
    attrs: Mutex<Vec<(String, String)>>,
    children: Mutex<Vec<Arc<FakeNode>>>,
    parent: Mutex<Weak<FakeNode>>,
    detached: AtomicBool,
    detach_on_click: AtomicBool,
    faults: Mutex<Faults>,
    ops: AtomicU32,
    clicks: AtomicU32,
}

impl FakeNode {
    /// Create a detached node with the given tag, visible by default.
    pub fn new(tag: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.into(),
            visible: Mutex::new(true),
            text: Mutex::new(String::new()),
            attrs: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
            detached: AtomicBool::new(false),
            detach_on_click: AtomicBool::new(false),
            faults: Mutex::new(Faults::default()),
            ops: AtomicU32::new(0),
            clicks: AtomicU32::new(0),
        })
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.lock().unwrap() = text.into();
    }

    pub fn set_visible(&self, visible: bool) {
        *self.visible.lock().unwrap() = visible;
    }

    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.lock().unwrap().push((name.into(), value.into()));
    }

    /// Simulate the view re-rendering this node away.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    /// Detach the node as a side effect of a successful click, the way a
    /// live view replaces a clicked outcome button.
    pub fn detach_on_click(&self) {
        self.detach_on_click.store(true, Ordering::SeqCst);
    }

    /// Every subsequent access to this node fails with `Stale`.
    pub fn fail_all_access(&self) {
        self.faults.lock().unwrap().fail_all_access = true;
    }

    /// Accesses beyond `n` fail with `Stale`.
    pub fn stale_after_ops(&self, n: u32) {
        self.faults.lock().unwrap().stale_after_ops = Some(n);
    }

    /// The first `n` clicks fail with `Intercepted`.
    pub fn intercept_clicks(&self, n: u32) {
        self.faults.lock().unwrap().intercept_clicks = n;
    }

    /// How many clicks have landed on this node.
    pub fn click_count(&self) -> u32 {
        self.clicks.load(Ordering::SeqCst)
    }

    /// Attach `child` under `parent`.
    pub fn attach(parent: &Arc<FakeNode>, child: &Arc<FakeNode>) {
        *child.parent.lock().unwrap() = Arc::downgrade(parent);
        parent.children.lock().unwrap().push(Arc::clone(child));
    }

    fn check_access(&self) -> ViewResult<()> {
        let ops = self.ops.fetch_add(1, Ordering::SeqCst) + 1;
        if self.detached.load(Ordering::SeqCst) {
            return Err(ViewError::Stale);
        }
        let faults = self.faults.lock().unwrap();
        if faults.fail_all_access {
            return Err(ViewError::Stale);
        }
        if let Some(limit) = faults.stale_after_ops {
            if ops > limit {
                return Err(ViewError::Stale);
            }
        }
        Ok(())
    }

    fn matches(&self, query: &Query) -> bool {
        let tag_ok = query
            .css
            .split(',')
            .map(str::trim)
            .any(|sel| sel == self.tag || sel == "*");
        if !tag_ok {
            return false;
        }
        match &query.text_contains {
            Some(fragment) => self.subtree_text().contains(fragment.as_str()),
            None => true,
        }
    }

    /// Own text plus descendant text, the way `textContent` renders.
    fn subtree_text(&self) -> String {
        let mut out = self.text.lock().unwrap().clone();
        for child in self.children.lock().unwrap().iter() {
            let t = child.subtree_text();
            if !t.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&t);
            }
        }
        out
    }

    fn collect_matching(self: &Arc<Self>, query: &Query, out: &mut Vec<Arc<FakeNode>>) {
        if self.matches(query) {
            out.push(Arc::clone(self));
        }
        for child in self.children.lock().unwrap().iter() {
            child.collect_matching(query, out);
        }
    }
}

/// In-memory view provider over a tree of [`FakeNode`]s.
pub struct FakeView {
    roots: Mutex<Vec<Arc<FakeNode>>>,
    url: Mutex<String>,
}

impl FakeView {
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(Vec::new()),
            url: Mutex::new("about:blank".to_string()),
        }
    }

    pub fn add_root(&self, node: Arc<FakeNode>) {
        self.roots.lock().unwrap().push(node);
    }

    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.lock().unwrap() = url.into();
    }

    fn find(&self, query: &Query) -> Vec<Arc<FakeNode>> {
        let mut out = Vec::new();
        for root in self.roots.lock().unwrap().iter() {
            root.collect_matching(query, &mut out);
        }
        // Detached nodes no longer appear in lookups, matching a live DOM.
        out.retain(|n| !n.detached.load(Ordering::SeqCst));
        out
    }
}

struct FakeHandle {
    node: Arc<FakeNode>,
}

#[async_trait]
impl ViewHandle for FakeHandle {
    async fn is_visible(&self) -> ViewResult<bool> {
        self.node.check_access()?;
        Ok(*self.node.visible.lock().unwrap())
    }

    async fn text(&self) -> ViewResult<String> {
        self.node.check_access()?;
        Ok(self.node.subtree_text())
    }

    async fn attribute(&self, name: &str) -> ViewResult<Option<String>> {
        self.node.check_access()?;
        let explicit = self
            .node
            .attrs
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone());
        if explicit.is_some() {
            return Ok(explicit);
        }
        if name == "textContent" {
            return Ok(Some(self.node.subtree_text()));
        }
        Ok(None)
    }

    async fn descendants(&self, query: &Query) -> ViewResult<Vec<Box<dyn ViewHandle>>> {
        self.node.check_access()?;
        let mut out = Vec::new();
        for child in self.node.children.lock().unwrap().iter() {
            child.collect_matching(query, &mut out);
        }
        Ok(out
            .into_iter()
            .map(|node| Box::new(FakeHandle { node }) as Box<dyn ViewHandle>)
            .collect())
    }

    async fn ancestor(&self, query: &Query) -> ViewResult<Option<Box<dyn ViewHandle>>> {
        self.node.check_access()?;
        let mut current = self.node.parent.lock().unwrap().upgrade();
        while let Some(node) = current {
            if node.matches(query) {
                return Ok(Some(Box::new(FakeHandle { node })));
            }
            current = node.parent.lock().unwrap().upgrade();
        }
        Ok(None)
    }

    async fn parent(&self) -> ViewResult<Option<Box<dyn ViewHandle>>> {
        self.node.check_access()?;
        Ok(self
            .node
            .parent
            .lock()
            .unwrap()
            .upgrade()
            .map(|node| Box::new(FakeHandle { node }) as Box<dyn ViewHandle>))
    }

    async fn interact(&self, kind: Interaction) -> ViewResult<()> {
        self.node.check_access()?;
        let _ = kind;
        {
            let mut faults = self.node.faults.lock().unwrap();
            if faults.intercept_clicks > 0 {
                faults.intercept_clicks -= 1;
                return Err(ViewError::Intercepted);
            }
        }
        self.node.clicks.fetch_add(1, Ordering::SeqCst);
        if self.node.detach_on_click.load(Ordering::SeqCst) {
            self.node.detached.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ViewProvider for FakeView {
    async fn locate(&self, query: &Query) -> ViewResult<Vec<Box<dyn ViewHandle>>> {
        Ok(self
            .find(query)
            .into_iter()
            .map(|node| Box::new(FakeHandle { node }) as Box<dyn ViewHandle>)
            .collect())
    }

    async fn current_url(&self) -> ViewResult<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> ViewResult<()> {
        self.set_url(url);
        Ok(())
    }

    async fn close(self: Box<Self>) -> ViewResult<()> {
        Ok(())
    }
}
