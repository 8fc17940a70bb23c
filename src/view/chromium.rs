//! Chromium-backed view provider using chromiumoxide.
//!
//! Handles are realized through an in-page element registry: `locate` runs
//! the query in the page and parks each match in `window.__lpReg`, and every
//! subsequent handle operation re-checks that the parked node is still
//! connected to the document. Each `locate` also nulls out slots whose node
//! has been disconnected, so the registry never pins torn-down subtrees on a
//! page that re-renders continuously. A navigation replaces the document (and
//! the registry with it), so every outstanding handle turns
//! [`ViewError::Stale`] exactly when the live view invalidates it.

use super::{Interaction, Query, ViewError, ViewHandle, ViewProvider, ViewResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. LIVEPROBE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("LIVEPROBE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.liveprobe/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".liveprobe/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".liveprobe/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".liveprobe/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".liveprobe/chromium/chrome-linux64/chrome"),
                home.join(".liveprobe/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch configuration for the Chromium provider.
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Run headless (new headless mode). Headed runs start maximized instead.
    pub headless: bool,
    /// Use an incognito profile so state never leaks between runs.
    pub incognito: bool,
    /// UI language hint, e.g. "en" or "bg".
    pub lang: String,
    /// Window size in headless mode, so responsive layouts are deterministic.
    pub window: (u32, u32),
    /// Explicit Chromium binary; discovered via [`find_chromium`] when unset.
    pub executable: Option<PathBuf>,
    /// Pause between pointer move and click.
    pub pointer_pause: Duration,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            incognito: true,
            lang: "en".to_string(),
            window: (1366, 900),
            executable: None,
            pointer_pause: Duration::from_millis(150),
        }
    }
}

/// Chromium-backed live view.
pub struct ChromiumView {
    #[allow(dead_code)]
    browser: Browser,
    page: Page,
    pointer_pause: Duration,
}

impl ChromiumView {
    /// Launch a Chromium instance and open a blank page.
    pub async fn launch(config: ChromiumConfig) -> Result<Self> {
        let chrome_path = match config.executable.clone() {
            Some(p) => p,
            None => find_chromium()
                .context("Chromium not found. Set LIVEPROBE_CHROMIUM_PATH or install Chrome.")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-notifications")
            .arg("--disable-infobars")
            .arg(format!("--lang={}", config.lang));

        if config.incognito {
            builder = builder.arg("--incognito");
        }
        if config.headless {
            builder = builder
                .arg("--headless=new")
                .arg(format!("--window-size={},{}", config.window.0, config.window.1));
        } else {
            builder = builder.arg("--start-maximized");
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        // Drain CDP events for the lifetime of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        Ok(Self {
            browser,
            page,
            pointer_pause: config.pointer_pause,
        })
    }
}

/// Map a chromiumoxide error onto the view taxonomy.
///
/// CDP reports nodes torn down by a re-render with context/node errors;
/// those are the moral equivalent of a stale element reference.
fn map_cdp_err(e: impl std::fmt::Display) -> ViewError {
    let msg = e.to_string();
    let lowered = msg.to_lowercase();
    if lowered.contains("node") && (lowered.contains("detached") || lowered.contains("not find"))
        || lowered.contains("cannot find context")
        || lowered.contains("execution context was destroyed")
    {
        ViewError::Stale
    } else {
        ViewError::Provider(msg)
    }
}

/// Escape a string for injection into a single-quoted JS literal.
fn js_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {}
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            _ => out.push(ch),
        }
    }
    out
}

/// JS expression for the query's text filter: a string literal or `null`.
fn text_filter_js(query: &Query) -> String {
    match &query.text_contains {
        Some(t) => format!("'{}'", js_str(t)),
        None => "null".to_string(),
    }
}

async fn eval_json(page: &Page, js: String) -> ViewResult<serde_json::Value> {
    let result = page.evaluate(js).await.map_err(map_cdp_err)?;
    result
        .into_value::<serde_json::Value>()
        .map_err(|e| ViewError::Provider(format!("failed to decode JS result: {e:?}")))
}

/// Run `body` with `el` bound to the registered node, surfacing staleness.
async fn eval_on_node(page: &Page, index: usize, body: &str) -> ViewResult<serde_json::Value> {
    let js = format!(
        r#"(() => {{
            const reg = window.__lpReg;
            const el = reg && reg.nodes[{index}];
            if (!el || !el.isConnected) return {{ stale: true }};
            {body}
        }})()"#
    );
    let value = eval_json(page, js).await?;
    if value
        .get("stale")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return Err(ViewError::Stale);
    }
    if let Some(err) = value.get("error").and_then(|v| v.as_str()) {
        return Err(ViewError::Provider(err.to_string()));
    }
    Ok(value)
}

fn indices_of(value: &serde_json::Value, field: &str) -> Vec<usize> {
    value
        .get(field)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_u64())
                .map(|v| v as usize)
                .collect()
        })
        .unwrap_or_default()
}

/// One node parked in the page-side registry.
pub struct ChromiumHandle {
    page: Page,
    index: usize,
    pointer_pause: Duration,
}

impl ChromiumHandle {
    fn wrap(&self, index: usize) -> Box<dyn ViewHandle> {
        Box::new(ChromiumHandle {
            page: self.page.clone(),
            index,
            pointer_pause: self.pointer_pause,
        })
    }

    async fn pointer_click(&self) -> ViewResult<()> {
        // Scroll into view, compute the click point, and check what actually
        // sits on top of it. A foreign element at the point means an overlay
        // would swallow the click.
        let body = r#"
            el.scrollIntoView({ block: 'center', inline: 'center' });
            const r = el.getBoundingClientRect();
            const cx = r.left + r.width / 2;
            const cy = r.top + r.height / 2;
            const top = document.elementFromPoint(cx, cy);
            const hit = top !== null && (el === top || el.contains(top) || top.contains(el));
            return { stale: false, x: cx, y: cy, covered: !hit };
        "#;
        let v = eval_on_node(&self.page, self.index, body).await?;
        if v.get("covered").and_then(|c| c.as_bool()).unwrap_or(false) {
            return Err(ViewError::Intercepted);
        }
        let x = v.get("x").and_then(|x| x.as_f64()).unwrap_or(0.0);
        let y = v.get("y").and_then(|y| y.as_f64()).unwrap_or(0.0);
        let point = Point::new(x, y);

        // Realistic sequencing: move, pause, click.
        self.page.move_mouse(point).await.map_err(map_cdp_err)?;
        tokio::time::sleep(self.pointer_pause).await;
        self.page.click(point).await.map_err(map_cdp_err)?;
        Ok(())
    }

    async fn press_enter(&self) -> ViewResult<()> {
        eval_on_node(
            &self.page,
            self.index,
            "el.focus(); return { stale: false };",
        )
        .await?;

        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let event = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key("Enter")
                .code("Enter")
                .windows_virtual_key_code(13)
                .build()
                .map_err(ViewError::Provider)?;
            self.page.execute(event).await.map_err(map_cdp_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ViewHandle for ChromiumHandle {
    async fn is_visible(&self) -> ViewResult<bool> {
        let body = r#"
            const r = el.getBoundingClientRect();
            const st = window.getComputedStyle(el);
            const shown = r.width > 0 && r.height > 0
                && st.display !== 'none' && st.visibility !== 'hidden';
            return { stale: false, value: shown };
        "#;
        let v = eval_on_node(&self.page, self.index, body).await?;
        Ok(v.get("value").and_then(|b| b.as_bool()).unwrap_or(false))
    }

    async fn text(&self) -> ViewResult<String> {
        let body = r#"
            const t = el.innerText !== undefined ? el.innerText : el.textContent;
            return { stale: false, value: t || '' };
        "#;
        let v = eval_on_node(&self.page, self.index, body).await?;
        Ok(v.get("value")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn attribute(&self, name: &str) -> ViewResult<Option<String>> {
        // Fall through to the DOM property so "textContent" works the way
        // WebDriver's getAttribute does.
        let body = format!(
            r#"
            const name = '{}';
            const attr = el.getAttribute(name);
            if (attr !== null) return {{ stale: false, value: attr }};
            const prop = el[name];
            return {{ stale: false, value: typeof prop === 'string' ? prop : null }};
            "#,
            js_str(name)
        );
        let v = eval_on_node(&self.page, self.index, &body).await?;
        Ok(v.get("value").and_then(|t| t.as_str()).map(String::from))
    }

    async fn descendants(&self, query: &Query) -> ViewResult<Vec<Box<dyn ViewHandle>>> {
        let body = format!(
            r#"
            const wanted = {};
            let found;
            try {{ found = el.querySelectorAll('{}'); }}
            catch (e) {{ return {{ stale: false, error: String(e) }}; }}
            const out = [];
            for (const d of found) {{
                if (wanted && !(d.textContent || '').includes(wanted)) continue;
                out.push(reg.nodes.push(d) - 1);
            }}
            return {{ stale: false, indices: out }};
            "#,
            text_filter_js(query),
            js_str(&query.css)
        );
        let v = eval_on_node(&self.page, self.index, &body).await?;
        Ok(indices_of(&v, "indices")
            .into_iter()
            .map(|i| self.wrap(i))
            .collect())
    }

    async fn ancestor(&self, query: &Query) -> ViewResult<Option<Box<dyn ViewHandle>>> {
        let body = format!(
            r#"
            const wanted = {};
            let p = el.parentElement;
            while (p) {{
                let ok = false;
                try {{ ok = p.matches('{}'); }}
                catch (e) {{ return {{ stale: false, error: String(e) }}; }}
                if (ok && (!wanted || (p.textContent || '').includes(wanted))) {{
                    return {{ stale: false, index: reg.nodes.push(p) - 1 }};
                }}
                p = p.parentElement;
            }}
            return {{ stale: false, index: null }};
            "#,
            text_filter_js(query),
            js_str(&query.css)
        );
        let v = eval_on_node(&self.page, self.index, &body).await?;
        Ok(v.get("index")
            .and_then(|i| i.as_u64())
            .map(|i| self.wrap(i as usize)))
    }

    async fn parent(&self) -> ViewResult<Option<Box<dyn ViewHandle>>> {
        let body = r#"
            const p = el.parentElement;
            return { stale: false, index: p ? reg.nodes.push(p) - 1 : null };
        "#;
        let v = eval_on_node(&self.page, self.index, body).await?;
        Ok(v.get("index")
            .and_then(|i| i.as_u64())
            .map(|i| self.wrap(i as usize)))
    }

    async fn interact(&self, kind: Interaction) -> ViewResult<()> {
        match kind {
            Interaction::PointerClick => self.pointer_click().await,
            Interaction::PressEnter => self.press_enter().await,
        }
    }
}

#[async_trait]
impl ViewProvider for ChromiumView {
    async fn locate(&self, query: &Query) -> ViewResult<Vec<Box<dyn ViewHandle>>> {
        let js = format!(
            r#"(() => {{
                const reg = window.__lpReg = window.__lpReg || {{ nodes: [] }};
                for (let i = 0; i < reg.nodes.length; i++) {{
                    const n = reg.nodes[i];
                    if (n && !n.isConnected) reg.nodes[i] = null;
                }}
                const wanted = {};
                let found;
                try {{ found = document.querySelectorAll('{}'); }}
                catch (e) {{ return {{ error: String(e) }}; }}
                const out = [];
                for (const el of found) {{
                    if (wanted && !(el.textContent || '').includes(wanted)) continue;
                    out.push(reg.nodes.push(el) - 1);
                }}
                return {{ indices: out }};
            }})()"#,
            text_filter_js(query),
            js_str(&query.css)
        );
        let v = eval_json(&self.page, js).await?;
        if let Some(err) = v.get("error").and_then(|e| e.as_str()) {
            return Err(ViewError::Provider(format!("bad query {query}: {err}")));
        }
        Ok(indices_of(&v, "indices")
            .into_iter()
            .map(|i| {
                Box::new(ChromiumHandle {
                    page: self.page.clone(),
                    index: i,
                    pointer_pause: self.pointer_pause,
                }) as Box<dyn ViewHandle>
            })
            .collect())
    }

    async fn current_url(&self) -> ViewResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(map_cdp_err)?
            .unwrap_or_default())
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> ViewResult<()> {
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        match result {
            Ok(Ok(_)) => {
                // Settle the initial render; old registry entries are gone
                // with the previous document, which is exactly the staleness
                // contract handles rely on.
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => Err(map_cdp_err(e)),
            Err(_) => Err(ViewError::Timeout(timeout)),
        }
    }

    async fn close(self: Box<Self>) -> ViewResult<()> {
        let _ = self.page.close().await;
        // Browser process shuts down on drop.
        Ok(())
    }
}
