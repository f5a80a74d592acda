//! Read-only page observation seam
//!
//! Every probe the engine makes goes through [`PageObserver`]. The production
//! implementation wraps a chromiumoxide [`Page`]; tests drive the engine with
//! an in-memory fake. All methods are non-mutating and idempotent, so the
//! poller and the completion detector can share one page handle concurrently
//! without coordination.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ObserveError {
    /// A DOM query threw (stale handle, mid-navigation). Callers treat this
    /// as "no candidate this attempt", never as fatal.
    #[error("page query failed: {0}")]
    Query(String),

    #[error("unexpected evaluation result: {0}")]
    BadValue(String),
}

pub type ObserveResult<T> = Result<T, ObserveError>;

/// An `<img>` element as observed in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageElement {
    pub src: String,
    pub alt: String,
}

/// Non-mutating observations over live page state.
#[async_trait]
pub trait PageObserver: Send + Sync {
    /// Trimmed inner text of every element matching `selector`, in DOM order.
    async fn texts(&self, selector: &str) -> ObserveResult<Vec<String>>;

    /// Whether at least one element matches `selector`.
    async fn is_present(&self, selector: &str) -> ObserveResult<bool>;

    /// Text of the region following an accessibility marker whose label
    /// contains `label` (case-insensitive): sibling blocks concatenated, or
    /// the marker's parent region when it has no following siblings.
    async fn labelled_region_text(&self, label: &str) -> ObserveResult<Option<String>>;

    /// Visible text nodes of at least `min_len` characters, in document
    /// order, excluding script/style/navigation/analytics subtrees.
    async fn visible_text_blocks(&self, min_len: usize) -> ObserveResult<Vec<String>>;

    /// The page body's rendered text.
    async fn body_text(&self) -> ObserveResult<String>;

    /// Full rendered HTML, for when innerText comes back empty on an SPA.
    async fn rendered_html(&self) -> ObserveResult<String>;

    /// Every `<img>` matching `selector`, with src and alt.
    async fn images(&self, selector: &str) -> ObserveResult<Vec<ImageElement>>;

    /// Literal asset URLs matching `pattern` (a JS regex source) anywhere in
    /// the body text or element attributes, deduplicated, in discovery order.
    async fn scan_asset_urls(&self, pattern: &str) -> ObserveResult<Vec<String>>;

    /// Screenshot the image element with the given src. Used to materialize
    /// blob: locators that cannot be fetched out of band.
    async fn capture_image(&self, src: &str) -> ObserveResult<Vec<u8>>;
}

/// [`PageObserver`] backed by a live CDP page.
pub struct CdpObserver {
    page: Page,
}

impl CdpObserver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval(&self, expr: String) -> ObserveResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(expr)
            .await
            .map_err(|e| ObserveError::Query(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| ObserveError::BadValue(e.to_string()))
    }

    fn string_array(value: serde_json::Value) -> Vec<String> {
        match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Embed a Rust string into a JS expression as a quoted literal.
pub(crate) fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl PageObserver for CdpObserver {
    async fn texts(&self, selector: &str) -> ObserveResult<Vec<String>> {
        let expr = format!(
            "Array.from(document.querySelectorAll({sel}))\
             .map(el => (el.innerText || el.textContent || '').trim())",
            sel = js_str(selector)
        );
        Ok(Self::string_array(self.eval(expr).await?))
    }

    async fn is_present(&self, selector: &str) -> ObserveResult<bool> {
        let expr = format!(
            "document.querySelector({sel}) !== null",
            sel = js_str(selector)
        );
        match self.eval(expr).await? {
            serde_json::Value::Bool(present) => Ok(present),
            other => Err(ObserveError::BadValue(format!(
                "expected bool, got {other}"
            ))),
        }
    }

    async fn labelled_region_text(&self, label: &str) -> ObserveResult<Option<String>> {
        let expr = format!(
            r#"(() => {{
                const label = {label};
                const marks = Array.from(
                    document.querySelectorAll('[aria-label], [data-role], [role], .sr-only')
                ).filter(el => {{
                    const l = (el.getAttribute('aria-label') || el.getAttribute('data-role')
                        || el.getAttribute('role') || el.textContent || '').toLowerCase();
                    return l.includes(label);
                }});
                if (!marks.length) return null;
                const mark = marks[marks.length - 1];
                const parts = [];
                for (let sib = mark.nextElementSibling; sib; sib = sib.nextElementSibling) {{
                    const t = (sib.innerText || sib.textContent || '').trim();
                    if (t) parts.push(t);
                }}
                if (!parts.length && mark.parentElement) {{
                    const t = (mark.parentElement.innerText || '').trim();
                    if (t) parts.push(t);
                }}
                return parts.length ? parts.join('\n') : null;
            }})()"#,
            label = js_str(&label.to_lowercase())
        );
        match self.eval(expr).await? {
            serde_json::Value::String(text) => Ok(Some(text)),
            _ => Ok(None),
        }
    }

    async fn visible_text_blocks(&self, min_len: usize) -> ObserveResult<Vec<String>> {
        let expr = format!(
            r#"(() => {{
                const excluded = ['script', 'style', 'nav', 'header', 'footer', 'noscript'];
                const walker = document.createTreeWalker(
                    document.body,
                    NodeFilter.SHOW_TEXT,
                    {{
                        acceptNode: (node) => {{
                            for (let el = node.parentElement; el; el = el.parentElement) {{
                                if (excluded.includes(el.tagName.toLowerCase())
                                    || el.classList.contains('analytics')) {{
                                    return NodeFilter.FILTER_REJECT;
                                }}
                            }}
                            return NodeFilter.FILTER_ACCEPT;
                        }}
                    }}
                );
                const blocks = [];
                let node;
                while ((node = walker.nextNode())) {{
                    const text = (node.textContent || '').trim();
                    if (text.length >= {min_len}) blocks.push(text);
                }}
                return blocks;
            }})()"#
        );
        Ok(Self::string_array(self.eval(expr).await?))
    }

    async fn body_text(&self) -> ObserveResult<String> {
        let expr =
            "document.body ? (document.body.innerText || document.body.textContent || '') : ''";
        match self.eval(expr.to_string()).await? {
            serde_json::Value::String(text) => Ok(text),
            _ => Ok(String::new()),
        }
    }

    async fn rendered_html(&self) -> ObserveResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| ObserveError::Query(e.to_string()))
    }

    async fn images(&self, selector: &str) -> ObserveResult<Vec<ImageElement>> {
        let expr = format!(
            "Array.from(document.querySelectorAll({sel}))\
             .map(img => ({{ src: img.src || '', alt: img.alt || '' }}))",
            sel = js_str(selector)
        );
        match self.eval(expr).await? {
            serde_json::Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| {
                    let src = item.get("src")?.as_str()?.to_string();
                    let alt = item
                        .get("alt")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    Some(ImageElement { src, alt })
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn scan_asset_urls(&self, pattern: &str) -> ObserveResult<Vec<String>> {
        let expr = format!(
            r#"(() => {{
                const re = new RegExp({pattern}, 'g');
                const found = [];
                const push = (text) => {{
                    let m;
                    re.lastIndex = 0;
                    while ((m = re.exec(text))) found.push(m[0]);
                }};
                push(document.body ? (document.body.textContent || '') : '');
                for (const el of document.querySelectorAll('*')) {{
                    for (const name of el.getAttributeNames()) {{
                        const value = el.getAttribute(name);
                        if (value) push(value);
                    }}
                }}
                return Array.from(new Set(found));
            }})()"#,
            pattern = js_str(pattern)
        );
        Ok(Self::string_array(self.eval(expr).await?))
    }

    async fn capture_image(&self, src: &str) -> ObserveResult<Vec<u8>> {
        let selector = format!("img[src={}]", js_str(src));
        let element = self
            .page
            .find_element(&selector)
            .await
            .map_err(|e| ObserveError::Query(e.to_string()))?;
        debug!("Capturing in-page screenshot of {}", src);
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| ObserveError::Query(e.to_string()))
    }
}
