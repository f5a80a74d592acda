//! In-memory fakes for engine tests
//!
//! `FakeObserver` holds a mutable page snapshot behind a mutex so tests can
//! rewrite "page state" while the engine runs against a paused tokio clock.
//! `FakeFetcher` scripts download outcomes per URL.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::config::ExtractConfig;
use super::fetch::{AssetFetcher, FetchError};
use super::observe::{ImageElement, ObserveError, ObserveResult, PageObserver};

#[derive(Debug, Default, Clone)]
pub(crate) struct PageState {
    /// selector -> element texts, in DOM order.
    pub texts: HashMap<String, Vec<String>>,
    pub labelled: Option<String>,
    pub blocks: Vec<String>,
    pub body: String,
    pub html: String,
    /// selector -> images.
    pub images: HashMap<String, Vec<ImageElement>>,
    pub asset_urls: Vec<String>,
    /// selectors currently present in the page.
    pub present: Vec<String>,
    /// src -> bytes for in-page capture.
    pub captures: HashMap<String, Vec<u8>>,
}

pub(crate) struct FakeObserver {
    state: Mutex<PageState>,
    texts_calls: Mutex<HashMap<String, u32>>,
    /// (probes left before failing, failures left). Every observer method
    /// consults this before answering.
    failure_plan: Mutex<(u32, u32)>,
}

impl FakeObserver {
    pub fn new(state: PageState) -> Self {
        Self {
            state: Mutex::new(state),
            texts_calls: Mutex::new(HashMap::new()),
            failure_plan: Mutex::new((0, 0)),
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut PageState)) {
        apply(&mut self.state.lock().unwrap());
    }

    /// How many times `texts()` was probed for `selector`. One probe of the
    /// first response selector equals one pass of the strategy chain.
    pub fn texts_calls(&self, selector: &str) -> u32 {
        *self.texts_calls.lock().unwrap().get(selector).unwrap_or(&0)
    }

    /// Make the next `failures` observer calls return an error, as a detached
    /// node or mid-navigation DOM would.
    pub fn fail_next_probes(&self, failures: u32) {
        self.fail_probes_after(0, failures);
    }

    /// Like [`fail_next_probes`](Self::fail_next_probes), but let `successes`
    /// calls through first.
    pub fn fail_probes_after(&self, successes: u32, failures: u32) {
        *self.failure_plan.lock().unwrap() = (successes, failures);
    }

    fn probe_gate(&self) -> ObserveResult<()> {
        let mut plan = self.failure_plan.lock().unwrap();
        if plan.0 > 0 {
            plan.0 -= 1;
            return Ok(());
        }
        if plan.1 > 0 {
            plan.1 -= 1;
            return Err(ObserveError::Query("node detached".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PageObserver for FakeObserver {
    async fn texts(&self, selector: &str) -> ObserveResult<Vec<String>> {
        *self
            .texts_calls
            .lock()
            .unwrap()
            .entry(selector.to_string())
            .or_insert(0) += 1;
        self.probe_gate()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .texts
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_present(&self, selector: &str) -> ObserveResult<bool> {
        self.probe_gate()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .present
            .iter()
            .any(|s| s == selector))
    }

    async fn labelled_region_text(&self, _label: &str) -> ObserveResult<Option<String>> {
        self.probe_gate()?;
        Ok(self.state.lock().unwrap().labelled.clone())
    }

    async fn visible_text_blocks(&self, min_len: usize) -> ObserveResult<Vec<String>> {
        self.probe_gate()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .blocks
            .iter()
            .filter(|b| b.chars().count() >= min_len)
            .cloned()
            .collect())
    }

    async fn body_text(&self) -> ObserveResult<String> {
        self.probe_gate()?;
        Ok(self.state.lock().unwrap().body.clone())
    }

    async fn rendered_html(&self) -> ObserveResult<String> {
        self.probe_gate()?;
        Ok(self.state.lock().unwrap().html.clone())
    }

    async fn images(&self, selector: &str) -> ObserveResult<Vec<ImageElement>> {
        self.probe_gate()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn scan_asset_urls(&self, _pattern: &str) -> ObserveResult<Vec<String>> {
        self.probe_gate()?;
        Ok(self.state.lock().unwrap().asset_urls.clone())
    }

    async fn capture_image(&self, src: &str) -> ObserveResult<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .captures
            .get(src)
            .cloned()
            .ok_or_else(|| ObserveError::Query(format!("no capture scripted for {src}")))
    }
}

pub(crate) struct FakeFetcher {
    /// url -> Ok(bytes) or Err(http status).
    responses: HashMap<String, Result<Vec<u8>, u16>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(responses: HashMap<String, Result<Vec<u8>, u16>>) -> Self {
        Self {
            responses,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        match self.responses.get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(status)) => Err(FetchError::Status(*status)),
            None => Err(FetchError::Network("no route scripted".to_string())),
        }
    }
}

/// Small deterministic config shared across engine tests: one selector per
/// concern so probe counts map one-to-one onto chain passes.
pub(crate) fn test_config() -> ExtractConfig {
    ExtractConfig {
        response_selectors: vec!["#answer".to_string()],
        loading_selectors: vec!["#spinner".to_string()],
        completion_selectors: vec!["#done".to_string()],
        image_selectors: vec!["img.gen".to_string()],
        ..ExtractConfig::default()
    }
}
