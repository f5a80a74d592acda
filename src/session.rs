//! One question, one page: session orchestration against the chat app
//!
//! A [`ChatSession`] owns the journey of a single question: open a fresh
//! page on the shared browser, authenticate, navigate to the model's prompt
//! URL, push the prompt through the composer, then hand the page to the
//! extraction engine. Every step that touches the remote app is best-effort
//! with logged fallbacks, because the app ships UI changes without notice.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::page::Page;
use chromiumoxide_cdp::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use serde_json::json;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::Config;
use crate::browser_setup::CHROME_USER_AGENT;
use crate::catalog::Model;
use crate::extract::observe::js_str;
use crate::extract::{ImageAsset, RequestContext, RunOutcome, RunResult, run_extraction};
use crate::manager::BrowserManager;

/// Selector for the message composer. The app has changed between a plain
/// textarea and a contenteditable div across releases; match all of them.
const COMPOSER_SELECTOR: &str = "textarea, input[type=\"text\"], [contenteditable=\"true\"]";

const SUBMIT_SELECTOR: &str = "button[type=\"submit\"], [data-testid=\"send-button\"], \
     .send-button, button[class*=\"send\"], button[class*=\"submit\"]";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Browser unavailable: {0}")]
    Browser(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Composer interaction failed: {0}")]
    Composer(String),
}

/// What the caller gets back for one question.
#[derive(Debug, Clone)]
pub enum AskOutcome {
    Text(String),
    Image(ImageAsset),
    /// Extraction gave up within budget. The prompt URL still carries the
    /// question, so the caller can hand the user a clickable link instead.
    Fallback { url: String },
}

pub struct ChatSession {
    manager: Arc<BrowserManager>,
    config: Config,
}

impl ChatSession {
    pub fn new(manager: Arc<BrowserManager>, config: Config) -> Self {
        Self { manager, config }
    }

    /// Build the prompt URL for a model: substitute the encoded prompt into
    /// the catalog template and opt into search when both sides support it.
    pub fn build_prompt_url(&self, model: &Model, context: &RequestContext) -> String {
        let template = model
            .url
            .replace("https://beta.t3.chat", &self.config.base_url);
        let mut url = template.replace(
            "%s",
            &urlencoding::encode(&context.full_prompt()),
        );
        if context.search_enabled && model.features.search {
            url.push_str("&search=true");
        }
        url
    }

    /// Ask one question and wait for the answer.
    ///
    /// Opens a dedicated page, authenticates, submits the prompt, runs the
    /// extraction race, and closes the page. Budget exhaustion and page-level
    /// setup failures both degrade to [`AskOutcome::Fallback`] rather than an
    /// error; only "no page at all" surfaces as [`SessionError`].
    pub async fn ask(
        &self,
        model: &Model,
        context: &RequestContext,
    ) -> Result<AskOutcome, SessionError> {
        let url = self.build_prompt_url(model, context);
        info!(
            "Asking {} ({:?} generation): {}",
            model.name,
            context.kind,
            context.question
        );

        let page = self.open_page().await?;
        let run = self.ask_on_page(&page, context, &url).await;

        // The page is per-question; close it regardless of outcome so the
        // shared browser doesn't accumulate tabs.
        if let Err(e) = page.close().await {
            debug!("Failed to close page after run: {}", e);
        }

        info!(
            "Run finished in {}ms: {}",
            run.elapsed_ms,
            match &run.outcome {
                RunOutcome::Text(t) => format!("text ({} chars)", t.len()),
                RunOutcome::Image(a) => format!("image ({})", a.source_url),
                RunOutcome::Timeout => "timeout".to_string(),
                RunOutcome::Error(e) => format!("error: {e}"),
            }
        );

        Ok(Self::resolve(run.outcome, url))
    }

    /// Map a run outcome to what the caller sees. Timeout and pre-race
    /// failures both turn into the clickable fallback link.
    fn resolve(outcome: RunOutcome, url: String) -> AskOutcome {
        match outcome {
            RunOutcome::Text(text) => AskOutcome::Text(text),
            RunOutcome::Image(asset) => AskOutcome::Image(asset),
            RunOutcome::Timeout => AskOutcome::Fallback { url },
            RunOutcome::Error(e) => {
                warn!("Run failed before extraction, degrading to link response: {}", e);
                AskOutcome::Fallback { url }
            }
        }
    }

    /// Drive one question on an already-open page. Failures while the page is
    /// being prepared (auth, navigation, composer) become
    /// [`RunOutcome::Error`]; once the extraction race starts, the engine owns
    /// the outcome.
    async fn ask_on_page(&self, page: &Page, context: &RequestContext, url: &str) -> RunResult {
        let started = std::time::Instant::now();
        let staged = async {
            self.bootstrap_auth(page).await?;
            self.navigate_to_prompt(page, url).await?;
            self.submit_prompt(page, context).await?;
            Ok::<(), SessionError>(())
        }
        .await;

        match staged {
            Ok(()) => run_extraction(page, context, &self.config.extract).await,
            Err(e) => RunResult {
                outcome: RunOutcome::Error(e.to_string()),
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    async fn open_page(&self) -> Result<Page, SessionError> {
        let browser_arc = self
            .manager
            .get_or_launch()
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))?;
        let guard = browser_arc.lock().await;
        let wrapper = guard
            .as_ref()
            .ok_or_else(|| SessionError::Browser("Browser not available".into()))?;
        crate::browser::new_page(wrapper)
            .await
            .map_err(|e| SessionError::Browser(e.to_string()))
    }

    /// Seed the access token everywhere the app might look for it.
    ///
    /// The app's auth storage has moved between localStorage keys and cookies
    /// across releases, so the token is planted under every spelling that has
    /// been observed, plus a bearer header for direct API calls.
    async fn bootstrap_auth(&self, page: &Page) -> Result<(), SessionError> {
        page.set_user_agent(CHROME_USER_AGENT)
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;

        let token = self.config.access_token();
        let headers = json!({
            "Accept-Language": "en-US,en;q=0.9",
            "Authorization": format!("Bearer {token}"),
        });
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;

        page.goto(self.config.base_url.as_str())
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        let _ = page.wait_for_navigation().await;

        let seed = format!(
            "(() => {{\
                const token = {tok};\
                for (const key of ['access_token', 'accessToken', 'auth_token', 'token']) {{\
                    localStorage.setItem(key, token);\
                    document.cookie = key + '=' + token + '; path=/; domain=.t3.chat';\
                }}\
            }})()",
            tok = js_str(token),
        );
        if let Err(e) = page.evaluate(seed).await {
            warn!("Failed to seed auth token into page storage: {}", e);
        }

        sleep(Duration::from_millis(self.config.settle_ms)).await;
        Ok(())
    }

    async fn navigate_to_prompt(&self, page: &Page, url: &str) -> Result<(), SessionError> {
        debug!("Navigating to prompt URL: {}", url);
        page.goto(url)
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        let _ = page.wait_for_navigation().await;
        sleep(Duration::from_millis(self.config.settle_ms)).await;

        if self.on_login_wall(page).await {
            warn!("Hit login/upgrade wall, attempting token form login");
            if self.attempt_form_login(page).await {
                sleep(Duration::from_millis(self.config.settle_ms)).await;
                page.goto(url)
                    .await
                    .map_err(|e| SessionError::Navigation(e.to_string()))?;
                let _ = page.wait_for_navigation().await;
                sleep(Duration::from_millis(self.config.settle_ms)).await;
            }
        }
        Ok(())
    }

    /// True when the rendered page is a login or upgrade wall instead of the
    /// conversation view.
    async fn on_login_wall(&self, page: &Page) -> bool {
        let expr = "(() => {\
            const text = document.body ? document.body.textContent || '' : '';\
            return text.includes('Upgrade to Pro')\
                || text.includes('Sign in')\
                || text.includes('Terms and our Privacy Policy');\
        })()";
        match page.evaluate(expr).await {
            Ok(result) => matches!(result.into_value(), Ok(serde_json::Value::Bool(true))),
            Err(e) => {
                debug!("Auth check evaluation failed: {}", e);
                false
            }
        }
    }

    /// Best-effort: paste the token into any credential-looking input and
    /// click the first submit button. Returns whether a submit was clicked.
    async fn attempt_form_login(&self, page: &Page) -> bool {
        let expr = format!(
            "(() => {{\
                const token = {tok};\
                const inputs = document.querySelectorAll(\
                    'input[type=\"password\"], input[name=\"token\"], \
                     input[placeholder*=\"token\"], input[placeholder*=\"key\"]');\
                for (const input of inputs) {{\
                    input.value = token;\
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));\
                    input.dispatchEvent(new Event('change', {{ bubbles: true }}));\
                }}\
                const button = document.querySelector('button[type=\"submit\"]');\
                if (button) {{ button.click(); return true; }}\
                return false;\
            }})()",
            tok = js_str(self.config.access_token()),
        );
        match page.evaluate(expr).await {
            Ok(result) => matches!(result.into_value(), Ok(serde_json::Value::Bool(true))),
            Err(e) => {
                debug!("Form login attempt failed: {}", e);
                false
            }
        }
    }

    /// Push the prompt through the composer and fire it off.
    ///
    /// The prompt URL usually pre-fills the composer, but typing it explicitly
    /// covers app versions that ignore the query parameter. No composer on the
    /// page is not an error for the same reason.
    async fn submit_prompt(
        &self,
        page: &Page,
        context: &RequestContext,
    ) -> Result<(), SessionError> {
        let prompt = context.full_prompt();

        let element = match page.find_element(COMPOSER_SELECTOR).await {
            Ok(element) => element,
            Err(e) => {
                debug!("No composer found ({}); relying on URL prefill", e);
                return Ok(());
            }
        };

        element
            .click()
            .await
            .map_err(|e| SessionError::Composer(format!("focus click: {e}")))?;
        sleep(Duration::from_millis(250)).await;

        // Clear URL-prefilled text so the typed prompt isn't doubled
        element
            .call_js_fn(
                "function() { this.value = ''; this.textContent = ''; }",
                false,
            )
            .await
            .map_err(|e| SessionError::Composer(format!("clear: {e}")))?;

        element
            .type_str(&prompt)
            .await
            .map_err(|e| SessionError::Composer(format!("type: {e}")))?;
        sleep(Duration::from_millis(250)).await;

        match page.find_element(SUBMIT_SELECTOR).await {
            Ok(button) => {
                debug!("Clicking submit button");
                button
                    .click()
                    .await
                    .map_err(|e| SessionError::Composer(format!("submit click: {e}")))?;
            }
            Err(_) => {
                debug!("No submit button found, pressing Enter");
                element
                    .press_key("Enter")
                    .await
                    .map_err(|e| SessionError::Composer(format!("press enter: {e}")))?;
            }
        }
        Ok(())
    }

    /// Quick connectivity probe: can we launch the browser and load the app?
    pub async fn test_connection(&self) -> Result<(), SessionError> {
        let page = self.open_page().await?;
        let result = page
            .goto(self.config.base_url.as_str())
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Navigation(e.to_string()));
        if let Err(e) = page.close().await {
            debug!("Failed to close probe page: {}", e);
        }
        result
    }
}
