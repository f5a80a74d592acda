//! Response-extraction and completion-detection engine
//!
//! Given a page that already has the question submitted, this module decides
//! *when* generation finished and *what* the produced content is, using only
//! observable page state: rendered text, images, and transient loading
//! indicators. The remote UI is unstructured and changes without notice, so
//! everything runs on ordered fallback chains, injectable denylists, and
//! strict wall-clock budgets.
//!
//! Entry point: [`run_extraction`]. Everything it needs from the page goes
//! through the read-only [`PageObserver`] seam.

pub mod budget;
pub mod classifier;
pub mod config;
pub mod fetch;
pub mod observe;
pub mod types;

mod completion;
mod coordinator;
#[cfg(test)]
pub(crate) mod fixtures;
mod poller;
mod strategies;

use chromiumoxide::Page;

pub use budget::AttemptBudget;
pub use classifier::{ClassifierConfig, ContentClassifier};
pub use config::ExtractConfig;
pub use fetch::{AssetFetcher, FetchError, HttpFetcher};
pub use observe::{CdpObserver, ImageElement, ObserveError, PageObserver};
pub use types::{
    CompletionSignal, ExtractionCandidate, GenerationKind, ImageAsset, RequestContext,
    RunOutcome, RunResult,
};

/// Run one extraction race against a live page.
///
/// The page must already be navigated to the conversation with the question
/// submitted. Returns a terminal [`RunResult`]; budget exhaustion is the
/// `Timeout` outcome, not an error, so the caller can degrade to a
/// link-based response.
pub async fn run_extraction(page: &Page, context: &RequestContext, config: &ExtractConfig) -> RunResult {
    let observer = CdpObserver::new(page.clone());
    let fetcher = HttpFetcher::new();
    run_extraction_with(&observer, &fetcher, context, config).await
}

/// Engine entry point over explicit observer/fetcher implementations.
///
/// This is what tests drive with fakes; [`run_extraction`] is the
/// chromiumoxide wiring over it.
pub async fn run_extraction_with<O, F>(
    observer: &O,
    fetcher: &F,
    context: &RequestContext,
    config: &ExtractConfig,
) -> RunResult
where
    O: PageObserver + ?Sized,
    F: AssetFetcher + ?Sized,
{
    coordinator::run_race(observer, fetcher, context, config).await
}
