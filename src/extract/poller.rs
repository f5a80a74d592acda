//! Adaptive polling loop over the strategy chain
//!
//! Drives repeated chain attempts on the front-loaded schedule in
//! [`super::budget`], stopping at the first classifier-accepted candidate,
//! `max_attempts`, or the deadline.

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use super::budget::{AttemptBudget, poll_delay};
use super::classifier::ContentClassifier;
use super::config::ExtractConfig;
use super::fetch::AssetFetcher;
use super::observe::PageObserver;
use super::strategies::{run_image_chain, run_text_chain};
use super::types::{ExtractionCandidate, GenerationKind, RequestContext};

/// Poll until a candidate is accepted or the budget runs out.
///
/// Image requests run the image locator chain first; the text chain still
/// follows within the same attempt, because the remote side sometimes answers
/// an image prompt with text (refusals, quota notices).
pub(crate) async fn poll_for_candidate<O, F>(
    observer: &O,
    fetcher: &F,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
    context: &RequestContext,
    budget: &AttemptBudget,
) -> Option<ExtractionCandidate>
where
    O: PageObserver + ?Sized,
    F: AssetFetcher + ?Sized,
{
    let start = Instant::now();
    let deadline = budget.overall_deadline();

    for attempt in 1..=budget.max_attempts {
        // Raw-body scraping is noisy; hold it back until the deadline is near.
        let deadline_near = start.elapsed() >= deadline.mul_f64(0.8);

        let candidate = match context.kind {
            GenerationKind::Image => {
                match run_image_chain(observer, fetcher, config, classifier).await {
                    Some(image) => Some(image),
                    None => run_text_chain(observer, config, classifier, deadline_near).await,
                }
            }
            GenerationKind::Text => {
                run_text_chain(observer, config, classifier, deadline_near).await
            }
        };

        if let Some(candidate) = candidate {
            debug!(attempt, elapsed_ms = start.elapsed().as_millis() as u64, "candidate accepted");
            return Some(candidate);
        }

        let elapsed = start.elapsed();
        if elapsed >= deadline {
            debug!(attempt, "poll deadline reached without a candidate");
            return None;
        }
        let delay = poll_delay(attempt, elapsed).min(deadline - elapsed);
        trace!(attempt, delay_ms = delay.as_millis() as u64, "no candidate yet, sleeping");
        sleep(delay).await;
    }

    debug!(attempts = budget.max_attempts, "poll attempts exhausted");
    None
}
