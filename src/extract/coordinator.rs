//! Race coordination between the poller and the completion detector
//!
//! One run, one shot: the adaptive poller and the completion detector race as
//! cooperative tasks against the same page handle. The first usable signal
//! wins; a detector-first resolution earns exactly one more extraction pass;
//! and when everything expires, a last-resort raw-body pass runs before the
//! run settles on `Timeout`. Exceeding the deadline is an outcome, never an
//! error.

use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info};

use super::classifier::ContentClassifier;
use super::completion::await_completion;
use super::config::ExtractConfig;
use super::fetch::AssetFetcher;
use super::observe::PageObserver;
use super::poller::poll_for_candidate;
use super::strategies::{run_image_chain, run_text_chain};
use super::types::{
    ExtractionCandidate, GenerationKind, RequestContext, RunOutcome, RunResult,
};

/// Run one extraction race to a terminal [`RunResult`].
///
/// Cancellation is structural: both loops are plain futures polled by
/// `select!`, so whichever side loses is dropped at its next suspension point
/// and its eventual resolution is discarded.
pub(crate) async fn run_race<O, F>(
    observer: &O,
    fetcher: &F,
    context: &RequestContext,
    config: &ExtractConfig,
) -> RunResult
where
    O: PageObserver + ?Sized,
    F: AssetFetcher + ?Sized,
{
    let budget = config.budget_for(context.kind);
    let deadline = budget.overall_deadline();
    let start = Instant::now();
    let classifier = ContentClassifier::new(config.classifier.clone(), context.question.clone());

    info!(
        kind = ?context.kind,
        deadline_ms = budget.overall_deadline_ms,
        max_attempts = budget.max_attempts,
        "starting extraction run"
    );

    let poll = poll_for_candidate(observer, fetcher, config, &classifier, context, &budget);
    let detect = await_completion(observer, config, deadline);
    let expiry = sleep_until(start + deadline);
    tokio::pin!(poll, detect, expiry);

    let mut poll_exhausted = false;
    loop {
        tokio::select! {
            candidate = &mut poll, if !poll_exhausted => {
                match candidate {
                    Some(candidate) => {
                        debug!("poller settled the race");
                        return finish(candidate, start);
                    }
                    // Attempts ran out early; the detector may still flag
                    // completion and earn a retry.
                    None => poll_exhausted = true,
                }
            }
            signal = &mut detect => {
                if signal.finished {
                    debug!(elapsed_ms = signal.elapsed.as_millis() as u64,
                        "completion detected before any accepted candidate; one more pass");
                    if let Some(candidate) = final_pass(observer, fetcher, context, config, &classifier).await {
                        return finish(candidate, start);
                    }
                }
                break;
            }
            _ = &mut expiry => {
                debug!("overall deadline expired during the race");
                break;
            }
        }
    }

    // Last resort under deadline pressure: the raw-body split alone, so a
    // detector-first retry stays the single extra chain pass of a run.
    if let Some(candidate) = raw_body_pass(observer, config, &classifier).await {
        return finish(candidate, start);
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    info!(elapsed_ms, "extraction run timed out");
    RunResult { outcome: RunOutcome::Timeout, elapsed_ms }
}

/// One bounded extraction pass outside the race loop, so a hung page query
/// cannot stretch the run past the deadline by more than schedule overhead.
async fn final_pass<O, F>(
    observer: &O,
    fetcher: &F,
    context: &RequestContext,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<ExtractionCandidate>
where
    O: PageObserver + ?Sized,
    F: AssetFetcher + ?Sized,
{
    let bound = std::time::Duration::from_millis(config.final_pass_ms);
    let pass = async {
        if context.kind == GenerationKind::Image
            && let Some(image) = run_image_chain(observer, fetcher, config, classifier).await
        {
            return Some(image);
        }
        run_text_chain(observer, config, classifier, false).await
    };
    timeout(bound, pass).await.ok().flatten()
}

/// Bounded raw-body-only pass for the exhausted endgame.
async fn raw_body_pass<O>(
    observer: &O,
    config: &ExtractConfig,
    classifier: &ContentClassifier,
) -> Option<ExtractionCandidate>
where
    O: PageObserver + ?Sized,
{
    use super::strategies::TextStrategy;
    let bound = std::time::Duration::from_millis(config.final_pass_ms);
    timeout(bound, TextStrategy::RawBody.attempt(observer, config, classifier))
        .await
        .ok()
        .flatten()
        .map(ExtractionCandidate::Text)
}

fn finish(candidate: ExtractionCandidate, start: Instant) -> RunResult {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let outcome = match candidate {
        ExtractionCandidate::Text(text) => {
            info!(elapsed_ms, len = text.len(), "run succeeded with text");
            RunOutcome::Text(text)
        }
        ExtractionCandidate::Image(asset) => {
            info!(elapsed_ms, src = %asset.source_url, "run succeeded with image");
            RunOutcome::Image(asset)
        }
    };
    RunResult { outcome, elapsed_ms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::budget::AttemptBudget;
    use crate::extract::fixtures::{FakeFetcher, FakeObserver, PageState, test_config};
    use crate::extract::observe::ImageElement;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    const ANSWER: &str = "Polling is repeatedly sampling state until a condition holds.";

    #[tokio::test(start_paused = true)]
    async fn poller_win_returns_success_with_schedule_bounded_elapsed() {
        let observer = Arc::new(FakeObserver::new(PageState::default()));

        let obs = Arc::clone(&observer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            obs.update(|s| {
                s.texts.insert("#answer".to_string(), vec![ANSWER.to_string()]);
            });
        });

        let result = run_race(
            observer.as_ref(),
            &FakeFetcher::empty(),
            &RequestContext::text("What is polling?"),
            &test_config(),
        )
        .await;

        assert_eq!(result.outcome, RunOutcome::Text(ANSWER.to_string()));
        // Cumulative schedule through attempt 4: 100+100+100.
        assert_eq!(result.elapsed_ms, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn detector_first_earns_exactly_one_extra_pass() {
        // Zero poll attempts: only the detector can trigger extraction.
        let mut config = test_config();
        config.text_budget = AttemptBudget::new(0, 5_000);

        let mut state = PageState::default();
        state.present = vec!["#done".to_string()];
        let observer = FakeObserver::new(state);

        let result = run_race(
            &observer,
            &FakeFetcher::empty(),
            &RequestContext::text("q"),
            &config,
        )
        .await;

        // The extra pass found nothing; the run degrades to timeout, having
        // probed the response selector exactly once.
        assert_eq!(result.outcome, RunOutcome::Timeout);
        assert_eq!(observer.texts_calls("#answer"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn detector_first_extra_pass_can_succeed() {
        let mut config = test_config();
        config.text_budget = AttemptBudget::new(0, 5_000);

        let mut state = PageState::default();
        state.present = vec!["#done".to_string()];
        state.texts.insert("#answer".to_string(), vec![ANSWER.to_string()]);
        let observer = FakeObserver::new(state);

        let result = run_race(
            &observer,
            &FakeFetcher::empty(),
            &RequestContext::text("q"),
            &config,
        )
        .await;

        assert_eq!(result.outcome, RunOutcome::Text(ANSWER.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_times_out_within_schedule_overhead() {
        let mut config = test_config();
        config.text_budget = AttemptBudget::new(100, 500);

        let result = run_race(
            &FakeObserver::new(PageState::default()),
            &FakeFetcher::empty(),
            &RequestContext::text("q"),
            &config,
        )
        .await;

        assert_eq!(result.outcome, RunOutcome::Timeout);
        assert!((500..=600).contains(&result.elapsed_ms), "elapsed {}", result.elapsed_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_body_rescues_the_run_at_the_deadline() {
        let mut config = test_config();
        config.text_budget = AttemptBudget::new(3, 400);

        let mut state = PageState::default();
        // Nothing any structured strategy can use, but the body holds an
        // answer behind a footer marker.
        state.body = format!("{ANSWER}\nUpgrade to Pro\nfooter");
        // A loading indicator pins the detector down so it cannot settle.
        state.present = vec!["#spinner".to_string()];
        let observer = FakeObserver::new(state);

        let result = run_race(
            &observer,
            &FakeFetcher::empty(),
            &RequestContext::text("q"),
            &config,
        )
        .await;

        assert_eq!(result.outcome, RunOutcome::Text(ANSWER.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn second_image_candidate_rescues_a_failed_download() {
        let first = "https://utfs.io/f/Broken11".to_string();
        let second = "https://utfs.io/f/Works222".to_string();
        let mut state = PageState::default();
        state.images.insert(
            "img.gen".to_string(),
            vec![
                ImageElement { src: first.clone(), alt: String::new() },
                ImageElement { src: second.clone(), alt: String::new() },
            ],
        );
        let observer = FakeObserver::new(state);
        let fetcher = FakeFetcher::new(HashMap::from([
            (first, Err(502)),
            (second.clone(), Ok(b"image bytes".to_vec())),
        ]));

        let result = run_race(
            &observer,
            &fetcher,
            &RequestContext::image("draw a lighthouse"),
            &test_config(),
        )
        .await;

        match result.outcome {
            RunOutcome::Image(asset) => {
                assert_eq!(asset.source_url, second);
                assert_eq!(asset.bytes, Some(b"image bytes".to_vec()));
            }
            other => panic!("expected image outcome, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn image_runs_use_the_larger_budget() {
        let mut config = test_config();
        config.text_budget = AttemptBudget::new(100, 300);
        config.image_budget = AttemptBudget::new(100, 900);

        let observer = Arc::new(FakeObserver::new(PageState::default()));
        // An image appears at 600ms: inside the image budget, past the text one.
        let obs = Arc::clone(&observer);
        let url = "https://utfs.io/f/Late5555".to_string();
        let scripted = url.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            obs.update(|s| {
                s.images.insert(
                    "img.gen".to_string(),
                    vec![ImageElement { src: scripted.clone(), alt: String::new() }],
                );
            });
        });
        let fetcher = FakeFetcher::new(HashMap::from([(url, Ok(b"png".to_vec()))]));

        let result = run_race(
            observer.as_ref(),
            &fetcher,
            &RequestContext::image("draw"),
            &config,
        )
        .await;
        assert!(result.is_success(), "got {:?}", result.outcome);
    }
}
