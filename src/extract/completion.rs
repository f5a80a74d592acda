//! Completion detection from observable page state
//!
//! There is no structured "done" signal from the remote service, so the
//! detector infers one: an explicit completion marker, or content whose
//! length held still across two consecutive probes with no loading indicator
//! in sight. It never judges whether the content is *correct*, only whether
//! the page stopped moving.

use tokio::time::{Instant, sleep};
use tracing::debug;

use super::budget::probe_interval;
use super::config::ExtractConfig;
use super::observe::PageObserver;
use super::types::CompletionSignal;

/// Wait until generation looks finished or `max_wait` elapses.
///
/// Read-only and lock-free: probes the same page the poller is reading, and
/// every observation is idempotent. Transient probe failures skip the probe
/// rather than aborting the wait.
pub(crate) async fn await_completion<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
    max_wait: std::time::Duration,
) -> CompletionSignal {
    let start = Instant::now();
    let mut previous_len: Option<usize> = None;

    loop {
        match probe(observer, config).await {
            Ok(probe) => {
                if probe.completion_marker {
                    debug!("explicit completion marker present");
                    return CompletionSignal { finished: true, elapsed: start.elapsed() };
                }
                // Debounce against render flicker: stability means the same
                // nonzero length on two consecutive probes with no spinner.
                if !probe.loading
                    && probe.content_len > 0
                    && previous_len == Some(probe.content_len)
                {
                    debug!(len = probe.content_len, "content stabilized");
                    return CompletionSignal { finished: true, elapsed: start.elapsed() };
                }
                previous_len = Some(probe.content_len);
            }
            Err(e) => {
                // Stale handle or mid-navigation; the next probe re-checks.
                // The debounce restarts so "consecutive" stays literal.
                debug!("completion probe failed: {e}");
                previous_len = None;
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= max_wait {
            return CompletionSignal { finished: false, elapsed };
        }
        let interval = probe_interval(elapsed).min(max_wait - elapsed);
        sleep(interval).await;
    }
}

struct Probe {
    loading: bool,
    completion_marker: bool,
    content_len: usize,
}

async fn probe<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
) -> Result<Probe, super::observe::ObserveError> {
    for selector in &config.completion_selectors {
        if observer.is_present(selector).await? {
            return Ok(Probe { loading: false, completion_marker: true, content_len: 0 });
        }
    }

    let mut loading = false;
    for selector in &config.loading_selectors {
        if observer.is_present(selector).await? {
            loading = true;
            break;
        }
    }

    Ok(Probe {
        loading,
        completion_marker: false,
        content_len: content_length(observer, config).await?,
    })
}

/// Length of the current best-matching content region: the last element of
/// the first response selector with any match, falling back to zero.
async fn content_length<O: PageObserver + ?Sized>(
    observer: &O,
    config: &ExtractConfig,
) -> Result<usize, super::observe::ObserveError> {
    for selector in &config.response_selectors {
        let texts = observer.texts(selector).await?;
        if let Some(last) = texts.iter().rev().find(|t| !t.trim().is_empty()) {
            return Ok(last.trim().chars().count());
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fixtures::{FakeObserver, PageState, test_config};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn explicit_marker_resolves_immediately() {
        let mut state = PageState::default();
        state.present = vec!["#done".to_string()];
        let observer = FakeObserver::new(state);

        let signal = await_completion(&observer, &test_config(), Duration::from_secs(30)).await;
        assert!(signal.finished);
        assert!(signal.elapsed < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn stable_content_needs_two_consecutive_probes() {
        let mut state = PageState::default();
        state
            .texts
            .insert("#answer".to_string(), vec!["a settled answer".to_string()]);
        let observer = FakeObserver::new(state);

        let signal = await_completion(&observer, &test_config(), Duration::from_secs(30)).await;
        assert!(signal.finished);
        // First probe records the length, second confirms it: one 200ms interval.
        assert_eq!(signal.elapsed, Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn loading_indicator_defers_stability() {
        let mut state = PageState::default();
        state
            .texts
            .insert("#answer".to_string(), vec!["streaming answer".to_string()]);
        state.present = vec!["#spinner".to_string()];
        let observer = Arc::new(FakeObserver::new(state));

        // Spinner disappears after 1s of virtual time.
        let obs = Arc::clone(&observer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            obs.update(|s| s.present.clear());
        });

        let signal =
            await_completion(observer.as_ref(), &test_config(), Duration::from_secs(30)).await;
        assert!(signal.finished);
        assert!(signal.elapsed >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn growing_content_is_not_stable() {
        let observer = Arc::new(FakeObserver::new(PageState::default()));

        // Content keeps growing the whole time; detector never settles.
        let obs = Arc::clone(&observer);
        tokio::spawn(async move {
            let mut text = String::new();
            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;
                text.push('x');
                let snapshot = text.clone();
                obs.update(|s| {
                    s.texts.insert("#answer".to_string(), vec![snapshot.clone()]);
                });
            }
        });

        let signal =
            await_completion(observer.as_ref(), &test_config(), Duration::from_secs(2)).await;
        assert!(!signal.finished);
        assert!(signal.elapsed >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_is_skipped_not_fatal() {
        let mut state = PageState::default();
        state
            .texts
            .insert("#answer".to_string(), vec!["a settled answer".to_string()]);
        let observer = FakeObserver::new(state);
        // The very first probe errors; the wait carries on.
        observer.fail_next_probes(1);

        let signal = await_completion(&observer, &test_config(), Duration::from_secs(30)).await;
        assert!(signal.finished);
        // Probe 1 lost to the error, probes 2 and 3 record and confirm.
        assert_eq!(signal.elapsed, Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_restarts_the_stability_debounce() {
        let mut state = PageState::default();
        state
            .texts
            .insert("#answer".to_string(), vec!["a settled answer".to_string()]);
        let observer = FakeObserver::new(state);
        // A healthy probe is three observer calls; let the first probe
        // through, then fail the second.
        observer.fail_probes_after(3, 1);

        let signal = await_completion(&observer, &test_config(), Duration::from_secs(30)).await;
        assert!(signal.finished);
        // Probes 3 and 4 must match each other; the length recorded before
        // the error does not count toward "consecutive".
        assert_eq!(signal.elapsed, Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_exhausts_the_budget() {
        let observer = FakeObserver::new(PageState::default());

        let signal = await_completion(&observer, &test_config(), Duration::from_millis(500)).await;
        assert!(!signal.finished);
        assert!(signal.elapsed >= Duration::from_millis(500));
        assert!(signal.elapsed < Duration::from_millis(700));
    }
}
