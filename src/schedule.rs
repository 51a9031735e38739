//! Bounded-concurrency fan-out for LSP requests.
//!
//! The harvester issues hundreds of `documentSymbol`, `references`, and
//! `definition` requests; these helpers run them with at most
//! `max_concurrency` in flight. Operations are issued in input order,
//! complete in whatever order the server answers, and results come back in
//! input order. Individual failures are logged and recorded as `None`
//! in-slot rather than failing the batch — when the client shuts down
//! mid-flight, the cancelled requests simply resolve to `None`.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::error::LspError;

/// Options for [`stream_requests`].
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Maximum number of requests in flight.
    pub max_concurrency: usize,
    /// Whether to emit progress reports.
    pub show_progress: bool,
    /// Report every N completions.
    pub progress_every: usize,
    /// Also report when at least this much time has passed since the last
    /// report.
    pub progress_interval: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            show_progress: true,
            progress_every: 10,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Runs `op` over every item with bounded concurrency and returns the
/// results in input order. Failures become `None` in-slot.
pub async fn batch_requests<A, T, F, Fut>(args: Vec<A>, max_concurrency: usize, op: F) -> Vec<Option<T>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, LspError>>,
{
    let options = StreamOptions {
        max_concurrency,
        show_progress: false,
        ..Default::default()
    };
    stream_requests(args, &options, op).await
}

/// Like [`batch_requests`], with progress reports every
/// `progress_every` completions or `progress_interval`, whichever comes
/// first.
pub async fn stream_requests<A, T, F, Fut>(args: Vec<A>, options: &StreamOptions, op: F) -> Vec<Option<T>>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, LspError>>,
{
    let total = args.len();
    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();

    let start = Instant::now();
    let mut last_report = start;
    let mut completed = 0usize;

    let mut in_flight = stream::iter(
        args.into_iter()
            .enumerate()
            .map(|(index, arg)| {
                let fut = op(arg);
                async move { (index, fut.await) }
            }),
    )
    .buffer_unordered(options.max_concurrency.max(1));

    while let Some((index, result)) = in_flight.next().await {
        match result {
            Ok(value) => results[index] = Some(value),
            Err(e) => error!("request failed at index {index}: {e}"),
        }
        completed += 1;

        if options.show_progress {
            let now = Instant::now();
            if completed % options.progress_every == 0
                || now.duration_since(last_report) >= options.progress_interval
            {
                let elapsed = now.duration_since(start).as_secs_f64();
                let speed = if elapsed > 0.0 {
                    completed as f64 / elapsed
                } else {
                    0.0
                };
                let percent = completed as f64 / total as f64 * 100.0;
                let eta = if speed > 0.0 {
                    (total - completed) as f64 / speed
                } else {
                    f64::INFINITY
                };
                info!(
                    "progress: {completed}/{total} ({percent:.1}%) | elapsed: {elapsed:.1}s \
                     | speed: {speed:.2}/s | eta: {eta:.1}s"
                );
                last_report = now;
            }
        }
    }

    results
}
