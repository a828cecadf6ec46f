mod cli;
mod logging;

use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fetchq::{ConditionalFetcher, FetchEvent, FetchQueue, ReqwestClient, TransportSelector};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::cli::App;

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();
    logging::init(app.json_logs);

    let defaults = app.job_config()?;
    let client = ReqwestClient::new().context("failed to build http client")?;
    let fetcher = ConditionalFetcher::new(client)
        .with_selector(TransportSelector::new().relaxed_https(app.insecure_https));
    let queue = FetchQueue::new(fetcher, defaults).context("invalid queue configuration")?;

    let reporter = tokio::spawn(report(queue.subscribe()));

    let fetch_options = app.request_options();
    let content_options = app.content_options();
    let mut handles = Vec::with_capacity(app.urls.len());
    for url in &app.urls {
        let handle = queue
            .enqueue(url.clone(), fetch_options.clone(), content_options.clone(), Default::default())
            .with_context(|| format!("failed to queue {url}"))?;
        handles.push((url, handle));
    }
    info!(jobs = handles.len(), running = queue.running(), pending = queue.pending(), "queued");

    let mut stdout = std::io::stdout().lock();
    let mut failed = 0usize;
    for (url, handle) in handles {
        let line = match handle.await {
            Ok(result) => json!({ "url": url, "unchanged": result.is_unchanged(), "result": result }),
            Err(error) => {
                failed += 1;
                json!({ "url": url, "error": error.to_string() })
            }
        };
        writeln!(stdout, "{line}").context("failed to write result")?;
    }

    drop(queue);
    let _ = reporter.await;

    if failed > 0 {
        bail!("{failed} of {} fetches failed", app.urls.len());
    }
    Ok(())
}

/// Log queue events until the queue is dropped.
async fn report(mut events: broadcast::Receiver<FetchEvent>) {
    loop {
        match events.recv().await {
            Ok(FetchEvent::Attempt { attempt, request }) => {
                debug!(url = %request.url, attempt, "attempt started");
            }
            Ok(FetchEvent::Success { attempt, request, result }) => {
                info!(url = %request.url, attempt, unchanged = result.is_unchanged(), "fetched");
            }
            Ok(FetchEvent::Error { attempt, request, error }) => {
                warn!(url = %request.url, attempt, %error, "attempt failed");
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event reporter lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
