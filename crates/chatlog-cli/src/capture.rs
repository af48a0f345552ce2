//! `chatlog capture`: feed stdin snapshots through the capture worker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chatlog_capture::{CaptureConfig, CaptureHandle, CaptureWorker, ContactNode, SummaryExtractor};
use chatlog_core::CaptureEvent;
use chatlog_db::Archive;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Event counts seen during one capture run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTally {
    pub saved: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Events missed because the receiver fell behind.
    pub missed: u64,
}

impl CaptureTally {
    fn record(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::MessageSaved { .. } => self.saved += 1,
            CaptureEvent::MessageFiltered { .. } => self.filtered += 1,
            CaptureEvent::MessageDuplicate { .. } => self.duplicates += 1,
            CaptureEvent::MessageRejected { .. } => self.rejected += 1,
            CaptureEvent::SaveFailed { .. } => self.failed += 1,
            _ => {}
        }
    }
}

pub async fn run_capture(archive: Archive, pace_ms: Option<u64>) -> anyhow::Result<()> {
    let config = CaptureConfig::from_env();
    let stdin = BufReader::new(tokio::io::stdin());
    let (archive, tally) = capture_lines(archive, config, pace_ms, stdin).await?;

    println!(
        "Saved {}, filtered {}, duplicates {}, rejected {}, failed {} ({} stored)",
        tally.saved,
        tally.filtered,
        tally.duplicates,
        tally.rejected,
        tally.failed,
        archive.messages.len()
    );
    if tally.missed > 0 {
        warn!(missed = tally.missed, "Some capture events were not counted");
    }
    Ok(())
}

/// Run every snapshot line of `input` through a capture worker and wait
/// for the resulting drain to finish.
pub async fn capture_lines<R>(
    archive: Archive,
    config: CaptureConfig,
    pace_ms: Option<u64>,
    input: R,
) -> anyhow::Result<(Archive, CaptureTally)>
where
    R: AsyncBufRead + Unpin,
{
    let pace = Duration::from_millis(pace_ms.unwrap_or(config.throttle_ms));
    let poll_every = Duration::from_millis(config.drain_interval_ms.max(1));

    let handle: CaptureHandle<ContactNode> =
        CaptureWorker::new(archive, Arc::new(SummaryExtractor), config).start();
    let mut events = handle.events();
    let counter = spawn_counter(handle.events());

    handle.mount().await?;
    wait_started(&mut events).await?;
    drop(events);

    let mut lines = input.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("reading snapshots")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Vec<ContactNode>>(&line) {
            Ok(nodes) => {
                debug!(line_no, nodes = nodes.len(), "Forwarding snapshot");
                handle.mutation(nodes).await?;
            }
            Err(e) => {
                warn!(line_no, error = %e, "Skipping malformed snapshot");
                continue;
            }
        }
        tokio::time::sleep(pace).await;
    }

    while handle.status().await?.draining {
        tokio::time::sleep(poll_every).await;
    }

    let archive = handle.shutdown().await?;
    let tally = counter
        .await
        .context("capture event counter panicked")?;
    info!(saved = tally.saved, stored = archive.messages.len(), "Capture finished");
    Ok((archive, tally))
}

async fn wait_started(events: &mut broadcast::Receiver<CaptureEvent>) -> anyhow::Result<()> {
    loop {
        match events.recv().await {
            Ok(CaptureEvent::ObserverStarted { seeded_keys }) => {
                info!(seeded_keys, "Observer started");
                return Ok(());
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("capture worker stopped before observing"),
        }
    }
}

/// Count events until the worker's bus closes.
fn spawn_counter(mut events: broadcast::Receiver<CaptureEvent>) -> JoinHandle<CaptureTally> {
    tokio::spawn(async move {
        let mut tally = CaptureTally::default();
        loop {
            match events.recv().await {
                Ok(event) => tally.record(&event),
                Err(RecvError::Lagged(n)) => tally.missed += n,
                Err(RecvError::Closed) => break,
            }
        }
        tally
    })
}
