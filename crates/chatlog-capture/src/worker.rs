//! Async capture worker.
//!
//! The UI side pushes [`DomEvent`]s into a bounded channel; a single task
//! owns the [`CapturePipeline`] and applies them in order, waking up on its
//! own for the settle delay, drain chunks and the compaction interval.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use chatlog_core::{CaptureEvent, Clock, Error, EventBus, FilterField, Result, ViewHandle};
use chatlog_db::{Archive, ImportBundle, ImportReport};

use crate::clock::InstantClock;
use crate::config::CaptureConfig;
use crate::extractor::MessageExtractor;
use crate::observer::ObserverState;
use crate::pipeline::{CapturePipeline, CaptureStatus};

/// Signal from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent<N> {
    /// The observed component was mounted.
    Mount,
    /// The observed tree changed; carries the full visible node list.
    Mutation(Vec<N>),
    /// The component was unmounted. Only `shutting_down` stops capture.
    Unmount { shutting_down: bool },
}

enum Command<N> {
    Dom(DomEvent<N>),
    AttachView(ViewHandle),
    AddRule {
        field: FilterField,
        pattern: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    RemoveRule {
        field: FilterField,
        pattern: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    Import {
        bundle: ImportBundle,
        reply: oneshot::Sender<Result<ImportReport>>,
    },
    Compact {
        reply: oneshot::Sender<Option<usize>>,
    },
    Status {
        reply: oneshot::Sender<CaptureStatus>,
    },
}

/// Handle for controlling a running capture worker.
pub struct CaptureHandle<N> {
    tx: mpsc::Sender<Command<N>>,
    events: EventBus,
    task: JoinHandle<Archive>,
}

fn worker_gone<T>(_: T) -> Error {
    Error::Internal("capture worker is not running".into())
}

impl<N: Send + 'static> CaptureHandle<N> {
    /// Forward a UI signal. Waits while the channel is full.
    pub async fn send(&self, event: DomEvent<N>) -> Result<()> {
        self.tx.send(Command::Dom(event)).await.map_err(worker_gone)
    }

    pub async fn mount(&self) -> Result<()> {
        self.send(DomEvent::Mount).await
    }

    pub async fn mutation(&self, nodes: Vec<N>) -> Result<()> {
        self.send(DomEvent::Mutation(nodes)).await
    }

    /// Make `view` the currently open view.
    pub async fn attach_view(&self, view: ViewHandle) -> Result<()> {
        self.tx
            .send(Command::AttachView(view))
            .await
            .map_err(worker_gone)
    }

    pub async fn add_rule(&self, field: FilterField, pattern: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::AddRule {
                field,
                pattern: pattern.into(),
                reply,
            })
            .await
            .map_err(worker_gone)?;
        rx.await.map_err(worker_gone)?
    }

    pub async fn remove_rule(
        &self,
        field: FilterField,
        pattern: impl Into<String>,
    ) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RemoveRule {
                field,
                pattern: pattern.into(),
                reply,
            })
            .await
            .map_err(worker_gone)?;
        rx.await.map_err(worker_gone)?
    }

    pub async fn import(&self, bundle: ImportBundle) -> Result<ImportReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Import { bundle, reply })
            .await
            .map_err(worker_gone)?;
        rx.await.map_err(worker_gone)?
    }

    /// Run the compaction check now. `None` means it was deferred because
    /// a drain is active.
    pub async fn compact(&self) -> Result<Option<usize>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Compact { reply })
            .await
            .map_err(worker_gone)?;
        rx.await.map_err(worker_gone)
    }

    pub async fn status(&self) -> Result<CaptureStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .await
            .map_err(worker_gone)?;
        rx.await.map_err(worker_gone)
    }

    /// Get a receiver for capture events.
    pub fn events(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Stop capture and wait for the worker, returning the archive.
    ///
    /// A chunk being drained when the signal arrives is finished first.
    pub async fn shutdown(self) -> Result<Archive> {
        // The worker may already have stopped; joining still yields the archive.
        let _ = self
            .tx
            .send(Command::Dom(DomEvent::Unmount {
                shutting_down: true,
            }))
            .await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("capture worker panicked: {}", e)))
    }
}

/// Capture worker owning the pipeline.
pub struct CaptureWorker<N> {
    pipeline: CapturePipeline<N>,
    clock: InstantClock,
}

impl<N: Send + Sync + 'static> CaptureWorker<N> {
    pub fn new(
        archive: Archive,
        extractor: Arc<dyn MessageExtractor<N>>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            pipeline: CapturePipeline::new(archive, extractor, config),
            clock: InstantClock::system(),
        }
    }

    /// Use a clock anchored elsewhere (tests pin the wall time).
    pub fn with_clock(mut self, clock: InstantClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.pipeline = self.pipeline.with_events(events);
        self
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> CaptureHandle<N> {
        let (tx, rx) = mpsc::channel(self.pipeline.config().channel_capacity);
        let events = self.pipeline.events().clone();
        let task = tokio::spawn(self.run(rx));
        CaptureHandle { tx, events, task }
    }

    #[instrument(skip_all, fields(subsystem = "capture", component = "worker"))]
    async fn run(mut self, mut rx: mpsc::Receiver<Command<N>>) -> Archive {
        let config = self.pipeline.config().clone();
        info!(
            throttle_ms = config.throttle_ms,
            settle_delay_ms = config.settle_delay_ms,
            batch_size = config.batch_size,
            drain_interval_ms = config.drain_interval_ms,
            "Capture worker started"
        );

        let period = config.compact_interval();
        let mut compaction = interval_at(Instant::now() + period, period);
        compaction.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self
                .pipeline
                .next_deadline()
                .map(|at| self.clock.instant_of(at));

            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("All capture handles dropped");
                        self.pipeline.unmount(true);
                        break;
                    }
                },
                _ = wait_until(deadline) => {
                    self.pipeline.poll(self.clock.now()).await;
                }
                _ = compaction.tick() => {
                    self.pipeline.request_compaction().await;
                }
            }
        }

        info!(
            stored = self.pipeline.archive().messages.len(),
            "Capture worker stopped"
        );
        self.pipeline.into_archive()
    }

    /// Apply one command. Returns true when the worker should exit.
    async fn handle(&mut self, command: Command<N>) -> bool {
        let now = self.clock.now();
        match command {
            Command::Dom(DomEvent::Mount) => {
                self.pipeline.mount(now);
            }
            Command::Dom(DomEvent::Mutation(nodes)) => {
                self.pipeline.on_mutation(&nodes, now).await;
            }
            Command::Dom(DomEvent::Unmount { shutting_down }) => {
                self.pipeline.unmount(shutting_down);
                return self.pipeline.state() == ObserverState::Stopped;
            }
            Command::AttachView(view) => self.pipeline.attach_view(view),
            Command::AddRule {
                field,
                pattern,
                reply,
            } => {
                let _ = reply.send(self.pipeline.add_rule(field, &pattern).await);
            }
            Command::RemoveRule {
                field,
                pattern,
                reply,
            } => {
                let _ = reply.send(self.pipeline.remove_rule(field, &pattern).await);
            }
            Command::Import { bundle, reply } => {
                let _ = reply.send(self.pipeline.import(bundle, now).await);
            }
            Command::Compact { reply } => {
                let _ = reply.send(self.pipeline.request_compaction().await);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.pipeline.status());
            }
        }
        false
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
