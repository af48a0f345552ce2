//! # chatlog-capture
//!
//! Capture side of the chatlog archive.
//!
//! This crate provides:
//! - The observer lifecycle (mount, settle delay, throttled mutations, stop)
//! - A session cache of recently seen identity keys with staleness eviction
//! - A chunked drain queue that filters and stores candidates
//! - [`CapturePipeline`], the context object tying these to an [`Archive`]
//! - [`CaptureWorker`], an async loop fed by a channel of [`DomEvent`]s
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chatlog_capture::{CaptureConfig, CaptureWorker, ContactNode, SummaryExtractor};
//!
//! let (archive, _) = Archive::open(backend).await;
//! let handle = CaptureWorker::new(archive, Arc::new(SummaryExtractor), CaptureConfig::from_env())
//!     .start();
//!
//! handle.mount().await?;
//! handle.mutation(vec![ContactNode::new("Alice", "09:00", "hi")]).await?;
//!
//! let archive = handle.shutdown().await?;
//! ```
//!
//! [`Archive`]: chatlog_db::Archive

pub mod clock;
pub mod config;
pub mod extractor;
pub mod known_keys;
pub mod observer;
pub mod pipeline;
pub mod scheduler;
pub mod throttle;
pub mod worker;

pub use clock::InstantClock;
pub use config::CaptureConfig;
pub use extractor::{ContactNode, MessageExtractor, SummaryExtractor};
pub use known_keys::KnownKeys;
pub use observer::{Observer, ObserverState};
pub use pipeline::{CapturePipeline, CaptureStatus, DrainSummary};
pub use scheduler::BatchScheduler;
pub use throttle::Throttle;
pub use worker::{CaptureHandle, CaptureWorker, DomEvent};
