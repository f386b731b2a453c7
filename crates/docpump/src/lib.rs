//! # docpump
//!
//! Paged batch pump engine: moves documents from a data source to a data
//! sink under an explicit concurrency/throughput policy, with durable
//! progress checkpoints and optional in-place document transformation.
//!
//! The engine is backend-agnostic. Concrete adapters implement the
//! [`DocumentSource`]/[`DocumentSink`] capability traits and plug in;
//! the pump owns pagination, overlapped writes, bounded concurrency,
//! rate limiting, transforms, checkpointing and failure policy.
//!
//! Delivery is at-least-once with best-effort resumability from the
//! checkpoint file; there is no exactly-once guarantee.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docpump::{Mode, Pump, RunConfig};
//! # fn adapters() -> (Arc<dyn docpump::DocumentSource>, Arc<dyn docpump::DocumentSink>) { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> docpump::Result<()> {
//!     let mut config = RunConfig::new(Mode::Backup, "http://localhost:9200/orders", "orders.json");
//!     config.limit = 500;
//!     config.concurrency = 4;
//!
//!     let (source, sink) = adapters();
//!     let report = Pump::new(config, source, sink)?.run().await?;
//!     println!("wrote {} documents", report.total_writes);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod pump;
pub mod queue;
pub mod transform;

// Re-exports for convenient access
pub use checkpoint::{CheckpointRecord, CheckpointStatus, CheckpointStore};
pub use config::{Mode, PoolConfig, RunConfig};
pub use core::{Batch, Document, DocumentSink, DocumentSource};
pub use error::{PumpError, Result};
pub use events::{ErrorEvent, EventSink, NullSink, TracingSink};
pub use pump::{Pump, RunReport};
pub use queue::{QueuePolicy, WriteOutcome, WriteQueue};
pub use transform::{Modifier, TransformFn, TransformRegistry};
