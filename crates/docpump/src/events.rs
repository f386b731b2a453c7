//! Observational event sink.
//!
//! Events never participate in control flow: every fatal condition is
//! returned from [`Pump::run`](crate::pump::Pump::run) as the single
//! source of truth, and the sink only mirrors it for observability.

use tracing::{error, info};

use crate::error::PumpError;

/// An error surfaced to the event sink.
#[derive(Debug)]
pub enum ErrorEvent<'a> {
    /// A run failure (fetch, write, transform, cancellation, ...).
    Failure(&'a PumpError),

    /// The pre-flight validation error list.
    Validation(&'a [String]),
}

/// Receives engine events. Implementations must be cheap and must not
/// fail; the engine ignores anything they do.
pub trait EventSink: Send + Sync {
    /// A progress message.
    fn log(&self, message: &str);

    /// An error observation.
    fn error(&self, event: &ErrorEvent<'_>);
}

/// Default sink: forwards to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, event: &ErrorEvent<'_>) {
        match event {
            ErrorEvent::Failure(err) => error!("{}", err),
            ErrorEvent::Validation(errors) => {
                for message in errors.iter() {
                    error!("{}", message);
                }
            }
        }
    }
}

/// Sink that discards everything (`to_log: false`).
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn log(&self, _message: &str) {}

    fn error(&self, _event: &ErrorEvent<'_>) {}
}
