//! Telemetry for gate decisions.
//!
//! Every terminal pipeline outcome produces one [`GateEvent`]. Events flow
//! through `TelemetrySink` implementations, which are plain
//! `tower::Service<GateEvent>`s, so they compose with standard tower
//! combinators and can forward to audit logs or metrics systems.
//!
//! ```rust
//! use turnstile::telemetry::GateEvent;
//! use turnstile::rate_limit::Dimension;
//!
//! let event = GateEvent::RateLimited {
//!     dimension: Dimension::Ip,
//!     client_ip: "203.0.113.9".into(),
//!     path: "/api/v1/orders".into(),
//!     retry_after: None,
//! };
//! assert!(event.to_string().contains("ip"));
//! ```

use crate::rate_limit::Dimension;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// A telemetry sink that consumes gate events.
pub trait TelemetrySink:
    tower::Service<GateEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
///
/// Telemetry must never hold up or fail a request: if a sink is not ready or
/// returns an error, the event is dropped.
pub async fn emit_best_effort<S>(sink: S, event: GateEvent)
where
    S: tower::Service<GateEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// Terminal outcome of one request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// A dimension rejected the request.
    RateLimited {
        /// Dimension that rejected.
        dimension: Dimension,
        /// Client address.
        client_ip: String,
        /// Request path.
        path: String,
        /// Retry hint, when the algorithm could compute one.
        retry_after: Option<Duration>,
    },
    /// Authorization denied the request.
    Denied {
        /// Request path.
        path: String,
        /// Strategy that decided, `None` when nothing matched.
        strategy: Option<String>,
        /// Why access was denied.
        reason: String,
    },
    /// The request was admitted and authorized.
    Granted {
        /// Request path.
        path: String,
        /// Strategy that granted.
        strategy: String,
    },
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateEvent::RateLimited { dimension, client_ip, path, retry_after } => {
                write!(f, "rate_limited dimension={} ip={} path={}", dimension, client_ip, path)?;
                if let Some(wait) = retry_after {
                    write!(f, " retry_after={:?}", wait)?;
                }
                Ok(())
            }
            GateEvent::Denied { path, strategy, reason } => write!(
                f,
                "denied path={} strategy={} reason={}",
                path,
                strategy.as_deref().unwrap_or("-"),
                reason
            ),
            GateEvent::Granted { path, strategy } => {
                write!(f, "granted path={} strategy={}", path, strategy)
            }
        }
    }
}

type SinkFuture = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<GateEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: GateEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate.
///
/// Rejections and denials go out at `info`, grants at `debug`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<GateEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: GateEvent) -> Self::Future {
        match &event {
            GateEvent::Granted { .. } => {
                tracing::debug!(target: "turnstile::audit", event = %event, "gate_event")
            }
            _ => tracing::info!(target: "turnstile::audit", event = %event, "gate_event"),
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A telemetry sink that stores the most recent events in memory.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<GateEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<GateEvent> {
        self.events.lock().expect("memory sink poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("memory sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dropped because the sink was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<GateEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: GateEvent) -> Self::Future {
        let mut guard = self.events.lock().expect("memory sink poisoned");
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}
