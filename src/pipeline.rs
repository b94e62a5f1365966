//! Request pipeline: admission, then authorization.
//!
//! Per request the pipeline moves through
//! `Start -> Admitting -> (RejectedRate | Authorizing) -> (RejectedAuth | Granted)`.
//! Cheap counter checks run first; authorization is skipped entirely for
//! rate-limited requests. Each stage runs exactly once; retries belong to the
//! client.

use crate::admission::{Admission, AdmissionController};
use crate::authz::{AuthorizationContext, Decision, DecisionEngine};
use crate::error::GateError;
use crate::principal::{Principal, PrincipalResolver, PrincipalSlot};
use crate::rate_limit::Dimension;
use crate::request::RequestDescriptor;
use crate::telemetry::{emit_best_effort, GateEvent, NullSink, TelemetrySink};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{trace, Instrument};

/// Position in the per-request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Admitting,
    Authorizing,
    /// Terminal: a rate limit dimension rejected.
    RejectedRate,
    /// Terminal: authorization denied.
    RejectedAuth,
    /// Terminal: admitted and authorized.
    Granted,
}

/// Final answer for the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Admitted and authorized; route the request.
    Proceed {
        /// Caller, when a token was presented and resolved.
        principal: Option<Principal>,
        /// The granting decision, for audit.
        decision: Decision,
        /// Smallest remaining quota across the metered dimensions, for
        /// `X-RateLimit-Remaining`; `None` when nothing was metered.
        remaining: Option<u64>,
    },
    /// Respond with a rate limit status.
    RejectedByRateLimit {
        /// Dimension that rejected.
        dimension: Dimension,
        /// Retry hint; `None` when rejected because the counter store was down.
        retry_after: Option<Duration>,
    },
    /// Respond with an access-denied status.
    RejectedByAuthorization {
        /// The denying decision.
        decision: Decision,
    },
}

impl Outcome {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Outcome::Proceed { .. })
    }

    /// Terminal stage this outcome corresponds to.
    pub fn stage(&self) -> Stage {
        match self {
            Outcome::Proceed { .. } => Stage::Granted,
            Outcome::RejectedByRateLimit { .. } => Stage::RejectedRate,
            Outcome::RejectedByAuthorization { .. } => Stage::RejectedAuth,
        }
    }
}

/// Sequences the [`AdmissionController`] and the [`DecisionEngine`].
///
/// Stateless apart from the shared counter store, so it can be cloned freely
/// and replicated across instances.
#[derive(Clone, Debug)]
pub struct Pipeline<S = NullSink> {
    admission: AdmissionController,
    engine: DecisionEngine,
    resolver: Arc<dyn PrincipalResolver>,
    sink: S,
}

impl Pipeline<NullSink> {
    pub fn new(
        admission: AdmissionController,
        engine: DecisionEngine,
        resolver: Arc<dyn PrincipalResolver>,
    ) -> Self {
        Self { admission, engine, resolver, sink: NullSink }
    }
}

impl<S> Pipeline<S> {
    /// Send terminal outcomes to `sink`.
    pub fn with_sink<T: TelemetrySink>(self, sink: T) -> Pipeline<T> {
        Pipeline { admission: self.admission, engine: self.engine, resolver: self.resolver, sink }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }
}

impl<S> Pipeline<S>
where
    S: TelemetrySink + Sync,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    /// Run one request through admission and authorization.
    ///
    /// Never fails: every error inside is already a reject or deny.
    pub async fn handle(&self, request: &RequestDescriptor) -> Outcome {
        let span =
            tracing::debug_span!("turnstile.gate", path = %request.path, ip = %request.client_ip);
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &RequestDescriptor) -> Outcome {
        let slot = Arc::new(PrincipalSlot::new(
            request.bearer_token().map(str::to_string),
            self.resolver.clone(),
        ));

        trace!(target: "turnstile::pipeline", stage = ?Stage::Admitting);
        // Admission resolves the principal only if it reaches the USER
        // dimension; authorization reuses whatever the slot cached.
        let remaining = match self.admission.evaluate(request, &slot).await {
            Admission::Admitted { remaining } => remaining,
            Admission::Rejected { dimension, retry_after } => {
                trace!(target: "turnstile::pipeline", stage = ?Stage::RejectedRate, %dimension);
                self.emit(GateEvent::RateLimited {
                    dimension,
                    client_ip: request.client_ip.clone(),
                    path: request.path.clone(),
                    retry_after,
                })
                .await;
                return Outcome::RejectedByRateLimit { dimension, retry_after };
            }
        };

        trace!(target: "turnstile::pipeline", stage = ?Stage::Authorizing);
        let ctx = AuthorizationContext::new(request, slot.clone());
        let decision = self.engine.authorize(&ctx).await;

        if decision.granted {
            trace!(target: "turnstile::pipeline", stage = ?Stage::Granted);
            self.emit(GateEvent::Granted {
                path: request.path.clone(),
                strategy: decision.strategy.clone().unwrap_or_default(),
            })
            .await;
            Outcome::Proceed { principal: slot.resolved().cloned(), decision, remaining }
        } else {
            trace!(target: "turnstile::pipeline", stage = ?Stage::RejectedAuth);
            self.emit(GateEvent::Denied {
                path: request.path.clone(),
                strategy: decision.strategy.clone(),
                reason: decision.reason.clone().unwrap_or_default(),
            })
            .await;
            Outcome::RejectedByAuthorization { decision }
        }
    }

    async fn emit(&self, event: GateEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

/// A layer that gates requests through a [`Pipeline`].
#[derive(Clone, Debug)]
pub struct GatekeeperLayer<S = NullSink> {
    pipeline: Arc<Pipeline<S>>,
}

impl<S> GatekeeperLayer<S> {
    /// Create a new gatekeeper layer.
    pub fn new(pipeline: Pipeline<S>) -> Self {
        Self { pipeline: Arc::new(pipeline) }
    }
}

impl<I, S> Layer<I> for GatekeeperLayer<S> {
    type Service = GatekeeperService<I, S>;

    fn layer(&self, inner: I) -> Self::Service {
        GatekeeperService { inner, pipeline: self.pipeline.clone() }
    }
}

/// Middleware service that only forwards admitted and authorized requests.
#[derive(Clone, Debug)]
pub struct GatekeeperService<I, S = NullSink> {
    inner: I,
    pipeline: Arc<Pipeline<S>>,
}

impl<I, S> Service<RequestDescriptor> for GatekeeperService<I, S>
where
    I: Service<RequestDescriptor> + Clone + Send + 'static,
    I::Future: Send + 'static,
    I::Error: Send + 'static,
    I::Response: Send + 'static,
    S: TelemetrySink + Sync,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = I::Response;
    type Error = GateError<I::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GateError::Inner)
    }

    fn call(&mut self, req: RequestDescriptor) -> Self::Future {
        let pipeline = self.pipeline.clone();
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match pipeline.handle(&req).await {
                Outcome::Proceed { .. } => inner.call(req).await.map_err(GateError::Inner),
                Outcome::RejectedByRateLimit { dimension, retry_after } => {
                    Err(GateError::RateLimited { dimension, retry_after })
                }
                Outcome::RejectedByAuthorization { decision } => Err(GateError::Forbidden {
                    reason: decision.reason.unwrap_or_else(|| "access denied".into()),
                }),
            }
        })
    }
}
