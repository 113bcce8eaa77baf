//! The capture pipeline.
//!
//! One exchange flows Start -> RequestCaptured -> HandlerInvoked ->
//! ResponseCaptured -> {Delivered | Dropped}. Telemetry work never changes
//! what the downstream handler returned: the buffered response is passed back
//! verbatim and delivery is handed off to the dispatcher, which the response
//! path does not wait on beyond a bounded enqueue.

use crate::batch::BatchReporter;
use crate::capture::{capture_request, capture_response};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::errors::{ErrorCollector, ErrorKind};
use crate::middleware::{BoxedNext, MiddlewareLayer, Request, Response};
use crate::payload::{EventData, EventPayload};
use crate::route::{normalize_route_path, route_pattern};
use crate::transport::{Transport, TransportError};
use bytes::Bytes;
use chrono::Utc;
use futures_util::FutureExt;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Telemetry capture middleware.
///
/// Cheap to clone; all clones share one dispatcher and one batch reporter.
///
/// ```ignore
/// let config = Config::builder()
///     .api_key("...")
///     .project_id("...")
///     .build()
///     .await;
/// let telemetry = TelemetryLayer::new(config)?;
/// ```
#[derive(Clone)]
pub struct TelemetryLayer {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    dispatcher: Dispatcher,
    batch: Option<BatchReporter>,
}

impl TelemetryLayer {
    /// Wire the pipeline up from an immutable configuration.
    ///
    /// Must be called inside a tokio runtime: the pooled dispatcher and the
    /// batch reporter spawn their worker tasks here.
    pub fn new(config: Config) -> Result<Self, TransportError> {
        let transport = Transport::new(&config)?;

        let dispatcher = if config.async_dispatch {
            Dispatcher::pooled(
                transport.clone(),
                config.max_concurrency,
                config.queue_capacity,
                config.overflow_policy,
            )
        } else {
            Dispatcher::spawning(transport.clone())
        };

        let batch = config
            .batch_errors_enabled
            .then(|| BatchReporter::new(transport, config.batch_size, config.flush_interval));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                batch,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The shared batch reporter, when batched error reporting is enabled.
    pub fn batch_reporter(&self) -> Option<&BatchReporter> {
        self.inner.batch.as_ref()
    }

    /// Flush the batch reporter and stop accepting new deliveries.
    /// Queued deliveries still drain in the background.
    pub async fn shutdown(&self) {
        if let Some(batch) = &self.inner.batch {
            batch.close().await;
        }
        self.inner.dispatcher.close();
    }

    async fn run(inner: Arc<Inner>, req: Request, next: BoxedNext) -> Response {
        if inner.config.is_ignored_environment() {
            return next(req).await;
        }

        let collector = ErrorCollector::new();
        let started_wall = Utc::now();
        let started = Instant::now();

        let mut request_snapshot = capture_request(
            &req,
            started_wall,
            &inner.config.mask_rules,
            &collector,
        );
        if let Some(pattern) = route_pattern(req.extensions()) {
            request_snapshot.route_path = normalize_route_path(pattern);
        }

        // Invoke the handler with panic isolation. A panicking handler still
        // yields a completed exchange: a bare 500 plus a critical record.
        let response = match AssertUnwindSafe(next(req)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                collector.add(
                    format!("panic recovered: {}", panic_message(panic.as_ref())),
                    ErrorKind::UnhandledException,
                    "handler",
                );
                let mut fallback = http::Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            }
        };

        // The response is final from here on; everything below only reads it.
        let (parts, body) = response.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => Bytes::new(),
        };

        let mut response_snapshot = capture_response(
            &parts,
            &body_bytes,
            started.elapsed(),
            &inner.config.mask_rules,
            &collector,
        );

        let records = collector.drain();
        if let Some(batch) = &inner.batch {
            for record in &records {
                batch.add(record.clone()).await;
            }
        }
        response_snapshot.errors = records;

        let mut server = inner.config.server.clone();
        server.protocol = request_snapshot.protocol.clone();

        let payload = EventPayload {
            api_key: inner.config.api_key.clone(),
            project_id: inner.config.project_id.clone(),
            version: inner.config.sdk_version.clone(),
            sdk: inner.config.sdk_name.clone(),
            data: EventData {
                server,
                language: inner.config.language.clone(),
                request: request_snapshot,
                response: response_snapshot,
            },
        };
        inner.dispatcher.submit(payload).await;

        http::Response::from_parts(parts, Full::new(body_bytes))
    }
}

impl MiddlewareLayer for TelemetryLayer {
    fn call(
        &self,
        req: Request,
        next: BoxedNext,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'static>> {
        let inner = self.inner.clone();
        Box::pin(Self::run(inner, req, next))
    }

    fn clone_box(&self) -> Box<dyn MiddlewareLayer> {
        Box::new(self.clone())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
