//! # apipulse
//!
//! HTTP-exchange telemetry SDK. Wrap a handler in [`TelemetryLayer`] and every
//! exchange is snapshotted, redacted and shipped to the apipulse collector
//! without altering what the caller sees: sensitive fields are masked before
//! anything leaves the process, delivery is fire-and-forget, and failures
//! anywhere in the pipeline never touch the instrumented request.
//!
//! ```ignore
//! use apipulse::{Config, TelemetryLayer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder()
//!         .api_key(std::env::var("APIPULSE_API_KEY")?)
//!         .project_id("my-project")
//!         .additional_masked_fields(["session_token"])
//!         .build()
//!         .await;
//!
//!     let telemetry = TelemetryLayer::new(config)?;
//!     // hand `telemetry` to your framework's middleware chain
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod masking;
pub mod meta;
pub mod middleware;
pub mod payload;
pub mod pipeline;
pub mod route;
pub mod transport;

pub use batch::BatchReporter;
pub use capture::{RequestSnapshot, ResponseSnapshot, MAX_RESPONSE_BYTES};
pub use config::{Config, ConfigBuilder};
pub use dispatch::{Dispatcher, OverflowPolicy};
pub use errors::{ErrorCollector, ErrorKind, ErrorRecord, Severity};
pub use masking::{mask_bytes, mask_value, MaskError, MaskRules, MASK_TOKEN};
pub use middleware::{BoxedNext, MiddlewareLayer, Request, Response};
pub use payload::{EventData, EventPayload};
pub use pipeline::TelemetryLayer;
pub use route::{normalize_route_path, route_pattern, set_route_pattern, RoutePattern};
pub use transport::{Transport, TransportError};

/// SDK version reported in every payload.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
