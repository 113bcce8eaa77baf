//! Wire payload delivered to the collector.

use crate::capture::{RequestSnapshot, ResponseSnapshot};
use crate::meta::{LanguageInfo, ServerInfo};
use serde::Serialize;

/// Complete delivery unit for one exchange. Immutable once assembled.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    pub api_key: String,
    pub project_id: String,
    pub version: String,
    pub sdk: String,
    pub data: EventData,
}

/// Everything observed about the exchange plus host metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EventData {
    pub server: ServerInfo,
    pub language: LanguageInfo,
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
}
