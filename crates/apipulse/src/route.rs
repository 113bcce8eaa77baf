//! Route pattern hand-off between routers and the capture pipeline.
//!
//! Routers know the pattern that matched ("/users/{id}"); the pipeline only
//! sees the concrete path. A router integration stores the pattern in the
//! request extensions before the telemetry layer runs; without one, the raw
//! path is reported.

use crate::middleware::Request;
use http::Extensions;

/// Route pattern carried through request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern(pub String);

/// Attach a route pattern to a request.
pub fn set_route_pattern(request: &mut Request, pattern: impl Into<String>) {
    request
        .extensions_mut()
        .insert(RoutePattern(pattern.into()));
}

/// Read a previously attached route pattern.
pub fn route_pattern(extensions: &Extensions) -> Option<&str> {
    extensions
        .get::<RoutePattern>()
        .map(|pattern| pattern.0.as_str())
        .filter(|pattern| !pattern.is_empty())
}

/// Normalize a route pattern so equivalent endpoints group together:
/// `:id` style parameters become `{id}` and a leading slash is guaranteed.
pub fn normalize_route_path(pattern: &str) -> String {
    let mut normalized = String::with_capacity(pattern.len() + 1);
    if !pattern.starts_with('/') {
        normalized.push('/');
    }
    let mut segments = pattern.split('/').peekable();
    while let Some(segment) = segments.next() {
        if let Some(name) = segment.strip_prefix(':') {
            normalized.push('{');
            normalized.push_str(name);
            normalized.push('}');
        } else {
            normalized.push_str(segment);
        }
        if segments.peek().is_some() {
            normalized.push('/');
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_pattern_round_trips_through_extensions() {
        let (parts, _) = http::Request::builder()
            .uri("/users/42")
            .body(())
            .unwrap()
            .into_parts();
        let mut request = Request::new(parts, Bytes::new());

        assert!(route_pattern(request.extensions()).is_none());
        set_route_pattern(&mut request, "/users/{id}");
        assert_eq!(route_pattern(request.extensions()), Some("/users/{id}"));
    }

    #[test]
    fn test_empty_pattern_is_ignored() {
        let (parts, _) = http::Request::builder()
            .uri("/x")
            .body(())
            .unwrap()
            .into_parts();
        let mut request = Request::new(parts, Bytes::new());
        set_route_pattern(&mut request, "");
        assert!(route_pattern(request.extensions()).is_none());
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_route_path("/users/:id"), "/users/{id}");
        assert_eq!(normalize_route_path("users/{id}/posts"), "/users/{id}/posts");
        assert_eq!(normalize_route_path("/plain"), "/plain");
        assert_eq!(normalize_route_path("/a/:b/c/:d"), "/a/{b}/c/{d}");
    }
}
