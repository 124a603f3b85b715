//! Request-scoped context extracted from HTTP requests.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, REQUEST_ID_HEADER)
            .unwrap_or_else(|| format!("req_{}", Uuid::new_v4().simple()));

        Ok(Self { request_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> RequestContext {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_id_from_header() {
        let request = Request::builder()
            .header(REQUEST_ID_HEADER, "req_abc")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.request_id, "req_abc");
    }

    #[tokio::test]
    async fn test_request_id_generated_when_missing() {
        let ctx = extract(Request::builder().body(()).unwrap()).await;
        assert!(ctx.request_id.starts_with("req_"));
        assert_eq!(ctx.request_id.len(), 4 + 32);
    }
}
