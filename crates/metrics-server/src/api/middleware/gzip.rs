use metric_comm::codec;
use metric_comm::CommError;
use poem::http::header;
use poem::Body;
use poem::Endpoint;
use poem::IntoResponse;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::Result as PoemResult;
use tracing::debug;
use tracing::error;

use super::header_has_token;
use super::RawBody;
use crate::api::errors::ApiError;

const GZIP: &str = "gzip";

/// Default cap on request bodies, both on the wire and once inflated.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Bidirectional gzip: inflates `Content-Encoding: gzip` request bodies and
/// compresses JSON/HTML responses for clients sending `Accept-Encoding: gzip`.
///
/// Bodies larger than the limit, before or after inflation, get 413.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    limit: usize,
}

impl Gzip {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::with_limit(MAX_BODY_BYTES)
    }
}

impl<E> Middleware<E> for Gzip
where E: Endpoint
{
    type Output = GzipEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        GzipEndpoint {
            inner: ep,
            limit: self.limit,
        }
    }
}

pub struct GzipEndpoint<E> {
    inner: E,
    limit: usize,
}

impl<E> Endpoint for GzipEndpoint<E>
where E: Endpoint
{
    type Output = Response;

    async fn call(&self, mut req: Request) -> PoemResult<Self::Output> {
        let accepts_gzip = header_has_token(req.headers(), header::ACCEPT_ENCODING.as_str(), GZIP);
        let raw = req.take_body().into_bytes_limit(self.limit).await?.to_vec();

        let body = if header_has_token(req.headers(), header::CONTENT_ENCODING.as_str(), GZIP) {
            let inflated = codec::decompress_limited(&raw, self.limit).map_err(|e| {
                if let CommError::PayloadTooLarge { limit } = e.current_context() {
                    debug!(limit, "Rejecting gzip body that inflates past the limit");
                    ApiError::PayloadTooLarge { limit: *limit }
                } else {
                    debug!(error = %e, "Rejecting request with malformed gzip body");
                    ApiError::malformed("Malformed gzip payload")
                }
            })?;
            req.headers_mut().remove(header::CONTENT_ENCODING);
            inflated
        } else {
            raw.clone()
        };
        req.extensions_mut().insert(RawBody(raw));
        req.set_body(body);

        let resp = self.inner.get_response(req).await;
        if accepts_gzip {
            compress_response(resp).await
        } else {
            Ok(resp)
        }
    }
}

fn is_compressible(resp: &Response) -> bool {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.starts_with("text/html"))
}

async fn compress_response(resp: Response) -> PoemResult<Response> {
    if !is_compressible(&resp) || resp.headers().contains_key(header::CONTENT_ENCODING) {
        return Ok(resp);
    }

    let (mut parts, body) = resp.into_parts();
    let plain = body.into_vec().await?;
    let compressed = codec::compress(&plain).map_err(|e| {
        error!(error = %e, "Failed to compress response");
        ApiError::ServerError {
            message: "Failed to compress response".into(),
        }
    })?;

    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CONTENT_ENCODING, header::HeaderValue::from_static(GZIP));
    Ok(Response::from_parts(parts, Body::from_vec(compressed)).into_response())
}
