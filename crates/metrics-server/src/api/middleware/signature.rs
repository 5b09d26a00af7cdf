use std::sync::Arc;

use api_types::HASH_HEADER;
use metric_comm::codec;
use poem::Endpoint;
use poem::IntoResponse;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::Result as PoemResult;
use tracing::error;
use tracing::warn;

use super::RawBody;
use crate::api::errors::ApiError;

/// Verifies the `HashSHA256` header against the raw request body.
///
/// Without a configured key every request passes.
#[derive(Debug, Clone)]
pub struct VerifySignature {
    key: Option<Arc<[u8]>>,
}

impl VerifySignature {
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key
                .filter(|k| !k.is_empty())
                .map(|k| Arc::from(k.as_bytes())),
        }
    }
}

impl<E> Middleware<E> for VerifySignature
where E: Endpoint
{
    type Output = VerifySignatureEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        VerifySignatureEndpoint {
            inner: ep,
            key: self.key.clone(),
        }
    }
}

pub struct VerifySignatureEndpoint<E> {
    inner: E,
    key: Option<Arc<[u8]>>,
}

impl<E> Endpoint for VerifySignatureEndpoint<E>
where E: Endpoint
{
    type Output = Response;

    async fn call(&self, mut req: Request) -> PoemResult<Self::Output> {
        let Some(key) = &self.key else {
            return self.inner.call(req).await.map(IntoResponse::into_response);
        };

        let Some(signature) = req
            .headers()
            .get(HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            warn!("Rejecting unsigned request");
            return Err(ApiError::malformed("HashSHA256 header is required").into());
        };

        let raw = match req.extensions().get::<RawBody>() {
            Some(raw) => raw.0.clone(),
            None => {
                let body = req.take_body().into_vec().await?;
                req.set_body(body.clone());
                body
            }
        };

        let valid = codec::verify(key, &raw, &signature).map_err(|e| {
            error!(error = %e, "Signature verification failed");
            ApiError::ServerError {
                message: "Signature verification failed".into(),
            }
        })?;
        if !valid {
            warn!(uri = %req.uri(), "Rejecting request with signature mismatch");
            return Err(ApiError::SignatureMismatch.into());
        }

        self.inner.call(req).await.map(IntoResponse::into_response)
    }
}
