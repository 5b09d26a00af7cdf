use std::time::Instant;

use poem::Body;
use poem::Endpoint;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::Result as PoemResult;
use tracing::info;

/// Logs method, uri, status, duration and response size of every request.
pub struct RequestLog;

impl<E> Middleware<E> for RequestLog
where E: Endpoint
{
    type Output = RequestLogEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        RequestLogEndpoint { inner: ep }
    }
}

pub struct RequestLogEndpoint<E> {
    inner: E,
}

impl<E> Endpoint for RequestLogEndpoint<E>
where E: Endpoint
{
    type Output = Response;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let start = Instant::now();

        let resp = self.inner.get_response(req).await;

        let (parts, body) = resp.into_parts();
        let bytes = body.into_bytes().await?;
        info!(
            uri = %uri,
            method = %method,
            status = parts.status.as_u16(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            size = bytes.len(),
            "Request handled"
        );
        Ok(Response::from_parts(parts, Body::from_bytes(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use poem::handler;
    use poem::http::StatusCode;
    use poem::test::TestClient;
    use poem::EndpointExt;
    use poem::Route;

    use super::*;

    #[handler]
    fn ok() -> &'static str {
        "fine"
    }

    #[test_log::test(tokio::test)]
    async fn passes_responses_through_unchanged() {
        let cli = TestClient::new(Route::new().at("/", poem::get(ok)).with(RequestLog));

        let resp = cli.get("/").send().await;

        resp.assert_status_is_ok();
        resp.assert_text("fine").await;
    }

    #[test_log::test(tokio::test)]
    async fn errors_become_responses() {
        let cli = TestClient::new(Route::new().at("/", poem::get(ok)).with(RequestLog));

        let resp = cli.get("/missing").send().await;

        resp.assert_status(StatusCode::NOT_FOUND);
    }
}
