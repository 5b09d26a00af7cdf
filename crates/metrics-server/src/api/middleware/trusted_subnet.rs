use std::net::IpAddr;

use api_types::REAL_IP_HEADER;
use ipnet::IpNet;
use poem::Endpoint;
use poem::IntoResponse;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::Result as PoemResult;
use tracing::info;

use crate::api::errors::ApiError;

/// Admits only requests whose `X-Real-IP` lies in the trusted subnet.
///
/// Without a configured subnet every request passes.
#[derive(Debug, Clone)]
pub struct TrustedSubnet {
    subnet: Option<IpNet>,
}

impl TrustedSubnet {
    pub fn new(subnet: Option<IpNet>) -> Self {
        Self { subnet }
    }

    fn check(&self, req: &Request) -> Result<(), ApiError> {
        let Some(subnet) = self.subnet else {
            return Ok(());
        };

        let Some(raw) = req.headers().get(REAL_IP_HEADER) else {
            info!("X-Real-IP header not set");
            return Err(ApiError::malformed("X-Real-IP header is required"));
        };
        let ip = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
            // `::ffff:a.b.c.d` is matched as the IPv4 address it maps
            .map(|ip| ip.to_canonical())
            .ok_or_else(|| {
                info!("Invalid IP address in X-Real-IP");
                ApiError::malformed("X-Real-IP is not an IP address")
            })?;

        if subnet.contains(&ip) {
            Ok(())
        } else {
            info!(%ip, %subnet, "Client address is outside the trusted subnet");
            Err(ApiError::Untrusted { ip: ip.to_string() })
        }
    }
}

impl<E> Middleware<E> for TrustedSubnet
where E: Endpoint
{
    type Output = TrustedSubnetEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        TrustedSubnetEndpoint {
            inner: ep,
            guard: self.clone(),
        }
    }
}

pub struct TrustedSubnetEndpoint<E> {
    inner: E,
    guard: TrustedSubnet,
}

impl<E> Endpoint for TrustedSubnetEndpoint<E>
where E: Endpoint
{
    type Output = Response;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        self.guard.check(&req)?;
        self.inner.call(req).await.map(IntoResponse::into_response)
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
        "ok"
    }

    fn client(subnet: Option<&str>) -> TestClient<impl Endpoint> {
        let subnet = subnet.map(|s| s.parse::<IpNet>().unwrap());
        TestClient::new(
            Route::new()
                .at("/", poem::post(ok))
                .with(TrustedSubnet::new(subnet)),
        )
    }

    #[test_log::test(tokio::test)]
    async fn address_inside_subnet_is_allowed() {
        let resp = client(Some("192.168.1.0/24"))
            .post("/")
            .header(REAL_IP_HEADER, "192.168.1.10")
            .send()
            .await;

        resp.assert_status_is_ok();
    }

    #[test_log::test(tokio::test)]
    async fn mapped_ipv6_address_matches_ipv4_subnet() {
        let cli = client(Some("192.168.1.0/24"));

        cli.post("/")
            .header(REAL_IP_HEADER, "::ffff:192.168.1.10")
            .send()
            .await
            .assert_status_is_ok();
        cli.post("/")
            .header(REAL_IP_HEADER, "::ffff:10.0.0.1")
            .send()
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[test_log::test(tokio::test)]
    async fn address_outside_subnet_is_forbidden() {
        let resp = client(Some("192.168.1.0/24"))
            .post("/")
            .header(REAL_IP_HEADER, "10.0.0.1")
            .send()
            .await;

        resp.assert_status(StatusCode::FORBIDDEN);
    }

    #[test_log::test(tokio::test)]
    async fn malformed_or_missing_address_is_bad_request() {
        let cli = client(Some("192.168.1.0/24"));

        cli.post("/")
            .header(REAL_IP_HEADER, "not-an-ip")
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        cli.post("/")
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn no_subnet_allows_everything() {
        let cli = client(None);

        cli.post("/").send().await.assert_status_is_ok();
        cli.post("/")
            .header(REAL_IP_HEADER, "garbage")
            .send()
            .await
            .assert_status_is_ok();
    }
}
