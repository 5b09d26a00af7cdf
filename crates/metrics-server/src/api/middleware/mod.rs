//! Ingress middleware.
//!
//! Applied outermost first:
//!
//! 1. [`RequestLog`] records every request, whatever the outcome downstream
//! 2. [`Gzip`] inflates gzip request bodies and compresses accepted responses
//! 3. [`TrustedSubnet`] checks `X-Real-IP` against the configured CIDR
//! 4. [`VerifySignature`] checks `HashSHA256` against the raw request body
//!
//! Each stage short-circuits on rejection.

mod gzip;
mod logging;
mod signature;
mod trusted_subnet;

pub use gzip::Gzip;
pub use logging::RequestLog;
pub use signature::VerifySignature;
pub use trusted_subnet::TrustedSubnet;

/// Request body exactly as received on the wire, before decompression.
///
/// Inserted into the request extensions by [`Gzip`]; signatures are computed
/// over these bytes.
#[derive(Debug, Clone)]
pub struct RawBody(pub Vec<u8>);

fn header_has_token(headers: &poem::http::HeaderMap, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| {
            item.split(';')
                .next()
                .is_some_and(|t| t.trim().eq_ignore_ascii_case(token))
        })
}
