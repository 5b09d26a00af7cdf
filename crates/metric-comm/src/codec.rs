//! Wire codec shared by the agent and the server: gzip and HMAC-SHA256.

use std::io::Read;
use std::io::Write;

use error_stack::Report;
use error_stack::ResultExt;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;

use crate::error::CommError;
use crate::error::CommResult;

type HmacSha256 = Hmac<Sha256>;

/// Gzip-compress a payload.
pub fn compress(payload: &[u8]) -> CommResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
    encoder
        .write_all(payload)
        .and_then(|()| encoder.finish())
        .change_context(CommError::Serialization {
            message: "Failed to gzip payload".into(),
        })
}

/// Inflate a gzip payload.
pub fn decompress(payload: &[u8]) -> CommResult<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut decoded)
        .change_context(CommError::Serialization {
            message: "Malformed gzip payload".into(),
        })?;
    Ok(decoded)
}

/// Inflate a gzip payload, refusing to produce more than `limit` bytes.
pub fn decompress_limited(payload: &[u8], limit: usize) -> CommResult<Vec<u8>> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoded = Vec::new();
    GzDecoder::new(payload)
        .take(cap)
        .read_to_end(&mut decoded)
        .change_context(CommError::Serialization {
            message: "Malformed gzip payload".into(),
        })?;
    if decoded.len() > limit {
        return Err(Report::new(CommError::PayloadTooLarge { limit }));
    }
    Ok(decoded)
}

fn mac(key: &[u8]) -> CommResult<HmacSha256> {
    // HMAC accepts keys of any length, so this only fails on a broken backend.
    HmacSha256::new_from_slice(key).map_err(|e| {
        Report::new(CommError::Configuration {
            message: format!("Invalid HMAC key: {e}"),
        })
    })
}

/// Hex encoded HMAC-SHA256 of `payload` under `key`.
pub fn sign(key: &[u8], payload: &[u8]) -> CommResult<String> {
    let mut mac = mac(key)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex encoded signature in constant time.
///
/// Returns `false` for signatures that are not valid hex or have the wrong length.
pub fn verify(key: &[u8], payload: &[u8], signature_hex: &str) -> CommResult<bool> {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return Ok(false);
    };
    let mut mac = mac(key)?;
    mac.update(payload);
    Ok(mac.verify_slice(&signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trip() {
        let payload = br#"[{"id":"Alloc","type":"gauge","value":1.0}]"#;

        let compressed = compress(payload).expect("should compress");

        assert_ne!(compressed.as_slice(), payload.as_slice());
        assert_eq!(decompress(&compressed).expect("should inflate"), payload);
    }

    #[test]
    fn malformed_gzip_is_rejected() {
        let err = decompress(b"definitely not gzip").expect_err("should fail");

        assert!(format!("{err}").contains("Malformed gzip payload"));
    }

    #[test]
    fn inflation_stops_at_limit() {
        let compressed = compress(&[0u8; 4096]).unwrap();

        assert_eq!(decompress_limited(&compressed, 4096).unwrap().len(), 4096);
        let err = decompress_limited(&compressed, 4095).expect_err("should refuse");
        assert!(matches!(
            err.current_context(),
            CommError::PayloadTooLarge { limit: 4095 }
        ));
    }

    #[test]
    fn signature_verifies_with_same_key_only() {
        let signature = sign(b"K", b"payload").unwrap();

        assert_eq!(signature.len(), 64);
        assert!(verify(b"K", b"payload", &signature).unwrap());
        assert!(!verify(b"other", b"payload", &signature).unwrap());
        assert!(!verify(b"K", b"tampered", &signature).unwrap());
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let signature = sign(b"Jefe", b"what do ya want for nothing?").unwrap();

        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn non_hex_signature_fails_verification() {
        assert!(!verify(b"K", b"payload", "zz-not-hex").unwrap());
        assert!(!verify(b"K", b"payload", "abcd").unwrap());
    }
}
