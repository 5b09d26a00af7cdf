//! Rendering of samples into transport-ready requests.
//!
//! Two independent encodings exist. The path form carries everything in the
//! URL (`update/{type}/{name}/{value}`) and has no body. The structured form is
//! a JSON object or array, gzip-compressed when enabled. Either way, when a key
//! is configured the exact bytes placed on the wire are signed and the hex
//! digest travels in [`HASH_HEADER`].

use api_types::rpc::JsonRpcRequest;
use api_types::rpc::MetricCall;
use api_types::MetricSample;
use api_types::HASH_HEADER;
use error_stack::ResultExt;
use serde::Serialize;

use crate::codec;
use crate::error::CommError;
use crate::error::CommResult;

const GZIP: &str = "gzip";
const CONTENT_TYPE: &str = "content-type";
const CONTENT_ENCODING: &str = "content-encoding";
const ACCEPT_ENCODING: &str = "accept-encoding";

/// A request ready to be sent: path segments below the base url, body and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRequest {
    pub segments: Vec<String>,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

impl EncodedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Pure, deterministic encoder for a fixed key/compression setting.
#[derive(Debug, Clone)]
pub struct Encoder {
    key: Option<Vec<u8>>,
    compress: bool,
}

impl Encoder {
    pub fn new(key: Option<&str>, compress: bool) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(|k| k.as_bytes().to_vec()),
            compress,
        }
    }

    /// `update/{type}/{name}/{value}` with an empty body.
    pub fn encode_path(&self, sample: &MetricSample) -> CommResult<EncodedRequest> {
        let mut request = EncodedRequest {
            segments: vec![
                "update".to_string(),
                sample.kind().to_string(),
                sample.id.clone(),
                sample.value.to_string(),
            ],
            body: Vec::new(),
            headers: vec![(CONTENT_TYPE, "text/plain".to_string())],
        };
        self.sign(&mut request)?;
        Ok(request)
    }

    /// Single JSON sample for `update/`.
    pub fn encode_json(&self, sample: &MetricSample) -> CommResult<EncodedRequest> {
        self.encode_structured(&["update", ""], sample)
    }

    /// JSON array of samples for `updates/`.
    pub fn encode_batch(&self, samples: &[MetricSample]) -> CommResult<EncodedRequest> {
        self.encode_structured(&["updates", ""], &samples)
    }

    /// JSON-RPC call for `rpc`.
    pub fn encode_rpc(&self, call: &MetricCall, id: u64) -> CommResult<EncodedRequest> {
        let params = call.params().change_context(CommError::Serialization {
            message: "Failed to serialize RPC params".into(),
        })?;
        let request = JsonRpcRequest::new(call.method(), &params, id).change_context(
            CommError::Serialization {
                message: "Failed to serialize RPC request".into(),
            },
        )?;
        self.encode_structured(&["rpc"], &request)
    }

    fn encode_structured(
        &self,
        segments: &[&str],
        value: &impl Serialize,
    ) -> CommResult<EncodedRequest> {
        let json = serde_json::to_vec(value).change_context(CommError::Serialization {
            message: "Failed to serialize metrics".into(),
        })?;

        let mut headers = vec![(CONTENT_TYPE, "application/json".to_string())];
        let body = if self.compress {
            headers.push((CONTENT_ENCODING, GZIP.to_string()));
            headers.push((ACCEPT_ENCODING, GZIP.to_string()));
            codec::compress(&json)?
        } else {
            json
        };

        let mut request = EncodedRequest {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            body,
            headers,
        };
        self.sign(&mut request)?;
        Ok(request)
    }

    fn sign(&self, request: &mut EncodedRequest) -> CommResult<()> {
        if let Some(key) = &self.key {
            let signature = codec::sign(key, &request.body)?;
            request.headers.push((HASH_HEADER, signature));
        }
        Ok(())
    }
}
