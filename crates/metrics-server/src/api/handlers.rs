use api_types::MetricKind;
use api_types::MetricSample;
use api_types::MetricValue;
use api_types::Metrics;
use poem::handler;
use poem::web::Data;
use poem::web::Html;
use poem::web::Json;
use poem::web::Path;
use poem::Response;
use tracing::debug;

use super::errors::ApiError;
use crate::storage::MetricStore;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

fn parse_kind(raw: &str) -> Result<MetricKind, ApiError> {
    Ok(raw.parse::<MetricKind>()?)
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::malformed("request body is empty"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::malformed(format!("invalid JSON: {e}")))
}

fn text(body: String) -> Response {
    Response::builder().content_type(TEXT_PLAIN).body(body)
}

/// `POST /update/:kind/:name/:value`
#[handler]
pub async fn update_path(
    Path((kind, name, value)): Path<(String, String, String)>,
    store: Data<&MetricStore>,
) -> poem::Result<Response> {
    let kind = parse_kind(&kind)?;
    if name.is_empty() {
        return Err(ApiError::from(api_types::MetricError::EmptyId).into());
    }
    let sample = MetricSample {
        value: MetricValue::parse(kind, &value).map_err(ApiError::from)?,
        id: name,
    };

    store.apply(&sample);
    debug!(id = %sample.id, kind = %kind, "Applied path update");
    Ok(text(String::new()))
}

/// `POST /update/:kind/:name` without a value.
#[handler]
pub async fn update_path_missing_value(
    Path((kind, _name)): Path<(String, String)>,
) -> poem::Result<Response> {
    parse_kind(&kind)?;
    Err(ApiError::malformed("metric value is missing").into())
}

/// `POST /update/` with a single JSON sample.
#[handler]
pub async fn update_json(body: Vec<u8>, store: Data<&MetricStore>) -> poem::Result<Json<MetricSample>> {
    let wire: Metrics = parse_json(&body)?;
    let sample = MetricSample::try_from(wire).map_err(ApiError::from)?;

    store.apply(&sample);
    debug!(id = %sample.id, kind = %sample.kind(), "Applied JSON update");
    Ok(Json(sample))
}

/// `POST /updates/` with a JSON array; all samples are validated before any is applied.
#[handler]
pub async fn update_batch(
    body: Vec<u8>,
    store: Data<&MetricStore>,
) -> poem::Result<Json<Vec<MetricSample>>> {
    let wire: Vec<Metrics> = parse_json(&body)?;
    if wire.is_empty() {
        return Err(ApiError::malformed("batch is empty").into());
    }
    let samples = wire
        .into_iter()
        .map(MetricSample::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ApiError::from)?;

    store.apply_batch(&samples);
    debug!(count = samples.len(), "Applied batch update");
    Ok(Json(samples))
}

/// `GET /value/:kind/:name`
#[handler]
pub async fn value_path(
    Path((kind, name)): Path<(String, String)>,
    store: Data<&MetricStore>,
) -> poem::Result<Response> {
    let kind = parse_kind(&kind)?;
    let value = store.get(kind, &name).ok_or_else(|| ApiError::NotFound {
        kind: kind.to_string(),
        id: name.clone(),
    })?;
    Ok(text(value.to_string()))
}

/// `POST /value/` with `{"id", "type"}`.
#[handler]
pub async fn value_json(body: Vec<u8>, store: Data<&MetricStore>) -> poem::Result<Json<MetricSample>> {
    let wire: Metrics = parse_json(&body)?;
    let (kind, id) = wire.series().map_err(ApiError::from)?;
    let value = store.get(kind, id).ok_or_else(|| ApiError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    })?;
    Ok(Json(MetricSample {
        id: id.to_string(),
        value,
    }))
}

/// `GET /`: HTML listing of every series.
#[handler]
pub async fn index(store: Data<&MetricStore>) -> Html<String> {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n<table>\n<tr><th>Name</th><th>Type</th><th>Value</th></tr>\n",
    );
    for sample in store.list() {
        page.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&sample.id),
            sample.kind(),
            sample.value
        ));
    }
    page.push_str("</table>\n</body>\n</html>\n");
    Html(page)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_special_characters_are_escaped() {
        assert_eq!(
            escape_html("<script>\"a\"&'b'</script>"),
            "&lt;script&gt;&quot;a&quot;&amp;&#39;b&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn empty_body_is_malformed() {
        let err = parse_json::<Metrics>(b"").unwrap_err();

        assert_eq!(err.status(), poem::http::StatusCode::BAD_REQUEST);
    }
}
