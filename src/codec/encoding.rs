//! Parameter encoding into query strings and request bodies.
//!
//! # Responsibilities
//! - Flatten structured parameters into `key=value` pairs (`a[b]`, `a[]`)
//! - Place URL-encoded parameters in the query or the body
//! - Serialize JSON bodies
//!
//! # Design Decisions
//! - Pure functions; invoked once per attempt by the adapting stage
//! - `content-type` is only set when the caller has not set one
//! - Object keys come out sorted (serde_json's map order)

use bytes::Bytes;
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::error::RequestError;
use crate::http::{Method, RequestDescriptor};

/// Structured request parameters.
pub type Parameters = serde_json::Map<String, Value>;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Where URL-encoded parameters go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Query for GET, HEAD and DELETE; body otherwise.
    #[default]
    MethodDependent,
    QueryString,
    HttpBody,
}

/// How pending parameters are turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    Url(Destination),
    Json,
}

impl Default for ParameterEncoding {
    fn default() -> Self {
        ParameterEncoding::Url(Destination::MethodDependent)
    }
}

fn encodes_in_query(method: &Method, destination: Destination) -> bool {
    match destination {
        Destination::QueryString => true,
        Destination::HttpBody => false,
        Destination::MethodDependent => {
            matches!(method, Method::Get | Method::Head | Method::Delete)
        }
    }
}

fn flatten(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&format!("{key}[{k}]"), v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                flatten(&format!("{key}[]"), v, out);
            }
        }
        Value::String(s) => out.push((key.to_string(), s.clone())),
        Value::Number(n) => out.push((key.to_string(), n.to_string())),
        Value::Bool(b) => out.push((key.to_string(), b.to_string())),
        Value::Null => out.push((key.to_string(), String::new())),
    }
}

/// Percent-encoded `application/x-www-form-urlencoded` string.
pub fn query_string(parameters: &Parameters) -> String {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        flatten(key, value, &mut pairs);
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

/// Encode parameters as a body, returning the bytes and their content type.
pub fn encode_body(
    parameters: &Parameters,
    encoding: ParameterEncoding,
) -> Result<(Bytes, &'static str), RequestError> {
    match encoding {
        ParameterEncoding::Url(_) => Ok((Bytes::from(query_string(parameters)), FORM_CONTENT_TYPE)),
        ParameterEncoding::Json => {
            let body = serde_json::to_vec(&Value::Object(parameters.clone()))
                .map_err(|e| RequestError::Encoding(e.to_string()))?;
            Ok((Bytes::from(body), JSON_CONTENT_TYPE))
        }
    }
}

/// Apply a descriptor's pending parameters against its resolved URL.
pub fn apply_parameters(
    descriptor: RequestDescriptor,
    url: &Url,
) -> Result<RequestDescriptor, RequestError> {
    let (descriptor, pending) = descriptor.take_parameters();
    let Some((parameters, encoding)) = pending else {
        return Ok(descriptor);
    };
    if parameters.is_empty() {
        return Ok(descriptor);
    }

    if let ParameterEncoding::Url(destination) = encoding {
        if encodes_in_query(descriptor.method(), destination) {
            let mut url = url.clone();
            let encoded = query_string(&parameters);
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
                _ => encoded,
            };
            url.set_query(Some(&query));
            return Ok(descriptor.with_url(url.to_string()));
        }
    }

    let (body, content_type) = encode_body(&parameters, encoding)?;
    let descriptor = if descriptor.headers().contains("content-type") {
        descriptor
    } else {
        descriptor.with_header("Content-Type", content_type)
    };
    Ok(descriptor.with_body(body))
}
