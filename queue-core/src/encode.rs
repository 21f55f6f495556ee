//! The request encoder (spec.md §4.4): turns a `QueueEntry`'s stored
//! payload and content type into a `reqwest::Request` ready to dispatch.
//!
//! `HttpMethod`'s custom `FromStr`/`Display` is carried over from
//! `hook-common::webhook::HttpMethod` almost unchanged, a small
//! enum-over-the-wire adapter that belongs in the shared library
//! regardless of domain. The content-type alias table and
//! multipart/urlencoded/json branching are new: the teacher's webhook
//! payloads are always JSON, but spec.md §6 names six canonical encodings.

use std::collections::HashMap;
use std::str::FromStr;

use serde_json::Value;

use crate::error::SubmitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl FromStr for HttpMethod {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "" => Err(SubmitError::EmptyMethod),
            _ => Err(SubmitError::EmptyMethod),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{s}")
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// A content type, after resolving spec.md §6's aliases to one of the
/// six canonical encodings the request encoder knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    UrlEncoded,
    Multipart,
    Bytes,
    Text,
    Html,
}

/// Canonicalize a content-type token to one of the six encodings the
/// request encoder supports, following spec.md §6's alias table exactly:
/// `form`/`form-data` alias `multipart/form-data`, not the url-encoded
/// type; only `url`/`urlencoded` do.
pub fn canonicalize_content_type(raw: &str) -> Result<ContentType, SubmitError> {
    match raw.to_ascii_lowercase().as_str() {
        "json" | "application/json" | "x-json" | "application/x-json" => Ok(ContentType::Json),
        "url" | "urlencoded" | "application/x-www-form-urlencoded" => Ok(ContentType::UrlEncoded),
        "form" | "form-data" | "multipart" | "multipart/form-data" => Ok(ContentType::Multipart),
        "bytes" | "binary" | "octet-stream" | "octets" | "application/octet-stream" => {
            Ok(ContentType::Bytes)
        }
        "text" | "text/plain" => Ok(ContentType::Text),
        "html" | "text/html" => Ok(ContentType::Html),
        other => Err(SubmitError::UnknownContentType(other.to_owned())),
    }
}

impl ContentType {
    pub fn header_value(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::UrlEncoded => "application/x-www-form-urlencoded",
            ContentType::Multipart => "multipart/form-data",
            ContentType::Bytes => "application/octet-stream",
            ContentType::Text => "text/plain",
            ContentType::Html => "text/html",
        }
    }
}

/// The fully-resolved inputs to one dispatch attempt: everything the
/// request encoder needs, already decoded out of a `QueueEntry`'s stored
/// JSON-text columns.
pub struct EncodeRequest<'a> {
    pub method: HttpMethod,
    pub url: &'a str,
    pub content_type: ContentType,
    pub payload: &'a Value,
    pub headers: &'a HashMap<String, String>,
    /// `None` skips the self-callback header entirely (absolute URL, not a
    /// self-callback). `Some((name, value))` is a configured
    /// `SecureHeaderName`/`SecureHeaderValue` pair, per spec.md §6.
    pub self_callback_secret: Option<(&'a str, &'a str)>,
}

pub fn build_request(
    client: &reqwest::Client,
    req: EncodeRequest<'_>,
) -> Result<reqwest::RequestBuilder, SubmitError> {
    let mut builder = client.request(req.method.into(), req.url);

    for (name, value) in req.headers {
        builder = builder.header(name, value);
    }

    if let Some((header_name, secret)) = req.self_callback_secret {
        builder = builder.header(header_name, secret);
    }

    builder = match req.content_type {
        ContentType::Json => builder.header("Content-Type", req.content_type.header_value()).body(
            serde_json::to_vec(req.payload).map_err(SubmitError::Encode)?,
        ),
        ContentType::UrlEncoded => {
            let pairs = object_to_pairs(req.payload);
            builder
                .header("Content-Type", req.content_type.header_value())
                .body(serde_urlencoded::to_string(&pairs).unwrap_or_default())
        }
        ContentType::Multipart => {
            let mut form = reqwest::multipart::Form::new();
            for (key, value) in object_to_pairs(req.payload) {
                form = form.text(key, value);
            }
            builder.multipart(form)
        }
        ContentType::Bytes => {
            let bytes = match req.payload {
                Value::String(s) => base64::Engine::decode(
                    &base64::engine::general_purpose::STANDARD,
                    s.as_bytes(),
                )
                .map_err(|_| SubmitError::PayloadNotBytes)?,
                _ => return Err(SubmitError::PayloadNotBytes),
            };
            builder
                .header("Content-Type", req.content_type.header_value())
                .body(bytes)
        }
        ContentType::Text | ContentType::Html => {
            let text = match req.payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            builder
                .header("Content-Type", req.content_type.header_value())
                .body(text)
        }
    };

    Ok(builder)
}

fn object_to_pairs(value: &Value) -> Vec<(String, String)> {
    match value.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_and_displays_methods() {
        for (text, method) in [
            ("get", HttpMethod::Get),
            ("POST", HttpMethod::Post),
            ("Patch", HttpMethod::Patch),
        ] {
            let parsed: HttpMethod = text.parse().unwrap();
            assert_eq!(parsed, method);
        }
    }

    #[test]
    fn empty_method_is_rejected() {
        assert!("".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn canonicalizes_aliases() {
        for alias in ["json", "application/json", "x-json", "application/x-json"] {
            assert_eq!(canonicalize_content_type(alias).unwrap(), ContentType::Json);
        }
        for alias in ["url", "urlencoded", "application/x-www-form-urlencoded"] {
            assert_eq!(canonicalize_content_type(alias).unwrap(), ContentType::UrlEncoded);
        }
        for alias in ["form", "form-data", "multipart", "multipart/form-data"] {
            assert_eq!(canonicalize_content_type(alias).unwrap(), ContentType::Multipart);
        }
        for alias in ["bytes", "binary", "octet-stream", "octets", "application/octet-stream"] {
            assert_eq!(canonicalize_content_type(alias).unwrap(), ContentType::Bytes);
        }
        assert_eq!(canonicalize_content_type("text").unwrap(), ContentType::Text);
        assert_eq!(canonicalize_content_type("text/plain").unwrap(), ContentType::Text);
        assert_eq!(canonicalize_content_type("html").unwrap(), ContentType::Html);
        assert_eq!(canonicalize_content_type("text/html").unwrap(), ContentType::Html);
    }

    #[test]
    fn rejects_unknown_content_type() {
        assert!(canonicalize_content_type("carrier-pigeon").is_err());
    }

    #[test]
    fn builds_json_request() {
        let client = reqwest::Client::new();
        let headers = HashMap::new();
        let payload = json!({"hello": "world"});
        let request = build_request(
            &client,
            EncodeRequest {
                method: HttpMethod::Post,
                url: "https://example.test/hook",
                content_type: ContentType::Json,
                payload: &payload,
                headers: &headers,
                self_callback_secret: None,
            },
        )
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn self_callback_header_is_attached() {
        let client = reqwest::Client::new();
        let headers = HashMap::new();
        let payload = json!({});
        let request = build_request(
            &client,
            EncodeRequest {
                method: HttpMethod::Post,
                url: "https://example.test/hook",
                content_type: ContentType::Json,
                payload: &payload,
                headers: &headers,
                self_callback_secret: Some(("X-Queue-Self-Callback", "topsecret")),
            },
        )
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            request.headers().get("X-Queue-Self-Callback").unwrap(),
            "topsecret"
        );
    }
}
