//! Framework-facing view of an inbound request.

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, FromRequestParts, Multipart, RawPathParams},
    http::{header, request::Parts, HeaderMap, HeaderName, Request},
};
use cookie::Cookie;
use std::collections::HashMap;

use super::error::CsrfError;
use super::extractor::RequestSource;

/// Lookups over a request's headers, query string, path parameters and,
/// when buffered, its form fields.
#[derive(Debug)]
pub struct InboundRequest<'a> {
    headers: &'a HeaderMap,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl<'a> InboundRequest<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            query: HashMap::new(),
            params: HashMap::new(),
            form: HashMap::new(),
        }
    }

    /// Build a view from request parts, decoding the query string.
    pub fn from_parts(parts: &'a Parts) -> Self {
        let mut request = Self::new(&parts.headers);
        if let Some(query) = parts.uri.query() {
            request.query = first_values(serde_urlencoded::from_str(query).unwrap_or_default());
        }
        request
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_form(mut self, form: HashMap<String, String>) -> Self {
        self.form = form;
        self
    }
}

impl RequestSource for InboundRequest<'_> {
    fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn form(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<String> {
        request_cookie(self.headers, name)
    }
}

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}

/// Matched route parameters, empty when the request was not routed.
pub async fn path_params(parts: &mut Parts) -> HashMap<String, String> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        Err(_) => HashMap::new(),
    }
}

/// Buffer up to `limit` bytes of body and decode form fields from it.
///
/// Returns the fields together with the raw bytes so the body can be handed
/// on unchanged. Bodies that are neither urlencoded nor multipart yield no
/// fields.
pub async fn buffer_form(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<(HashMap<String, String>, Bytes), CsrfError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| CsrfError::UnreadableBody(e.to_string()))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let fields = match mime.as_str() {
        "application/x-www-form-urlencoded" => first_values(
            serde_urlencoded::from_bytes(&bytes)
                .map_err(|e| CsrfError::UnreadableBody(e.to_string()))?,
        ),
        "multipart/form-data" => multipart_fields(content_type, bytes.clone()).await?,
        _ => HashMap::new(),
    };

    Ok((fields, bytes))
}

async fn multipart_fields(
    content_type: &str,
    bytes: Bytes,
) -> Result<HashMap<String, String>, CsrfError> {
    let request = Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .map_err(|e| CsrfError::UnreadableBody(e.to_string()))?;

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| CsrfError::UnreadableBody(e.body_text()))?;

    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CsrfError::UnreadableBody(e.body_text()))?
    {
        // File parts never carry the token
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| CsrfError::UnreadableBody(e.body_text()))?;
        fields.entry(name).or_insert(value);
    }

    Ok(fields)
}

fn first_values(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        map.entry(key).or_insert(value);
    }
    map
}
