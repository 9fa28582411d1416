//! Per-request context handed to every handler in a chain.
//!
//! # Responsibilities
//! - Expose the request: method, path, headers, params, query, body
//! - Collect pending status and headers for the response being built
//! - Hold the response once a handler produced one (the finalized flag)
//! - Carry typed per-request variables between middleware and handlers
//!
//! # Design Decisions
//! - Params are read from the route currently executing, so every handler
//!   sees the names its own pattern declares
//! - Query string and body are parsed on first access and cached
//! - Replacing a response keeps the previous response's headers, except
//!   `content-type`; cookies accumulate

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Extensions, Method, Request, StatusCode, Uri};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dispatch::NotFoundHandler;
use crate::error::{Error, Result};
use crate::routing::Params;

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
const TEXT_HTML: &str = "text/html; charset=UTF-8";
const APPLICATION_JSON: &str = "application/json";

/// Per-request state shared by the handler chain.
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Body>,
    body_cache: Option<Bytes>,
    body_limit: usize,

    route_params: Vec<Params>,
    route_index: usize,
    query: OnceLock<Vec<(String, String)>>,

    status: StatusCode,
    prepared: HeaderMap,
    res: Option<Response>,
    finalized: bool,
    error: Option<Arc<Error>>,

    vars: Extensions,
    not_found: Option<NotFoundHandler>,
}

impl Context {
    pub fn new(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Some(body),
            body_cache: None,
            body_limit: usize::MAX,
            route_params: Vec::new(),
            route_index: 0,
            query: OnceLock::new(),
            status: StatusCode::OK,
            prepared: HeaderMap::new(),
            res: None,
            finalized: false,
            error: None,
            vars: parts.extensions,
            not_found: None,
        }
    }

    pub(crate) fn with_not_found(mut self, handler: Option<NotFoundHandler>) -> Self {
        self.not_found = handler;
        self
    }

    pub(crate) fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub(crate) fn set_matches(&mut self, params: Vec<Params>) {
        self.route_params = params;
        self.route_index = 0;
    }

    pub(crate) fn route_index(&self) -> usize {
        self.route_index
    }

    pub(crate) fn set_route_index(&mut self, index: usize) {
        self.route_index = index;
    }

    pub(crate) fn set_error(&mut self, error: Arc<Error>) {
        self.error = Some(error);
    }

    // ---- request ----

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request header as text; `None` if absent or not visible ASCII.
    pub fn req_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn current_params(&self) -> Option<&Params> {
        self.route_params.get(self.route_index)
    }

    /// Decoded value of a param bound by the executing route.
    pub fn param(&self, name: &str) -> Option<Cow<'_, str>> {
        self.current_params().and_then(|p| p.get(name))
    }

    /// Every param bound by the executing route, decoded.
    pub fn params(&self) -> HashMap<String, String> {
        self.current_params().map(Params::to_map).unwrap_or_default()
    }

    fn query_pairs(&self) -> &[(String, String)] {
        self.query.get_or_init(|| {
            self.uri
                .query()
                .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
                .unwrap_or_default()
        })
    }

    /// First value of a query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_pairs()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query parameter, in order.
    pub fn queries(&self, name: &str) -> Vec<&str> {
        self.query_pairs()
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Request body; read once, then served from the cache.
    pub async fn body_bytes(&mut self) -> Result<Bytes> {
        if let Some(bytes) = &self.body_cache {
            return Ok(bytes.clone());
        }
        let body = self.body.take().unwrap_or_else(Body::empty);
        let bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| Error::Body(e.to_string()))?;
        self.body_cache = Some(bytes.clone());
        Ok(bytes)
    }

    pub async fn body_text(&mut self) -> Result<String> {
        let bytes = self.body_bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Body(e.to_string()))
    }

    pub async fn body_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.body_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ---- response ----

    /// Status used by the next response builder call.
    pub fn status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Set a response header, replacing earlier values. Applies to the
    /// current response too if one was already produced.
    pub fn header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        if let Some(res) = &mut self.res {
            res.headers_mut().insert(name.clone(), value.clone());
        }
        self.prepared.insert(name, value);
        Ok(())
    }

    /// Add a response header value, keeping earlier values (`Set-Cookie`).
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        if let Some(res) = &mut self.res {
            res.headers_mut().append(name.clone(), value.clone());
        }
        self.prepared.append(name, value);
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) {
        if let Some(res) = &mut self.res {
            res.headers_mut().remove(name);
        }
        self.prepared.remove(name);
    }

    /// Build a response from the pending status and headers.
    pub fn body(&mut self, body: impl Into<Body>) -> Response {
        self.new_response(body.into(), None)
    }

    pub fn text(&mut self, text: impl Into<String>) -> Response {
        self.new_response(Body::from(text.into()), Some(TEXT_PLAIN))
    }

    pub fn html(&mut self, html: impl Into<String>) -> Response {
        self.new_response(Body::from(html.into()), Some(TEXT_HTML))
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Response> {
        let body = serde_json::to_vec(value)?;
        Ok(self.new_response(Body::from(body), Some(APPLICATION_JSON)))
    }

    /// Redirect to `location`; `status` should be a 3xx code.
    pub fn redirect(&mut self, location: &str, status: StatusCode) -> Result<Response> {
        let value = HeaderValue::from_str(location)
            .map_err(|_| Error::handler(format!("invalid redirect location `{location}`")))?;
        let mut res = self.new_response(Body::empty(), None);
        *res.status_mut() = status;
        res.headers_mut().insert(header::LOCATION, value);
        Ok(res)
    }

    /// Response of the app's not-found handler.
    pub async fn not_found(&mut self) -> Response {
        match self.not_found.clone() {
            Some(handler) => handler(self).await,
            None => default_not_found(),
        }
    }

    fn new_response(&mut self, body: Body, content_type: Option<&'static str>) -> Response {
        let mut res = Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.prepared.clone();
        if let Some(content_type) = content_type {
            res.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        res
    }

    /// True once a handler produced the response.
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    pub fn res(&self) -> Option<&Response> {
        self.res.as_ref()
    }

    pub fn res_mut(&mut self) -> Option<&mut Response> {
        self.res.as_mut()
    }

    /// Install `res` as the response and finalize the context.
    ///
    /// Headers of a response already in place are carried over: the new
    /// `content-type` wins, cookies from both are kept, any other header
    /// takes the earlier value.
    pub fn set_res(&mut self, mut res: Response) {
        if let Some(previous) = self.res.take() {
            let headers = res.headers_mut();
            let mut last_name: Option<HeaderName> = None;
            for (name, value) in previous.headers() {
                if *name == header::CONTENT_TYPE {
                    continue;
                }
                if *name == header::SET_COOKIE {
                    headers.append(name.clone(), value.clone());
                    continue;
                }
                // Multi-valued headers replace once, then append.
                if last_name.as_ref() == Some(name) {
                    headers.append(name.clone(), value.clone());
                } else {
                    headers.insert(name.clone(), value.clone());
                    last_name = Some(name.clone());
                }
            }
        }
        self.res = Some(res);
        self.finalized = true;
    }

    pub(crate) fn take_res(&mut self) -> Option<Response> {
        self.res.take()
    }

    /// Error captured by the last error handler invocation.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_deref()
    }

    // ---- variables ----

    /// Store a typed per-request value.
    pub fn set<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.vars.insert(value);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.vars.get::<T>()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("route_index", &self.route_index)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::handler(format!("invalid header name `{name}`")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| Error::handler(format!("invalid value for header `{name}`")))?;
    Ok((name, value))
}

/// `404 Not Found` as plain text.
pub fn default_not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "404 Not Found")
}

/// Plain-text response with `status`.
pub fn plain(status: StatusCode, text: &str) -> Response {
    let mut res = Response::new(Body::from(text.to_string()));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    res
}
