//! Outbound call model.
//!
//! An [`ApiRequest`] is plain data so the pipeline can replay it after a
//! refresh or re-dispatch it after a timeout.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::form::FormData;
use crate::params::{compile_param_to_url, filter_query_params, PathParams, QueryParams};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RequestMethod {
    /// Convert to reqwest::Method.
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body content.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(FormData),
}

/// Per-call options for the request facade.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers.
    pub headers: HashMap<String, String>,
    /// Encode the body as multipart form data.
    pub use_form_data: bool,
    /// Values for `:name` placeholders in the endpoint.
    pub path_params: Option<PathParams>,
    /// Query parameters; absent and empty values are dropped.
    pub query_params: Option<QueryParams>,
    /// Override the client-wide timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn form_data(mut self) -> Self {
        self.use_form_data = true;
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<crate::ParamValue>) -> Self {
        self.path_params
            .get_or_insert_with(PathParams::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<crate::ParamValue>) -> Self {
        self.query_params
            .get_or_insert_with(QueryParams::new)
            .push((name.into(), Some(value.into())));
        self
    }

    /// Add a query parameter that may be absent.
    pub fn query_opt<V: Into<crate::ParamValue>>(
        mut self,
        name: impl Into<String>,
        value: Option<V>,
    ) -> Self {
        self.query_params
            .get_or_insert_with(QueryParams::new)
            .push((name.into(), value.map(Into::into)));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An outbound call, augmented with retry bookkeeping.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: RequestMethod,
    /// Compiled endpoint, relative to the base URL or absolute.
    pub endpoint: String,
    /// Filtered query pairs.
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
    pub bearer_token: Option<String>,
    /// Already replayed once after a refresh; a second 401 is terminal.
    pub retried: bool,
    /// Timeout retries applied so far.
    pub retry_count: u32,
}

impl ApiRequest {
    /// Create a new request.
    pub fn new(method: RequestMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            bearer_token: None,
            retried: false,
            retry_count: 0,
        }
    }

    /// Compile a facade call: substitute path params, filter the query,
    /// encode the body. Fails before any network activity on a missing
    /// path parameter.
    pub fn compile(
        method: RequestMethod,
        endpoint: &str,
        data: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<Self> {
        let endpoint = compile_param_to_url(endpoint, options.path_params.as_ref())?;
        let query = filter_query_params(options.query_params.as_ref());

        let body = match data {
            None => RequestBody::Empty,
            Some(value) if options.use_form_data => {
                RequestBody::Multipart(crate::form::object_to_form_data(&value)?)
            }
            Some(value) => RequestBody::Json(value),
        };

        Ok(Self {
            query,
            headers: options.headers,
            body,
            timeout: options.timeout,
            ..Self::new(method, endpoint)
        })
    }

    /// Set the bearer token for authentication.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Set a multipart body.
    pub fn multipart(mut self, form: FormData) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Set a per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
