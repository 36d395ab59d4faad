//! Path-parameter substitution and query filtering.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, ErrorKind, Result};

/// A scalar usable as a path or query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    /// Empty strings are dropped from query strings.
    pub fn is_empty(&self) -> bool {
        matches!(self, ParamValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

macro_rules! int_param {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(value: $t) -> Self {
                ParamValue::Int(i64::from(value))
            }
        })*
    };
}

int_param!(i8, i16, i32, i64, u8, u16, u32);

/// Values for `:name` placeholders.
pub type PathParams = HashMap<String, ParamValue>;

/// Query parameters; `None` marks an absent value.
pub type QueryParams = Vec<(String, Option<ParamValue>)>;

/// Substitute `:name` placeholders in `endpoint` with percent-encoded values.
///
/// Without a parameter map the endpoint is returned unchanged. With one,
/// every referenced placeholder must have a value. For absolute URLs only
/// the path is scanned, so `host:8000` is never read as a placeholder.
pub fn compile_param_to_url(endpoint: &str, params: Option<&PathParams>) -> Result<String> {
    let Some(params) = params else {
        return Ok(endpoint.to_string());
    };

    let (prefix, path) = split_origin(endpoint);
    let mut out = String::with_capacity(endpoint.len());
    out.push_str(prefix);

    let mut rest = path;
    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());

        if name_len == 0 {
            out.push(':');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        let value = params
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::MissingParameter(name.to_string())))?;
        out.push_str(&urlencoding::encode(&value.to_string()));
        rest = &after[name_len..];
    }
    out.push_str(rest);

    Ok(out)
}

fn split_origin(endpoint: &str) -> (&str, &str) {
    let Some(scheme_end) = endpoint.find("://") else {
        return ("", endpoint);
    };
    let authority_start = scheme_end + 3;
    match endpoint[authority_start..].find('/') {
        Some(slash) => endpoint.split_at(authority_start + slash),
        None => (endpoint, ""),
    }
}

/// Drop absent and empty-string values, stringifying the rest.
pub fn filter_query_params(params: Option<&QueryParams>) -> Vec<(String, String)> {
    let Some(params) = params else {
        return Vec::new();
    };

    params
        .iter()
        .filter_map(|(key, value)| match value {
            Some(v) if !v.is_empty() => Some((key.clone(), v.to_string())),
            _ => None,
        })
        .collect()
}
