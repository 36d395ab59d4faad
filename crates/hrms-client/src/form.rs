//! Multipart body compilation.
//!
//! Arrays become repeated `key[]` parts, absent values are omitted, binary
//! values pass through untouched and every other scalar is stringified.

use bytes::Bytes;
use serde_json::Value;

use crate::error::{Error, ErrorKind, Result};

/// One value in a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Binary content sent as a file part.
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Bytes,
    },
    /// Omitted from the compiled body.
    Null,
}

impl FormValue {
    /// Build a file value.
    pub fn file(file_name: impl Into<String>, mime: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        FormValue::File {
            file_name: file_name.into(),
            mime: mime.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    /// Text form of a scalar, `None` for files and nulls.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FormValue::Text(s) => Some(s.clone()),
            FormValue::Int(i) => Some(i.to_string()),
            FormValue::Float(x) => Some(x.to_string()),
            FormValue::Bool(b) => Some(b.to_string()),
            FormValue::File { .. } | FormValue::Null => None,
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FormValue::Null,
            Value::Bool(b) => FormValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FormValue::Int(i),
                None => FormValue::Text(n.to_string()),
            },
            Value::String(s) => FormValue::Text(s.clone()),
            other => FormValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Int(value)
    }
}

impl From<i32> for FormValue {
    fn from(value: i32) -> Self {
        FormValue::Int(i64::from(value))
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

impl<T: Into<FormValue>> From<Option<T>> for FormValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FormValue::Null)
    }
}

/// A field before compilation: one value or a list.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Single(FormValue),
    List(Vec<FormValue>),
}

macro_rules! single_field {
    ($($t:ty),*) => {
        $(impl From<$t> for FormField {
            fn from(value: $t) -> Self {
                FormField::Single(value.into())
            }
        })*
    };
}

single_field!(FormValue, &str, String, i64, i32, bool);

impl From<Vec<FormValue>> for FormField {
    fn from(values: Vec<FormValue>) -> Self {
        FormField::List(values)
    }
}

/// A compiled part; never carries `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

/// Ordered multipart body.
///
/// Kept as plain data so a replayed or retried call can rebuild the
/// `reqwest` form, which is consumed on send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    parts: Vec<FormPart>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, expanding lists and dropping nulls.
    pub fn append(&mut self, key: &str, field: impl Into<FormField>) {
        match field.into() {
            FormField::Single(value) => self.push(key.to_string(), value),
            FormField::List(values) => {
                let name = format!("{key}[]");
                for value in values {
                    self.push(name.clone(), value);
                }
            }
        }
    }

    /// Builder form of [`FormData::append`].
    pub fn with(mut self, key: &str, field: impl Into<FormField>) -> Self {
        self.append(key, field);
        self
    }

    fn push(&mut self, name: String, value: FormValue) {
        if value != FormValue::Null {
            self.parts.push(FormPart { name, value });
        }
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Text values of all parts named `name`.
    pub fn values(&self, name: &str) -> Vec<String> {
        self.parts
            .iter()
            .filter(|p| p.name == name)
            .filter_map(|p| p.value.as_text())
            .collect()
    }

    /// Build the `reqwest` multipart form.
    pub fn to_multipart(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match &part.value {
                FormValue::File {
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime)?;
                    }
                    form.part(part.name.clone(), file)
                }
                value => match value.as_text() {
                    Some(text) => form.text(part.name.clone(), text),
                    None => form,
                },
            };
        }
        Ok(form)
    }
}

/// Compile a JSON object into a multipart body.
///
/// Nested objects are sent as their JSON text.
pub fn object_to_form_data(params: &Value) -> Result<FormData> {
    let object = params.as_object().ok_or_else(|| {
        Error::new(ErrorKind::Other(
            "multipart body must be a JSON object".to_string(),
        ))
    })?;

    let mut form = FormData::new();
    for (key, value) in object {
        let field = match value {
            Value::Array(items) => FormField::List(items.iter().map(FormValue::from_json).collect()),
            other => FormField::Single(FormValue::from_json(other)),
        };
        form.append(key, field);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arrays_expand_and_nulls_drop() {
        let form = object_to_form_data(&json!({"a": 1, "b": [2, 3], "c": null})).unwrap();
        assert_eq!(form.values("a"), vec!["1"]);
        assert_eq!(form.values("b[]"), vec!["2", "3"]);
        assert!(form.parts().iter().all(|p| p.name != "c"));
        assert_eq!(form.parts().len(), 3);
    }

    #[test]
    fn test_nulls_inside_arrays_drop() {
        let form = object_to_form_data(&json!({"ids": [1, null, 2]})).unwrap();
        assert_eq!(form.values("ids[]"), vec!["1", "2"]);
    }

    #[test]
    fn test_scalars_stringified() {
        let form = object_to_form_data(&json!({
            "active": true,
            "salary": 1250.5,
            "name": "Jane",
            "meta": {"k": "v"}
        }))
        .unwrap();
        assert_eq!(form.values("active"), vec!["true"]);
        assert_eq!(form.values("salary"), vec!["1250.5"]);
        assert_eq!(form.values("name"), vec!["Jane"]);
        assert_eq!(form.values("meta"), vec![r#"{"k":"v"}"#]);
    }

    #[test]
    fn test_files_pass_through() {
        let form = FormData::new()
            .with("title", "Contract")
            .with(
                "attachment",
                FormValue::file("contract.pdf", Some("application/pdf"), vec![1u8, 2, 3]),
            )
            .with("note", FormValue::from(None::<String>));

        assert_eq!(form.parts().len(), 2);
        match &form.parts()[1].value {
            FormValue::File { file_name, bytes, .. } => {
                assert_eq!(file_name, "contract.pdf");
                assert_eq!(bytes.as_ref(), &[1, 2, 3]);
            }
            other => panic!("expected file part, got {other:?}"),
        }
        assert!(form.to_multipart().is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(object_to_form_data(&json!([1, 2])).is_err());
    }
}
