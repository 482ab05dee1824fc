//! Typed access to posted form fields.
//!
//! Every handler reads its inputs through [`FormFields`] so integer parsing and
//! error wording are identical across endpoints. Handlers read fields in their
//! declared order and return on the first error.

use crate::error::ValidationError;
use crate::pagination::PageRequest;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: HashMap<String, String>,
}

impl FormFields {
    pub fn new(fields: HashMap<String, String>) -> Self {
        FormFields { fields }
    }

    /// Raw text of `name`, empty when the field was not posted.
    pub fn raw(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Parses `name` as a base-10 signed integer. A missing field parses as the
    /// empty string and fails like any other malformed value.
    pub fn int(&self, name: &str) -> Result<i64, ValidationError> {
        let raw = self.raw(name);
        raw.parse::<i64>()
            .map_err(|source| ValidationError::InvalidInteger {
                field: name.to_string(),
                raw: raw.to_string(),
                source,
            })
    }

    /// String fields are forwarded untouched, including the empty string.
    pub fn text(&self, name: &str) -> String {
        self.raw(name).to_string()
    }

    /// Reads a page size then a page index, checking each fully before the next.
    pub fn page(&self, size_field: &str, index_field: &str) -> Result<PageRequest, ValidationError> {
        let size = self.int(size_field)?;
        PageRequest::check_size(size, size_field)?;
        let index = self.int(index_field)?;
        PageRequest::new(size, index, size_field, index_field)
    }
}

impl<K, V> FromIterator<(K, V)> for FormFields
where
    K: Into<String>,
    V: Into<String>,
{
    /// A key posted more than once keeps its first value.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = HashMap::new();
        for (k, v) in iter {
            fields.entry(k.into()).or_insert_with(|| v.into());
        }
        FormFields::new(fields)
    }
}
