//! Route parameter bindings.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

/// Parameter bindings of one matched route.
///
/// Values are stored raw, as they appeared in the path. Decoding happens on
/// read and only when the value contains a `%` escape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(Arc<str>, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing an earlier binding of the same name.
    pub fn insert(&mut self, name: impl Into<Arc<str>>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Decoded value of `name`.
    pub fn get(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get_raw(name).map(decode)
    }

    /// Value of `name` exactly as it appeared in the path.
    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, raw value)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    /// All bindings, decoded.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), decode(v).into_owned()))
            .collect()
    }
}

fn decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    // Malformed escapes fall back to the raw value.
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lazily() {
        let mut params = Params::new();
        params.insert("name", "hello%20world");
        params.insert("plain", "abc");

        assert_eq!(params.get_raw("name"), Some("hello%20world"));
        assert_eq!(params.get("name").as_deref(), Some("hello world"));
        assert!(matches!(params.get("plain"), Some(Cow::Borrowed("abc"))));
    }

    #[test]
    fn invalid_utf8_escape_keeps_raw() {
        let mut params = Params::new();
        params.insert("bad", "%FF%FE");
        assert_eq!(params.get("bad").as_deref(), Some("%FF%FE"));
    }

    #[test]
    fn insert_replaces_existing_name() {
        let mut params = Params::new();
        params.insert("id", "1");
        params.insert("id", "2");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get_raw("id"), Some("2"));
    }
}
