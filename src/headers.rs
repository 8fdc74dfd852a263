//! Decoded header lists.

use std::collections::BTreeMap;

/// A decoded header name/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Pseudo-headers (`:method`, `:path`, ...) start with a colon.
    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with(':')
    }
}

/// An ordered header list, as it appeared in the header block.
///
/// Lookups are case-insensitive and return the last value for a name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    list: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.list.push(Header::new(name, value));
    }

    /// Builder form of [`Headers::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Last value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.list
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for `name`, in block order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.list
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Size as counted by SETTINGS_MAX_HEADER_LIST_SIZE: name + value + 32
    /// per entry (RFC 7540 Section 6.5.2).
    pub fn list_size(&self) -> usize {
        self.list
            .iter()
            .map(|h| h.name.len() + h.value.len() + 32)
            .sum()
    }

    /// Resolve to a name -> value mapping with lowercased names.
    ///
    /// Duplicate pseudo-headers keep the last value; duplicate regular
    /// headers are joined with `", "`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for header in &self.list {
            let name = header.name.to_ascii_lowercase();
            match map.get_mut(&name) {
                Some(existing) if !header.is_pseudo() => {
                    existing.push_str(", ");
                    existing.push_str(&header.value);
                }
                _ => {
                    map.insert(name, header.value.clone());
                }
            }
        }
        map
    }
}

impl From<Vec<Header>> for Headers {
    fn from(list: Vec<Header>) -> Self {
        Self { list }
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            list: iter.into_iter().map(|(n, v)| Header::new(n, v)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}
