//! Header collection
//!
//! Ordered, multi-valued headers with case-insensitive names. Entries keep
//! the name as it was written and the order of insertion; lookups ignore
//! ASCII case.

/// Headers collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from iterator
    pub fn from_entries<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { entries }
    }

    /// Append a header value, keeping any existing values for the name
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Set a header value (replaces any existing)
    pub fn set(&mut self, name: &str, value: &str) {
        self.delete(name);
        self.append(name, value);
    }

    /// Delete every value of a header
    pub fn delete(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Get a header value, combining repeated values with ", "
    pub fn get(&self, name: &str) -> Option<String> {
        let values = self.get_all(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Get every value of a header in insertion order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Check if header exists
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared `Content-Length`, if present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.get_all("content-length")
            .first()
            .and_then(|v| v.trim().parse().ok())
    }

    /// MIME essence of `Content-Type` (lowercased, parameters stripped)
    pub fn mime_essence(&self) -> Option<String> {
        self.get("content-type").map(|v| mime_essence(&v))
    }

    /// Serialize the way `getAllResponseHeaders()` does: lowercase names,
    /// sorted by name, repeated values combined, each line ending in CRLF.
    pub fn to_raw(&self) -> String {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|(k, _)| k.to_ascii_lowercase())
            .collect();
        names.sort();
        names.dedup();

        let mut result = String::new();
        for name in names {
            if let Some(value) = self.get(&name) {
                result.push_str(&name);
                result.push_str(": ");
                result.push_str(&value);
                result.push_str("\r\n");
            }
        }
        result
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Strip parameters from a MIME type and lowercase it
pub fn mime_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
