//! Ordered header lists.

use std::fmt;

/// An ordered list of header fields.
///
/// Field names are stored lower-cased, as HTTP/2 requires. Insertion order
/// is preserved so pseudo-headers stay ahead of regular fields on the wire.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing an existing field of the same name
    /// in place or appending a new one.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Append a field without replacing earlier ones.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.fields
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Pseudo-header fields (`:`-prefixed) followed by regular fields, with
    /// `defaults` inserted among the pseudo-headers when absent.
    pub fn with_pseudo_defaults(&self, defaults: &[(&str, &str)]) -> Headers {
        let mut out = Headers::new();
        for (name, value) in self.iter().filter(|(n, _)| n.starts_with(':')) {
            out.append(name, value);
        }
        for (name, value) in defaults {
            if !out.contains(name) {
                out.append(name, *value);
            }
        }
        for (name, value) in self.iter().filter(|(n, _)| !n.starts_with(':')) {
            out.append(name, value);
        }
        out
    }

    pub(crate) fn extend_raw(&mut self, raw: Vec<(Vec<u8>, Vec<u8>)>) {
        for (name, value) in raw {
            self.fields.push((
                String::from_utf8_lossy(&name).to_ascii_lowercase(),
                String::from_utf8_lossy(&value).into_owned(),
            ));
        }
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<N: AsRef<str>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_and_lowercases() {
        let mut headers = Headers::new();
        headers.insert("APNS-Topic", "a");
        headers.insert("apns-topic", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Apns-Topic"), Some("b"));
    }

    #[test]
    fn pseudo_defaults_go_before_regular_fields() {
        let headers: Headers = [
            (":method", "POST"),
            (":path", "/3/device/abc"),
            ("content-length", "2"),
            ("apns-id", "x"),
        ]
        .into_iter()
        .collect();
        let wire = headers.with_pseudo_defaults(&[(":scheme", "https"), (":path", "/ignored")]);
        let names: Vec<&str> = wire.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![":method", ":path", ":scheme", "content-length", "apns-id"]
        );
        assert_eq!(wire.get(":path"), Some("/3/device/abc"));
    }
}
