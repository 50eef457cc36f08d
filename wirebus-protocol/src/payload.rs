//! Flat key/value payload carried in call arguments and results.

/// Ordered mapping from string keys to string values.
///
/// Used both as a call's argument set and as its result set. Keys are unique;
/// `set` on an existing key overwrites the value in place, so the original
/// insertion position is kept. Order is irrelevant for lookup but preserved
/// for deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    entries: Vec<(String, String)>,
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets `key` to `value`, overwriting any existing entry in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Builder-style `set`, for literals in tests and call sites.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns the value for `key`, or `None` if the key is absent.
    ///
    /// A missing key is not an error and never defaults to an empty string;
    /// callers choose their own fallback.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the payload has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.set(k, v);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut p = Payload::new();
        p.set("name", "BBT");
        assert_eq!(p.get("name"), Some("BBT"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let p = Payload::new().with("present", "yes");
        // Absent keys yield None, not an empty-string default.
        assert_eq!(p.get("absent"), None);
        assert!(!p.contains("absent"));
    }

    #[test]
    fn test_overwrite_preserves_position() {
        let mut p = Payload::new();
        p.set("a", "1").set("b", "2").set("c", "3");
        p.set("a", "override");

        let keys: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(p.get("a"), Some("override"));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_insertion_order() {
        let p = Payload::new().with("z", "1").with("a", "2").with("m", "3");
        let keys: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_empty_values_are_distinct_from_missing() {
        let p = Payload::new().with("empty", "");
        assert_eq!(p.get("empty"), Some(""));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn test_from_iterator_dedups() {
        let p: Payload = vec![
            ("k".to_string(), "old".to_string()),
            ("k".to_string(), "new".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("k"), Some("new"));
    }
}
