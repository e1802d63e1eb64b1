//! Path parameters bound while a request walks the router tree.
//!
//! Values are always percent-decoded strings, numeric looking values are never coerced.

use std::fmt;

/// An ordered bag of path parameters with unique names.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Creates an empty `Params`
    #[inline]
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Gets the value of a path parameter by its name
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.entries.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: impl AsRef<str>) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a value, replacing the value of an existing parameter with the same name
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Layers `self` over `parent`: every parent parameter is kept, and on a name collision the
    /// value from `self` wins.
    pub fn merged_over(&self, parent: &Params) -> Params {
        let mut merged = parent.clone();
        for (name, value) in &self.entries {
            merged.insert(name.as_str(), value.as_str());
        }
        merged
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::empty();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::Params;

    #[test]
    fn test_insert_replaces() {
        let mut params = Params::empty();
        params.insert("id", "1");
        params.insert("id", "2");

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("2"));
    }

    #[test]
    fn test_child_overrides_parent() {
        let parent: Params = [("id", "parent"), ("org", "acme")].into_iter().collect();
        let child: Params = [("id", "child")].into_iter().collect();

        let merged = child.merged_over(&parent);
        assert_eq!(merged.get("id"), Some("child"));
        assert_eq!(merged.get("org"), Some("acme"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_numeric_values_stay_strings() {
        let params: Params = [("id", "42")].into_iter().collect();
        assert_eq!(params.get("id"), Some("42"));
        assert!(!params.contains("missing"));
    }
}
