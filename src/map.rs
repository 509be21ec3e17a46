use std::collections::HashMap;
use std::io::{self, Write};

/// A `KEY=VALUE` entry as stored in an [`EnvMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    key: String,
    value: String,
}

impl Pair {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_parts(self) -> (String, String) {
        (self.key, self.value)
    }
}

/// Insertion-ordered map of environment variables.
///
/// Every key appears at most once. Positions are zero-based and always
/// reflect the current order, so they shift when entries are removed or
/// moved with [`EnvMap::set_at`].
///
/// The map does no internal locking; share it across threads only behind
/// external synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    entries: Vec<Pair>,
    by_key: HashMap<String, usize>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Store `value` under `key`.
    ///
    /// An existing key keeps its position and the previous value is returned.
    /// A new key is appended at the end and `None` is returned.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();

        if let Some(existing_idx) = self.by_key.get(&key).copied() {
            let previous = std::mem::replace(&mut self.entries[existing_idx].value, value);
            return Some(previous);
        }

        self.by_key.insert(key.clone(), self.entries.len());
        self.entries.push(Pair { key, value });
        None
    }

    /// Store `value` under `key` at position `at`, moving the key if it
    /// already exists.
    ///
    /// When an existing key is moved forward, `at` is interpreted relative to
    /// the sequence with that key already removed: moving the entry at 0 to
    /// position 2 in `[a, b, c]` yields `[b, a, c]`. The position is clamped
    /// to `[0, len]`.
    ///
    /// Returns the previous value and position if the key existed.
    pub fn set_at(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        mut at: usize,
    ) -> Option<(String, usize)> {
        let key = key.into();
        let value = value.into();

        let previous = match self.by_key.get(&key).copied() {
            Some(existing_idx) => {
                let removed = self.entries.remove(existing_idx);
                if existing_idx < at {
                    at -= 1;
                }
                Some((removed.value, existing_idx))
            }
            None => None,
        };

        let at = at.min(self.entries.len());
        self.entries.insert(at, Pair { key, value });
        self.reindex();
        previous
    }

    /// Look up `key`, returning its value and position.
    pub fn get(&self, key: &str) -> Option<(&str, usize)> {
        let idx = self.by_key.get(key).copied()?;
        Some((self.entries[idx].value.as_str(), idx))
    }

    /// Entry at position `at`, together with the next position if there is one.
    ///
    /// ```
    /// # let mut map = envmap::EnvMap::new();
    /// # map.set("A", "1");
    /// let mut cursor = Some(0);
    /// while let Some((pair, next)) = cursor.and_then(|at| map.get_at(at)) {
    ///     println!("{}={}", pair.key(), pair.value());
    ///     cursor = next;
    /// }
    /// ```
    pub fn get_at(&self, at: usize) -> Option<(&Pair, Option<usize>)> {
        let pair = self.entries.get(at)?;
        let next = at + 1;
        let next = (next < self.entries.len()).then_some(next);
        Some((pair, next))
    }

    /// Remove `key`, returning its value and the position it occupied.
    pub fn remove(&mut self, key: &str) -> Option<(String, usize)> {
        let idx = self.by_key.get(key).copied()?;
        let removed = self.entries.remove(idx);
        self.reindex();
        Some((removed.value, idx))
    }

    /// Remove the entry at position `at`, returning its value and key.
    pub fn remove_at(&mut self, at: usize) -> Option<(String, String)> {
        if at >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(at);
        self.reindex();
        Some((removed.value, removed.key))
    }

    /// Iterate over `(key, value)` in map order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Pair::key)
    }

    /// Write `format(position, key, value)` for every entry, in order.
    pub fn export<W, F>(&self, mut writer: W, mut format: F) -> io::Result<()>
    where
        W: Write,
        F: FnMut(usize, &str, &str) -> String,
    {
        let mut buf = String::new();
        for (idx, pair) in self.entries.iter().enumerate() {
            buf.push_str(&format(idx, &pair.key, &pair.value));
        }
        writer.write_all(buf.as_bytes())
    }

    /// Write every entry as `KEY="VALUE"`, optionally prefixed with its
    /// zero-padded position.
    ///
    /// Values are written as stored; use [`crate::marshal`] for escaped output.
    pub fn emit<W: Write>(&self, writer: W, line_numbers: bool) -> io::Result<()> {
        let width = index_width(self.entries.len());
        self.export(writer, |idx, key, value| {
            if line_numbers {
                format!("{idx:0width$} {key}=\"{value}\"\n")
            } else {
                format!("{key}=\"{value}\"\n")
            }
        })
    }

    fn reindex(&mut self) {
        self.by_key.clear();
        for (idx, pair) in self.entries.iter().enumerate() {
            self.by_key.insert(pair.key.clone(), idx);
        }
    }
}

fn index_width(len: usize) -> usize {
    len.checked_ilog10().map_or(1, |digits| digits as usize + 1)
}

#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: std::slice::Iter<'a, Pair>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|pair| (pair.key.as_str(), pair.value.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a EnvMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for EnvMap {
    type Item = Pair;
    type IntoIter = std::vec::IntoIter<Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V> Extend<(K, V)> for EnvMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}
