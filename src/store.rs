use std::collections::BTreeMap;

use crate::error::KeyFormatError;
use crate::model::KeyPattern;
use crate::resolve::coerce;
use crate::value::TypedValue;

/// Key/value store that loaded values are written to and expanded against.
///
/// A store is an ordinary value: build one per process (or per test), pass it
/// to an [`EnvLoader`](crate::EnvLoader), and [`reset`](Self::reset) it when
/// the loaded keys should be forgotten.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStore {
    values: BTreeMap<String, TypedValue>,
    loaded: Vec<String>,
    backing: Backing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    /// Values live only in this store.
    Memory,
    /// Writes are mirrored into the process environment and reads fall back
    /// to it.
    ///
    /// Mirroring goes through [`std::env::set_var`], which mutates global
    /// process state and is not thread-safe for concurrent environment access.
    Process,
}

impl Default for EnvStore {
    fn default() -> Self {
        Self::memory()
    }
}

impl EnvStore {
    /// Create an empty in-memory store.
    pub fn memory() -> Self {
        Self {
            values: BTreeMap::new(),
            loaded: Vec::new(),
            backing: Backing::Memory,
        }
    }

    /// Create an in-memory store seeded with existing string values.
    ///
    /// Seeded values are coerced but do not count as loaded keys.
    pub fn from_memory<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let values = values
            .into_iter()
            .map(|(key, value)| (key.into(), coerce(value.as_ref())))
            .collect();
        Self {
            values,
            loaded: Vec::new(),
            backing: Backing::Memory,
        }
    }

    /// Create a store backed by the process environment.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other threads concurrently read or write the
    /// process environment while this store is written to or reset.
    pub unsafe fn process() -> Self {
        Self {
            values: BTreeMap::new(),
            loaded: Vec::new(),
            backing: Backing::Process,
        }
    }

    pub fn is_process(&self) -> bool {
        self.backing == Backing::Process
    }

    /// Store `value` under `key` and remember the key as loaded.
    ///
    /// Returns `false` when a process-backed store cannot publish the entry:
    /// an empty key, a key containing `=` or NUL, or a value containing NUL.
    /// Such an entry is logged and nothing is stored.
    pub fn set(&mut self, key: &str, value: TypedValue) -> bool {
        if self.backing == Backing::Process {
            let text = value.to_string();
            if !is_publishable(key, &text) {
                tracing::warn!(key = %key, "skipping value the process environment cannot hold");
                return false;
            }
            // SAFETY: upheld by the caller of `EnvStore::process`.
            unsafe { std::env::set_var(key, text) };
        }
        if !self.is_loaded(key) {
            self.loaded.push(key.to_owned());
        }
        self.values.insert(key.to_owned(), value);
        true
    }

    /// Look up a value. Keys must match `[A-Z_][A-Z0-9_]*`.
    pub fn get(&self, key: &str) -> Result<Option<TypedValue>, KeyFormatError> {
        validate_key(key)?;
        Ok(self.lookup(key))
    }

    pub fn get_or(&self, key: &str, default: TypedValue) -> Result<TypedValue, KeyFormatError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn has(&self, key: &str) -> Result<bool, KeyFormatError> {
        validate_key(key)?;
        Ok(self.contains_key(key))
    }

    /// Keys written through [`set`](Self::set), in first-write order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.loaded.iter().map(String::as_str)
    }

    /// Loaded keys with their current values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.loaded
            .iter()
            .filter_map(|key| self.values.get(key).map(|value| (key.as_str(), value)))
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded.iter().any(|loaded| loaded == key)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    /// Forget every value. A process-backed store also removes the keys it
    /// wrote from the process environment.
    pub fn reset(&mut self) {
        if self.backing == Backing::Process {
            for key in &self.loaded {
                // SAFETY: upheld by the caller of `EnvStore::process`.
                unsafe { std::env::remove_var(key) };
            }
        }
        self.loaded.clear();
        self.values.clear();
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        if self.values.contains_key(key) {
            return true;
        }
        self.backing == Backing::Process && std::env::var_os(key).is_some()
    }

    pub(crate) fn lookup(&self, key: &str) -> Option<TypedValue> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }

        match self.backing {
            Backing::Memory => None,
            Backing::Process => {
                std::env::var_os(key).map(|value| coerce(&value.to_string_lossy()))
            }
        }
    }
}

/// `set_var` panics on these.
fn is_publishable(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '\0']) && !value.contains('\0')
}

fn validate_key(key: &str) -> Result<(), KeyFormatError> {
    if KeyPattern::Strict.matches(key) {
        Ok(())
    } else {
        Err(KeyFormatError {
            key: key.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_typed_values() {
        let mut store = EnvStore::memory();
        store.set("PORT", TypedValue::Integer(8080));
        store.set("DEBUG", TypedValue::Bool(true));

        assert_eq!(store.get("PORT"), Ok(Some(TypedValue::Integer(8080))));
        assert_eq!(store.get("DEBUG"), Ok(Some(TypedValue::Bool(true))));
        assert_eq!(store.get("MISSING"), Ok(None));
        assert_eq!(store.has("PORT"), Ok(true));
        assert_eq!(store.has("MISSING"), Ok(false));
        assert_eq!(
            store.get_or("MISSING", TypedValue::Null),
            Ok(TypedValue::Null)
        );
    }

    #[test]
    fn lookups_reject_non_uppercase_keys() {
        let mut store = EnvStore::memory();
        store.set("camelCase", TypedValue::from("value"));

        for key in ["123INVALID", "kebab-case", "dot.notation", "camelCase", ""] {
            let err = store.get(key).expect_err("expected key format error");
            assert_eq!(err.key, key);
            assert!(store.has(key).is_err());
        }
        assert!(store.keys().any(|key| key == "camelCase"));
    }

    #[test]
    fn keys_follow_first_write_order() {
        let mut store = EnvStore::memory();
        store.set("B", TypedValue::Integer(1));
        store.set("A", TypedValue::Integer(2));
        store.set("B", TypedValue::Integer(3));

        assert_eq!(store.keys().collect::<Vec<_>>(), ["B", "A"]);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.iter().collect::<Vec<_>>(),
            [("B", &TypedValue::Integer(3)), ("A", &TypedValue::Integer(2))]
        );
    }

    #[test]
    fn seeded_values_are_coerced_but_not_loaded() {
        let store = EnvStore::from_memory([("HOME", "/home/me"), ("RETRIES", "3")]);

        assert_eq!(store.get("RETRIES"), Ok(Some(TypedValue::Integer(3))));
        assert_eq!(store.has("HOME"), Ok(true));
        assert!(store.is_empty());
        assert!(!store.is_loaded("HOME"));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut store = EnvStore::from_memory([("SEEDED", "1")]);
        store.set("LOADED", TypedValue::Integer(2));
        store.reset();

        assert_eq!(store.get("SEEDED"), Ok(None));
        assert_eq!(store.get("LOADED"), Ok(None));
        assert_eq!(store.keys().count(), 0);
    }

    #[test]
    fn process_store_mirrors_and_reads_back() {
        let key = format!("TYPENV_STORE_TEST_{}", std::process::id());
        // SAFETY: the key is unique to this test.
        let mut store = unsafe { EnvStore::process() };
        store.set(&key, TypedValue::Float(1.5));

        assert_eq!(std::env::var(&key).as_deref(), Ok("1.5"));
        assert_eq!(store.get(&key), Ok(Some(TypedValue::Float(1.5))));

        store.reset();
        assert!(std::env::var_os(&key).is_none());
        assert_eq!(store.get(&key), Ok(None));
    }

    #[test]
    fn process_store_skips_values_with_nul_bytes() {
        let key = format!("TYPENV_STORE_NUL_{}", std::process::id());
        // SAFETY: the key is unique to this test.
        let mut store = unsafe { EnvStore::process() };

        assert!(!store.set(&key, TypedValue::from("a\0b")));
        assert!(!store.set("BAD=KEY", TypedValue::from("value")));
        assert!(std::env::var_os(&key).is_none());
        assert_eq!(store.get(&key), Ok(None));
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_keeps_values_with_nul_bytes() {
        let mut store = EnvStore::memory();

        assert!(store.set("RAW", TypedValue::from("a\0b")));
        assert_eq!(store.get("RAW"), Ok(Some(TypedValue::from("a\0b"))));
    }
}
