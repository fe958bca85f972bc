use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadModelError {
    #[error("read model store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store for disposable read models.
pub trait ReadModelStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError>;

    /// Read-modify-write one record atomically, starting from `V::default()`
    /// when the key is absent.
    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> Result<(), ReadModelError>;

    fn keys(&self) -> Result<Vec<K>, ReadModelError>;

    /// Drop every record (rebuild support).
    fn clear(&self) -> Result<(), ReadModelError>;
}

impl<K, V, S> ReadModelStore<K, V> for Arc<S>
where
    S: ReadModelStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        (**self).get(key)
    }

    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> Result<(), ReadModelError> {
        (**self).update(key, f)
    }

    fn keys(&self) -> Result<Vec<K>, ReadModelError> {
        (**self).keys()
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        (**self).clear()
    }
}

/// In-memory store for tests/dev.
#[derive(Debug)]
pub struct InMemoryReadModelStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryReadModelStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryReadModelStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> ReadModelError {
    ReadModelError::Unavailable("lock poisoned".to_string())
}

impl<K, V> ReadModelStore<K, V> for InMemoryReadModelStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Default + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, ReadModelError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn update(&self, key: K, f: &mut dyn FnMut(&mut V)) -> Result<(), ReadModelError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        f(map.entry(key).or_default());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<K>, ReadModelError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), ReadModelError> {
        self.inner.write().map_err(poisoned)?.clear();
        Ok(())
    }
}
