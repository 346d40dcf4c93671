//! Context documents for `${...}` substitution
//!
//! A [`ContextStore`] remembers which JSON file acts as the substitution
//! source and loads it lazily, only once some parameter actually contains a
//! reference. Loaded documents are cached by a hash of the absolute path and
//! modification time, and expire after [`CACHE_TTL`].
//!
//! The store also carries per-thread runtime overrides. They take precedence
//! over the file document for the thread that set them and never leak into
//! other threads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::{ContextFailure, Error, Result};
use crate::params::Params;
use crate::substitution;

/// How long a loaded document is reused before the file is read again
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Cache size above which stale and then oldest entries are pruned
pub const MAX_CACHE_ENTRIES: usize = 50;

/// A parsed context file: a JSON object with arbitrary nesting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextDocument {
    values: Map<String, Value>,
}

impl ContextDocument {
    /// Wrap an already-parsed JSON object
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Look up a dotted path like `db.port`
    pub fn get(&self, key_path: &str) -> Option<&Value> {
        substitution::lookup(&self.values, key_path).ok()
    }

    /// Top-level keys
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the document has no keys
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the underlying object
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Take the underlying object
    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// Snapshot of the store's state, for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ContextInfo {
    /// Resolved context file path, if one is set
    pub path: Option<PathBuf>,
    /// Whether a fresh document for that path is cached
    pub loaded: bool,
    /// Top-level keys of the cached document
    pub keys: Option<Vec<String>>,
}

#[derive(Debug)]
struct CacheEntry {
    path: PathBuf,
    document: ContextDocument,
    loaded_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    path: Option<PathBuf>,
    current_key: Option<String>,
    cache: HashMap<String, CacheEntry>,
    overrides: HashMap<ThreadId, Map<String, Value>>,
}

/// Thread-safe holder of the active context file and its cached documents
#[derive(Debug)]
pub struct ContextStore {
    base_dir: PathBuf,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<State>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// Create an empty store; relative paths resolve against the current directory
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            ttl: CACHE_TTL,
            max_entries: MAX_CACHE_ENTRIES,
            state: Mutex::new(State::default()),
        }
    }

    /// Resolve relative context paths against `dir` instead of the current directory
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Override the cache TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the cache size bound
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the context file to substitute from.
    ///
    /// The file is not read here. Any cached document for the previously set
    /// path is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `path` is empty or whitespace.
    pub fn set_context(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = path.as_ref().to_string_lossy();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("file_path must be a non-empty string"));
        }

        let candidate = Path::new(trimmed);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        };
        let resolved = std::path::absolute(&resolved).unwrap_or(resolved);

        let mut state = self.lock();
        if let Some(previous) = state.path.take() {
            state.cache.retain(|_, entry| entry.path != previous);
        }
        state.cache.retain(|_, entry| entry.path != resolved);
        state.current_key = None;
        tracing::debug!(path = %resolved.display(), "context file set");
        state.path = Some(resolved);
        Ok(())
    }

    /// Reset to the unset state, dropping cached documents and overrides
    pub fn clear_context(&self) {
        let mut state = self.lock();
        *state = State::default();
        tracing::debug!("context cleared");
    }

    /// Currently set context path
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Load the current context document, reading the file only on a cache miss.
    ///
    /// # Errors
    ///
    /// - [`Error::ContextNotSet`] if no path is set
    /// - [`Error::ContextFile`] if the file is missing, not a file, unreadable,
    ///   not JSON, or not a JSON object
    pub fn load(&self) -> Result<ContextDocument> {
        let path = self.lock().path.clone().ok_or(Error::ContextNotSet)?;
        let fail = |reason| Error::ContextFile {
            path: path.clone(),
            reason,
        };

        let metadata = std::fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => fail(ContextFailure::NotFound),
            _ => fail(ContextFailure::Unreadable(e)),
        })?;
        if !metadata.is_file() {
            return Err(fail(ContextFailure::NotAFile));
        }
        let key = cache_key(&path, metadata.modified().ok());

        {
            let mut state = self.lock();
            let fresh = state
                .cache
                .get(&key)
                .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
                .map(|entry| entry.document.clone());
            if let Some(document) = fresh {
                tracing::debug!(path = %path.display(), "context cache hit");
                state.current_key = Some(key);
                return Ok(document);
            }
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| fail(ContextFailure::Unreadable(e)))?;
        let parsed: Value =
            serde_json::from_str(&contents).map_err(|e| fail(ContextFailure::InvalidJson(e)))?;
        let Value::Object(values) = parsed else {
            return Err(fail(ContextFailure::NotAnObject));
        };
        let document = ContextDocument::new(values);
        tracing::info!(
            path = %path.display(),
            keys = document.len(),
            "context loaded"
        );

        let mut state = self.lock();
        // The path may have been replaced while the file was being read.
        if state.path.as_ref() == Some(&path) {
            state.cache.insert(
                key.clone(),
                CacheEntry {
                    path: path.clone(),
                    document: document.clone(),
                    loaded_at: Instant::now(),
                },
            );
            state.current_key = Some(key);
            self.prune(&mut state);
        }
        Ok(document)
    }

    fn prune(&self, state: &mut State) {
        if state.cache.len() <= self.max_entries {
            return;
        }
        let ttl = self.ttl;
        state.cache.retain(|_, entry| entry.loaded_at.elapsed() < ttl);

        while state.cache.len() > self.max_entries {
            let oldest = state
                .cache
                .iter()
                .min_by_key(|(_, entry)| entry.loaded_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    state.cache.remove(&key);
                }
                None => break,
            }
        }
        tracing::debug!(entries = state.cache.len(), "context cache pruned");
    }

    /// Number of cached documents
    pub fn cached_documents(&self) -> usize {
        self.lock().cache.len()
    }

    /// Resolve `${...}` references in `params` against the context.
    ///
    /// Returns an unchanged copy, without touching the file, when nothing in
    /// `params` needs substitution or when neither a context file nor runtime
    /// overrides are present.
    ///
    /// # Errors
    ///
    /// Propagates load failures and [`Error::VariableNotFound`].
    pub fn substitute(&self, params: &Params) -> Result<Params> {
        if !substitution::params_need_substitution(params) {
            tracing::debug!("no ${{}} patterns found - skipping context substitution");
            return Ok(params.clone());
        }

        let (has_path, overrides) = {
            let state = self.lock();
            (
                state.path.is_some(),
                state.overrides.get(&thread::current().id()).cloned(),
            )
        };

        if !has_path && overrides.is_none() {
            tracing::debug!("no context set - parameters returned unchanged");
            return Ok(params.clone());
        }

        let mut merged = if has_path {
            self.load()?.into_map()
        } else {
            Map::new()
        };
        if let Some(overrides) = overrides {
            deep_merge(&mut merged, overrides);
        }

        substitution::substitute(params, &merged)
    }

    /// Set a runtime override for the calling thread.
    ///
    /// Intermediate maps along `key_path` are created as needed.
    ///
    /// Overrides are keyed by thread and are not dropped when the thread
    /// exits. A thread that sets overrides should call
    /// [`ContextStore::clear_runtime_context`] when done; otherwise they stay
    /// in the store, invisible to other threads, until
    /// [`ContextStore::clear_context`].
    pub fn update_context(&self, key_path: &str, value: Value) -> Result<()> {
        let key_path = key_path.trim();
        if key_path.is_empty() {
            return Err(Error::invalid_argument("key_path must be a non-empty string"));
        }

        let mut state = self.lock();
        let root = state.overrides.entry(thread::current().id()).or_default();
        let segments: Vec<&str> = key_path.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| Error::invalid_argument("key_path must be a non-empty string"))?;

        let mut current = root;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = slot
                .as_object_mut()
                .ok_or_else(|| Error::invalid_argument("key_path segment is not a map"))?;
        }
        current.insert(last.to_string(), value);
        tracing::debug!(key_path, "runtime context updated");
        Ok(())
    }

    /// Drop runtime overrides for the calling thread
    pub fn clear_runtime_context(&self) {
        self.lock().overrides.remove(&thread::current().id());
        tracing::debug!("runtime context cleared for current thread");
    }

    /// Typed lookup: runtime overrides, then the file document, then `default`.
    ///
    /// A missing or unloadable context file yields `default`.
    pub fn get_context(&self, key_path: &str, default: Value) -> Value {
        let overrides = self.lock().overrides.get(&thread::current().id()).cloned();
        if let Some(found) = overrides
            .as_ref()
            .and_then(|o| substitution::lookup(o, key_path).ok())
        {
            return found.clone();
        }

        if self.path().is_some() {
            match self.load() {
                Ok(document) => {
                    if let Some(found) = document.get(key_path) {
                        return found.clone();
                    }
                }
                Err(e) => tracing::debug!(error = %e, "context unavailable for lookup"),
            }
        }

        tracing::debug!(key_path, "context key not found, returning default");
        default
    }

    /// Describe the current context configuration
    pub fn context_info(&self) -> ContextInfo {
        let state = self.lock();
        let cached = state
            .current_key
            .as_ref()
            .and_then(|key| state.cache.get(key))
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl);
        ContextInfo {
            path: state.path.clone(),
            loaded: cached.is_some(),
            keys: cached.map(|entry| entry.document.keys()),
        }
    }
}

fn cache_key(path: &Path, modified: Option<SystemTime>) -> String {
    let nanos = modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(nanos.to_le_bytes());
    hex::encode(hasher.finalize())
}

fn deep_merge(base: &mut Map<String, Value>, overrides: Map<String, Value>) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_context(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_context_rejects_empty_path() {
        let store = ContextStore::new();
        assert!(matches!(
            store.set_context(""),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            store.set_context("   "),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(store.path().is_none());
    }

    #[test]
    fn test_set_context_does_not_read_file() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new();
        store.set_context(dir.path().join("missing.json")).unwrap();
        assert_eq!(store.cached_documents(), 0);
        assert!(!store.context_info().loaded);
    }

    #[test]
    fn test_relative_path_resolves_against_base_dir() {
        let dir = TempDir::new().unwrap();
        write_context(&dir, "ctx.json", r#"{"a": 1}"#);
        let store = ContextStore::new().with_base_dir(dir.path());
        store.set_context("  ctx.json  ").unwrap();
        assert_eq!(store.load().unwrap().get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_load_without_path_fails() {
        let store = ContextStore::new();
        assert!(matches!(store.load(), Err(Error::ContextNotSet)));
    }

    #[test]
    fn test_load_failures() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new();

        store.set_context(dir.path().join("missing.json")).unwrap();
        assert!(matches!(
            store.load(),
            Err(Error::ContextFile {
                reason: ContextFailure::NotFound,
                ..
            })
        ));

        store.set_context(dir.path()).unwrap();
        assert!(matches!(
            store.load(),
            Err(Error::ContextFile {
                reason: ContextFailure::NotAFile,
                ..
            })
        ));

        let bad = write_context(&dir, "bad.json", r#"{"invalid": json"#);
        store.set_context(&bad).unwrap();
        assert!(matches!(
            store.load(),
            Err(Error::ContextFile {
                reason: ContextFailure::InvalidJson(_),
                ..
            })
        ));

        let empty = write_context(&dir, "empty.json", "");
        store.set_context(&empty).unwrap();
        assert!(matches!(
            store.load(),
            Err(Error::ContextFile {
                reason: ContextFailure::InvalidJson(_),
                ..
            })
        ));

        let list = write_context(&dir, "list.json", r#"["not", "an", "object"]"#);
        store.set_context(&list).unwrap();
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("must contain a JSON object"));
    }

    #[test]
    fn test_load_is_cached() {
        let dir = TempDir::new().unwrap();
        let path = write_context(&dir, "ctx.json", r#"{"cached": true}"#);
        let store = ContextStore::new();
        store.set_context(&path).unwrap();

        let first = store.load().unwrap();
        let second = store.load().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.cached_documents(), 1);
        assert!(store.context_info().loaded);
    }

    #[test]
    fn test_expired_entry_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = write_context(&dir, "ctx.json", r#"{"v": 1}"#);
        let store = ContextStore::new().with_ttl(Duration::ZERO);
        store.set_context(&path).unwrap();
        assert_eq!(store.load().unwrap().get("v"), Some(&json!(1)));

        std::fs::write(&path, r#"{"v": 2}"#).unwrap();
        assert_eq!(store.load().unwrap().get("v"), Some(&json!(2)));
    }

    #[test]
    fn test_set_context_invalidates_previous_document() {
        let dir = TempDir::new().unwrap();
        let first = write_context(&dir, "one.json", r#"{"first": "context"}"#);
        let second = write_context(&dir, "two.json", r#"{"second": "context"}"#);
        let store = ContextStore::new();

        store.set_context(&first).unwrap();
        store.load().unwrap();
        assert_eq!(store.cached_documents(), 1);

        store.set_context(&second).unwrap();
        assert_eq!(store.cached_documents(), 0);
        assert!(!store.context_info().loaded);
        assert_eq!(store.load().unwrap().keys(), vec!["second".to_string()]);
    }

    #[test]
    fn test_cache_is_bounded() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new().with_max_entries(2);
        let path = write_context(&dir, "ctx.json", r#"{"v": 0}"#);
        store.set_context(&path).unwrap();

        // Each rewrite changes the mtime and therefore the cache key.
        for i in 0..5 {
            std::fs::write(&path, format!(r#"{{"v": {i}}}"#)).unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(UNIX_EPOCH + Duration::from_secs(1_000 + i))
                .unwrap();
            store.load().unwrap();
        }
        assert!(store.cached_documents() <= 2);
    }

    #[test]
    fn test_clear_context_resets_state() {
        let dir = TempDir::new().unwrap();
        let path = write_context(&dir, "ctx.json", r#"{"a": 1}"#);
        let store = ContextStore::new();
        store.set_context(&path).unwrap();
        store.load().unwrap();
        store.update_context("x", json!(1)).unwrap();

        store.clear_context();
        store.clear_context();
        let info = store.context_info();
        assert!(info.path.is_none());
        assert!(!info.loaded);
        assert_eq!(store.cached_documents(), 0);
        assert_eq!(store.get_context("x", json!("none")), json!("none"));
    }

    #[test]
    fn test_substitute_without_context_returns_copy() {
        let store = ContextStore::new();
        let input = params(json!({"p": "${a.b}"}));
        assert_eq!(store.substitute(&input).unwrap(), input);
    }

    #[test]
    fn test_substitute_without_patterns_skips_load() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new();
        // A broken path proves the file is never touched.
        store.set_context(dir.path().join("missing.json")).unwrap();
        let input = params(json!({"p": "plain", "n": 1}));
        assert_eq!(store.substitute(&input).unwrap(), input);
    }

    #[test]
    fn test_substitute_against_file() {
        let dir = TempDir::new().unwrap();
        let path = write_context(&dir, "ctx.json", r#"{"db": {"port": 5432}, "app": {"name": "x"}}"#);
        let store = ContextStore::new();
        store.set_context(&path).unwrap();

        let result = store
            .substitute(&params(json!({"p": "${db.port}", "h": "host-${app.name}"})))
            .unwrap();
        assert_eq!(result["p"], json!(5432));
        assert_eq!(result["h"], json!("host-x"));
    }

    #[test]
    fn test_runtime_overrides_take_precedence() {
        let dir = TempDir::new().unwrap();
        let path = write_context(
            &dir,
            "ctx.json",
            r#"{"database": {"host": "file-host", "port": 5432}}"#,
        );
        let store = ContextStore::new();
        store.set_context(&path).unwrap();
        store
            .update_context("database.host", json!("override-host"))
            .unwrap();

        let result = store
            .substitute(&params(json!({"h": "${database.host}", "p": "${database.port}"})))
            .unwrap();
        assert_eq!(result["h"], json!("override-host"));
        assert_eq!(result["p"], json!(5432));

        store.clear_runtime_context();
        let result = store
            .substitute(&params(json!({"h": "${database.host}"})))
            .unwrap();
        assert_eq!(result["h"], json!("file-host"));
    }

    #[test]
    fn test_overrides_are_per_thread() {
        let store = Arc::new(ContextStore::new());
        store.update_context("only.here", json!(true)).unwrap();

        let other = Arc::clone(&store);
        let seen = std::thread::spawn(move || other.get_context("only.here", Value::Null))
            .join()
            .unwrap();
        assert_eq!(seen, Value::Null);
        assert_eq!(store.get_context("only.here", Value::Null), json!(true));
    }

    #[test]
    fn test_exited_thread_overrides_kept_until_cleared() {
        let store = Arc::new(ContextStore::new());

        let worker = Arc::clone(&store);
        std::thread::spawn(move || worker.update_context("job.id", json!(7)).unwrap())
            .join()
            .unwrap();
        assert_eq!(store.lock().overrides.len(), 1);
        assert_eq!(store.get_context("job.id", Value::Null), Value::Null);

        let worker = Arc::clone(&store);
        std::thread::spawn(move || {
            worker.update_context("job.id", json!(8)).unwrap();
            worker.clear_runtime_context();
        })
        .join()
        .unwrap();
        assert_eq!(store.lock().overrides.len(), 1);

        store.clear_context();
        assert!(store.lock().overrides.is_empty());
    }

    #[test]
    fn test_get_context_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = write_context(&dir, "ctx.json", r#"{"api": {"timeout": 5}}"#);
        let store = ContextStore::new();
        store.set_context(&path).unwrap();

        assert_eq!(store.get_context("api.timeout", json!(30)), json!(5));
        assert_eq!(store.get_context("api.retries", json!(3)), json!(3));
    }

    #[test]
    fn test_concurrent_substitution_is_consistent() {
        let dir = TempDir::new().unwrap();
        let path = write_context(&dir, "ctx.json", r#"{"n": 7, "s": "seven"}"#);
        let store = Arc::new(ContextStore::new());
        store.set_context(&path).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let input = params(json!({"n": "${n}", "tag": format!("{i}-${{s}}")}));
                    store.substitute(&input).unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.join().unwrap();
            assert_eq!(result["n"], json!(7));
            assert_eq!(result["tag"], json!(format!("{i}-seven")));
        }
    }
}
