//! The gateway's persisted JSON configuration document (`openclaw.json`).
//!
//! The document is treated as an opaque, order-preserving JSON tree. The
//! wrapper only ever upserts into it: values are written through dotted key
//! paths or merged in with [`deep_merge`], and keys it does not know about are
//! left alone.

use std::path::{Path, PathBuf};

use {serde_json::Value, tracing::debug};

use crate::error::{Error, Result};

/// Handle on the configuration document at a fixed path.
///
/// "Configured" is defined as the file existing; the handle never caches
/// contents, every call goes back to disk.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
}

impl ConfigDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the document exists on disk.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the document. Returns `Ok(None)` when the file is absent.
    pub fn load(&self) -> Result<Option<Value>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::Read {
                    path: self.path.clone(),
                    source,
                });
            },
        };
        let value = serde_json::from_str(&raw).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(value))
    }

    /// Write the document as pretty-printed JSON, creating parent directories.
    pub fn save(&self, value: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut out = serde_json::to_string_pretty(value)?;
        out.push('\n');
        std::fs::write(&self.path, out).map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "saved configuration document");
        Ok(())
    }

    /// Look up a dotted key path in the current on-disk document.
    pub fn get(&self, dotted: &str) -> Result<Option<Value>> {
        Ok(self
            .load()?
            .and_then(|doc| lookup(&doc, dotted).cloned()))
    }

    /// Load, mutate and save the document in one step.
    ///
    /// Returns `Ok(false)` without touching disk when the document is absent.
    pub fn update(&self, f: impl FnOnce(&mut serde_json::Map<String, Value>)) -> Result<bool> {
        let Some(mut doc) = self.load()? else {
            return Ok(false);
        };
        let Some(root) = doc.as_object_mut() else {
            return Err(Error::NotAnObject {
                path: self.path.clone(),
            });
        };
        f(root);
        self.save(&doc)?;
        Ok(true)
    }

    /// Delete the document. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Resolve a dotted key path (`gateway.auth.token`) inside a JSON tree.
pub fn lookup<'a>(root: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .try_fold(root, |node, key| node.as_object()?.get(key))
}

/// Upsert `value` at a dotted key path, creating intermediate objects and
/// replacing any non-object node that sits on the way.
pub fn set_path(root: &mut Value, dotted: &str, value: Value) {
    let mut node = root;
    let mut keys = dotted.split('.').peekable();
    while let Some(key) = keys.next() {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return;
        }
        node = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Merge `patch` into `target`.
///
/// Objects merge key by key, recursively. Every other patch value (arrays,
/// scalars, `null`) replaces what was there. Applying the same patch twice
/// yields the same tree as applying it once.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    },
                }
            }
        },
        (target, patch) => *target = patch.clone(),
    }
}
