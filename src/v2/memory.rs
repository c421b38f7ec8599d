//! In-process keys API
//!
//! A `KeysApi` that keeps the key tree in memory and applies the store's v2
//! rules: one global index bumped by every mutation, implicit parent
//! directories, TTL expiry and the store's error codes.
//!
//! ## Data Structure Choice
//! A flat BTreeMap keyed by absolute path. The children of `/a` are the
//! entries between `/a/` and the next sibling, so directory listings and
//! recursive deletes are range scans.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::clock::{remaining_ttl, Clock, SystemClock};
use crate::error::{ApiError, Result};

use super::api::{
    normalize_key, CreateInOrderOptions, DeleteOptions, GetOptions, KeysApi, Node, PrevExist,
    Response, SetOptions,
};

/// Cluster ID reported by a fresh single-member store
pub const DEFAULT_CLUSTER_ID: &str = "cdf818194e3a8c32";

const ROOT: &str = "/";

/// One stored key or directory
#[derive(Debug, Clone)]
struct Entry {
    dir: bool,
    value: String,
    created_index: u64,
    modified_index: u64,
    expiration: Option<DateTime<Utc>>,
}

/// The key tree plus the store index
#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Entry>,
    index: u64,
}

/// In-memory keys API
pub struct MemoryKeysApi {
    tree: Mutex<Tree>,
    clock: Arc<dyn Clock>,
    cluster_id: String,
}

impl MemoryKeysApi {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store driven by `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT.to_string(),
            Entry {
                dir: true,
                value: String::new(),
                created_index: 0,
                modified_index: 0,
                expiration: None,
            },
        );

        Self {
            tree: Mutex::new(Tree { nodes, index: 0 }),
            clock,
            cluster_id: DEFAULT_CLUSTER_ID.to_string(),
        }
    }

    /// Current store index
    pub fn index(&self) -> u64 {
        self.tree.lock().index
    }

    /// Number of live keys and directories, root excluded
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut tree = self.tree.lock();
        tree.expire(now);
        tree.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn response(&self, tree: &Tree, action: &str, node: Option<Node>, prev_node: Option<Node>) -> Response {
        Response {
            action: action.to_string(),
            node,
            prev_node,
            index: tree.index,
            cluster_id: self.cluster_id.clone(),
        }
    }

    fn expiration_for(&self, ttl: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = ttl.as_secs();
        if secs == 0 {
            return None;
        }
        now.checked_add_signed(ChronoDuration::seconds(secs as i64))
    }
}

impl Default for MemoryKeysApi {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tree Helpers
// =============================================================================

/// Prefix shared by every descendant of `path`
fn child_prefix(path: &str) -> String {
    if path == ROOT {
        ROOT.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Ancestors of `path`, outermost first, root excluded
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut end = 0;
    while let Some(pos) = path[end + 1..].find('/') {
        end += 1 + pos;
        out.push(path[..end].to_string());
    }
    out
}

fn is_hidden(path: &str) -> bool {
    path.rsplit('/').next().map_or(false, |name| name.starts_with('_'))
}

impl Tree {
    fn descendants(&self, path: &str) -> Vec<String> {
        let prefix = child_prefix(path);
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.as_str() != ROOT)
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn has_children(&self, path: &str) -> bool {
        !self.descendants(path).is_empty()
    }

    fn remove_subtree(&mut self, path: &str) {
        for key in self.descendants(path) {
            self.nodes.remove(&key);
        }
        self.nodes.remove(path);
    }

    /// Drop every entry whose TTL has passed, along with its descendants
    fn expire(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, e)| e.expiration.map_or(false, |at| at <= now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired {
            if self.nodes.contains_key(&key) {
                self.remove_subtree(&key);
                self.index += 1;
                tracing::trace!("Expired {} at index {}", key, self.index);
            }
        }
    }

    /// Create missing parent directories of `path` at `index`
    fn ensure_parents(&mut self, path: &str, index: u64) -> std::result::Result<(), ApiError> {
        for parent in ancestors(path) {
            match self.nodes.get(&parent) {
                Some(entry) if !entry.dir => {
                    return Err(ApiError::new(ApiError::NOT_DIR, parent, self.index));
                }
                Some(_) => {}
                None => {
                    self.nodes.insert(
                        parent,
                        Entry {
                            dir: true,
                            value: String::new(),
                            created_index: index,
                            modified_index: index,
                            expiration: None,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn repr(&self, path: &str, recursive: bool, sorted: bool, list_children: bool, now: DateTime<Utc>) -> Option<Node> {
        let entry = self.nodes.get(path)?;
        let mut node = Node {
            key: path.to_string(),
            dir: entry.dir,
            value: if entry.dir { String::new() } else { entry.value.clone() },
            nodes: Vec::new(),
            created_index: entry.created_index,
            modified_index: entry.modified_index,
            expiration: entry.expiration,
            ttl: entry.expiration.map_or(0, |at| remaining_ttl(at, now)),
        };

        if entry.dir && list_children {
            let prefix = child_prefix(path);
            let children: Vec<String> = self
                .descendants(path)
                .into_iter()
                .filter(|k| !k[prefix.len()..].contains('/') && !is_hidden(k))
                .collect();
            node.nodes = children
                .iter()
                .filter_map(|child| self.repr(child, recursive, sorted, recursive, now))
                .collect();
            if sorted {
                node.nodes.sort_by(|a, b| a.key.cmp(&b.key));
            }
        }

        Some(node)
    }

    fn compare(&self, path: &str, prev_value: Option<&str>, prev_index: Option<u64>) -> std::result::Result<(), ApiError> {
        let entry = self
            .nodes
            .get(path)
            .ok_or_else(|| ApiError::new(ApiError::KEY_NOT_FOUND, path, self.index))?;

        if entry.dir {
            return Err(ApiError::new(ApiError::NOT_FILE, path, self.index));
        }

        let value_ok = prev_value.map_or(true, |v| v == entry.value);
        let index_ok = prev_index.map_or(true, |i| i == entry.modified_index);
        if value_ok && index_ok {
            return Ok(());
        }

        let mut cause = Vec::new();
        if !value_ok {
            cause.push(format!("[{} != {}]", prev_value.unwrap_or_default(), entry.value));
        }
        if !index_ok {
            cause.push(format!("[{} != {}]", prev_index.unwrap_or_default(), entry.modified_index));
        }
        Err(ApiError::new(ApiError::TEST_FAILED, cause.join(" "), self.index))
    }
}

// =============================================================================
// KeysApi
// =============================================================================

impl KeysApi for MemoryKeysApi {
    fn create(&self, key: &str, value: &str) -> Result<Response> {
        let opts = SetOptions {
            prev_exist: PrevExist::NoExist,
            ..SetOptions::default()
        };
        self.set(key, value, &opts)
    }

    fn create_in_order(&self, dir: &str, value: &str, opts: &CreateInOrderOptions) -> Result<Response> {
        let dir = normalize_key(dir);
        let now = self.clock.now();
        let mut tree = self.tree.lock();
        tree.expire(now);

        if let Some(entry) = tree.nodes.get(&dir) {
            if !entry.dir {
                return Err(ApiError::new(ApiError::NOT_DIR, dir, tree.index).into());
            }
        }

        let index = tree.index + 1;
        let child = format!("{}{:020}", child_prefix(&dir), index);
        tree.ensure_parents(&child, index)?;
        tree.nodes.insert(
            child.clone(),
            Entry {
                dir: false,
                value: value.to_string(),
                created_index: index,
                modified_index: index,
                expiration: self.expiration_for(opts.ttl, now),
            },
        );
        tree.index = index;

        let node = tree.repr(&child, false, false, false, now);
        Ok(self.response(&tree, "create", node, None))
    }

    fn set(&self, key: &str, value: &str, opts: &SetOptions) -> Result<Response> {
        let key = normalize_key(key);
        let now = self.clock.now();
        let mut tree = self.tree.lock();

        if key == ROOT {
            return Err(ApiError::new(ApiError::ROOT_RONLY, key, tree.index).into());
        }
        if opts.refresh {
            if !value.is_empty() {
                return Err(ApiError::new(ApiError::REFRESH_VALUE, key, tree.index).into());
            }
            if opts.ttl.as_secs() == 0 {
                return Err(ApiError::new(ApiError::REFRESH_TTL_REQUIRED, key, tree.index).into());
            }
        }

        tree.expire(now);
        let existing = tree.nodes.get(&key).cloned();
        let prev_node = tree.repr(&key, false, false, false, now);
        let index = tree.index + 1;
        let expiration = self.expiration_for(opts.ttl, now);

        let action = if opts.prev_value.is_some() || opts.prev_index.is_some() {
            tree.compare(&key, opts.prev_value.as_deref(), opts.prev_index)?;
            "compareAndSwap"
        } else {
            match (opts.prev_exist, &existing) {
                (PrevExist::NoExist, Some(_)) => {
                    return Err(ApiError::new(ApiError::NODE_EXIST, key, tree.index).into());
                }
                (PrevExist::Exist, None) => {
                    return Err(ApiError::new(ApiError::KEY_NOT_FOUND, key, tree.index).into());
                }
                (PrevExist::Exist, Some(entry)) if entry.dir && !value.is_empty() => {
                    return Err(ApiError::new(ApiError::NOT_FILE, key, tree.index).into());
                }
                (PrevExist::Exist, Some(_)) => "update",
                (PrevExist::Ignore, Some(entry)) if entry.dir => {
                    return Err(ApiError::new(ApiError::NOT_FILE, key, tree.index).into());
                }
                (PrevExist::NoExist, None) => "create",
                (PrevExist::Ignore, _) => "set",
            }
        };

        if opts.refresh {
            let entry = tree
                .nodes
                .get_mut(&key)
                .ok_or_else(|| ApiError::new(ApiError::KEY_NOT_FOUND, key.clone(), index - 1))?;
            entry.expiration = expiration;
            entry.modified_index = index;
        } else {
            match existing {
                // In-place update keeps the node, and with it the creation index
                Some(entry) if action != "set" => {
                    let updated = Entry {
                        dir: entry.dir,
                        value: if entry.dir { String::new() } else { value.to_string() },
                        created_index: entry.created_index,
                        modified_index: index,
                        expiration,
                    };
                    tree.nodes.insert(key.clone(), updated);
                }
                _ => {
                    tree.ensure_parents(&key, index)?;
                    tree.nodes.insert(
                        key.clone(),
                        Entry {
                            dir: opts.dir,
                            value: if opts.dir { String::new() } else { value.to_string() },
                            created_index: index,
                            modified_index: index,
                            expiration,
                        },
                    );
                }
            }
        }
        tree.index = index;

        let action = if opts.refresh { "update" } else { action };
        if opts.no_value_on_success {
            return Ok(self.response(&tree, action, None, None));
        }
        let node = tree.repr(&key, false, false, false, now);
        Ok(self.response(&tree, action, node, prev_node))
    }

    fn get(&self, key: &str, opts: &GetOptions) -> Result<Response> {
        let key = normalize_key(key);
        let now = self.clock.now();
        let mut tree = self.tree.lock();
        tree.expire(now);

        let node = tree
            .repr(&key, opts.recursive, opts.sorted, true, now)
            .ok_or_else(|| ApiError::new(ApiError::KEY_NOT_FOUND, key.clone(), tree.index))?;
        Ok(self.response(&tree, "get", Some(node), None))
    }

    fn update(&self, key: &str, value: &str) -> Result<Response> {
        let opts = SetOptions {
            prev_exist: PrevExist::Exist,
            ..SetOptions::default()
        };
        self.set(key, value, &opts)
    }

    fn delete(&self, key: &str, opts: &DeleteOptions) -> Result<Response> {
        let key = normalize_key(key);
        let now = self.clock.now();
        let mut tree = self.tree.lock();

        if key == ROOT {
            return Err(ApiError::new(ApiError::ROOT_RONLY, key, tree.index).into());
        }

        tree.expire(now);
        let entry = tree
            .nodes
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::new(ApiError::KEY_NOT_FOUND, key.clone(), tree.index))?;

        let action = if opts.prev_value.is_some() || opts.prev_index.is_some() {
            tree.compare(&key, opts.prev_value.as_deref(), opts.prev_index)?;
            "compareAndDelete"
        } else {
            "delete"
        };

        if entry.dir {
            if !opts.dir && !opts.recursive {
                return Err(ApiError::new(ApiError::NOT_FILE, key, tree.index).into());
            }
            if !opts.recursive && tree.has_children(&key) {
                return Err(ApiError::new(ApiError::DIR_NOT_EMPTY, key, tree.index).into());
            }
        }

        let prev_node = tree.repr(&key, false, false, false, now);
        tree.remove_subtree(&key);
        tree.index += 1;

        let node = Node {
            key: key.clone(),
            dir: entry.dir,
            created_index: entry.created_index,
            modified_index: tree.index,
            ..Node::default()
        };
        Ok(self.response(&tree, action, Some(node), prev_node))
    }
}
