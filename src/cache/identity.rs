//! Cache identity for resource instances
//!
//! Derives a content-addressed cache key from a resource instance. Same
//! type, version, source and params = same key, regardless of map
//! insertion order or which build step asked.

use crate::resource::ResourceInstance;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::{self, Write};

/// Where a materialized cache may be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// Each worker materializes its own copy; locks are per worker
    Worker,
    /// One lock for the whole cluster
    Cluster,
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::Cluster => write!(f, "cluster"),
        }
    }
}

/// SHA256 hex digest of the instance's identity document
pub fn cache_key(instance: &ResourceInstance) -> String {
    digest(&identity_document(instance, None))
}

/// Name of the lock guarding Create for this instance
///
/// Worker-scoped caches salt the identity with the worker name so that
/// different workers can materialize the same artifact concurrently.
pub fn lock_name(instance: &ResourceInstance, worker_name: &str, scope: CacheScope) -> String {
    match scope {
        CacheScope::Worker => digest(&identity_document(instance, Some(worker_name))),
        CacheScope::Cluster => cache_key(instance),
    }
}

fn digest(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hex::encode(hasher.finalize())
}

/// `{"type":..,"version":..,"source":..,"params":..[,"worker_name":..]}`
///
/// Field order is fixed; keys inside each map are sorted recursively.
/// Written by hand so keys stay sorted even if `serde_json/preserve_order`
/// gets enabled by another crate in the build.
fn identity_document(instance: &ResourceInstance, worker_name: Option<&str>) -> String {
    let mut out = String::from("{\"type\":");
    write_string(&mut out, instance.resource_type().as_str());

    out.push_str(",\"version\":{");
    for (i, (k, v)) in instance.version().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(&mut out, k);
        out.push(':');
        write_string(&mut out, v);
    }
    out.push('}');

    out.push_str(",\"source\":");
    write_object(&mut out, instance.source().iter());
    out.push_str(",\"params\":");
    write_object(&mut out, instance.params().iter());

    if let Some(worker) = worker_name {
        out.push_str(",\"worker_name\":");
        write_string(&mut out, worker);
    }
    out.push('}');
    out
}

/// Serialize a JSON value with object keys in sorted order
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_object(out, entries.into_iter());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => {
            // Scalars have a single JSON spelling
            let _ = write!(out, "{}", scalar);
        }
    }
}

/// Entries must already be sorted by key
fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push('{');
    for (i, (k, v)) in entries.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, k);
        out.push(':');
        write_canonical(out, v);
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    let _ = write!(out, "{}", Value::from(s));
}
