/// Identity keys: how "the same" logical entity is recognised across
/// independent rebuilds of the tree.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::PathBuf;

/// A stable key for one domain entity.
///
/// Keys must be cheap to clone and hash: every patch resolves its target
/// through an `identity -> NodeIndex` map. They must also serialise, because
/// drag payloads carry only the identity of the dragged node.
pub trait Identity:
    Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The identity this key takes after the entity at `from` moved to `to`.
    ///
    /// Hierarchical keys (paths) substitute the `from` prefix with `to`, so
    /// a whole subtree is rewritten by calling this on every descendant.
    /// Opaque keys only change when they are `from` itself.
    fn rebase(&self, from: &Self, to: &Self) -> Self {
        if self == from {
            to.clone()
        } else {
            self.clone()
        }
    }
}

impl Identity for PathBuf {
    fn rebase(&self, from: &Self, to: &Self) -> Self {
        match self.strip_prefix(from) {
            Ok(rest) if rest.as_os_str().is_empty() => to.clone(),
            Ok(rest) => to.join(rest),
            Err(_) => self.clone(),
        }
    }
}

impl Identity for u64 {}

/// Slash-separated keys rebase like paths, so `"a/b"` moved to `"c/b"`
/// takes `"a/b/x"` with it.
impl Identity for String {
    fn rebase(&self, from: &Self, to: &Self) -> Self {
        match self.strip_prefix(from.as_str()) {
            Some("") => to.clone(),
            Some(rest) if rest.starts_with('/') => format!("{to}{rest}"),
            _ => self.clone(),
        }
    }
}
