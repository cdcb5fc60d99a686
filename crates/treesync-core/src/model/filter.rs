/// Population filter: extension allow-list and "containers only" mode.
use super::node::NodeKind;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Decides which children appear in the tree.
///
/// Containers always pass so the walk can reach matching leaves below them;
/// containers left empty by an extension filter are pruned afterwards.
/// Deserialising goes through [`Filter::with_extensions`], so configured
/// extensions are normalised the same way as programmatic ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFilter")]
pub struct Filter {
    /// Allowed leaf extensions, lowercase, without the leading dot.
    /// `None` lets every leaf through.
    pub extensions: Option<BTreeSet<CompactString>>,

    /// Hide every leaf, showing the container skeleton only.
    pub containers_only: bool,
}

impl Filter {
    /// A filter that accepts everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only leaves whose extension is in `extensions` pass.
    ///
    /// Entries are normalised: a leading `.` is stripped and the text is
    /// lowercased, so `".TXT"` and `"txt"` are equivalent. An empty
    /// iterator yields a filter with no extension restriction.
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<CompactString> = extensions
            .into_iter()
            .map(|e| normalise_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            extensions: if set.is_empty() { None } else { Some(set) },
            containers_only: false,
        }
    }

    /// Builder-style toggle for containers-only mode.
    pub fn containers_only(mut self, enabled: bool) -> Self {
        self.containers_only = enabled;
        self
    }

    /// `true` if empty containers should be removed after filtering.
    ///
    /// Only an extension filter can leave a container "dead"; in
    /// containers-only mode the containers *are* the content.
    pub fn prunes_empty_containers(&self) -> bool {
        self.extensions.is_some() && !self.containers_only
    }

    /// `true` if a child of this kind and name belongs in the tree.
    pub fn accepts(&self, kind: NodeKind, name: &str) -> bool {
        if kind.is_container() {
            return true;
        }
        if self.containers_only {
            return false;
        }
        match &self.extensions {
            None => true,
            Some(allowed) => Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext))),
        }
    }
}

/// The filter as written in a config file, before normalisation.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawFilter {
    extensions: Option<Vec<String>>,
    containers_only: bool,
}

impl From<RawFilter> for Filter {
    fn from(raw: RawFilter) -> Self {
        Filter::with_extensions(raw.extensions.unwrap_or_default()).containers_only(raw.containers_only)
    }
}

fn normalise_extension(ext: &str) -> CompactString {
    CompactString::new(ext.trim().trim_start_matches('.').to_ascii_lowercase())
}
