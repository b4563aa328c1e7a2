use std::collections::BTreeMap;

use crate::scope::Scope;

/// A variable assignment. `Unset` is an explicit marker, distinct from
/// setting a key to the empty string: it tells the shell to remove the
/// variable entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Set(String),
    Unset,
}

impl VarValue {
    pub fn as_set(&self) -> Option<&str> {
        match self {
            VarValue::Set(v) => Some(v),
            VarValue::Unset => None,
        }
    }
}

/// Environment variables with overwrite-on-merge semantics: the last merge
/// wins for a given key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars(BTreeMap<String, VarValue>);

impl Vars {
    pub fn new() -> Vars {
        Vars::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), VarValue::Set(value.into()));
    }

    pub fn unset(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), VarValue::Unset);
    }

    pub fn get(&self, key: &str) -> Option<&VarValue> {
        self.0.get(key)
    }

    pub fn merge(&mut self, other: &Vars) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An ordered set of PATH entries. Merge is append-if-absent, so entries
/// merged earlier keep the earlier (higher-precedence) PATH positions and
/// re-merging an already-contained path is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paths {
    entries: Vec<String>,
}

impl Paths {
    pub fn new() -> Paths {
        Paths::default()
    }

    pub fn from_env_path() -> Paths {
        let mut paths = Paths::new();
        if let Some(raw) = std::env::var_os("PATH") {
            for part in std::env::split_paths(&raw) {
                let s = part.to_string_lossy().to_string();
                if !s.is_empty() {
                    paths.add(s);
                }
            }
        }
        paths
    }

    /// Appends `entry` unless already present. Returns whether it was added.
    pub fn add(&mut self, entry: impl Into<String>) -> bool {
        let entry = entry.into();
        if self.entries.iter().any(|e| e == &entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn merge(&mut self, other: &Paths) {
        for entry in &other.entries {
            self.add(entry.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    pub fn join(&self, separator: &str) -> String {
        self.entries.join(separator)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Variables plus PATH entries produced by one or more active runtimes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envs {
    pub vars: Vars,
    pub paths: Paths,
}

impl Envs {
    pub fn new() -> Envs {
        Envs::default()
    }

    pub fn merge(&mut self, other: &Envs) {
        self.vars.merge(&other.vars);
        self.paths.merge(&other.paths);
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.paths.is_empty()
    }
}

/// Merges per-scope environments into one, honouring scope priority.
///
/// `priority_highest_first` is walked forwards for paths (append-if-absent
/// puts the highest-priority scope's entries first in the final PATH) and
/// *backwards* for variables (overwrite-last-wins means the highest-priority
/// scope's values must land last). Reusing the paths order for variables
/// would invert variable precedence.
pub fn merge_by_scope_priority(
    by_scope: &BTreeMap<Scope, Envs>,
    priority_highest_first: &[Scope],
) -> Envs {
    let mut merged = Envs::new();

    for scope in priority_highest_first {
        if let Some(envs) = by_scope.get(scope) {
            merged.paths.merge(&envs.paths);
        }
    }

    for scope in priority_highest_first.iter().rev() {
        if let Some(envs) = by_scope.get(scope) {
            merged.vars.merge(&envs.vars);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_of(entries: &[&str]) -> Paths {
        let mut p = Paths::new();
        for e in entries {
            p.add(*e);
        }
        p
    }

    #[test]
    fn paths_merge_is_idempotent() {
        let a = paths_of(&["/a/bin", "/b/bin"]);
        let b = paths_of(&["/c/bin"]);

        let mut once = a.clone();
        once.merge(&b);

        let mut again = a.clone();
        again.merge(&b);
        again.merge(&a);

        assert_eq!(once, again);
        assert_eq!(
            once.iter().collect::<Vec<_>>(),
            vec!["/a/bin", "/b/bin", "/c/bin"]
        );

        let mut self_merge = a.clone();
        self_merge.merge(&a);
        assert_eq!(self_merge, a);
    }

    #[test]
    fn paths_join_uses_the_given_separator() {
        let paths = paths_of(&["/a/bin", "/b/bin"]);
        assert_eq!(paths.join(":"), "/a/bin:/b/bin");
        assert_eq!(Paths::new().join(":"), "");
    }

    #[test]
    fn env_path_carries_every_process_path_entry() {
        let paths = Paths::from_env_path();
        if let Some(raw) = std::env::var_os("PATH") {
            for part in std::env::split_paths(&raw) {
                let s = part.to_string_lossy().to_string();
                if !s.is_empty() {
                    assert!(paths.iter().any(|p| p == &s), "missing {s}");
                }
            }
        }
    }

    #[test]
    fn vars_merge_overwrites() {
        let mut a = Vars::new();
        a.set("K", "1");
        let mut b = Vars::new();
        b.set("K", "2");

        a.merge(&b);
        assert_eq!(a.get("K"), Some(&VarValue::Set("2".to_string())));
    }

    #[test]
    fn unset_is_distinct_from_empty() {
        let mut a = Vars::new();
        a.set("K", "");
        assert_eq!(a.get("K"), Some(&VarValue::Set(String::new())));

        a.unset("K");
        assert_eq!(a.get("K"), Some(&VarValue::Unset));
    }

    #[test]
    fn scope_priority_is_asymmetric() {
        let mut project = Envs::new();
        project.vars.set("K", "P");
        project.paths.add("/project/bin");
        project.paths.add("/shared/bin");

        let mut global = Envs::new();
        global.vars.set("K", "G");
        global.paths.add("/global/bin");
        global.paths.add("/shared/bin");

        let mut by_scope = BTreeMap::new();
        by_scope.insert(Scope::Project, project);
        by_scope.insert(Scope::Global, global);

        let merged = merge_by_scope_priority(&by_scope, &Scope::LOOKUP_PRIORITY);

        assert_eq!(merged.vars.get("K"), Some(&VarValue::Set("P".to_string())));
        let order: Vec<_> = merged.paths.iter().map(String::as_str).collect();
        assert_eq!(order, vec!["/project/bin", "/shared/bin", "/global/bin"]);
    }
}
