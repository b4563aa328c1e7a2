use std::fmt;

/// Where a tool activation lives.
///
/// Two orderings are derived from this enum and they are *not* the same:
/// [`Scope::MERGE_PRIORITY`] for config-chain merging and
/// [`Scope::LOOKUP_PRIORITY`] for answering "what version is active".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// Machine-wide, recorded under the user home.
    Global,
    /// Current directory tree.
    Project,
    /// Current shell lineage.
    Session,
}

impl Scope {
    /// Config-chain merge order, lowest priority first. A tool recorded in a
    /// later scope overrides the same tool name from an earlier one.
    pub const MERGE_PRIORITY: [Scope; 3] = [Scope::Global, Scope::Session, Scope::Project];

    /// Current-version lookup order, most specific first.
    pub const LOOKUP_PRIORITY: [Scope; 3] = [Scope::Project, Scope::Session, Scope::Global];

    pub fn parse(s: &str) -> Option<Scope> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Some(Scope::Global),
            "project" => Some(Scope::Project),
            "session" => Some(Scope::Session),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
            Scope::Session => "session",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
