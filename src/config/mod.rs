//! Per-scope tool configuration files.
//!
//! The on-disk format is TOML with a single `[tools]` table. Each entry is
//! either a bare version string or an inline table carrying a version plus
//! arbitrary string attributes:
//!
//! ```toml
//! [tools]
//! nodejs = "21.5.1"
//! java = {version = "21", vendor = "openjdk"}
//! ```

pub mod chain;
pub mod legacy;

pub use chain::ConfigChain;

use anyhow::{bail, Context as _, Result};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// Primary config filename, preferred on load and for new files.
pub const PRIMARY_FILENAME: &str = ".perigee.toml";
/// Secondary config filename, accepted when the primary is absent.
pub const SECONDARY_FILENAME: &str = "perigee.toml";
/// Legacy line-oriented `name version` file, upgraded transparently on read.
pub const LEGACY_FILENAME: &str = ".tool-versions";

/// One tool entry: a version and optional extra attributes (vendor, dist…).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolConfig {
    pub version: String,
    pub attr: BTreeMap<String, String>,
}

impl ToolConfig {
    pub fn simple(version: impl Into<String>) -> ToolConfig {
        ToolConfig {
            version: version.into(),
            attr: BTreeMap::new(),
        }
    }

    /// Serializes to the inline value form: `"21.5.1"` or
    /// `{version = "21", vendor = "openjdk"}`.
    fn to_inline(&self) -> String {
        if self.attr.is_empty() {
            return quote_toml(&self.version);
        }
        let mut parts = vec![format!("version = {}", quote_toml(&self.version))];
        for (key, value) in &self.attr {
            parts.push(format!("{} = {}", key, format_attr_value(value)));
        }
        format!("{{{}}}", parts.join(", "))
    }
}

/// Tool name → configuration. Keys are case-sensitive; serialization is
/// sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tools(BTreeMap<String, ToolConfig>);

impl Tools {
    pub fn new() -> Tools {
        Tools::default()
    }

    pub fn set(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.0.insert(name.into(), ToolConfig::simple(version));
    }

    pub fn set_with_attr(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        attr: BTreeMap<String, String>,
    ) {
        self.0.insert(
            name.into(),
            ToolConfig {
                version: version.into(),
                attr,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ToolConfig> {
        self.0.get(name)
    }

    pub fn get_version(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|t| t.version.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<ToolConfig> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ToolConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A loaded (or loadable) config file for one scope directory.
///
/// `path == None` means the config was never persisted; the first save picks
/// the target filename via [`determine_config_path`].
///
/// Entries can be *transient*: pins derived from an external source (a
/// plugin legacy file such as `.nvmrc`) that participate in merge and
/// lookup like any other entry but are never written back to disk, so the
/// external file stays the source of truth.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub tools: Tools,
    transient: BTreeSet<String>,
    path: Option<PathBuf>,
}

impl ConfigFile {
    pub fn new() -> ConfigFile {
        ConfigFile::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_new(&self) -> bool {
        self.path.is_none()
    }

    /// Pins a tool for persistence, replacing any transient entry.
    pub fn pin(&mut self, name: impl Into<String>, version: impl Into<String>) {
        let name = name.into();
        self.transient.remove(&name);
        self.tools.set(name, version);
    }

    pub fn pin_with_attr(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        attr: BTreeMap<String, String>,
    ) {
        let name = name.into();
        self.transient.remove(&name);
        self.tools.set_with_attr(name, version, attr);
    }

    /// Records an in-memory-only pin; [`ConfigFile::save`] skips it.
    pub fn set_transient(&mut self, name: impl Into<String>, version: impl Into<String>) {
        let name = name.into();
        self.transient.insert(name.clone());
        self.tools.set(name, version);
    }

    pub fn is_transient(&self, name: &str) -> bool {
        self.transient.contains(name)
    }

    /// Removes a pin, transient or persistent.
    pub fn unpin(&mut self, name: &str) -> Option<ToolConfig> {
        self.transient.remove(name);
        self.tools.remove(name)
    }

    /// Reads a single TOML config file. A missing file yields an empty
    /// config that still remembers `path` so a later save lands there.
    /// Malformed content is a hard error.
    pub fn load(path: &Path) -> Result<ConfigFile> {
        let mut config = ConfigFile::new();
        config.path = Some(path.to_path_buf());

        if !path.exists() {
            return Ok(config);
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        config.tools = parse_tools(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Loads the config for a scope directory.
    ///
    /// Precedence: [`PRIMARY_FILENAME`] > [`SECONDARY_FILENAME`] >
    /// [`LEGACY_FILENAME`]. A legacy file is upgraded in memory and the
    /// primary-format file is written once alongside it, so subsequent loads
    /// skip the legacy path; the legacy file itself is left untouched. If
    /// nothing exists, returns an empty config pointed at the default target.
    pub fn load_dir(dir: &Path) -> Result<ConfigFile> {
        for filename in [PRIMARY_FILENAME, SECONDARY_FILENAME] {
            let candidate = dir.join(filename);
            if candidate.exists() {
                return ConfigFile::load(&candidate);
            }
        }

        let legacy_path = dir.join(LEGACY_FILENAME);
        if legacy_path.exists() {
            let record = legacy::read_file(&legacy_path)?;
            let mut config = ConfigFile::new();
            for (name, version) in record {
                config.tools.set(name, version);
            }
            config.path = Some(dir.join(PRIMARY_FILENAME));
            // One-time migration; a failed write is not fatal, the in-memory
            // upgrade already happened.
            if let Err(err) = config.save() {
                log::debug!(
                    "could not migrate {} to {}: {err:#}",
                    legacy_path.display(),
                    PRIMARY_FILENAME
                );
            }
            return Ok(config);
        }

        let mut config = ConfigFile::new();
        config.path = Some(determine_config_path(dir));
        Ok(config)
    }

    /// Writes the config back to its recorded path.
    ///
    /// Transient entries are left out. A config without persistent entries
    /// whose file does not exist yet is skipped entirely (no file is
    /// created); one whose file exists is rewritten with an empty `[tools]`
    /// table. The parent directory is created lazily here, never on load.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            bail!("cannot save a config that was never given a path");
        };
        self.save_to_path(&path)
    }

    fn save_to_path(&mut self, path: &Path) -> Result<()> {
        let has_persistent = self
            .tools
            .iter()
            .any(|(name, _)| !self.transient.contains(name));
        if !has_persistent && !path.exists() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        fs::write(path, serialize_tools(&self.tools, &self.transient))
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }
}

/// Picks the filename a new config in `dir` should be saved under: an
/// existing primary wins, then an existing secondary, defaulting to primary.
pub fn determine_config_path(dir: &Path) -> PathBuf {
    let primary = dir.join(PRIMARY_FILENAME);
    if primary.exists() {
        return primary;
    }
    let secondary = dir.join(SECONDARY_FILENAME);
    if secondary.exists() {
        return secondary;
    }
    primary
}

// -------------------- TOML parse / serialize --------------------

fn parse_tools(text: &str) -> Result<Tools> {
    let table: toml::Table = text.parse().context("invalid TOML")?;

    let mut tools = Tools::new();
    let Some(section) = table.get("tools") else {
        return Ok(tools);
    };
    let toml::Value::Table(section) = section else {
        bail!("[tools] must be a table");
    };

    for (name, value) in section {
        match value {
            toml::Value::String(version) => tools.set(name, version),
            toml::Value::Table(entry) => {
                let mut version = String::new();
                let mut attr = BTreeMap::new();
                for (key, val) in entry {
                    let rendered = attr_value_to_string(val)
                        .with_context(|| format!("tool {name}: unsupported value for {key}"))?;
                    if key == "version" {
                        version = rendered;
                    } else {
                        attr.insert(key.clone(), rendered);
                    }
                }
                if version.is_empty() {
                    bail!("tool {name}: missing version");
                }
                tools.set_with_attr(name, version, attr);
            }
            other => bail!(
                "tool {name}: expected string or table, got {}",
                other.type_str()
            ),
        }
    }

    Ok(tools)
}

fn attr_value_to_string(value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        other => bail!("unsupported TOML value type {}", other.type_str()),
    }
}

fn serialize_tools(tools: &Tools, skip: &BTreeSet<String>) -> String {
    let mut out = String::from("[tools]\n");
    for (name, tool) in tools.iter() {
        if skip.contains(name) {
            continue;
        }
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(&tool.to_inline());
        out.push('\n');
    }
    out
}

fn quote_toml(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' | '"' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Attribute values round-trip as the bare TOML literal when they look like
/// one (bool, integer, float), quoted strings otherwise.
fn format_attr_value(value: &str) -> String {
    if value == "true" || value == "false" {
        return value.to_string();
    }
    if value.parse::<i64>().is_ok() {
        return value.to_string();
    }
    if value.parse::<f64>().is_ok() {
        return value.to_string();
    }
    quote_toml(value)
}
