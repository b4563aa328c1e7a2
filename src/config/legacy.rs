//! The legacy `.tool-versions` format: one `name version` pair per line,
//! `#` comments and blank lines ignored. Read-only; new writes always go to
//! the TOML format.

use anyhow::{Context as _, Result};
use std::{collections::BTreeMap, fs, path::Path};

pub fn read_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse(&text))
}

pub fn parse(text: &str) -> BTreeMap<String, String> {
    let mut record = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(name), Some(version)) = (parts.next(), parts.next()) {
            record.insert(name.to_string(), version.to_string());
        }
    }
    record
}
