//! Rendering an [`Envs`] set as shell statements to be eval'd by the caller,
//! plus plain JSON for tooling.

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use crate::envs::{Envs, VarValue};

/// Set by the shell hook so nested invocations know which dialect to emit.
pub const HOOK_ENV: &str = "__PERIGEE_SHELL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Pwsh,
    Json,
}

impl ShellKind {
    pub fn parse(s: &str) -> Result<ShellKind> {
        match s.to_ascii_lowercase().as_str() {
            "bash" => Ok(ShellKind::Bash),
            "zsh" => Ok(ShellKind::Zsh),
            "fish" => Ok(ShellKind::Fish),
            "pwsh" | "powershell" => Ok(ShellKind::Pwsh),
            "json" => Ok(ShellKind::Json),
            other => bail!("unsupported shell: {other}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellKind::Bash => "bash",
            ShellKind::Zsh => "zsh",
            ShellKind::Fish => "fish",
            ShellKind::Pwsh => "pwsh",
            ShellKind::Json => "json",
        }
    }

    /// The dialect recorded by the hook, if any.
    pub fn from_hook_env() -> Option<ShellKind> {
        let raw = std::env::var(HOOK_ENV).ok()?;
        ShellKind::parse(&raw).ok()
    }
}

pub struct Exporter {
    shell: ShellKind,
}

impl Exporter {
    pub fn new(shell: ShellKind) -> Exporter {
        Exporter { shell }
    }

    /// Renders variable assignments, removals and the PATH prefix for this
    /// shell. The PATH entries come first in the emitted PATH, ahead of
    /// whatever `inherited_path` carries.
    pub fn export(&self, envs: &Envs, inherited_path: &str) -> String {
        if self.shell == ShellKind::Json {
            return self.export_json(envs, inherited_path);
        }

        let mut out = String::new();
        for (key, value) in envs.vars.iter() {
            match value {
                VarValue::Set(v) => self.set_var(&mut out, key, v),
                VarValue::Unset => self.unset_var(&mut out, key),
            }
        }
        if !envs.paths.is_empty() {
            let mut entries: Vec<String> =
                envs.paths.iter().map(|p| self.rewrite_path(p)).collect();
            if !inherited_path.is_empty() {
                entries.push(inherited_path.to_string());
            }
            let joined = entries.join(self.path_separator());
            self.set_var(&mut out, "PATH", &joined);
        }
        out
    }

    fn export_json(&self, envs: &Envs, inherited_path: &str) -> String {
        let mut vars = Map::new();
        for (key, value) in envs.vars.iter() {
            vars.insert(
                key.clone(),
                match value {
                    VarValue::Set(v) => Value::String(v.clone()),
                    VarValue::Unset => Value::Null,
                },
            );
        }
        let paths: Vec<&String> = envs.paths.iter().collect();
        let body = json!({
            "vars": vars,
            "paths": paths,
            "inherited_path": inherited_path,
        });
        // A Map<String, Value> always serializes.
        serde_json::to_string_pretty(&body).unwrap_or_default()
    }

    fn set_var(&self, out: &mut String, key: &str, value: &str) {
        match self.shell {
            ShellKind::Bash | ShellKind::Zsh => {
                out.push_str("export ");
                out.push_str(key);
                out.push('=');
                out.push_str(&quote_posix(value));
                out.push('\n');
            }
            ShellKind::Fish => {
                out.push_str("set -x -g ");
                out.push_str(key);
                out.push(' ');
                out.push_str(&quote_fish(value));
                out.push('\n');
            }
            ShellKind::Pwsh => {
                out.push_str("$env:");
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(&quote_pwsh(value));
                out.push('\n');
            }
            ShellKind::Json => {}
        }
    }

    fn unset_var(&self, out: &mut String, key: &str) {
        match self.shell {
            ShellKind::Bash | ShellKind::Zsh => {
                out.push_str("unset ");
                out.push_str(key);
                out.push('\n');
            }
            ShellKind::Fish => {
                out.push_str("set -e ");
                out.push_str(key);
                out.push('\n');
            }
            ShellKind::Pwsh => {
                out.push_str("Remove-Item -ErrorAction SilentlyContinue env:/");
                out.push_str(key);
                out.push('\n');
            }
            ShellKind::Json => {}
        }
    }

    fn path_separator(&self) -> &'static str {
        match self.shell {
            ShellKind::Pwsh if cfg!(windows) => ";",
            _ => ":",
        }
    }

    /// Git Bash on Windows wants `/c/foo` where the filesystem says `C:\foo`.
    fn rewrite_path(&self, path: &str) -> String {
        if cfg!(windows) && matches!(self.shell, ShellKind::Bash | ShellKind::Zsh) {
            return gitbash_path(path);
        }
        path.to_string()
    }
}

/// Translates a Windows drive path to Git Bash form: `C:\a\b` -> `/c/a/b`.
pub fn gitbash_path(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest: String = path[2..].replace('\\', "/");
        return format!("/{drive}{rest}");
    }
    path.replace('\\', "/")
}

// -------------------- quoting helpers --------------------

fn quote_posix(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' | '"' | '$' | '`' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn quote_fish(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' | '"' | '$' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn quote_pwsh(s: &str) -> String {
    let mut out = String::from("'");
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
