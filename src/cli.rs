use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use crate::scope::Scope;

#[derive(Parser, Debug)]
#[command(name = "perigee", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install tool versions, e.g. `perigee install nodejs@20.5.0`
    Install {
        /// One or more `tool@version` specs (`tool` alone asks the plugin
        /// for its latest)
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// Remove an installed version
    Uninstall {
        /// `tool@version`
        tool: String,
    },

    /// Activate a version in a scope (default: session)
    Use {
        /// `tool@version` or `tool@prefix` (e.g. `nodejs@20`)
        tool: String,
        #[arg(short = 'g', long, conflicts_with_all = ["project", "session"])]
        global: bool,
        #[arg(short = 'p', long, conflicts_with = "session")]
        project: bool,
        #[arg(short = 's', long)]
        session: bool,
        /// Record at project scope without creating project shims
        #[arg(long)]
        unlink: bool,
    },

    /// Deactivate a tool in a scope (default: session)
    Unuse {
        tool: String,
        #[arg(short = 'g', long, conflicts_with_all = ["project", "session"])]
        global: bool,
        #[arg(short = 'p', long, conflicts_with = "session")]
        project: bool,
        #[arg(short = 's', long)]
        session: bool,
    },

    /// Show the active version of one tool, or of every installed tool
    Current { tool: Option<String> },

    /// List installed versions
    List { tool: Option<String> },

    /// List the versions a plugin can install
    Available { tool: String },

    /// Emit the environment for the current shell (meant to be eval'd)
    Env {
        /// bash, zsh, fish, pwsh or json; defaults to the hook's shell
        #[arg(long)]
        shell: Option<String>,
        /// Also sweep expired session directories
        #[arg(long)]
        cleanup: bool,
    },
}

/// Splits `tool@version` into its parts; the version may be absent.
pub fn parse_tool_spec(spec: &str) -> Result<(&str, &str)> {
    let (tool, version) = match spec.split_once('@') {
        Some((tool, version)) => (tool, version),
        None => (spec, ""),
    };
    if tool.is_empty() {
        bail!("invalid tool spec: {spec}");
    }
    Ok((tool, version))
}

pub fn scope_of(global: bool, project: bool, session: bool) -> Scope {
    if global {
        Scope::Global
    } else if project {
        Scope::Project
    } else {
        // `session` is the default, flag or not.
        let _ = session;
        Scope::Session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_specs_split_on_at() {
        assert_eq!(parse_tool_spec("nodejs@20.5.0").unwrap(), ("nodejs", "20.5.0"));
        assert_eq!(parse_tool_spec("nodejs").unwrap(), ("nodejs", ""));
        assert!(parse_tool_spec("@20").is_err());
    }

    #[test]
    fn session_is_the_default_scope() {
        assert_eq!(scope_of(false, false, false), Scope::Session);
        assert_eq!(scope_of(false, false, true), Scope::Session);
        assert_eq!(scope_of(false, true, false), Scope::Project);
        assert_eq!(scope_of(true, false, false), Scope::Global);
    }

    #[test]
    fn args_parse() {
        use clap::Parser as _;
        let args = Args::parse_from(["perigee", "use", "nodejs@20", "-p", "--unlink"]);
        match args.command {
            Command::Use {
                tool,
                project,
                unlink,
                ..
            } => {
                assert_eq!(tool, "nodejs@20");
                assert!(project);
                assert!(unlink);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
