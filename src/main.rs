use anyhow::{bail, Context as _, Result};
use clap::Parser as _;

use perigee::cli::{parse_tool_spec, scope_of, Args, Command};
use perigee::envs::{Envs, Paths};
use perigee::paths::PathMeta;
use perigee::session;
use perigee::shell::{Exporter, ShellKind, HOOK_ENV};
use perigee::state::ConfigState;
use perigee::{Manager, Scope};

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let working_dir = std::env::current_dir().context("cannot determine working directory")?;
    let meta = PathMeta::from_env(working_dir)?;
    let mut manager = Manager::new(meta)?;

    match args.command {
        Command::Install { tools } => install_all(&mut manager, &tools),
        Command::Uninstall { tool } => {
            let (tool, version) = parse_tool_spec(&tool)?;
            if version.is_empty() {
                bail!("uninstall needs an exact version: {tool}@<version>");
            }
            manager.uninstall(tool, version)?;
            println!("removed {tool} {version}");
            Ok(())
        }
        Command::Use {
            tool,
            global,
            project,
            session,
            unlink,
        } => {
            let (tool, request) = parse_tool_spec(&tool)?;
            let scope = scope_of(global, project, session);
            let version = manager.use_version(tool, request, scope, unlink)?;
            println!("now using {tool} {version} ({scope})");
            Ok(())
        }
        Command::Unuse {
            tool,
            global,
            project,
            session,
        } => {
            let (tool, _) = parse_tool_spec(&tool)?;
            let scope = scope_of(global, project, session);
            if manager.unuse(tool, scope)? {
                println!("no longer using {tool} ({scope})");
            } else {
                println!("{tool} was not active at {scope}");
            }
            Ok(())
        }
        Command::Current { tool } => current(&mut manager, tool.as_deref()),
        Command::List { tool } => list(&manager, tool.as_deref()),
        Command::Available { tool } => {
            for entry in manager.available(&tool)? {
                if entry.note.is_empty() {
                    println!("{}", entry.version);
                } else {
                    println!("{} ({})", entry.version, entry.note);
                }
            }
            Ok(())
        }
        Command::Env { shell, cleanup } => env(&mut manager, shell.as_deref(), cleanup),
    }
}

/// Installs every spec, reporting per-tool failures at the end instead of
/// aborting the batch on the first one.
fn install_all(manager: &mut Manager, specs: &[String]) -> Result<()> {
    let mut failed = Vec::new();
    for spec in specs {
        let result = parse_tool_spec(spec)
            .and_then(|(tool, version)| manager.install(tool, version));
        match result {
            Ok(version) => {
                let (tool, _) = parse_tool_spec(spec)?;
                println!("installed {tool} {version}");
            }
            Err(err) => {
                log::error!("{spec}: {err:#}");
                failed.push(spec.as_str());
            }
        }
    }
    if !failed.is_empty() {
        bail!("failed to install: {}", failed.join(", "));
    }
    Ok(())
}

fn current(manager: &mut Manager, tool: Option<&str>) -> Result<()> {
    match tool {
        Some(tool) => match manager.current_version(tool)? {
            Some((version, scope)) => println!("{tool} {version} ({scope})"),
            None => println!("{tool}: no version active"),
        },
        None => {
            for tool in manager.installed_tools() {
                if let Some((version, scope)) = manager.current_version(&tool)? {
                    println!("{tool} {version} ({scope})");
                }
            }
        }
    }
    Ok(())
}

fn list(manager: &Manager, tool: Option<&str>) -> Result<()> {
    let tools = match tool {
        Some(tool) => vec![tool.to_string()],
        None => manager.installed_tools(),
    };
    for tool in tools {
        let versions = manager.list_installed(&tool);
        if versions.is_empty() {
            println!("{tool}: nothing installed");
            continue;
        }
        println!("{tool}:");
        for version in versions {
            println!("  {version}");
        }
    }
    Ok(())
}

/// Renders the composed environment for the hook to eval. Unchanged configs
/// replay the cached render; anything else recomposes and refreshes the
/// cache.
fn env(manager: &mut Manager, shell: Option<&str>, cleanup: bool) -> Result<()> {
    let kind = match shell {
        Some(raw) => ShellKind::parse(raw)?,
        None => ShellKind::from_hook_env().unwrap_or(ShellKind::Bash),
    };

    if cleanup {
        let temp = manager.meta.user.temp.clone();
        let keep = manager.meta.session_dir.clone();
        session::cleanup_expired(&temp, &keep)?;
    }

    let watched = manager.watched_config_files();
    let state = ConfigState::load(manager.meta.state_file());
    if !state.has_changed(&watched) {
        print!("{}", state.cached_output());
        return Ok(());
    }

    let mut envs = manager.compose_envs()?;
    envs.vars.set(HOOK_ENV, kind.as_str());
    envs.vars.set(
        session::SESSION_DIR_ENV,
        manager.meta.session_dir.to_string_lossy().to_string(),
    );

    let inherited = inherited_path(&Paths::from_env_path(), &manager.meta, &envs);
    let output = Exporter::new(kind).export(&envs, &inherited);
    state.update(&watched, &output)?;
    print!("{output}");
    Ok(())
}

/// The OS PATH with perigee shim directories and freshly emitted entries
/// stripped, so re-rendering never stacks stale shim entries behind the
/// fresh ones.
fn inherited_path(os_paths: &Paths, meta: &PathMeta, envs: &Envs) -> String {
    let managed: Vec<String> = Scope::MERGE_PRIORITY
        .iter()
        .map(|scope| meta.shim_dir(*scope).to_string_lossy().to_string())
        .collect();

    let mut kept = Paths::new();
    for entry in os_paths.iter() {
        if managed
            .iter()
            .any(|m| entry == m || entry.starts_with(&format!("{m}/")))
        {
            continue;
        }
        if envs.paths.iter().any(|fresh| fresh == entry) {
            continue;
        }
        kept.add(entry.clone());
    }

    let separator = if cfg!(windows) { ";" } else { ":" };
    kept.join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use perigee::paths::PathOptions;
    use tempfile::tempdir;

    #[test]
    #[cfg(unix)]
    fn inherited_path_drops_shims_and_fresh_entries() {
        let root = tempdir().unwrap();
        let meta = PathMeta::new(PathOptions {
            home: Some(root.path().join("home")),
            working_dir: root.path().join("work"),
            pid: Some(11),
            ..Default::default()
        })
        .unwrap();

        let mut os_paths = Paths::new();
        os_paths.add("/usr/local/bin");
        os_paths.add(meta.shim_dir(Scope::Global).to_string_lossy().to_string());
        os_paths.add(format!(
            "{}/nodejs/bin",
            meta.shim_dir(Scope::Session).to_string_lossy()
        ));
        os_paths.add("/opt/tool/bin");
        os_paths.add("/usr/bin");

        let mut envs = Envs::new();
        envs.paths.add("/opt/tool/bin");

        let inherited = inherited_path(&os_paths, &meta, &envs);
        assert_eq!(inherited, "/usr/local/bin:/usr/bin");
    }
}
