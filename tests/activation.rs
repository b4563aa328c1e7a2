//! End-to-end activation flows against a throwaway filesystem layout.

#![cfg(unix)]

use std::{fs, path::Path, rc::Rc};

use tempfile::tempdir;

use perigee::config::ConfigFile;
use perigee::envs::VarValue;
use perigee::paths::{PathMeta, PathOptions};
use perigee::plugin::testing::FakePlugin;
use perigee::shell::{Exporter, ShellKind};
use perigee::state::ConfigState;
use perigee::{Error, Manager, Scope};

fn manager_in(root: &Path) -> Manager {
    let meta = PathMeta::new(PathOptions {
        home: Some(root.join("home")),
        working_dir: root.join("work"),
        session_dir: Some(root.join("sess")),
        pid: Some(4321),
        ..Default::default()
    })
    .unwrap();
    let mut manager = Manager::new(meta).unwrap();
    manager.register_plugin(Rc::new(
        FakePlugin::new("nodejs", &["20.5.0", "20.11.1", "21.0.0"])
            .with_alias("latest", "21.0.0")
            .with_var("NODE_DIST", "managed")
            .with_bin_dir("bin"),
    ));
    manager
}

#[test]
fn use_requires_an_install_first() {
    let root = tempdir().unwrap();
    let mut manager = manager_in(root.path());

    let err = manager
        .use_version("nodejs", "20", Scope::Session, false)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::VersionNotInstalled { .. })
    ));

    manager.install("nodejs", "20.5.0").unwrap();
    let version = manager
        .use_version("nodejs", "20", Scope::Session, false)
        .unwrap();
    assert_eq!(version, "20.5.0");

    // The session config records the concrete version...
    let text = fs::read_to_string(root.path().join("sess/.perigee.toml")).unwrap();
    assert_eq!(text, "[tools]\nnodejs = \"20.5.0\"\n");

    // ...and the session shim points into the install.
    let shim = root.path().join("sess/nodejs");
    let target = fs::read_link(&shim).unwrap();
    assert!(target.ends_with("installs/nodejs/v-20.5.0/nodejs-20.5.0"));
}

#[test]
fn fuzzy_requests_pick_the_lowest_matching_patch() {
    let root = tempdir().unwrap();
    let mut manager = manager_in(root.path());
    manager.install("nodejs", "20.11.1").unwrap();
    manager.install("nodejs", "20.5.0").unwrap();

    let version = manager
        .use_version("nodejs", "20", Scope::Session, false)
        .unwrap();
    assert_eq!(version, "20.5.0");
}

#[test]
fn project_activation_beats_global_in_the_rendered_env() {
    let root = tempdir().unwrap();
    let mut manager = manager_in(root.path());
    manager.install("nodejs", "21.0.0").unwrap();
    manager.install("nodejs", "20.5.0").unwrap();

    manager
        .use_version("nodejs", "21.0.0", Scope::Global, false)
        .unwrap();
    manager
        .use_version("nodejs", "20.5.0", Scope::Project, false)
        .unwrap();

    let envs = manager.compose_envs().unwrap();
    assert_eq!(
        envs.vars.get("NODE_DIST"),
        Some(&VarValue::Set("managed".to_string()))
    );

    let output = Exporter::new(ShellKind::Bash).export(&envs, "/usr/bin");
    let project_bin = root.path().join("work/.perigee/shims/nodejs/bin");
    let path_line = output
        .lines()
        .find(|line| line.starts_with("export PATH="))
        .unwrap();
    assert!(
        path_line.contains(&format!("{}:", project_bin.display())),
        "project shims should lead the PATH: {path_line}"
    );
    assert!(path_line.ends_with(":/usr/bin\""));
}

#[test]
fn env_cache_replays_until_a_config_changes() {
    let root = tempdir().unwrap();
    let mut manager = manager_in(root.path());
    manager.install("nodejs", "20.5.0").unwrap();
    manager
        .use_version("nodejs", "20.5.0", Scope::Global, false)
        .unwrap();

    let watched = manager.watched_config_files();
    let state = ConfigState::load(manager.meta.state_file());
    assert!(state.has_changed(&watched));

    let envs = manager.compose_envs().unwrap();
    let output = Exporter::new(ShellKind::Bash).export(&envs, "");
    state.update(&watched, &output).unwrap();

    assert!(!state.has_changed(&watched));
    assert_eq!(state.cached_output(), output);

    // A deleted config invalidates the cache.
    fs::remove_file(root.path().join("home/.perigee.toml")).unwrap();
    assert!(state.has_changed(&watched));
}

#[test]
fn concurrent_saves_are_last_writer_wins() {
    let root = tempdir().unwrap();
    let dir = root.path().join("work");
    fs::create_dir_all(&dir).unwrap();

    let mut first = ConfigFile::load_dir(&dir).unwrap();
    let mut second = ConfigFile::load_dir(&dir).unwrap();

    first.tools.set("nodejs", "20.5.0");
    second.tools.set("python", "3.12.1");

    first.save().unwrap();
    second.save().unwrap();

    // No merge on disk: the second writer's view replaces the first's.
    let reloaded = ConfigFile::load_dir(&dir).unwrap();
    assert_eq!(reloaded.tools.get_version("python"), Some("3.12.1"));
    assert_eq!(reloaded.tools.get_version("nodejs"), None);
}

#[test]
fn unuse_then_env_drops_the_tool() {
    let root = tempdir().unwrap();
    let mut manager = manager_in(root.path());
    manager.install("nodejs", "20.5.0").unwrap();
    manager
        .use_version("nodejs", "20.5.0", Scope::Session, false)
        .unwrap();
    assert!(!manager.compose_envs().unwrap().is_empty());

    assert!(manager.unuse("nodejs", Scope::Session).unwrap());
    assert!(manager.compose_envs().unwrap().is_empty());
    assert!(!root.path().join("sess/nodejs").exists());
}
