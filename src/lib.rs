pub mod activate;
pub mod archive;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod envs;
pub mod error;
pub mod fetch;
pub mod link;
pub mod manager;
pub mod paths;
pub mod plugin;
pub mod runtime;
pub mod scope;
pub mod session;
pub mod settings;
pub mod shell;
pub mod state;

pub use config::{ConfigChain, ConfigFile};
pub use envs::{Envs, Paths, Vars};
pub use error::Error;
pub use manager::Manager;
pub use paths::PathMeta;
pub use scope::Scope;
pub use shell::{Exporter, ShellKind};
