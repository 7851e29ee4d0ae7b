use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub use sandbox_core::config::sandbox_root;

pub fn socket_path(home: &Path) -> PathBuf {
    sandbox_root(home).join(DAEMON_SOCKET)
}

pub fn run_dir(home: &Path) -> PathBuf {
    sandbox_root(home).join("run")
}
