//! Locating the external command
//!
//! A script next to the running binary wins over anything on `PATH`.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::DispatchError;

/// Default command name looked up on `PATH`
pub const DEFAULT_COMMAND: &str = "xhisper";

/// Default script name looked up next to the running binary
pub const DEFAULT_SCRIPT_NAME: &str = "xhisper.sh";

/// Script path adjacent to the running executable, if it can be determined
pub fn adjacent_script() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    exe.parent().map(|dir| dir.join(DEFAULT_SCRIPT_NAME))
}

/// Resolves the command to run, freshly on every call
#[derive(Debug, Clone)]
pub struct CommandResolver {
    local_script: Option<PathBuf>,
    command: String,
    /// Overrides the process `PATH`
    search_path: Option<OsString>,
}

impl CommandResolver {
    /// Create a resolver trying `local_script` first, then `command` on `PATH`
    pub fn new(local_script: Option<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            local_script,
            command: command.into(),
            search_path: None,
        }
    }

    /// Search this list of directories instead of the process `PATH`
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Find the executable to run
    pub fn resolve(&self) -> Result<PathBuf, DispatchError> {
        if let Some(script) = &self.local_script {
            if script.is_file() {
                debug!(path = ?script, "using local script");
                return Ok(script.clone());
            }
        }

        self.lookup().ok_or_else(|| DispatchError::CommandNotFound {
            name: self.command.clone(),
        })
    }

    fn lookup(&self) -> Option<PathBuf> {
        let command = Path::new(&self.command);

        // Explicit paths skip the search
        if command.components().count() > 1 {
            return is_executable(command).then(|| command.to_path_buf());
        }

        let search_path = self.search_path.clone().or_else(|| env::var_os("PATH"))?;
        env::split_paths(&search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(command))
            .find(|candidate| is_executable(candidate))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
