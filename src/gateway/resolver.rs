//! Executable Resolution
//!
//! Locates the external CLI tool on the host filesystem. Resolution probes
//! an ordered list of platform-conventional install paths first, then falls
//! back to a PATH search with an explicitly widened search path (package
//! manager install directories merged ahead of whatever the inherited
//! environment provides, since GUI-launched processes often carry a minimal
//! PATH).
//!
//! "Not found" is a distinct failure category: callers surface install
//! instructions for it, never a generic error.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::error::GatewayError;

/// Locates the external tool's binary.
///
/// Implementations must be cheap to call repeatedly: the gateway re-resolves
/// after any failed resolution (the tool may be installed while the
/// application is running) and only caches successes.
pub trait ExecutableResolver: Send + Sync + std::fmt::Debug {
    /// Resolve the absolute path of the tool, or fail with
    /// [`GatewayError::ToolNotFound`].
    fn resolve(&self) -> Result<PathBuf, GatewayError>;
}

/// Package-manager install directories searched ahead of the inherited PATH.
#[cfg(target_os = "macos")]
fn conventional_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
    ]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn conventional_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
        PathBuf::from("/opt/az/bin"),
    ]
}

#[cfg(windows)]
fn conventional_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from(r"C:\Program Files\Microsoft SDKs\Azure\CLI2\wbin"),
        PathBuf::from(r"C:\Program Files (x86)\Microsoft SDKs\Azure\CLI2\wbin"),
    ]
}

#[cfg(not(any(unix, windows)))]
fn conventional_dirs() -> Vec<PathBuf> {
    Vec::new()
}

/// Build a search path with the conventional install directories merged
/// ahead of the inherited `PATH`. Used both by the locator fallback and when
/// spawning, so a tool resolvable here is also spawnable.
pub fn widened_search_path() -> OsString {
    let mut dirs = conventional_dirs();
    if let Some(path) = env::var_os("PATH") {
        dirs.extend(env::split_paths(&path));
    }
    env::join_paths(dirs).unwrap_or_else(|_| env::var_os("PATH").unwrap_or_default())
}

/// Resolver for desktop Unix hosts (macOS and Linux).
#[derive(Debug, Clone)]
pub struct UnixResolver {
    tool: String,
}

impl UnixResolver {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn candidate_paths(&self) -> Vec<PathBuf> {
        conventional_dirs()
            .into_iter()
            .map(|dir| dir.join(&self.tool))
            .collect()
    }
}

impl ExecutableResolver for UnixResolver {
    fn resolve(&self) -> Result<PathBuf, GatewayError> {
        for candidate in self.candidate_paths() {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        locate_on_path(&self.tool)
    }
}

/// Resolver for Windows hosts. The Azure CLI installs a `.cmd` shim, so both
/// the bare name and the `.cmd` form are probed.
#[derive(Debug, Clone)]
pub struct WindowsResolver {
    tool: String,
}

impl WindowsResolver {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    fn candidate_paths(&self) -> Vec<PathBuf> {
        conventional_dirs()
            .into_iter()
            .flat_map(|dir| {
                [
                    dir.join(format!("{}.cmd", self.tool)),
                    dir.join(format!("{}.exe", self.tool)),
                ]
            })
            .collect()
    }
}

impl ExecutableResolver for WindowsResolver {
    fn resolve(&self) -> Result<PathBuf, GatewayError> {
        for candidate in self.candidate_paths() {
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        locate_on_path(&self.tool)
    }
}

/// Resolver pinned to a fixed path. Used when configuration names the binary
/// explicitly, and by tests that substitute harmless executables.
#[derive(Debug, Clone)]
pub struct FixedResolver {
    path: PathBuf,
}

impl FixedResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExecutableResolver for FixedResolver {
    fn resolve(&self) -> Result<PathBuf, GatewayError> {
        if self.path.is_file() {
            Ok(self.path.clone())
        } else {
            Err(GatewayError::ToolNotFound(
                self.path.display().to_string(),
            ))
        }
    }
}

/// Locator fallback: search the widened PATH for the tool.
fn locate_on_path(tool: &str) -> Result<PathBuf, GatewayError> {
    which::which_in(tool, Some(widened_search_path()), Path::new("."))
        .map_err(|_| GatewayError::ToolNotFound(tool.to_string()))
}
