//! Workspace handles: where a request's files are staged.
//!
//! A [`WorkspaceRoot`] owns the top-level directory for the life of the process.
//! Each request asks it for a [`Workspace`], which is either the root itself
//! (shared mode, last writer wins) or a fresh subdirectory (per-request mode).

use anyhow::{bail, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::error::StagingError;
use crate::config::ExecutionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Every request stages into the root directory; concurrent requests may clobber each other.
    Shared,
    /// Every request gets its own subdirectory of the root.
    #[default]
    PerRequest,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::Shared => write!(f, "shared"),
            IsolationMode::PerRequest => write!(f, "per-request"),
        }
    }
}

impl FromStr for IsolationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(IsolationMode::Shared),
            "per-request" | "per_request" | "isolated" => Ok(IsolationMode::PerRequest),
            other => bail!(
                "Unknown isolation mode: '{}' (expected 'shared' or 'per-request')",
                other
            ),
        }
    }
}

/// Directory a single request stages into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Use an existing or to-be-created directory as a workspace.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.join(relative)
    }
}

/// Process-lifetime owner of the workspace directory tree.
#[derive(Debug)]
pub struct WorkspaceRoot {
    root: PathBuf,
    mode: IsolationMode,
    persist: bool,
    next_request: AtomicU64,
}

impl WorkspaceRoot {
    pub fn new(root: impl Into<PathBuf>, mode: IsolationMode, persist: bool) -> Self {
        Self {
            root: root.into(),
            mode,
            persist,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(&config.workspace_dir, config.isolation, config.persist)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> IsolationMode {
        self.mode
    }

    pub fn persists(&self) -> bool {
        self.persist
    }

    /// Hand out the workspace for the next request, creating directories lazily.
    pub fn acquire(&self) -> Result<Workspace, StagingError> {
        let dir = match self.mode {
            IsolationMode::Shared => self.root.clone(),
            IsolationMode::PerRequest => {
                let seq = self.next_request.fetch_add(1, Ordering::Relaxed);
                self.root.join(format!(
                    "req-{}-{:04}",
                    Local::now().format("%Y%m%d_%H%M%S"),
                    seq
                ))
            }
        };

        fs::create_dir_all(&dir).map_err(|source| StagingError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        debug!("Acquired workspace {}", dir.display());
        Ok(Workspace { dir })
    }

    /// Delete the whole tree unless persistence was requested.
    /// Returns true when something was removed.
    pub fn teardown(&self) -> io::Result<bool> {
        if self.persist {
            info!("Keeping workspace {} for inspection", self.root.display());
            return Ok(false);
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                info!("Removed workspace {}", self.root.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_isolation_mode_parsing() {
        assert_eq!("shared".parse::<IsolationMode>().unwrap(), IsolationMode::Shared);
        assert_eq!(
            " Per-Request ".parse::<IsolationMode>().unwrap(),
            IsolationMode::PerRequest
        );
        assert!("sometimes".parse::<IsolationMode>().is_err());
        assert_eq!(IsolationMode::default(), IsolationMode::PerRequest);
        assert_eq!(IsolationMode::PerRequest.to_string(), "per-request");
    }

    #[test]
    fn test_root_is_created_lazily() {
        let temp = TempDir::new().unwrap();
        let root_path = temp.path().join("generated_files");
        let root = WorkspaceRoot::new(&root_path, IsolationMode::Shared, false);
        assert!(!root_path.exists());

        let workspace = root.acquire().unwrap();
        assert_eq!(workspace.path(), root_path.as_path());
        assert!(root_path.is_dir());
    }

    #[test]
    fn test_shared_mode_reuses_root() {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::new(temp.path(), IsolationMode::Shared, false);
        assert_eq!(root.acquire().unwrap(), root.acquire().unwrap());
    }

    #[test]
    fn test_per_request_mode_hands_out_distinct_dirs() {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::new(temp.path(), IsolationMode::PerRequest, false);
        let a = root.acquire().unwrap();
        let b = root.acquire().unwrap();
        assert_ne!(a, b);
        assert!(a.path().starts_with(temp.path()));
        assert!(a.path().is_dir() && b.path().is_dir());
        let name = b.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("req-"));
        assert!(name.ends_with("-0002"));
    }

    #[test]
    fn test_teardown_removes_tree() {
        let temp = TempDir::new().unwrap();
        let root_path = temp.path().join("ws");
        let root = WorkspaceRoot::new(&root_path, IsolationMode::PerRequest, false);
        let workspace = root.acquire().unwrap();
        fs::write(workspace.join("target_module.py"), "x = 1").unwrap();

        assert!(root.teardown().unwrap());
        assert!(!root_path.exists());
        // Second teardown finds nothing.
        assert!(!root.teardown().unwrap());
    }

    #[test]
    fn test_teardown_keeps_persisted_tree() {
        let temp = TempDir::new().unwrap();
        let root_path = temp.path().join("ws");
        let root = WorkspaceRoot::new(&root_path, IsolationMode::Shared, true);
        root.acquire().unwrap();

        assert!(!root.teardown().unwrap());
        assert!(root_path.is_dir());
    }

    #[test]
    fn test_acquire_fails_when_root_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let root = WorkspaceRoot::new(&blocker, IsolationMode::Shared, false);

        let err = root.acquire().unwrap_err();
        assert!(matches!(err, StagingError::CreateDir { .. }));
        assert_eq!(err.path(), &blocker);
    }
}
