//! The local udev rules file
//!
//! Writers hold an exclusive sibling lock file for the whole
//! read-modify-write cycle, and the new content replaces the old one through
//! an atomic rename, so a reader never sees a half-written file.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::rule::{symlink_of, NamingRule};

pub const DEFAULT_RULES_PATH: &str = "/etc/udev/rules.d/10-reachy-local.rules";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Rules store {path} is locked by another writer (remove {lock} if none is running)")]
    Locked { path: PathBuf, lock: PathBuf },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// Rules written together under one comment header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBlock {
    pub comment: String,
    pub rules: Vec<NamingRule>,
}

impl RuleBlock {
    pub fn new(comment: impl Into<String>, rules: Vec<NamingRule>) -> Self {
        Self {
            comment: comment.into(),
            rules,
        }
    }

    fn lines(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.comment.clone()).chain(self.rules.iter().map(|r| r.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub appended: usize,
    /// Previous rules dropped because they targeted the same symlink
    pub replaced: usize,
}

/// Held while a writer owns the store; released on drop
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(lock = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RulesStore {
    path: PathBuf,
}

impl Default for RulesStore {
    fn default() -> Self {
        Self::new(DEFAULT_RULES_PATH)
    }
}

impl RulesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Current content; a store that does not exist yet is empty
    pub fn read(&self) -> Result<String, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let lock = self.lock_path();
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => {
                // Owner pid, for operators inspecting a stale lock
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    debug!(lock = %lock.display(), error = %e, "Failed to record lock owner");
                }
                Ok(StoreLock { path: lock })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(StoreError::Locked {
                path: self.path.clone(),
                lock,
            }),
            Err(source) => Err(StoreError::Io { path: lock, source }),
        }
    }

    /// Append `block`, replacing earlier rules that target the same symlinks
    pub fn commit(&self, block: &RuleBlock) -> Result<CommitSummary, StoreError> {
        let _lock = self.lock()?;
        let current = self.read()?;

        let targets: HashSet<&str> = block.rules.iter().map(|r| r.symlink.as_str()).collect();
        let (mut content, replaced) = without_symlinks(&current, &targets);

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for line in block.lines() {
            content.push_str(&line);
            content.push('\n');
        }
        self.replace(&content)?;

        let summary = CommitSummary {
            appended: block.rules.len(),
            replaced,
        };
        info!(
            path = %self.path.display(),
            appended = summary.appended,
            replaced = summary.replaced,
            "Rules store updated"
        );
        Ok(summary)
    }

    fn replace(&self, content: &str) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        let permissions = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.permissions()),
            Err(_) => default_permissions(),
        };
        if let Some(permissions) = permissions {
            fs::set_permissions(tmp.path(), permissions).map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

/// Drop rule lines whose symlink is in `targets`, along with a comment header
/// left with no rules under it
///
/// Every other line is kept with its original line ending.
fn without_symlinks(content: &str, targets: &HashSet<&str>) -> (String, usize) {
    let mut out = String::with_capacity(content.len());
    let mut replaced = 0;

    let mut header: Option<&str> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut removed_in_segment = 0;

    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            flush(header, &body, removed_in_segment, &mut out);
            header = Some(line);
            body.clear();
            removed_in_segment = 0;
        } else if symlink_of(line).is_some_and(|s| targets.contains(s)) {
            replaced += 1;
            removed_in_segment += 1;
        } else {
            body.push(line);
        }
    }
    flush(header, &body, removed_in_segment, &mut out);

    (out, replaced)
}

fn flush(header: Option<&str>, body: &[&str], removed: usize, out: &mut String) {
    let emptied = removed > 0 && body.iter().all(|l| l.trim().is_empty());
    if !emptied {
        out.extend(header);
        out.extend(body.iter().copied());
    }
}
