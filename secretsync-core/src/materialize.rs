// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secret File Materializer
//!
//! Writes a decrypted snapshot into the secrets directory. Files are replaced
//! atomically (write `<path>.tmp`, then rename), so readers only ever see the
//! old or the complete new content. Change hooks run for every file whose
//! content changed or that was removed.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::bundle::ConfigSnapshot;

/// Environment variable carrying the changed file's path to hooks.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Mode of materialized files (owner read/write, group read).
#[cfg(unix)]
const SECRET_FILE_MODE: u32 = 0o640;

/// Runs change hooks.
pub trait HookRunner {
    /// Runs `command` for the file `name` materialized at `path`.
    ///
    /// Failures are reported through logs only.
    fn run(&self, name: &str, path: &Path, command: &[String]);
}

/// Spawns hooks as child processes inheriting stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandHookRunner;

impl HookRunner for CommandHookRunner {
    fn run(&self, name: &str, path: &Path, command: &[String]) {
        let Some((program, args)) = command.split_first() else {
            return;
        };
        info!(file = %name, ?command, "Running on-change command");

        match Command::new(program)
            .args(args)
            .env(CONFIG_FILE_ENV, path)
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(file = %name, %status, "On-change command failed"),
            Err(e) => warn!(file = %name, "Unable to run command: {}", e),
        }
    }
}

/// Files touched by one [`Materializer::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Files created or rewritten.
    pub written: Vec<String>,
    /// Files removed because they left the snapshot.
    pub removed: Vec<String>,
    /// Files whose change hook was run.
    pub hooks_run: Vec<String>,
}

impl ApplyReport {
    /// True when nothing on disk changed.
    pub fn is_unchanged(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }
}

/// Materializes snapshots into a secrets directory.
pub struct Materializer {
    secrets_dir: PathBuf,
    hooks: Box<dyn HookRunner>,
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("secrets_dir", &self.secrets_dir)
            .finish()
    }
}

impl Materializer {
    /// Creates a materializer that runs hooks as child processes.
    pub fn new(secrets_dir: impl Into<PathBuf>) -> Self {
        Materializer {
            secrets_dir: secrets_dir.into(),
            hooks: Box::new(CommandHookRunner),
        }
    }

    /// Replaces the hook runner.
    pub fn with_hook_runner(mut self, hooks: impl HookRunner + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn secrets_dir(&self) -> &Path {
        &self.secrets_dir
    }

    /// Path a secret file is materialized at.
    pub fn secret_path(&self, name: &str) -> PathBuf {
        self.secrets_dir.join(name)
    }

    /// Brings the secrets directory from `prev` to `next`.
    ///
    /// Every entry of `next` is written before anything from `prev` is
    /// removed. The first filesystem failure aborts; files already written
    /// stay in place.
    pub fn apply(
        &self,
        prev: Option<&ConfigSnapshot>,
        next: &ConfigSnapshot,
    ) -> Result<ApplyReport, MaterializeError> {
        // The directory is provisioned by the operator, never created here
        match fs::metadata(&self.secrets_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(MaterializeError::NotADirectory(self.secrets_dir.clone())),
            Err(source) => {
                return Err(MaterializeError::MissingSecretsDir {
                    path: self.secrets_dir.clone(),
                    source,
                })
            }
        }

        let mut report = ApplyReport::default();
        let mut seen = HashSet::new();

        for (name, entry) in next.iter() {
            info!(file = %name, "Extracting");
            seen.insert(name);
            let path = self.secret_path(name);
            if update_secret(&path, &entry.value)? {
                report.written.push(name.to_string());
                self.run_hook(name, &path, &entry.on_changed, &mut report);
            }
        }

        let Some(prev) = prev else {
            return Ok(report);
        };

        for (name, entry) in prev.iter() {
            if seen.contains(name) {
                continue;
            }
            info!(file = %name, "Removing");
            let path = self.secret_path(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(MaterializeError::Remove { path, source }),
            }
            report.removed.push(name.to_string());
            self.run_hook(name, &path, &entry.on_changed, &mut report);
        }

        Ok(report)
    }

    fn run_hook(&self, name: &str, path: &Path, command: &[String], report: &mut ApplyReport) {
        if command.is_empty() {
            return;
        }
        self.hooks.run(name, path, command);
        report.hooks_run.push(name.to_string());
    }
}

/// Writes `content` to `path` unless it already holds exactly that content.
///
/// Returns whether the file changed.
fn update_secret(path: &Path, content: &[u8]) -> Result<bool, MaterializeError> {
    if let Ok(current) = fs::read(path).map(Zeroizing::new) {
        if current.as_slice() == content {
            return Ok(false);
        }
    }
    atomic_write(path, content).map_err(|source| MaterializeError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Suffix of the temporary sibling written by [`atomic_write`].
///
/// Secret names may not end with it, or an entry would share its path with
/// another entry's temp file.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Temporary sibling used by [`atomic_write`]: `<path>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Atomic file write (write to temp, then rename)
///
/// The rename is the only step that makes new content visible, so the file
/// is never observed in a partial state. The temp file is removed on failure.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp = temp_path(path);
    let result = write_new(&temp, data).and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_new(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SECRET_FILE_MODE);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        // A stale temp file keeps its old mode on open
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(SECRET_FILE_MODE))?;
    }
    file.write_all(data)?;
    file.sync_all()
}

/// Materializer error types.
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Secrets directory {} is not accessible: {source}", path.display())]
    MissingSecretsDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Secrets path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Unable to update secret {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to remove secret {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
