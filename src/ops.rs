use crate::error::{Result, VolumeError};
use crate::invocation::ContainerSettings;
use crate::model::{Operation, Report, VolumeName};
use crate::runtime::{ContainerRuntime, Execution};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ARCHIVE_SUFFIX: &str = ".tar.gz";
const STAGING_PREFIX: &str = ".kilonova-";

/// Runs one volume operation in one throwaway container.
pub struct Runner<'a> {
    runtime: &'a dyn ContainerRuntime,
    settings: ContainerSettings,
}

impl<'a> Runner<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, settings: ContainerSettings) -> Self {
        Self { runtime, settings }
    }

    /// Writes `archive` from `volume`.
    ///
    /// The container writes into a staging directory beside the target and the
    /// finished archive is renamed into place, so a failed run never leaves a
    /// truncated file at `archive` and never clobbers a previous backup.
    pub fn backup(&self, volume: &VolumeName, archive: &Path) -> Result<Report> {
        let (dir, file_name) = backup_target(volume, archive)?;
        let target = dir.join(&file_name);
        let report = Report {
            operation: Operation::Backup,
            volume: Some(volume.clone()),
            source: None,
            target: None,
            archive: Some(target.display().to_string()),
        };

        if self.runtime.dry_run() {
            let invocation = self
                .settings
                .backup(volume, &mount_source(&dir)?, &file_name);
            self.runtime.execute(&invocation)?;
            return Ok(report);
        }

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&dir)
            .map_err(|err| {
                VolumeError::io(format!("create staging directory in {}", dir.display()), err)
            })?;
        tracing::debug!(staging = %staging.path().display(), "staging backup");

        let invocation = self
            .settings
            .backup(volume, &mount_source(staging.path())?, &file_name);
        self.runtime.execute(&invocation)?;

        let staged = staging.path().join(&file_name);
        std::fs::rename(&staged, &target).map_err(|err| {
            VolumeError::io(
                format!("move {} to {}", staged.display(), target.display()),
                err,
            )
        })?;
        tracing::debug!("{} -> {}", staged.display(), target.display());

        if let Err(err) = staging.close() {
            tracing::warn!("could not remove staging directory: {err}");
        }

        tracing::info!("Finished backing up {volume} to {}", target.display());
        Ok(report)
    }

    /// Extracts `archive` into `volume`, overwriting files of the same name.
    ///
    /// Only a private staging directory holding a link to the archive is
    /// mounted, so relabeling never touches the archive's neighbours.
    pub fn restore(&self, archive: &Path, volume: &VolumeName) -> Result<Report> {
        let archive = archive.canonicalize().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                VolumeError::invalid(format!("the file at {} does not exist", archive.display()))
            } else {
                VolumeError::io(format!("resolve {}", archive.display()), err)
            }
        })?;
        if !archive.is_file() {
            return Err(VolumeError::invalid(format!(
                "{} is not a regular file",
                archive.display()
            )));
        }
        let (dir, file_name) = split_file(&archive)?;
        let report = Report {
            operation: Operation::Restore,
            volume: Some(volume.clone()),
            source: None,
            target: None,
            archive: Some(archive.display().to_string()),
        };

        if self.runtime.dry_run() {
            let invocation = self
                .settings
                .restore(&mount_source(dir)?, file_name, volume);
            self.runtime.execute(&invocation)?;
            return Ok(report);
        }

        let staging = stage_archive(&archive, dir, file_name)?;
        tracing::debug!(staging = %staging.path().display(), "staging restore");

        let invocation = self
            .settings
            .restore(&mount_source(staging.path())?, file_name, volume);
        self.runtime.execute(&invocation)?;

        if let Err(err) = staging.close() {
            tracing::warn!("could not remove staging directory: {err}");
        }

        tracing::info!("Finished restoring {volume} from {}", archive.display());
        Ok(report)
    }

    /// Copies every file of `source` into `target`.
    pub fn clone_volume(&self, source: &VolumeName, target: &VolumeName) -> Result<Report> {
        if source == target {
            return Err(VolumeError::invalid(format!(
                "cannot clone volume {source} into itself"
            )));
        }

        let invocation = self.settings.clone_volume(source, target);
        if self.runtime.execute(&invocation)? == Execution::Completed {
            tracing::info!("Finished cloning from {source} to {target}");
        }

        Ok(Report {
            operation: Operation::Clone,
            volume: None,
            source: Some(source.clone()),
            target: Some(target.clone()),
            archive: None,
        })
    }
}

/// Private directory beside `archive` holding a hard link to it, or a copy
/// when linking fails (e.g. across filesystems). Falls back to the system
/// temp dir when the archive's directory is not writable.
fn stage_archive(archive: &Path, dir: &Path, file_name: &str) -> Result<TempDir> {
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(dir)
        .or_else(|_| tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir())
        .map_err(|err| VolumeError::io("create staging directory", err))?;

    let staged = staging.path().join(file_name);
    if let Err(err) = std::fs::hard_link(archive, &staged) {
        tracing::debug!("hard link failed ({err}), copying {}", archive.display());
        std::fs::copy(archive, &staged).map_err(|err| {
            VolumeError::io(
                format!("copy {} to {}", archive.display(), staged.display()),
                err,
            )
        })?;
    }
    Ok(staging)
}

/// Resolves where a backup of `volume` lands: `(canonical dir, file name)`.
///
/// An existing directory receives `<volume>.tar.gz`.
fn backup_target(volume: &VolumeName, archive: &Path) -> Result<(PathBuf, String)> {
    let archive = if archive.is_dir() {
        archive.join(format!("{volume}{ARCHIVE_SUFFIX}"))
    } else {
        archive.to_path_buf()
    };

    let file_name = archive
        .file_name()
        .ok_or_else(|| VolumeError::invalid(format!("{} has no file name", archive.display())))?;
    let file_name = file_name
        .to_str()
        .ok_or_else(|| {
            VolumeError::invalid(format!("archive name {file_name:?} is not valid UTF-8"))
        })?
        .to_string();

    let parent = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = parent.canonicalize().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            VolumeError::invalid(format!("directory {} does not exist", parent.display()))
        } else {
            VolumeError::io(format!("resolve {}", parent.display()), err)
        }
    })?;
    Ok((dir, file_name))
}

fn split_file(path: &Path) -> Result<(&Path, &str)> {
    let dir = path
        .parent()
        .ok_or_else(|| VolumeError::invalid(format!("{} has no parent", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            VolumeError::invalid(format!("archive name in {} is not valid UTF-8", path.display()))
        })?;
    Ok((dir, file_name))
}

/// Host side of a bind mount. `-v` splits on `:` and the options on `,`, so
/// neither may appear in the path.
fn mount_source(path: &Path) -> Result<String> {
    if !path.is_absolute() {
        return Err(VolumeError::invalid(format!(
            "{} is not an absolute path",
            path.display()
        )));
    }
    let s = path
        .to_str()
        .ok_or_else(|| VolumeError::invalid(format!("{} is not valid UTF-8", path.display())))?;
    if let Some(bad) = s.chars().find(|&c| matches!(c, ':' | ',')) {
        return Err(VolumeError::invalid(format!(
            "{s} cannot be mounted into a container because it contains {bad:?}"
        )));
    }
    Ok(s.to_string())
}
