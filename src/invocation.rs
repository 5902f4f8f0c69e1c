//! Runtime command lines for each volume operation.
//!
//! Everything here is pure: callers resolve host paths first and hand in
//! strings that are already safe to place in a `-v` spec.

use crate::model::{Invocation, Mount, Operation, VolumeName};

pub const DEFAULT_IMAGE: &str = "docker.io/library/busybox:1.36.0";

pub const VOLUME_PATH: &str = "/volume";
pub const ARCHIVE_PATH: &str = "/archive";
pub const CLONE_SOURCE_PATH: &str = "/source";
pub const CLONE_TARGET_PATH: &str = "/target";

/// Settings shared by every invocation of one run.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub program: String,
    pub image: String,
    pub verbose: bool,
}

impl ContainerSettings {
    fn invocation(&self, operation: Operation, mounts: &[Mount], command: Vec<String>) -> Invocation {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];
        for mount in mounts {
            args.push("-v".to_string());
            args.push(mount.volume_arg());
        }
        args.push(self.image.clone());
        args.extend(command);

        Invocation {
            operation,
            program: self.program.clone(),
            args,
        }
    }

    fn tar_flags(&self, mode: char) -> String {
        if self.verbose {
            format!("-{mode}vzf")
        } else {
            format!("-{mode}zf")
        }
    }

    /// `volume` read-only at `/volume`, `host_dir` at `/archive`; tar writes
    /// `/archive/<file_name>`.
    pub fn backup(&self, volume: &VolumeName, host_dir: &str, file_name: &str) -> Invocation {
        self.invocation(
            Operation::Backup,
            &[
                Mount::read_only(volume.as_str(), VOLUME_PATH),
                Mount::read_write(host_dir, ARCHIVE_PATH),
            ],
            vec![
                "tar".to_string(),
                self.tar_flags('c'),
                format!("{ARCHIVE_PATH}/{file_name}"),
                "-C".to_string(),
                VOLUME_PATH.to_string(),
                ".".to_string(),
            ],
        )
    }

    /// `host_dir` read-only at `/archive`, `volume` read-write at `/volume`.
    pub fn restore(&self, host_dir: &str, file_name: &str, volume: &VolumeName) -> Invocation {
        self.invocation(
            Operation::Restore,
            &[
                Mount::read_only(host_dir, ARCHIVE_PATH),
                Mount::read_write(volume.as_str(), VOLUME_PATH),
            ],
            vec![
                "tar".to_string(),
                self.tar_flags('x'),
                format!("{ARCHIVE_PATH}/{file_name}"),
                "-C".to_string(),
                VOLUME_PATH.to_string(),
            ],
        )
    }

    /// `/source/.` copies dotfiles too, which a shell glob would skip.
    pub fn clone_volume(&self, source: &VolumeName, target: &VolumeName) -> Invocation {
        let mut cp = vec!["cp".to_string(), "-a".to_string()];
        if self.verbose {
            cp.push("-v".to_string());
        }
        cp.push(format!("{CLONE_SOURCE_PATH}/."));
        cp.push(format!("{CLONE_TARGET_PATH}/"));

        self.invocation(
            Operation::Clone,
            &[
                Mount::read_only(source.as_str(), CLONE_SOURCE_PATH),
                Mount::read_write(target.as_str(), CLONE_TARGET_PATH),
            ],
            cp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(verbose: bool) -> ContainerSettings {
        ContainerSettings {
            program: "podman".into(),
            image: DEFAULT_IMAGE.into(),
            verbose,
        }
    }

    fn vol(name: &str) -> VolumeName {
        name.parse().unwrap()
    }

    #[test]
    fn backup_mounts_volume_read_only_and_writes_gzip_tar() {
        let inv = settings(false).backup(&vol("data"), "/srv/.kilonova-x", "data.tar.gz");
        assert_eq!(inv.operation, Operation::Backup);
        assert_eq!(inv.program, "podman");
        assert_eq!(
            inv.args,
            [
                "run",
                "--rm",
                "--network",
                "none",
                "-v",
                "data:/volume:ro,z",
                "-v",
                "/srv/.kilonova-x:/archive:z",
                DEFAULT_IMAGE,
                "tar",
                "-czf",
                "/archive/data.tar.gz",
                "-C",
                "/volume",
                ".",
            ]
        );
    }

    #[test]
    fn restore_mounts_archive_dir_read_only_and_extracts_gzip_tar() {
        let inv = settings(false).restore("/srv/backups", "data.tar.gz", &vol("data2"));
        assert_eq!(
            inv.args,
            [
                "run",
                "--rm",
                "--network",
                "none",
                "-v",
                "/srv/backups:/archive:ro,z",
                "-v",
                "data2:/volume:z",
                DEFAULT_IMAGE,
                "tar",
                "-xzf",
                "/archive/data.tar.gz",
                "-C",
                "/volume",
            ]
        );
    }

    #[test]
    fn clone_copies_whole_tree_between_volumes() {
        let inv = settings(false).clone_volume(&vol("src"), &vol("dst"));
        assert_eq!(
            &inv.args[4..],
            [
                "-v",
                "src:/source:ro,z",
                "-v",
                "dst:/target:z",
                DEFAULT_IMAGE,
                "cp",
                "-a",
                "/source/.",
                "/target/",
            ]
        );
    }

    #[test]
    fn verbose_lists_files() {
        let s = settings(true);
        let backup = s.backup(&vol("data"), "/tmp", "a.tar.gz");
        assert!(backup.args.contains(&"-cvzf".to_string()));
        let restore = s.restore("/tmp", "a.tar.gz", &vol("data"));
        assert!(restore.args.contains(&"-xvzf".to_string()));
        let clone = s.clone_volume(&vol("a"), &vol("b"));
        assert!(clone.args.ends_with(&["-a".into(), "-v".into(), "/source/.".into(), "/target/".into()]));
    }

    #[test]
    fn every_invocation_is_one_ephemeral_container() {
        let s = settings(false);
        for inv in [
            s.backup(&vol("a"), "/tmp", "a.tar.gz"),
            s.restore("/tmp", "a.tar.gz", &vol("a")),
            s.clone_volume(&vol("a"), &vol("b")),
        ] {
            assert_eq!(&inv.args[..2], ["run", "--rm"]);
            assert_eq!(inv.args.iter().filter(|a| *a == "run").count(), 1);
        }
    }
}
