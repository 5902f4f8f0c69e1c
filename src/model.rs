use crate::error::VolumeError;
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Backup,
    Restore,
    Clone,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Clone => "clone",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Engine {
    #[default]
    Docker,
    Podman,
}

impl Engine {
    pub fn binary(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

/// A runtime-managed named volume.
///
/// Names follow the runtime's own rule (`[A-Za-z0-9][A-Za-z0-9_.-]*`), so a
/// valid name can never be read as a host path by `-v`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VolumeName(String);

impl VolumeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VolumeName {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let Some(first) = chars.next() else {
            return Err(VolumeError::invalid("volume name is empty"));
        };
        if !first.is_ascii_alphanumeric() {
            return Err(VolumeError::invalid(format!(
                "volume name {s:?} must start with a letter or digit"
            )));
        }
        if let Some(bad) = chars.find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
        {
            return Err(VolumeError::invalid(format!(
                "volume name {s:?} contains {bad:?}; only letters, digits, '_', '.' and '-' are allowed"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for VolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: &'static str,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(source: impl Into<String>, target: &'static str) -> Self {
        Self {
            source: source.into(),
            target,
            read_only: true,
        }
    }

    pub fn read_write(source: impl Into<String>, target: &'static str) -> Self {
        Self {
            source: source.into(),
            target,
            read_only: false,
        }
    }

    /// `-v` argument. Every mount is relabeled (`z`) so SELinux hosts let the
    /// container read it; the flag is ignored elsewhere.
    pub fn volume_arg(&self) -> String {
        let mode = if self.read_only { "ro,z" } else { "z" };
        format!("{}:{}:{mode}", self.source, self.target)
    }
}

/// One fully assembled container runtime command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub operation: Operation,
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| {
            // Only reachable with NUL bytes, which no valid argument contains.
            std::iter::once(self.program.clone())
                .chain(self.args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<VolumeName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<VolumeName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_name_accepts_runtime_names() {
        for name in ["data", "my_vol", "app.db-1", "0cache", "A"] {
            assert_eq!(name.parse::<VolumeName>().unwrap().as_str(), name);
        }
    }

    #[test]
    fn volume_name_rejects_paths_and_junk() {
        for name in ["", "/var/lib", "./data", "-flag", "a:b", "a,b", "vol ume", ".hidden"] {
            let err = name.parse::<VolumeName>().unwrap_err();
            assert!(
                matches!(err, VolumeError::InvalidArguments(_)),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn mount_renders_mode() {
        assert_eq!(
            Mount::read_only("data", "/volume").volume_arg(),
            "data:/volume:ro,z"
        );
        assert_eq!(
            Mount::read_write("/srv/backups", "/archive").volume_arg(),
            "/srv/backups:/archive:z"
        );
    }

    #[test]
    fn command_line_quotes_arguments() {
        let inv = Invocation {
            operation: Operation::Backup,
            program: "docker".into(),
            args: vec!["run".into(), "-v".into(), "/tmp/my dir:/archive:z".into()],
        };
        assert_eq!(inv.command_line(), "docker run -v '/tmp/my dir:/archive:z'");
    }

    #[test]
    fn report_json_skips_unset_fields() {
        let report = Report {
            operation: Operation::Clone,
            volume: None,
            source: Some("a".parse().unwrap()),
            target: Some("b".parse().unwrap()),
            archive: None,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"operation":"clone","source":"a","target":"b"}"#
        );
    }
}
