use crate::error::{Result, VolumeError};
use crate::model::{Engine, Invocation};
use crate::progress;
use std::ffi::OsString;
use std::io;
use std::process::{Command, Stdio};

/// Name (or path) of the runtime executable, overridable for tests.
pub fn engine_bin(engine: Engine) -> String {
    std::env::var_os("KILONOVA_ENGINE_BIN")
        .map(|bin: OsString| bin.to_string_lossy().into_owned())
        .unwrap_or_else(|| engine.binary().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Completed,
    Planned,
}

pub trait ContainerRuntime {
    fn execute(&self, invocation: &Invocation) -> Result<Execution>;

    /// Whether `execute` only reports what it would run.
    fn dry_run(&self) -> bool {
        false
    }
}

/// Runs the invocation as a child process and waits for it.
#[derive(Debug, Clone, Default)]
pub struct EngineRuntime {
    /// Inherit stdio instead of capturing it behind a spinner.
    pub stream_output: bool,
}

impl EngineRuntime {
    fn spawn_error(invocation: &Invocation, err: io::Error) -> VolumeError {
        let message = if err.kind() == io::ErrorKind::NotFound {
            format!(
                "container engine `{}` is not installed (or not on PATH)",
                invocation.program
            )
        } else {
            format!("failed to start `{}`: {err}", invocation.program)
        };
        VolumeError::RuntimeInvocation {
            message,
            code: None,
        }
    }

    fn failure(invocation: &Invocation, status: std::process::ExitStatus, stderr: &[u8]) -> VolumeError {
        let stderr = String::from_utf8_lossy(stderr);
        let stderr = stderr.trim();
        let mut message = format!("`{}` exited with {status}", invocation.program);
        if !stderr.is_empty() {
            message.push_str(":\n");
            message.push_str(stderr);
        }
        VolumeError::RuntimeInvocation {
            message,
            code: status.code(),
        }
    }
}

impl ContainerRuntime for EngineRuntime {
    fn execute(&self, invocation: &Invocation) -> Result<Execution> {
        tracing::debug!(command = %invocation.command_line(), "running container");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).stdin(Stdio::null());

        if self.stream_output {
            // Container chatter goes to stderr; stdout is reserved for --json.
            let status = cmd
                .stdout(io::stderr())
                .status()
                .map_err(|err| Self::spawn_error(invocation, err))?;
            if !status.success() {
                return Err(Self::failure(invocation, status, &[]));
            }
            return Ok(Execution::Completed);
        }

        let spinner = progress::spinner(&format!("Running {}…", invocation.operation));
        let out = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| Self::spawn_error(invocation, err));
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        let out = out?;

        if !out.stdout.is_empty() {
            tracing::debug!(stdout = %String::from_utf8_lossy(&out.stdout).trim_end(), "container output");
        }
        if !out.status.success() {
            return Err(Self::failure(invocation, out.status, &out.stderr));
        }
        Ok(Execution::Completed)
    }
}

/// Prints the invocation instead of running it.
#[derive(Debug, Clone, Default)]
pub struct DryRunRuntime {
    pub json: bool,
}

impl ContainerRuntime for DryRunRuntime {
    fn execute(&self, invocation: &Invocation) -> Result<Execution> {
        if self.json {
            let out = serde_json::to_string_pretty(invocation).map_err(|err| {
                VolumeError::io("serialize invocation", io::Error::other(err))
            })?;
            println!("{out}");
        } else {
            println!("{}", invocation.command_line());
        }
        Ok(Execution::Planned)
    }

    fn dry_run(&self) -> bool {
        true
    }
}

pub fn make_runtime(dry_run: bool, json: bool, verbose: bool) -> Box<dyn ContainerRuntime> {
    if dry_run {
        Box::new(DryRunRuntime { json })
    } else {
        Box::new(EngineRuntime {
            stream_output: verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operation;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_stub(dir: &Path, body: &str) -> String {
        let path = dir.join("engine-stub");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn invocation(program: String) -> Invocation {
        Invocation {
            operation: Operation::Clone,
            program,
            args: vec!["run".into(), "--rm".into()],
        }
    }

    #[test]
    fn engine_runtime_succeeds_on_zero_exit() {
        let dir = tempdir().unwrap();
        let stub = write_stub(dir.path(), "echo copied; exit 0");
        let rt = EngineRuntime::default();
        assert_eq!(rt.execute(&invocation(stub)).unwrap(), Execution::Completed);
    }

    #[test]
    fn engine_runtime_reports_exit_code_and_stderr() {
        let dir = tempdir().unwrap();
        let stub = write_stub(dir.path(), "echo 'no such volume: src' >&2; exit 125");
        let err = EngineRuntime::default()
            .execute(&invocation(stub))
            .unwrap_err();
        match &err {
            VolumeError::RuntimeInvocation { message, code } => {
                assert_eq!(*code, Some(125));
                assert!(message.contains("exited with"));
                assert!(message.contains("no such volume: src"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), 125);
    }

    #[test]
    fn engine_runtime_passes_arguments_verbatim() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("args.log");
        let stub = write_stub(
            dir.path(),
            &format!("for a in \"$@\"; do printf '%s\\n' \"$a\" >> '{}'; done", log.display()),
        );
        let mut inv = invocation(stub);
        inv.args.push("/tmp/with space:/archive:z".into());
        EngineRuntime::default().execute(&inv).unwrap();
        let logged = std::fs::read_to_string(&log).unwrap();
        assert_eq!(logged, "run\n--rm\n/tmp/with space:/archive:z\n");
    }

    #[test]
    fn missing_engine_is_a_runtime_error() {
        let err = EngineRuntime::default()
            .execute(&invocation("/nonexistent/kilonova-engine".into()))
            .unwrap_err();
        assert!(err.to_string().contains("is not installed"), "{err}");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn dry_run_plans_without_running() {
        let rt = DryRunRuntime { json: false };
        assert!(rt.dry_run());
        assert_eq!(
            rt.execute(&invocation("/nonexistent/kilonova-engine".into()))
                .unwrap(),
            Execution::Planned
        );
    }
}
