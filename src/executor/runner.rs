//! External command boundary
//!
//! Everything the pipeline asks of the host (the load generator, zone reports,
//! discards) goes through a [`CommandRunner`]. The system runner spawns processes,
//! optionally inside a container; the mock runner in [`super::mock`] records the
//! invocations for tests.

use crate::config::ContainerMode;
use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    pub args: Vec<String>,
    /// Run inside the container image for `program` when container mode is active
    pub containerized: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            containerized: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn containerized(mut self, containerized: bool) -> Self {
        self.containerized = containerized;
        self
    }

    /// Value of `--output <path>` / `--output=<path>`, if present
    pub fn output_path(&self) -> Option<PathBuf> {
        let mut iter = self.args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--output" {
                return iter.next().map(PathBuf::from);
            }
            if let Some(path) = arg.strip_prefix("--output=") {
                return Some(PathBuf::from(path));
            }
        }
        None
    }

    /// Shell-like rendering for logs and metadata
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external programs
///
/// `run` fails only when the program cannot be started at all; a non-zero exit is
/// reported through [`CommandOutput::exit_code`] so callers can map it to their own
/// failure type.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs programs on the host, or in a container for containerized invocations
#[derive(Debug, Clone)]
pub struct SystemRunner {
    mode: ContainerMode,
    /// Device passed through to the container
    device: PathBuf,
    /// Host directory mounted at `/output` in the container
    output_dir: PathBuf,
    container_engine: String,
    /// Image used for the load generator in container mode
    fio_image: String,
}

/// Output directory as seen from inside the container
pub const CONTAINER_OUTPUT_DIR: &str = "/output";

impl SystemRunner {
    pub fn new(mode: ContainerMode, device: &Path, output_dir: &Path) -> Self {
        Self {
            mode,
            device: device.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            container_engine: "docker".to_string(),
            fio_image: "zfio".to_string(),
        }
    }

    pub fn with_images(mut self, container_engine: &str, fio_image: &str) -> Self {
        self.container_engine = container_engine.to_string();
        self.fio_image = fio_image.to_string();
        self
    }

    fn build_command(&self, invocation: &Invocation) -> Command {
        if invocation.containerized && self.mode == ContainerMode::Docker {
            let device = self.device.display().to_string();
            let mut cmd = Command::new(&self.container_engine);
            cmd.arg("run")
                .arg("-v")
                .arg(format!("{}:{}", device, device))
                .arg("-v")
                .arg(format!("{}:{}", self.output_dir.display(), CONTAINER_OUTPUT_DIR))
                .arg("--privileged=true")
                .arg(&self.fio_image)
                .args(&invocation.args);
            cmd
        } else {
            let mut cmd = Command::new(&invocation.program);
            cmd.args(&invocation.args);
            cmd
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        tracing::debug!(command = %invocation.command_line(), "exec");

        let output = self
            .build_command(invocation)
            .output()
            .with_context(|| format!("Failed to start {}", invocation.program))?;

        Ok(CommandOutput {
            // Killed by a signal: no exit code
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("fio")
            .arg("--rw=read")
            .args(["--bs=4096", "--output", "/tmp/x.log"])
            .containerized(true);

        assert_eq!(inv.program, "fio");
        assert_eq!(inv.args.len(), 4);
        assert!(inv.containerized);
        assert_eq!(inv.output_path(), Some(PathBuf::from("/tmp/x.log")));
        assert_eq!(inv.command_line(), "fio --rw=read --bs=4096 --output /tmp/x.log");
    }

    #[test]
    fn test_output_path_equals_form() {
        let inv = Invocation::new("fio").arg("--output=/out/a.log");
        assert_eq!(inv.output_path(), Some(PathBuf::from("/out/a.log")));
        assert_eq!(Invocation::new("fio").output_path(), None);
    }

    #[test]
    fn test_docker_wrapping() {
        let runner = SystemRunner::new(ContainerMode::Docker, Path::new("/dev/nvme0n1"), Path::new("/res"));
        let inv = Invocation::new("fio").arg("--rw=read").containerized(true);
        let cmd = runner.build_command(&inv);

        assert_eq!(cmd.get_program(), "docker");
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "run",
                "-v",
                "/dev/nvme0n1:/dev/nvme0n1",
                "-v",
                "/res:/output",
                "--privileged=true",
                "zfio",
                "--rw=read"
            ]
        );
    }

    #[test]
    fn test_host_tools_not_wrapped() {
        let runner = SystemRunner::new(ContainerMode::Docker, Path::new("/dev/nvme0n1"), Path::new("/res"));
        let inv = Invocation::new("blkdiscard").arg("/dev/nvme0n1");
        let cmd = runner.build_command(&inv);
        assert_eq!(cmd.get_program(), "blkdiscard");
    }

    #[test]
    fn test_system_runner_exit_code() {
        let runner = SystemRunner::new(ContainerMode::System, Path::new("/dev/null"), Path::new("/tmp"));
        let ok = runner.run(&Invocation::new("sh").args(["-c", "echo hi"])).unwrap();
        assert!(ok.success());
        assert_eq!(ok.stdout.trim(), "hi");

        let failed = runner.run(&Invocation::new("sh").args(["-c", "exit 3"])).unwrap();
        assert_eq!(failed.exit_code, 3);
    }

    #[test]
    fn test_missing_program_is_error() {
        let runner = SystemRunner::new(ContainerMode::System, Path::new("/dev/null"), Path::new("/tmp"));
        assert!(runner.run(&Invocation::new("definitely-not-a-real-tool-xyz")).is_err());
    }
}
