//! The launcher's view of the machine it runs on
//!
//! Every pre-spawn stage goes through [`Host`], so the pipeline can be
//! exercised against a fake filesystem and fake commands.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Captured result of a finished external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human form of the exit status, e.g. `exited with status 1`
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exited with status {code}"),
            None => "was terminated by a signal".to_string(),
        }
    }

    /// stderr when it has content, stdout otherwise
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Side effects the bootstrap pipeline needs from the outside world
pub trait Host {
    /// Resolve an executable name against the search path
    fn which(&self, name: &str) -> Option<PathBuf>;

    /// Whether a file or directory exists
    fn exists(&self, path: &Path) -> bool;

    /// Stdout of `<program> --version`, if it ran successfully
    fn version_output(&self, program: &Path) -> Option<String>;

    /// Run a command to completion with stdin closed and output captured
    fn run_captured(&self, program: &Path, args: &[String], cwd: &Path) -> io::Result<StepOutput>;
}

/// The real machine: `PATH`, the filesystem and child processes
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    search_path: Option<OsString>,
}

impl SystemHost {
    /// Search the `PATH` of the current process
    pub fn new() -> Self {
        Self::default()
    }

    /// Search an explicit path list instead of `PATH`
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

impl Host for SystemHost {
    fn which(&self, name: &str) -> Option<PathBuf> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))?;
        find_in_path(name, &search_path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn version_output(&self, program: &Path) -> Option<String> {
        let output = duct::cmd(program, ["--version"])
            .stdin_null()
            .stdout_capture()
            .stderr_null()
            .unchecked()
            .run()
            .ok()?;

        if !output.status.success() {
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }

    fn run_captured(&self, program: &Path, args: &[String], cwd: &Path) -> io::Result<StepOutput> {
        // stdin is the MCP stream; an installer must never consume it
        let output = duct::cmd(program, args)
            .dir(cwd)
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()?;

        Ok(StepOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Walk a `PATH`-style list looking for an executable `name`
pub fn find_in_path(name: &str, search_path: &std::ffi::OsStr) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    // A name with a separator is a path already
    if Path::new(name).components().count() > 1 {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }

    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| executable_names(name).map(move |file| dir.join(file)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn executable_names(name: &str) -> impl Iterator<Item = String> + '_ {
    // npm ships as npm.cmd on Windows
    ["", ".exe", ".cmd", ".bat"]
        .into_iter()
        .map(move |ext| format!("{name}{ext}"))
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(name.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording host for pipeline tests

    use super::{Host, StepOutput};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::path::{Path, PathBuf};

    /// How the fake answers a command, keyed by program file name
    #[derive(Debug, Clone)]
    pub enum Reply {
        Output(StepOutput),
        SpawnError(io::ErrorKind),
    }

    #[derive(Debug, Default)]
    pub struct FakeHost {
        pub binaries: HashMap<String, PathBuf>,
        pub existing: RefCell<HashSet<PathBuf>>,
        pub versions: HashMap<String, String>,
        pub replies: HashMap<String, Reply>,
        pub runs: RefCell<Vec<String>>,
        /// Paths that appear once a command with this program name succeeds
        pub creates: HashMap<String, PathBuf>,
    }

    impl FakeHost {
        pub fn with_binaries(names: &[&str]) -> Self {
            let binaries = names
                .iter()
                .map(|name| ((*name).to_string(), PathBuf::from("/fake/bin").join(name)))
                .collect();
            Self {
                binaries,
                ..Self::default()
            }
        }

        pub fn touch(&self, path: impl Into<PathBuf>) {
            self.existing.borrow_mut().insert(path.into());
        }

        pub fn reply(&mut self, program: &str, reply: Reply) {
            self.replies.insert(program.to_string(), reply);
        }

        pub fn ran(&self, program: &str) -> bool {
            self.runs
                .borrow()
                .iter()
                .any(|line| line.split(' ').next() == Some(program))
        }

        fn program_name(program: &Path) -> String {
            program
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        }
    }

    impl Host for FakeHost {
        fn which(&self, name: &str) -> Option<PathBuf> {
            self.binaries.get(name).cloned()
        }

        fn exists(&self, path: &Path) -> bool {
            self.existing.borrow().contains(path)
        }

        fn version_output(&self, program: &Path) -> Option<String> {
            self.versions.get(&Self::program_name(program)).cloned()
        }

        fn run_captured(
            &self,
            program: &Path,
            args: &[String],
            _cwd: &Path,
        ) -> io::Result<StepOutput> {
            let name = Self::program_name(program);
            let mut line = name.clone();
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            self.runs.borrow_mut().push(line);

            let output = match self.replies.get(&name) {
                Some(Reply::SpawnError(kind)) => return Err(io::Error::from(*kind)),
                Some(Reply::Output(output)) => output.clone(),
                None => StepOutput {
                    code: Some(0),
                    ..StepOutput::default()
                },
            };

            if output.success() {
                if let Some(path) = self.creates.get(&name) {
                    self.touch(path.clone());
                }
            }
            Ok(output)
        }
    }
}
