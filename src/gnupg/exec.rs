//! Subprocess plumbing for the GnuPG toolchain.
//!
//! Every tool is resolved through [`Toolchain`], run with the session's
//! environment overlay on top of the inherited environment, and mirrored to a
//! [`Trace`] sink as `+ <program> <args...>`. Input reaches the child only
//! through its stdin; see [`Input`].

use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::error::{CommandFailure, GpgError, Result};
use super::secret::Secret;

/// How often a child is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The executables a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Gpg,
    Gpgconf,
    GpgAgent,
    GpgConnectAgent,
}

impl Tool {
    pub fn default_name(self) -> &'static str {
        match self {
            Tool::Gpg => "gpg",
            Tool::Gpgconf => "gpgconf",
            Tool::GpgAgent => "gpg-agent",
            Tool::GpgConnectAgent => "gpg-connect-agent",
        }
    }
}

/// Configured executable paths (or bare names looked up on `PATH`) plus an
/// optional per-invocation timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    gpg: PathBuf,
    gpgconf: PathBuf,
    gpg_agent: PathBuf,
    gpg_connect_agent: PathBuf,
    timeout: Option<Duration>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            gpg: Tool::Gpg.default_name().into(),
            gpgconf: Tool::Gpgconf.default_name().into(),
            gpg_agent: Tool::GpgAgent.default_name().into(),
            gpg_connect_agent: Tool::GpgConnectAgent.default_name().into(),
            timeout: None,
        }
    }
}

impl Toolchain {
    pub fn with_tool(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match tool {
            Tool::Gpg => self.gpg = path,
            Tool::Gpgconf => self.gpgconf = path,
            Tool::GpgAgent => self.gpg_agent = path,
            Tool::GpgConnectAgent => self.gpg_connect_agent = path,
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn configured(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Gpg => &self.gpg,
            Tool::Gpgconf => &self.gpgconf,
            Tool::GpgAgent => &self.gpg_agent,
            Tool::GpgConnectAgent => &self.gpg_connect_agent,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve a tool to an absolute executable path.
    pub fn resolve(&self, tool: Tool) -> Result<PathBuf> {
        let configured = self.configured(tool);
        which::which(configured).map_err(|source| GpgError::ToolchainNotFound {
            name: configured.display().to_string(),
            source,
        })
    }
}

/// Environment overrides applied on top of the inherited environment.
///
/// Keys are unique; setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: Vec<(String, OsString)>,
}

impl Env {
    pub fn set(&mut self, key: &str, value: impl Into<OsString>) {
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// What a child receives on stdin.
///
/// Secrets are only ever delivered through [`Input::Secret`]; they never
/// become part of the argument vector or the environment.
#[derive(Debug)]
pub enum Input {
    Null,
    Data(Vec<u8>),
    Secret(Secret),
}

impl Input {
    fn bytes(&self) -> Option<&[u8]> {
        match self {
            Input::Null => None,
            Input::Data(data) => Some(data),
            Input::Secret(secret) => Some(secret.expose()),
        }
    }
}

/// Captured result of a finished invocation.
#[derive(Debug)]
pub struct Output {
    pub program: PathBuf,
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout followed by stderr.
    pub fn combined_text(&self) -> String {
        let mut text = self.stdout_text();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }

    pub fn failure(&self) -> CommandFailure {
        CommandFailure {
            program: self.program.display().to_string(),
            code: self.status.code(),
            stderr: String::from_utf8_lossy(&self.stderr).trim().to_string(),
        }
    }
}

/// Sink mirroring each invocation's command line.
pub struct Trace {
    sink: Option<Box<dyn Write + Send>>,
}

impl Trace {
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn stderr() -> Self {
        Self::to(io::stderr())
    }

    pub fn to(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(writer)),
        }
    }

    fn command(&mut self, program: &Path, args: &[OsString]) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let _ = writeln!(sink, "{}", format_command_line(program, args));
        let _ = sink.flush();
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

/// Render a command line the way it is traced.
pub fn format_command_line(program: &Path, args: &[OsString]) -> String {
    let mut line = format!("+ {}", program.display());
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Build an argument vector from string-like items.
pub fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().to_os_string())
        .collect()
}

/// Run `tool` to completion and capture its output.
///
/// A non-zero exit is not an error here; callers decide what it means for
/// their stage.
pub fn run(
    toolchain: &Toolchain,
    tool: Tool,
    args: &[OsString],
    input: Input,
    env: &Env,
    trace: &mut Trace,
) -> Result<Output> {
    let program = toolchain.resolve(tool)?;
    trace.command(&program, args);

    let stdin = match input {
        Input::Null => Stdio::null(),
        _ => Stdio::piped(),
    };

    let mut child = Command::new(&program)
        .args(args)
        .envs(env.iter())
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| GpgError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let stdin_writer = spawn_writer(child.stdin.take(), input);

    let status = match wait(&mut child, toolchain.timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            return Err(GpgError::Timeout {
                program: program.display().to_string(),
                after: toolchain.timeout.unwrap_or_default(),
            });
        }
        Err(source) => {
            return Err(GpgError::Io {
                program: program.display().to_string(),
                source,
            });
        }
    };

    join_writer(stdin_writer, &program)?;
    let stdout = join_reader(stdout_reader, &program)?;
    let stderr = join_reader(stderr_reader, &program)?;

    Ok(Output {
        program,
        status,
        stdout,
        stderr,
    })
}

/// Start `tool` in the background without waiting for it.
pub fn spawn_detached(
    toolchain: &Toolchain,
    tool: Tool,
    args: &[OsString],
    env: &Env,
    trace: &mut Trace,
) -> Result<()> {
    let program = toolchain.resolve(tool)?;
    trace.command(&program, args);

    Command::new(&program)
        .args(args)
        .envs(env.iter())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
        .map_err(|source| GpgError::Spawn {
            program: program.display().to_string(),
            source,
        })
}

/// Wait for the child, killing it once `timeout` has elapsed.
///
/// Returns `Ok(None)` when the child had to be killed.
fn wait(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> Option<JoinHandle<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

/// Feed `input` to the child on its own thread so an unread pipe cannot
/// block the caller past its deadline. The handle is dropped once written so
/// the child sees EOF.
fn spawn_writer<W>(pipe: Option<W>, input: Input) -> Option<JoinHandle<io::Result<()>>>
where
    W: Write + Send + 'static,
{
    let mut pipe = pipe?;
    Some(thread::spawn(move || {
        let Some(bytes) = input.bytes() else {
            return Ok(());
        };
        match pipe.write_all(bytes) {
            // The child may exit without reading its input.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    }))
}

fn join_writer(writer: Option<JoinHandle<io::Result<()>>>, program: &Path) -> Result<()> {
    let Some(writer) = writer else {
        return Ok(());
    };
    let io_err = |source| GpgError::Io {
        program: program.display().to_string(),
        source,
    };
    writer
        .join()
        .map_err(|_| io_err(io::Error::other("input writer thread panicked")))?
        .map_err(io_err)
}

fn join_reader(
    reader: Option<JoinHandle<io::Result<Vec<u8>>>>,
    program: &Path,
) -> Result<Vec<u8>> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    let io_err = |source| GpgError::Io {
        program: program.display().to_string(),
        source,
    };
    reader
        .join()
        .map_err(|_| io_err(io::Error::other("output reader thread panicked")))?
        .map_err(io_err)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
