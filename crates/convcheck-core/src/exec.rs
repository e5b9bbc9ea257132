//! Deadline-bounded execution of external tools.
//!
//! Every collaborator the harness drives (formatter, converter, checker,
//! mount utilities, diff) goes through [`Executor::execute`]. Output is
//! always captured in full, never forwarded to the terminal, and the caller
//! gets it back whether the tool succeeded, failed, or timed out.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use convcheck_common::error::{HarnessError, Result};

/// Caller-supplied success predicate over a finished invocation.
pub type SuccessCheck = Box<dyn Fn(&ToolResult) -> Result<()> + Send + Sync>;

/// How a tool is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Direct exec of an argument vector; the first element is the program.
    Exec(Vec<OsString>),
    /// A string interpreted by the configured shell with `-c`.
    Shell(String),
}

/// A single tool call: what to run, what to call it, and how to judge it.
pub struct ToolInvocation {
    name: String,
    command: CommandLine,
    deadline: Option<Duration>,
    failure_message: Option<String>,
    check: Option<SuccessCheck>,
}

impl ToolInvocation {
    /// Creates a direct-exec invocation of `program` with `args`.
    pub fn exec<I, S>(name: impl Into<String>, program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let argv = std::iter::once(program.into())
            .chain(args.into_iter().map(Into::into))
            .collect();
        Self::new(name, CommandLine::Exec(argv))
    }

    /// Creates a shell-string invocation.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, CommandLine::Shell(script.into()))
    }

    fn new(name: impl Into<String>, command: CommandLine) -> Self {
        Self {
            name: name.into(),
            command,
            deadline: None,
            failure_message: None,
            check: None,
        }
    }

    /// Overrides the runner's default deadline for this invocation.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replaces the default "did not exit cleanly" message.
    #[must_use]
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Replaces the zero-exit policy with a custom predicate.
    #[must_use]
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ToolResult) -> Result<()> + Send + Sync + 'static,
    {
        self.check = Some(Box::new(check));
        self
    }

    /// Human-readable tool name used in errors and artifact names.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command line to launch.
    #[must_use]
    pub const fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Deadline override, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Applies the success policy to a captured execution.
    ///
    /// A timed-out execution always fails with [`HarnessError::Timeout`],
    /// before any predicate sees it.
    ///
    /// # Errors
    ///
    /// Returns the timeout, the default [`HarnessError::UnexpectedExit`], or
    /// whatever the custom predicate raises.
    pub fn judge(&self, captured: &Captured) -> Result<()> {
        if captured.timed_out {
            return Err(HarnessError::Timeout {
                tool: self.name.clone(),
                deadline: captured.deadline,
            });
        }
        if let Some(check) = &self.check {
            return check(&captured.result);
        }
        if captured.result.exit_code == 0 {
            return Ok(());
        }
        Err(HarnessError::UnexpectedExit {
            tool: self.name.clone(),
            code: captured.result.exit_code,
            message: self
                .failure_message
                .clone()
                .unwrap_or_else(|| format!("{} did not exit cleanly", self.name)),
        })
    }
}

impl fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInvocation")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("deadline", &self.deadline)
            .field("custom_check", &self.check.is_some())
            .finish_non_exhaustive()
    }
}

/// Output of a terminated (or killed) tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// Name of the tool.
    pub tool: String,
    /// Exit code, `-1` when the process was killed by a signal.
    pub exit_code: i32,
    /// Everything the tool wrote to standard output.
    pub stdout: Vec<u8>,
    /// Everything the tool wrote to standard error.
    pub stderr: Vec<u8>,
    /// Wall-clock time from spawn to reap.
    pub elapsed: Duration,
}

impl ToolResult {
    /// Standard output decoded lossily as UTF-8.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A finished execution before the success policy is applied.
#[derive(Debug, Clone)]
pub struct Captured {
    /// Exit status and output streams.
    pub result: ToolResult,
    /// Whether the process was killed for exceeding its deadline.
    pub timed_out: bool,
    /// Deadline that was in force.
    pub deadline: Duration,
}

/// Spawns tools and waits for them under a deadline.
#[derive(Debug, Clone)]
pub struct Executor {
    shell: PathBuf,
    poll_interval: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(PathBuf::from("/bin/sh"))
    }
}

impl Executor {
    /// Creates an executor running shell strings through `shell`.
    #[must_use]
    pub const fn new(shell: PathBuf) -> Self {
        Self {
            shell,
            poll_interval: Duration::from_millis(convcheck_common::constants::POLL_INTERVAL_MS),
        }
    }

    /// Runs the invocation to completion or until `deadline` elapses.
    ///
    /// The child gets a null stdin and piped stdout/stderr, which are drained
    /// on reader threads while this thread polls for exit. On timeout the
    /// child's whole process group is killed and reaped.
    ///
    /// The deadline also covers draining: if a background descendant keeps
    /// the pipes open after the child exits, the group is killed once the
    /// deadline passes and the execution counts as timed out.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] if the tool cannot be started,
    /// [`HarnessError::Config`] for an empty argument vector, or an I/O
    /// error if waiting on the child fails. Exit codes are not judged here.
    pub fn execute(&self, invocation: &ToolInvocation, deadline: Duration) -> Result<Captured> {
        let mut command = self.build_command(invocation)?;
        tracing::debug!(
            tool = invocation.name(),
            command = ?invocation.command(),
            deadline_ms = deadline.as_millis(),
            "running tool"
        );

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| HarnessError::Spawn {
            tool: invocation.name().to_string(),
            source: e,
        })?;

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let (status, mut timed_out) = self.wait_with_deadline(&mut child, invocation.name(), deadline)?;

        let mut streams = [Vec::new(), Vec::new()];
        for (slot, reader) in streams.iter_mut().zip([&stdout_reader, &stderr_reader]) {
            let budget = if timed_out {
                DRAIN_GRACE
            } else {
                deadline.saturating_sub(started.elapsed())
            };
            *slot = match reader.recv_timeout(budget) {
                Ok(output) => output,
                Err(RecvTimeoutError::Disconnected) => Vec::new(),
                Err(RecvTimeoutError::Timeout) => {
                    if !timed_out {
                        tracing::warn!(
                            tool = invocation.name(),
                            deadline_ms = deadline.as_millis(),
                            "descendants still hold output open past deadline, killing group"
                        );
                        kill_process_group(&mut child);
                        timed_out = true;
                    }
                    reader.recv_timeout(DRAIN_GRACE).unwrap_or_default()
                }
            };
        }
        let [stdout, stderr] = streams;

        let result = ToolResult {
            tool: invocation.name().to_string(),
            exit_code: exit_code(status),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            tool = invocation.name(),
            exit_code = result.exit_code,
            timed_out,
            elapsed_ms = result.elapsed.as_millis(),
            "tool finished"
        );

        Ok(Captured {
            result,
            timed_out,
            deadline,
        })
    }

    fn build_command(&self, invocation: &ToolInvocation) -> Result<Command> {
        let mut command = match invocation.command() {
            CommandLine::Exec(argv) => {
                let (program, args) = argv.split_first().ok_or_else(|| HarnessError::Config {
                    message: format!("{} has an empty command line", invocation.name()),
                })?;
                let mut command = Command::new(program);
                let _ = command.args(args);
                command
            }
            CommandLine::Shell(script) => {
                let mut command = Command::new(&self.shell);
                let _ = command.arg("-c").arg(script);
                command
            }
        };
        let _ = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            let _ = command.process_group(0);
        }
        Ok(command)
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        tool: &str,
        deadline: Duration,
    ) -> Result<(ExitStatus, bool)> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok((status, false)),
                Ok(None) => {
                    if started.elapsed() >= deadline {
                        tracing::warn!(tool, deadline_ms = deadline.as_millis(), "deadline exceeded, killing tool");
                        kill_process_group(child);
                        let status = child
                            .wait()
                            .map_err(|e| HarnessError::io(format!("<{tool}>"), e))?;
                        return Ok((status, true));
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    kill_process_group(child);
                    let _ = child.wait();
                    return Err(HarnessError::io(format!("<{tool}>"), e));
                }
            }
        }
    }
}

/// How long to wait for the readers once the process group has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

fn drain<R>(stream: Option<R>) -> Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let _ = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            // A read error only truncates the capture; the exit status still decides.
            let _ = stream.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let killed = i32::try_from(child.id())
        .ok()
        .is_some_and(|pid| killpg(Pid::from_raw(pid), Signal::SIGKILL).is_ok());
    if !killed {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}
