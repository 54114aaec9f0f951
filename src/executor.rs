//! Runs the wrapped playbook binary and tees its combined output.
//!
//! stdout and stderr of the child share one pipe, so the bytes observed here
//! are in exactly the order the child wrote them. Every chunk is forwarded to
//! the terminal as soon as it is read and appended to the buffer that later
//! becomes the stored output.

use crate::model::{Invocation, RunResult};
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus};
use time::OffsetDateTime;

pub const DEFAULT_BINARY: &str = "ansible-playbook";

/// Ansible disables color when stdout is not a TTY; the pipe would strip it.
const FORCE_COLOR_ENV: (&str, &str) = ("ANSIBLE_FORCE_COLOR", "true");

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to create output pipe")]
    Pipe(#[source] io::Error),
    #[error("failed to launch {binary}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read output of {binary}")]
    Read {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for {binary}")]
    Wait {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("{binary} terminated abnormally ({status})")]
    Terminated { binary: String, status: ExitStatus },
}

pub struct Executor {
    binary: String,
    env: Vec<(String, String)>,
}

impl Executor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            env: vec![(FORCE_COLOR_ENV.0.to_string(), FORCE_COLOR_ENV.1.to_string())],
        }
    }

    /// Run the invocation to completion, streaming its output to stdout.
    pub fn run(&self, invocation: &Invocation) -> Result<RunResult, ExecError> {
        let stdout = io::stdout();
        let mut sink = stdout.lock();
        self.run_with_sink(invocation, &mut sink)
    }

    /// Same as [`Executor::run`] but forwards live output to `sink`.
    ///
    /// A non-zero exit of the child is a recorded outcome, not an error. Only
    /// launch, pipe and wait failures and signal termination are errors.
    pub fn run_with_sink<W: Write>(
        &self,
        invocation: &Invocation,
        sink: &mut W,
    ) -> Result<RunResult, ExecError> {
        let (mut reader, writer) = io::pipe().map_err(ExecError::Pipe)?;
        let err_writer = writer.try_clone().map_err(ExecError::Pipe)?;

        let mut command = Command::new(&self.binary);
        command
            .args(invocation.argv())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(writer)
            .stderr(err_writer);

        let start_time = OffsetDateTime::now_utc();
        let spawned = command.spawn();
        // The command still owns the parent's write ends; EOF only arrives once they close.
        drop(command);
        let mut child = spawned.map_err(|source| ExecError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        tracing::info!(
            binary = %self.binary,
            playbook = invocation.target(),
            pid = child.id(),
            "playbook started"
        );

        let mut output = Vec::new();
        if let Err(source) = tee(&mut reader, sink, &mut output) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecError::Read {
                binary: self.binary.clone(),
                source,
            });
        }

        let status = child.wait().map_err(|source| ExecError::Wait {
            binary: self.binary.clone(),
            source,
        })?;
        let elapsed: std::time::Duration = (OffsetDateTime::now_utc() - start_time)
            .try_into()
            .unwrap_or_default();

        match status.code() {
            Some(code) => {
                tracing::info!(
                    code,
                    bytes = output.len(),
                    elapsed = %humantime::format_duration(elapsed),
                    "playbook finished"
                );
                if code != 0 {
                    tracing::warn!(code, "playbook reported failure; recording run anyway");
                }
            }
            None => {
                return Err(ExecError::Terminated {
                    binary: self.binary.clone(),
                    status,
                })
            }
        }

        Ok(RunResult {
            invocation: invocation.clone(),
            start_time,
            // Stored as text; invalid UTF-8 becomes U+FFFD, the live copy stays raw.
            output: String::from_utf8_lossy(&output).into_owned(),
        })
    }
}

/// Copy `reader` to `sink` chunk by chunk, appending every chunk to `acc`.
///
/// If the sink stops accepting writes (closed terminal, broken pipe) the
/// child is still drained and recorded; forwarding just stops.
fn tee<R: Read, W: Write>(reader: &mut R, sink: &mut W, acc: &mut Vec<u8>) -> io::Result<()> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut forwarding = true;
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let data = &chunk[..n];
        if forwarding {
            if let Err(e) = sink.write_all(data).and_then(|()| sink.flush()) {
                tracing::warn!(error = %e, "live output stopped; still recording");
                forwarding = false;
            }
        }
        acc.extend_from_slice(data);
    }
}
