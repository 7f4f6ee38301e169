//! External program invocation for the host backend.

use std::ffi::OsString;
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use super::CapabilityError;

const CAPABILITY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::capability");

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
}

impl Invocation {
    pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    /// Starts the program without waiting for it.
    ///
    /// The child is reaped on a background thread so long-running programs
    /// (task managers, shutdown timers) do not leave zombies behind.
    pub fn spawn_detached(&self) -> Result<(), CapabilityError> {
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CapabilityError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    /// Runs the program to completion and fails on a non-zero exit.
    pub fn run(&self) -> Result<(), CapabilityError> {
        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| CapabilityError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(CapabilityError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }

    /// Runs the program to completion and returns its standard output.
    pub fn output(&self) -> Result<Vec<u8>, CapabilityError> {
        let output = self
            .command()
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| CapabilityError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(CapabilityError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
            })
        }
    }
}

/// Starts the first candidate that can be spawned.
///
/// Returns the index of the candidate that started. When none can be started
/// the result is [`CapabilityError::Exhausted`].
pub fn run_first_available(
    action: &str,
    candidates: &[Invocation],
) -> Result<usize, CapabilityError> {
    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.spawn_detached() {
            Ok(()) => {
                debug!(
                    target: CAPABILITY_TARGET,
                    action,
                    program = candidate.program(),
                    "fallback command started"
                );
                return Ok(index);
            }
            Err(error) => {
                debug!(
                    target: CAPABILITY_TARGET,
                    action,
                    error = %error,
                    "fallback command unavailable"
                );
            }
        }
    }
    warn!(target: CAPABILITY_TARGET, action, "no fallback command could be started");
    Err(CapabilityError::Exhausted {
        action: action.to_string(),
    })
}
