//! Ownership of the one child process the launcher ever starts.
//!
//! `ProcessSupervisor` holds the child slot, relays SIGINT/SIGTERM to it as SIGTERM,
//! and turns its exit into the launcher's own exit code. Signals never end the wait
//! by themselves: the launcher exits only after the child has, so a child that traps
//! the signal gets to clean up and choose its own exit code.

use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Child;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("a child process is already being supervised")]
    AlreadyAdopted,
    #[error("no child process has been started")]
    NotStarted,
    #[error("failed to listen for termination signals: {0}")]
    Signals(std::io::Error),
    #[error("failed waiting for child process: {0}")]
    Wait(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    NotStarted,
    Running,
    Exited(i32),
    KilledBySignal,
}

impl ChildState {
    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ChildState::Exited(code),
            None => ChildState::KilledBySignal,
        }
    }

    /// Exit code the launcher should end with, once the child has finished.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            ChildState::Exited(code) => Some(code),
            ChildState::KilledBySignal => Some(0),
            ChildState::NotStarted | ChildState::Running => None,
        }
    }
}

/// Termination signals delivered to the launcher.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Register listeners. Must be called inside a tokio runtime.
    pub fn install() -> Result<Self, SupervisorError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt()).map_err(SupervisorError::Signals)?,
                terminate: signal(SignalKind::terminate()).map_err(SupervisorError::Signals)?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves with the name of the next signal received.
    pub async fn recv(&mut self) -> Result<&'static str, SupervisorError> {
        #[cfg(unix)]
        {
            let received = tokio::select! {
                r = self.interrupt.recv() => r.map(|_| "SIGINT"),
                r = self.terminate.recv() => r.map(|_| "SIGTERM"),
            };
            received.ok_or_else(|| {
                SupervisorError::Signals(std::io::Error::other("signal stream closed"))
            })
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .map_err(SupervisorError::Signals)?;
            Ok("ctrl-c")
        }
    }
}

pub struct ProcessSupervisor {
    child: Option<Child>,
    state: ChildState,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            child: None,
            state: ChildState::NotStarted,
        }
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    /// Take ownership of the freshly spawned child. The slot is filled once.
    pub fn adopt(&mut self, child: Child) -> Result<(), SupervisorError> {
        if self.child.is_some() {
            return Err(SupervisorError::AlreadyAdopted);
        }
        tracing::debug!(pid = child.id(), "supervising child");
        self.child = Some(child);
        self.state = ChildState::Running;
        Ok(())
    }

    /// Ask a running child to terminate. No-op when nothing is running.
    ///
    /// On Unix the child gets SIGTERM, which it may trap; elsewhere it is killed.
    pub fn forward_termination(&mut self) {
        if self.state != ChildState::Running {
            return;
        }
        let Some(child) = self.child.as_mut() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            // `id()` is None once the child has been reaped; its pid may be reused.
            let Some(pid) = child.id() else {
                return;
            };
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "SIGTERM not delivered");
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "kill request not delivered");
            }
        }
    }

    /// Wait for the child to exit, forwarding every termination signal that arrives
    /// in the meantime. Returns the launcher's exit code.
    pub async fn wait(&mut self, signals: &mut TerminationSignals) -> Result<i32, SupervisorError> {
        loop {
            if let Some(code) = self.state.exit_code() {
                return Ok(code);
            }
            let child = self.child.as_mut().ok_or(SupervisorError::NotStarted)?;

            let event = tokio::select! {
                status = child.wait() => Event::Exited(status),
                name = signals.recv() => Event::Signal(name),
            };

            self.handle(event)?;
        }
    }

    fn handle(&mut self, event: Event) -> Result<(), SupervisorError> {
        match event {
            Event::Exited(status) => {
                let status = status.map_err(SupervisorError::Wait)?;
                tracing::debug!(%status, "child exited");
                self.state = ChildState::from_status(status);
            }
            Event::Signal(name) => {
                let name = name?;
                tracing::debug!(signal = name, "forwarding termination to child");
                self.forward_termination();
            }
        }
        Ok(())
    }
}

enum Event {
    Exited(std::io::Result<ExitStatus>),
    Signal(Result<&'static str, SupervisorError>),
}
