use std::{io, time::Duration};

use crate::status::Status;

/// Pause between the two interrupts of the Windows forceful sequence.
const SECOND_INTERRUPT_DELAY: Duration = Duration::from_millis(10);

/// Signals the wrapper may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Quit,
    Terminate,
}

impl Signal {
    /// Conventional name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Quit => "SIGQUIT",
            Signal::Terminate => "SIGTERM",
        }
    }

    #[cfg(unix)]
    fn as_raw(&self) -> libc::c_int {
        match self {
            Signal::Interrupt => libc::SIGINT,
            Signal::Quit => libc::SIGQUIT,
            Signal::Terminate => libc::SIGTERM,
        }
    }
}

/// Deliver `signal` to process `pid`.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Signals cannot be delivered here; always fails.
#[cfg(not(unix))]
pub fn send_signal(_pid: u32, signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} delivery is not supported on this platform", signal.as_str()),
    ))
}

/// Which signals stand for graceful and forceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPlan {
    /// SIGQUIT asks to stop, SIGTERM forces.
    Unix,
    /// Interrupts only: the first asks to stop, the second forces, a third
    /// would kill without cleanup and is never sent.
    Windows,
}

impl SignalPlan {
    /// Plan for the platform this binary was built for.
    pub const fn native() -> Self {
        if cfg!(windows) {
            SignalPlan::Windows
        } else {
            SignalPlan::Unix
        }
    }

    /// Signal that asks the child to stop.
    pub fn graceful(&self) -> Signal {
        match self {
            SignalPlan::Unix => Signal::Quit,
            SignalPlan::Windows => Signal::Interrupt,
        }
    }

    /// Run the forceful sequence through `send`.
    ///
    /// On Windows the status is read after the first interrupt: when a
    /// graceful shutdown is already under way that interrupt was the second
    /// one and nothing more is sent.
    pub async fn forceful<S, F, E>(&self, status: S, mut send: F) -> Result<(), E>
    where
        S: Fn() -> Status,
        F: FnMut(Signal) -> Result<(), E>,
    {
        match self {
            SignalPlan::Unix => send(Signal::Terminate),
            SignalPlan::Windows => {
                send(Signal::Interrupt)?;
                if status() == Status::InShutdown {
                    return Ok(());
                }
                tokio::time::sleep(SECOND_INTERRUPT_DELAY).await;
                send(Signal::Interrupt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    async fn record(plan: SignalPlan, status: Status) -> Vec<Signal> {
        let sent = RefCell::new(Vec::new());
        plan.forceful(
            || status,
            |s| {
                sent.borrow_mut().push(s);
                Ok::<_, io::Error>(())
            },
        )
        .await
        .unwrap();
        sent.into_inner()
    }

    #[tokio::test]
    async fn unix_forceful_is_one_sigterm() {
        assert_eq!(record(SignalPlan::Unix, Status::Running).await, vec![Signal::Terminate]);
    }

    #[tokio::test]
    async fn windows_forceful_sends_two_interrupts_when_running() {
        assert_eq!(
            record(SignalPlan::Windows, Status::Running).await,
            vec![Signal::Interrupt, Signal::Interrupt]
        );
    }

    #[tokio::test]
    async fn windows_forceful_never_sends_a_third_interrupt() {
        assert_eq!(
            record(SignalPlan::Windows, Status::InShutdown).await,
            vec![Signal::Interrupt]
        );
    }

    #[test]
    fn graceful_signal_per_platform() {
        assert_eq!(SignalPlan::Unix.graceful(), Signal::Quit);
        assert_eq!(SignalPlan::Windows.graceful(), Signal::Interrupt);
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_missing_process_fails() {
        let err = send_signal(u32::MAX >> 1, Signal::Terminate).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    }
}
