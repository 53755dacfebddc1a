//! POSIX signal intake: SIGINT/SIGTERM/SIGHUP are converted into a wakeable
//! event stream via `signalfd`, so the signal group can be driven by the
//! same poll loop as everything else rather than an async-signal-unsafe
//! handler. the dedicated FSM drains the fd and posts `Shutdown` exactly
//! once; a handler at the very end of that chain terminates the process.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::SignalFd;

use super::event::{Event, EventBus};

/// owns the signalfd and the one-shot guard against posting `Shutdown` more
/// than once (SIGINT followed by SIGTERM while already shutting down must
/// not re-enter the handler chain).
pub struct SignalIntake {
    fd: SignalFd,
    posted: AtomicBool,
}

impl SignalIntake {
    /// blocks SIGINT/SIGTERM/SIGHUP on the calling thread (as signalfd
    /// requires) and opens a signalfd over that mask.
    pub fn new() -> nix::Result<Self> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGINT);
        mask.add(Signal::SIGTERM);
        mask.add(Signal::SIGHUP);
        mask.thread_block()?;

        let fd = SignalFd::new(&mask)?;
        Ok(SignalIntake {
            fd,
            posted: AtomicBool::new(false),
        })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// reads every pending signal off the fd and posts `Shutdown` to `bus`
    /// at most once, regardless of how many signals arrived. returns the
    /// number of signals drained, for logging.
    pub fn drain_and_post(&mut self, bus: &Arc<EventBus>) -> usize {
        let mut drained = 0;
        loop {
            match self.fd.read_signal() {
                Ok(Some(info)) => {
                    drained += 1;
                    info!("received signal {}", info.ssi_signo);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        if drained > 0 && !self.posted.swap(true, Ordering::SeqCst) {
            bus.post(Event::Shutdown);
        }
        drained
    }
}

/// the lowest-priority handler in the `Shutdown` chain: terminates the
/// process. registered last so any application-level cleanup handlers run
/// first.
pub fn register_exit_handler(bus: &Arc<EventBus>) {
    bus.register_handler("shutdown", i32::MAX, |_event| {
        info!("shutdown event reached terminal handler, exiting");
        std::process::exit(0);
    });
}
