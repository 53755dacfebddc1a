//! cooperative scheduling primitives.
//!
//! the core model is a small fixed pool of OS threads, each hosting one
//! [`Group`]: a single-threaded cooperative scheduling domain running any
//! number of stackless [`Fsm`]s. an FSM never blocks the OS thread; instead
//! every invocation of its `step` must end by reporting exactly one of the
//! dispositions in [`FsmResult`], mirroring the "register waits then block /
//! transition / yield / rest / exit" contract handlers are built against.
//! the poll loop (`poll.rs`) is the thing that actually drives `step` calls,
//! using the `Wait`s an FSM reports to know when to invoke it again.
//!
//! true stackful coroutines and a weak-reference wait registry are not
//! reproduced here; a poll-driven explicit state machine gives the same
//! externally observable behavior (no preemption inside a group, suspension
//! only at named points) without unsafe stack switching.

use std::os::unix::io::RawFd;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::event::EventBus;
use super::timer::TimerDispatcher;
use std::sync::Arc;

/// direction an FSM wants to be woken for on a registered fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    ReadWrite,
}

/// a single outstanding suspension point. an FSM reports a list of these
/// from `FsmResult::Block`; the driver resolves whichever fires first and
/// re-invokes `step`. unresolved waits from a previous `Block` are
/// considered cancelled as soon as any one of them resolves.
pub enum Wait {
    Fd(RawFd, Interest),
    Deadline(Instant),
}

impl Wait {
    pub fn timer_wait(deadline: Instant) -> Wait {
        Wait::Deadline(deadline)
    }

    pub fn fd_wait(fd: RawFd, interest: Interest) -> Wait {
        Wait::Fd(fd, interest)
    }
}

/// what an FSM invocation reports before returning control to its driver.
/// a driver that observes anything else (e.g. a step that panics instead of
/// reporting one of these) is witnessing a programmer error in the FSM.
pub enum FsmResult {
    /// register these waits, then go dormant until one resolves.
    Block(Vec<Wait>),
    /// be re-invoked on the next scheduler pass without waiting on anything.
    Yield,
    /// go dormant until explicitly woken (e.g. by another task posting to a
    /// waitqueue); no wait is registered on its behalf.
    Rest,
    /// this FSM is done; the driver may drop it.
    Exit,
}

/// stackless state machine run by a [`Group`]'s driver. `step` must itself
/// perform only non-blocking work and return one [`FsmResult`] describing
/// how it wants to be resumed.
pub trait Fsm {
    fn step(&mut self) -> FsmResult;
}

/// a scheduling domain: one OS thread's worth of cooperative state. holds
/// the event bus and timer dispatcher every FSM running on this thread
/// shares, so that `post`/`schedule` calls made from a handler never need
/// to reach across threads.
pub struct Group {
    pub id: usize,
    pub bus: Arc<EventBus>,
    pub timers: Mutex<TimerDispatcher>,
}

impl Group {
    pub fn new(id: usize) -> Arc<Self> {
        Arc::new(Group {
            id,
            bus: EventBus::new(),
            timers: Mutex::new(TimerDispatcher::new()),
        })
    }
}

/// a counting semaphore usable both within a group (non-blocking `try_down`)
/// and across native threads (blocking `down`).
pub struct Semaphore {
    state: Mutex<isize>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(initial: isize) -> Self {
        Semaphore {
            state: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    pub fn up(&self) {
        let mut count = self.state.lock().unwrap();
        *count += 1;
        self.cv.notify_one();
    }

    /// blocks the native thread until a permit is available. only safe to
    /// call from a task that has migrated out of its cooperative group.
    pub fn down(&self) {
        let mut count = self.state.lock().unwrap();
        while *count <= 0 {
            count = self.cv.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// never blocks; `true` if a permit was taken.
    pub fn try_down(&self) -> bool {
        let mut count = self.state.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    pub fn down_timeout(&self, timeout: Duration) -> bool {
        let count = self.state.lock().unwrap();
        let (mut count, result) = self.cv.wait_timeout_while(count, timeout, |c| *c <= 0).unwrap();
        if result.timed_out() {
            false
        } else {
            *count -= 1;
            true
        }
    }
}

/// a one-shot completion object a task can block on, matching the "any task
/// in the same group can block on a task's completion" primitive. unlike a
/// semaphore this only ever fires once, and late waiters still observe it.
pub struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Default for Completion {
    fn default() -> Self {
        Completion {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }
}

impl Completion {
    pub fn new() -> Self {
        Completion::default()
    }

    pub fn complete(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cv.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        *self.done.lock().unwrap()
    }

    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cv.wait(done).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn semaphore_try_down_never_blocks() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_down());
        sem.up();
        assert!(sem.try_down());
    }

    #[test]
    fn completion_wakes_waiters() {
        let completion = Arc::new(Completion::new());
        let c2 = completion.clone();
        let handle = thread::spawn(move || {
            c2.wait();
        });
        thread::sleep(Duration::from_millis(10));
        completion.complete();
        handle.join().unwrap();
    }
}
