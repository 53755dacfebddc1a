//! the reactor: a `libc::poll`-based loop that drives every [`Fsm`] running
//! on one [`Group`], translating each `step`'s reported [`Wait`]s into the
//! next `poll(2)` call's fd/timeout set. one `PollLoop` runs per OS thread;
//! nothing here blocks except the single `poll` syscall itself.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::event::EventBus;
use super::scheduler::{Fsm, FsmResult, Group, Interest, Wait};

/// a handle a running task can use to hand a freshly built FSM back to its
/// own driver, since a task only ever sees itself inside `step()`. the
/// accept loop is the motivating case: it cannot call `PollLoop::spawn`
/// directly (it doesn't own the loop), so it queues here instead and the
/// loop drains the queue at the top of every pass.
#[derive(Clone)]
pub struct SpawnHandle(Arc<Mutex<Vec<Box<dyn Fsm + Send>>>>);

impl SpawnHandle {
    pub fn spawn(&self, fsm: Box<dyn Fsm + Send>) {
        self.0.lock().unwrap().push(fsm);
    }
}

/// a cross-thread wakeup: writing a byte to the eventfd makes a blocked
/// `poll` return immediately, so a handler posting an event from another
/// thread doesn't wait out the current timeout before being drained.
#[derive(Clone, Copy)]
pub struct WakeupHandle(RawFd);

impl WakeupHandle {
    pub fn wake(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.0, &one as *const u64 as *const libc::c_void, 8);
        }
    }
}

/// one task's last reported suspension, plus the waits it's currently
/// registered under. `None` means "call step() again on the next pass
/// unconditionally" (covers both `Yield` and a task just added).
enum Suspension {
    Ready,
    Waiting(Vec<Wait>),
    Resting,
}

struct Task {
    fsm: Box<dyn Fsm + Send>,
    suspension: Suspension,
}

/// the reactor for one [`Group`]: owns every task assigned to this thread,
/// the group's event bus and timer dispatcher, and the wakeup eventfd other
/// threads use to interrupt a blocked `poll`.
pub struct PollLoop {
    group: Arc<Group>,
    wakeup_fd: RawFd,
    tasks: Vec<Task>,
    pending: Arc<Mutex<Vec<Box<dyn Fsm + Send>>>>,
}

impl PollLoop {
    pub fn new(group: Arc<Group>) -> io::Result<Self> {
        let wakeup_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
        if wakeup_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(PollLoop {
            group,
            wakeup_fd,
            tasks: Vec::new(),
            pending: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn wakeup_handle(&self) -> WakeupHandle {
        WakeupHandle(self.wakeup_fd)
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.group.bus.clone()
    }

    pub fn spawn_handle(&self) -> SpawnHandle {
        SpawnHandle(self.pending.clone())
    }

    /// adds a freshly constructed FSM; it gets its first `step()` call on
    /// the very next pass regardless of what else is pending.
    pub fn spawn(&mut self, fsm: Box<dyn Fsm + Send>) {
        self.tasks.push(Task {
            fsm,
            suspension: Suspension::Ready,
        });
    }

    /// moves every FSM queued via a [`SpawnHandle`] since the last pass into
    /// `tasks`, ready to step immediately.
    fn drain_pending(&mut self) {
        let mut pending = self.pending.lock().unwrap();
        for fsm in pending.drain(..) {
            self.tasks.push(Task {
                fsm,
                suspension: Suspension::Ready,
            });
        }
    }

    /// drains the wakeup eventfd so the next `poll` call blocks again
    /// instead of immediately returning on the byte(s) just consumed.
    fn drain_wakeup(&self) {
        let mut scratch = [0u8; 8];
        loop {
            let n = unsafe { libc::read(self.wakeup_fd, scratch.as_mut_ptr() as *mut libc::c_void, 8) };
            if n <= 0 {
                break;
            }
        }
    }

    /// runs until `should_stop` reports true after a pass. each pass:
    /// drains the event bus, steps every ready task, builds the pollfd set
    /// from the rest, and blocks in `poll` until the earliest wait fires or
    /// the group's next timer deadline arrives, whichever is sooner.
    pub fn run(&mut self, should_stop: impl Fn() -> bool) {
        loop {
            self.drain_pending();
            self.group.bus.drain();
            self.wake_resting();
            {
                let mut timers = self.group.timers.lock().unwrap();
                timers.fire_due(Instant::now());
            }

            self.step_ready_tasks();

            if should_stop() {
                return;
            }

            let timeout = self.compute_timeout();
            if let Err(e) = self.poll_once(timeout) {
                warn!("poll() failed: {}", e);
            }
            self.drain_wakeup();
        }
    }

    /// moves every `Resting` task back to `Ready`. a resting task registers
    /// no fd/deadline wait for `poll_once` to resolve, so the only thing
    /// that can ever end its rest is the driver itself retrying it after
    /// the bus has had a chance to run whatever handler was meant to wake
    /// it (e.g. `check_auth`'s wait on a handler-written verdict). called
    /// once per pass, right after `bus.drain()`.
    fn wake_resting(&mut self) {
        for task in &mut self.tasks {
            if matches!(task.suspension, Suspension::Resting) {
                task.suspension = Suspension::Ready;
            }
        }
    }

    /// invokes `step()` on every task not currently blocked on a wait,
    /// removing any that reported `Exit`.
    fn step_ready_tasks(&mut self) {
        let mut i = 0;
        while i < self.tasks.len() {
            let ready = matches!(self.tasks[i].suspension, Suspension::Ready);
            if !ready {
                i += 1;
                continue;
            }
            match self.tasks[i].fsm.step() {
                FsmResult::Exit => {
                    self.tasks.remove(i);
                    continue;
                }
                FsmResult::Yield => self.tasks[i].suspension = Suspension::Ready,
                FsmResult::Rest => self.tasks[i].suspension = Suspension::Resting,
                FsmResult::Block(waits) => self.tasks[i].suspension = Suspension::Waiting(waits),
            }
            i += 1;
        }
    }

    /// the soonest of: a task's registered deadline wait, or the group's
    /// next scheduled timer. `None` means block indefinitely (nothing is
    /// waiting on a deadline, only on fds or external wakeups).
    ///
    /// a `Resting` task is the exception: `post()` does not touch
    /// `wakeup_fd`, so nothing would interrupt an indefinite (or
    /// long-deadline) `poll` to let `wake_resting` retry it once its
    /// handler has run. while any task is resting, the timeout is capped
    /// so the next pass (and its `bus.drain()`) comes around promptly.
    fn compute_timeout(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;

        for task in &self.tasks {
            if let Suspension::Waiting(waits) = &task.suspension {
                for wait in waits {
                    if let Wait::Deadline(deadline) = wait {
                        earliest = Some(earliest.map_or(*deadline, |e| e.min(*deadline)));
                    }
                }
            }
        }
        if let Some(next) = self.group.timers.lock().unwrap().next_deadline() {
            earliest = Some(earliest.map_or(next, |e| e.min(next)));
        }

        let mut timeout = earliest.map(|deadline| deadline.saturating_duration_since(now));
        if self.tasks.iter().any(|t| matches!(t.suspension, Suspension::Resting)) {
            const REST_RETRY: Duration = Duration::from_millis(20);
            timeout = Some(timeout.map_or(REST_RETRY, |t| t.min(REST_RETRY)));
        }
        timeout
    }

    /// blocks in `poll(2)` for at most `timeout` (forever if `None`),
    /// resolving whichever task(s) had a fd or deadline ready.
    fn poll_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let mut pollfds: Vec<libc::pollfd> = vec![libc::pollfd {
            fd: self.wakeup_fd,
            events: libc::POLLIN,
            revents: 0,
        }];

        // index into `self.tasks` for every pollfd after the wakeup fd, so
        // a fired revents can be mapped back to its owning task.
        let mut owners: Vec<usize> = vec![usize::MAX];

        for (idx, task) in self.tasks.iter().enumerate() {
            if let Suspension::Waiting(waits) = &task.suspension {
                for wait in waits {
                    if let Wait::Fd(fd, interest) = wait {
                        pollfds.push(libc::pollfd {
                            fd: *fd,
                            events: poll_events(*interest),
                            revents: 0,
                        });
                        owners.push(idx);
                    }
                }
            }
        }

        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };

        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        let now = Instant::now();
        let mut to_wake = Vec::new();
        for (i, pollfd) in pollfds.iter().enumerate().skip(1) {
            if pollfd.revents != 0 {
                to_wake.push(owners[i]);
            }
        }
        for (idx, task) in self.tasks.iter().enumerate() {
            if let Suspension::Waiting(waits) = &task.suspension {
                if waits.iter().any(|w| matches!(w, Wait::Deadline(d) if *d <= now)) {
                    to_wake.push(idx);
                }
            }
        }
        to_wake.sort_unstable();
        to_wake.dedup();
        for idx in to_wake {
            self.tasks[idx].suspension = Suspension::Ready;
        }
        Ok(())
    }
}

fn poll_events(interest: Interest) -> libc::c_short {
    match interest {
        Interest::Read => libc::POLLIN,
        Interest::Write => libc::POLLOUT,
        Interest::ReadWrite => libc::POLLIN | libc::POLLOUT,
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wakeup_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Disposition, Event};
    use std::sync::Mutex;

    struct CountToThree {
        count: Arc<Mutex<u32>>,
    }

    impl Fsm for CountToThree {
        fn step(&mut self) -> FsmResult {
            let mut count = self.count.lock().unwrap();
            *count += 1;
            if *count >= 3 {
                FsmResult::Exit
            } else {
                FsmResult::Yield
            }
        }
    }

    #[test]
    fn yielding_task_runs_to_exit_without_blocking() {
        let group = Group::new(0);
        let mut poll_loop = PollLoop::new(group).unwrap();
        let count = Arc::new(Mutex::new(0u32));
        poll_loop.spawn(Box::new(CountToThree { count: count.clone() }));

        poll_loop.run(|| *count.lock().unwrap() >= 3);
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn spawn_handle_enqueues_into_next_pass() {
        let group = Group::new(0);
        let mut poll_loop = PollLoop::new(group).unwrap();
        let handle = poll_loop.spawn_handle();
        let count = Arc::new(Mutex::new(0u32));
        let count2 = count.clone();
        handle.spawn(Box::new(CountToThree { count: count2 }));

        poll_loop.run(|| *count.lock().unwrap() >= 3);
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn wakeup_handle_interrupts_a_blocked_poll() {
        let group = Group::new(0);
        let mut poll_loop = PollLoop::new(group).unwrap();
        let handle = poll_loop.wakeup_handle();

        let woke = Arc::new(Mutex::new(false));
        let woke2 = woke.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.wake();
            *woke2.lock().unwrap() = true;
        });

        poll_loop.run(|| *woke.lock().unwrap());
    }

    /// a `Rest`ing task (the `check_auth` shape: post an event, then wait
    /// for a handler to write a result somewhere) must eventually get
    /// re-stepped on its own, with no fd or deadline wait registered for
    /// it. without `wake_resting` this would spin forever.
    struct WaitsOnBusHandler {
        bus: Arc<EventBus>,
        posted: bool,
        woken: Arc<Mutex<bool>>,
        done: Arc<Mutex<bool>>,
    }

    impl Fsm for WaitsOnBusHandler {
        fn step(&mut self) -> FsmResult {
            if !self.posted {
                self.posted = true;
                let woken = self.woken.clone();
                self.bus.register_handler("shutdown", 0, move |_event| {
                    *woken.lock().unwrap() = true;
                    Disposition::Continue
                });
                self.bus.post(Event::Shutdown);
                return FsmResult::Rest;
            }
            if *self.woken.lock().unwrap() {
                *self.done.lock().unwrap() = true;
                FsmResult::Exit
            } else {
                FsmResult::Rest
            }
        }
    }

    #[test]
    fn resting_task_is_rewoken_once_its_handler_runs() {
        let group = Group::new(0);
        let bus = group.bus.clone();
        let mut poll_loop = PollLoop::new(group).unwrap();

        let done = Arc::new(Mutex::new(false));
        poll_loop.spawn(Box::new(WaitsOnBusHandler {
            bus,
            posted: false,
            woken: Arc::new(Mutex::new(false)),
            done: done.clone(),
        }));

        poll_loop.run(|| *done.lock().unwrap());
        assert!(*done.lock().unwrap());
    }
}
