//! the controller: binds a listening socket, runs every accepted switch's
//! handshake and steady-state connection as cooperative tasks on one
//! [`Group`]/[`PollLoop`], and drives the reactor until a signal asks it to
//! stop. [`command`] is the outbound surface handlers call back through.

pub mod command;

use std::io;
use std::net::{TcpListener, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::connection::{Connection, ConnectionHandle, ConnState};
use super::datapath_id::DatapathId;
use super::ds;
use super::event::{Event, EventBus};
use super::handshake::{AllowAll, Authorizer, HandshakeFsm, Role};
use super::poll::{PollLoop, SpawnHandle};
use super::registry::Registry;
use super::scheduler::{Fsm, FsmResult, Group, Interest, Wait};
use super::signals::{self, SignalIntake};

/// ties together the registry, event bus and poll loop group, and owns the
/// listening socket. constructed once at startup; `run` does not return
/// until the process is asked to shut down.
pub struct Controller {
    registry: Arc<Registry>,
    authorizer: Arc<dyn Authorizer>,
    listener_timeout: Duration,
}

impl Default for Controller {
    fn default() -> Self {
        Controller::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Controller {
            registry: Arc::new(Registry::new()),
            authorizer: Arc::new(AllowAll),
            listener_timeout: Role::Listener.default_timeout(),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_listener_timeout(mut self, timeout: Duration) -> Self {
        self.listener_timeout = timeout;
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// binds `addr`, accepts switches onto a single cooperative group, and
    /// runs the reactor until the shutdown handler terminates the process.
    /// `install_handlers` runs once against the group's bus before the
    /// accept loop starts, so application code can register its own
    /// handlers ahead of the first event.
    pub fn run<A, F>(&self, addr: A, install_handlers: F) -> io::Result<()>
    where
        A: ToSocketAddrs,
        F: FnOnce(&Arc<EventBus>),
    {
        let group = Group::new(0);
        let mut poll_loop = PollLoop::new(group.clone())?;
        install_handlers(&group.bus);
        signals::register_exit_handler(&group.bus);

        let signal_intake = SignalIntake::new().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        poll_loop.spawn(Box::new(SignalTask { intake: signal_intake, bus: group.bus.clone() }));

        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!("listening on {:?}", listener.local_addr());

        poll_loop.spawn(Box::new(AcceptTask {
            listener,
            bus: poll_loop.bus(),
            registry: self.registry.clone(),
            authorizer: self.authorizer.clone(),
            timeout: self.listener_timeout,
            spawn_handle: poll_loop.spawn_handle(),
        }));

        poll_loop.run(|| false);
        Ok(())
    }
}

/// drains the signalfd and posts `Shutdown` at most once; registered as an
/// ordinary task so the signal group shares the same reactor as every
/// connection rather than needing its own thread.
struct SignalTask {
    intake: SignalIntake,
    bus: Arc<EventBus>,
}

impl Fsm for SignalTask {
    fn step(&mut self) -> FsmResult {
        self.intake.drain_and_post(&self.bus);
        FsmResult::Block(vec![Wait::fd_wait(self.intake.as_raw_fd(), Interest::Read)])
    }
}

/// accepts incoming switches non-blocking and hands each one off as a
/// [`ConnectionLifecycle`] task via the loop's [`SpawnHandle`]; this task
/// itself never blocks on anything but the listening socket's readability.
struct AcceptTask {
    listener: TcpListener,
    bus: Arc<EventBus>,
    registry: Arc<Registry>,
    authorizer: Arc<dyn Authorizer>,
    timeout: Duration,
    spawn_handle: SpawnHandle,
}

impl Fsm for AcceptTask {
    fn step(&mut self) -> FsmResult {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("accepted connection from {:?}", peer);
                    match Connection::new(stream) {
                        Ok(conn) => {
                            let handle = ConnectionHandle::new(conn);
                            let handshake = HandshakeFsm::new(
                                handle.clone(),
                                self.bus.clone(),
                                self.registry.clone(),
                                self.authorizer.clone(),
                                self.timeout,
                            );
                            self.spawn_handle.spawn(Box::new(ConnectionLifecycle {
                                conn: handle,
                                bus: self.bus.clone(),
                                registry: self.registry.clone(),
                                stage: Stage::Handshaking(handshake),
                            }));
                        }
                        Err(e) => warn!("failed to set up accepted connection: {}", e),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept() failed: {}", e);
                    break;
                }
            }
        }
        FsmResult::Block(vec![Wait::fd_wait(self.listener.as_raw_fd(), Interest::Read)])
    }
}

enum Stage {
    Handshaking(HandshakeFsm),
    Steady(SteadyTask),
    Done,
}

/// one accepted connection's whole lifetime as a single task: it runs the
/// handshake to completion, then (on success) transitions in place to
/// steady-state dispatch, matching the "transition to change run function"
/// FSM primitive rather than spawning a second task for the same socket.
struct ConnectionLifecycle {
    conn: ConnectionHandle,
    bus: Arc<EventBus>,
    registry: Arc<Registry>,
    stage: Stage,
}

impl Fsm for ConnectionLifecycle {
    fn step(&mut self) -> FsmResult {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Handshaking(mut handshake) => match handshake.step() {
                FsmResult::Exit => {
                    if handshake.outcome() == Some(0) {
                        let dpid = self.conn.dpid().unwrap_or_else(|| DatapathId::new(0));
                        let mgmt_id = self.conn.mgmt_id();
                        self.stage = Stage::Steady(SteadyTask::new(
                            self.conn.clone(),
                            self.bus.clone(),
                            self.registry.clone(),
                            dpid,
                            mgmt_id,
                        ));
                        FsmResult::Yield
                    } else {
                        FsmResult::Exit
                    }
                }
                other => {
                    self.stage = Stage::Handshaking(handshake);
                    other
                }
            },
            Stage::Steady(mut steady) => {
                let result = steady.step();
                self.stage = Stage::Steady(steady);
                result
            }
            Stage::Done => FsmResult::Exit,
        }
    }
}

/// steady-state dispatch for one registered connection: pumps
/// `Connection::poll_read`, posts whatever events it produces, flushes the
/// write queue, and drives the idle-probe/disconnect transitions from
/// §4.3. on exit, removes this connection's registry entries if they still
/// point at it (a second connection claiming the same dpid will have
/// already displaced them, in which case cleanup here is a no-op).
struct SteadyTask {
    conn: ConnectionHandle,
    bus: Arc<EventBus>,
    registry: Arc<Registry>,
    dpid: DatapathId,
    mgmt_id: Option<DatapathId>,
    probing_since: Option<Instant>,
}

impl SteadyTask {
    fn new(
        conn: ConnectionHandle,
        bus: Arc<EventBus>,
        registry: Arc<Registry>,
        dpid: DatapathId,
        mgmt_id: Option<DatapathId>,
    ) -> Self {
        SteadyTask {
            conn,
            bus,
            registry,
            dpid,
            mgmt_id,
            probing_since: None,
        }
    }

    fn check_idle(&mut self) {
        let (state, last_activity, probe_interval) =
            self.conn.with(|c| (c.state, c.last_activity, c.probe_interval));
        match state {
            ConnState::Connected => {
                if last_activity.elapsed() >= probe_interval {
                    let xid = self.conn.with(|c| c.next_xid());
                    let _ = self
                        .conn
                        .with(|c| c.send_msg(ds::OfMsg::new(xid, ds::OfPayload::EchoRequest(Vec::new()))));
                    self.conn.with(|c| c.state = ConnState::Idle);
                    self.probing_since = Some(Instant::now());
                }
            }
            ConnState::Idle => {
                if let Some(since) = self.probing_since {
                    if last_activity > since {
                        self.conn.with(|c| c.state = ConnState::Connected);
                        self.probing_since = None;
                    } else if since.elapsed() >= probe_interval {
                        warn!("connection {} unresponsive to echo probe, dropping", self.conn.id());
                        self.conn.with(|c| c.state = ConnState::Disconnected);
                    }
                }
            }
            _ => {}
        }
    }

    fn cleanup(&self) {
        if self.registry.lookup_dpid(self.dpid).map(|h| h.id()) == Some(self.conn.id()) {
            self.registry.remove_dpid(self.dpid);
            self.bus.post(Event::DatapathLeave { dpid: self.dpid });
        }
        if let Some(mgmt_id) = self.mgmt_id {
            if self.registry.mgmt_for_dpid(self.dpid) == Some(mgmt_id) {
                self.registry.remove_switch_mgr(mgmt_id);
                self.bus.post(Event::SwitchMgrLeave { mgmt_id });
            }
        }
    }
}

impl Fsm for SteadyTask {
    fn step(&mut self) -> FsmResult {
        if self.conn.with(|c| c.state == ConnState::Disconnected) {
            self.cleanup();
            return FsmResult::Exit;
        }

        match self.conn.with(|c| c.poll_read(Some(self.dpid))) {
            Ok(events) => {
                for event in events {
                    self.bus.post(event);
                }
            }
            Err(e) => {
                warn!("connection {} closed: {}", self.conn.id(), e);
                self.conn.close();
                self.cleanup();
                return FsmResult::Exit;
            }
        }

        if self.conn.with(|c| c.state == ConnState::Disconnected) {
            self.cleanup();
            return FsmResult::Exit;
        }

        let _ = self.conn.with(|c| c.flush());
        self.check_idle();

        let (fd, writable) = self.conn.with(|c| (c.as_raw_fd(), c.has_pending_writes()));
        let interest = if writable { Interest::ReadWrite } else { Interest::Read };
        let probe_deadline = Instant::now() + self.conn.with(|c| c.probe_interval);
        FsmResult::Block(vec![Wait::fd_wait(fd, interest), Wait::timer_wait(probe_deadline)])
    }
}
