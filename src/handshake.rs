//! the per-connection handshake: HELLO/FEATURES/CONFIG exchange, the
//! optional Nicira management capability branch, a pluggable authorization
//! check, and registry insertion. runs as one [`Fsm`] per accepted or
//! connected socket, ahead of [`crate::connection::Connection`]'s
//! steady-state event dispatch; it owns its own extended-data reassembly
//! buffer rather than sharing the connection's, since the connection isn't
//! considered live (and isn't in the registry) until this finishes.

use std::convert::TryFrom;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::cfg::Cfg;
use super::codec;
use super::connection::{self, ConnectionHandle};
use super::datapath_id::DatapathId;
use super::ds;
use super::err::*;
use super::event::{Disposition, Event, EventBus};
use super::registry::Registry;
use super::scheduler::{Fsm, FsmResult, Interest, Wait};
use super::switch_mgr::SwitchMgr;

/// miss_send_len advertised in the SET_CONFIG sent during the handshake;
/// matches the OpenFlow 1.0 default rather than asking for full packets.
const DEFAULT_MISS_SEND_LEN: u16 = 128;

/// which side of the TCP connection this endpoint is, purely to pick a
/// sensible default timeout: a connector dialed out to a known switch and
/// can afford to wait; a listener accepting an unknown peer cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Connector,
    Listener,
}

impl Role {
    pub fn default_timeout(self) -> Duration {
        match self {
            Role::Connector => Duration::from_secs(60),
            Role::Listener => Duration::from_secs(5),
        }
    }
}

/// decides whether a connection that has completed the protocol exchange is
/// allowed to register. must deliver its verdict through the event bus
/// rather than returning it directly, so a synchronous implementation can't
/// accidentally re-enter the FSM mid-`step`.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, connection_id: u64, identity: DatapathId, bus: Arc<EventBus>);
}

/// the default policy: approve everything. still round-trips through the
/// bus like any other authorizer, so there is exactly one code path for
/// collecting a verdict regardless of which authorizer is installed.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, connection_id: u64, _identity: DatapathId, bus: Arc<EventBus>) {
        bus.post(Event::AuthVerdict {
            connection_id,
            approved: true,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SendHello,
    RecvHello,
    SendFeaturesReq,
    SendConfig,
    RecvFeaturesReply,
    SendMgmtCapabilityReq,
    RecvMgmtCapabilityReply,
    SendMgmtResourcesReq,
    RecvMgmtResourcesUpdate,
    SendMgmtConfigReq,
    RecvMgmtConfigUpdate,
    CheckMgmtAuth,
    RegisterMgmt,
    CheckSwitchAuth,
    RegisterSwitch,
}

/// one incoming or outgoing OFMP frame once reassembly (if any) has
/// completed, distinguishing a bare OpenFlow ERROR (the switch rejecting the
/// vendor extension outright) from a parsed OFMP message.
enum HandshakeFrame {
    OpenflowError,
    Ofmp(u32, ds::vendor::OfmpMsg),
}

/// drives one connection from raw socket to registered switch (or
/// management endpoint). a single absolute deadline covers the whole
/// exchange rather than resetting per step; simpler than per-state timeouts
/// and sufficient for the timeout behavior this needs to guarantee.
pub struct HandshakeFsm {
    conn: ConnectionHandle,
    bus: Arc<EventBus>,
    registry: Arc<Registry>,
    authorizer: Arc<dyn Authorizer>,
    state: State,
    deadline: Instant,
    xid_features: u32,
    features: Option<ds::features::SwitchFeatures>,
    dpid: Option<DatapathId>,
    mgmt_id: Option<DatapathId>,
    capabilities: Option<Cfg>,
    resources: Option<ds::vendor::ResourcesUpdate>,
    initial_cfg: Option<Cfg>,
    reassembly: Option<codec::Reassembly>,
    auth_result: Arc<Mutex<Option<bool>>>,
    auth_registered: bool,
    outcome: Option<i32>,
}

impl HandshakeFsm {
    pub fn new(
        conn: ConnectionHandle,
        bus: Arc<EventBus>,
        registry: Arc<Registry>,
        authorizer: Arc<dyn Authorizer>,
        timeout: Duration,
    ) -> Self {
        HandshakeFsm {
            conn,
            bus,
            registry,
            authorizer,
            state: State::SendHello,
            deadline: Instant::now() + timeout,
            xid_features: 0,
            features: None,
            dpid: None,
            mgmt_id: None,
            capabilities: None,
            resources: None,
            initial_cfg: None,
            reassembly: None,
            auth_result: Arc::new(Mutex::new(None)),
            auth_registered: false,
            outcome: None,
        }
    }

    /// `Some(0)` on success, `Some(errno)` on failure, `None` while still
    /// running.
    pub fn outcome(&self) -> Option<i32> {
        self.outcome
    }

    fn timed_out(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn wait_for_read(&self) -> FsmResult {
        let fd = self.conn.with(|c| c.as_raw_fd());
        FsmResult::Block(vec![Wait::fd_wait(fd, Interest::Read), Wait::timer_wait(self.deadline)])
    }

    fn fail(&mut self, errno: i32, msg: &str) -> FsmResult {
        warn!("handshake for connection {} failed: {} (errno {})", self.conn.id(), msg, errno);
        self.conn.close();
        self.outcome = Some(errno);
        FsmResult::Exit
    }

    fn try_read(&mut self) -> Result<Option<(ds::Header, Vec<u8>)>> {
        self.conn.with(|c| c.try_recv_raw())
    }

    /// reads one frame and, if it's a VENDOR/OFMP message whose reassembly
    /// is still pending, returns `Ok(None)` the same as "nothing readable
    /// yet" — the caller re-invokes on the next wakeup either way.
    fn try_recv_ofmp(&mut self) -> Result<Option<HandshakeFrame>> {
        let (header, body) = match self.try_read()? {
            Some(pair) => pair,
            None => return Ok(None),
        };
        if *header.ttype() == ds::Type::Error {
            return Ok(Some(HandshakeFrame::OpenflowError));
        }
        if *header.ttype() != ds::Type::Vendor {
            warn!("handshake expected VENDOR or ERROR, got {:?}; ignoring", header.ttype());
            return Ok(None);
        }
        let vendor = ds::vendor::VendorData::try_from(&body[..])?;
        let ofmp = match vendor.as_ofmp() {
            Some(parsed) => parsed?,
            None => {
                warn!("handshake dropping VENDOR message from unrecognized vendor/subtype");
                return Ok(None);
            }
        };
        let xid = *header.xid();
        match ofmp {
            ds::vendor::OfmpMsg::ExtendedData(fragment) => {
                match codec::feed_extended_data(&mut self.reassembly, xid, fragment)? {
                    codec::FeedResult::Pending => Ok(None),
                    codec::FeedResult::Complete { buf, .. } => {
                        let inner = ds::vendor::OfmpMsg::try_from(&buf[..])?;
                        Ok(Some(HandshakeFrame::Ofmp(xid, inner)))
                    }
                }
            }
            other => Ok(Some(HandshakeFrame::Ofmp(xid, other))),
        }
    }

    /// common tail of `CheckMgmtAuth`/`CheckSwitchAuth`: registers the
    /// verdict handler at most once, then polls the shared slot a handler
    /// writes into. `Rest` rather than `Block` while waiting, since there's
    /// no fd or deadline to wait on — only the bus event waking this task.
    fn check_auth(&mut self, identity: DatapathId, next: State) -> FsmResult {
        if !self.auth_registered {
            self.register_auth_handler();
            self.authorizer.authorize(self.conn.id(), identity, self.bus.clone());
        }
        let verdict = *self.auth_result.lock().unwrap();
        match verdict {
            Some(true) => {
                self.state = next;
                FsmResult::Yield
            }
            Some(false) => self.fail(libc::EPERM, "registration denied by authorizer"),
            None => FsmResult::Rest,
        }
    }

    fn register_auth_handler(&mut self) {
        let result = self.auth_result.clone();
        let my_id = self.conn.id();
        self.bus.register_handler("auth-verdict", 0, move |event| {
            if let Event::AuthVerdict { connection_id, approved } = event {
                if *connection_id == my_id {
                    *result.lock().unwrap() = Some(*approved);
                }
            }
            Disposition::Continue
        });
        self.auth_registered = true;
    }

    /// shared by both registration outcomes: claim the dpid in the
    /// registry (displacing and closing whoever held it, posting
    /// `DatapathLeave` before this function returns so the caller's
    /// `DatapathJoin`/`SwitchMgrJoin` always comes after it), record the
    /// mgmt mapping if known, and clear the switch's boot-time flow table.
    fn finalize_registration(&mut self) {
        let dpid = self.dpid.unwrap();
        if let Some(old) = self.registry.insert_dpid(dpid, self.conn.clone()) {
            old.close();
            self.bus.post(Event::DatapathLeave { dpid });
        }
        if let Some(mgmt_id) = self.mgmt_id {
            self.registry.insert_dpid_mgmt(dpid, mgmt_id);
        }
        let xid = self.conn.with(|c| c.next_xid());
        let delete = connection::wildcard_flow_delete(xid, 0, 0);
        let _ = self.conn.with(|c| c.send_msg(delete));
    }
}

impl Fsm for HandshakeFsm {
    fn step(&mut self) -> FsmResult {
        match self.state {
            State::SendHello => {
                let xid = self.conn.with(|c| c.next_xid());
                let msg = ds::OfMsg::new(xid, ds::OfPayload::Hello(Vec::new()));
                if self.conn.with(|c| c.send_msg(msg)).is_err() {
                    return self.fail(libc::EPROTO, "failed to send HELLO");
                }
                self.state = State::RecvHello;
                FsmResult::Yield
            }

            State::RecvHello => {
                if self.timed_out() {
                    return self.fail(libc::ETIMEDOUT, "timed out waiting for HELLO");
                }
                match self.try_read() {
                    Ok(Some((header, _body))) => {
                        if *header.ttype() != ds::Type::Hello {
                            return self.fail(libc::EPROTO, "expected HELLO");
                        }
                        // version negotiation is already enforced below this
                        // layer: `ds::Header::try_from` rejects anything but
                        // the one version this core speaks, so reaching here
                        // at all is the negotiation succeeding.
                        self.state = State::SendFeaturesReq;
                        FsmResult::Yield
                    }
                    Ok(None) => self.wait_for_read(),
                    Err(_) => self.fail(libc::EPROTO, "malformed frame while awaiting HELLO"),
                }
            }

            State::SendFeaturesReq => {
                let xid = self.conn.with(|c| c.next_xid());
                self.xid_features = xid;
                let msg = ds::OfMsg::new(xid, ds::OfPayload::FeaturesRequest);
                if self.conn.with(|c| c.send_msg(msg)).is_err() {
                    return self.fail(libc::EPROTO, "failed to send FEATURES_REQUEST");
                }
                self.state = State::SendConfig;
                FsmResult::Yield
            }

            State::SendConfig => {
                let xid = self.conn.with(|c| c.next_xid());
                let config = ds::switch_config::SwitchConfig {
                    flags: ds::switch_config::ConfigFlags::empty(),
                    miss_send_len: DEFAULT_MISS_SEND_LEN,
                };
                let msg = ds::OfMsg::new(xid, ds::OfPayload::SetConfig(config));
                if self.conn.with(|c| c.send_msg(msg)).is_err() {
                    return self.fail(libc::EPROTO, "failed to send SET_CONFIG");
                }
                self.state = State::RecvFeaturesReply;
                FsmResult::Yield
            }

            State::RecvFeaturesReply => {
                if self.timed_out() {
                    return self.fail(libc::ETIMEDOUT, "timed out waiting for FEATURES_REPLY");
                }
                match self.try_read() {
                    Ok(Some((header, body))) => {
                        if *header.ttype() != ds::Type::FeaturesReply || *header.xid() != self.xid_features {
                            warn!("expected FEATURES_REPLY, got {:?}; ignoring", header.ttype());
                            return FsmResult::Yield;
                        }
                        let features = match ds::features::SwitchFeatures::try_from(&body[..]) {
                            Ok(f) => f,
                            Err(_) => return self.fail(libc::EPROTO, "malformed FEATURES_REPLY"),
                        };
                        let dpid = DatapathId::new(features.datapath_id);
                        if dpid.is_zero() {
                            return self.fail(libc::EINVAL, "FEATURES_REPLY carried datapath id 0");
                        }
                        self.dpid = Some(dpid);
                        self.features = Some(features);
                        self.state = State::SendMgmtCapabilityReq;
                        FsmResult::Yield
                    }
                    Ok(None) => self.wait_for_read(),
                    Err(_) => self.fail(libc::EPROTO, "malformed frame while awaiting FEATURES_REPLY"),
                }
            }

            State::SendMgmtCapabilityReq => {
                let xid = self.conn.with(|c| c.next_xid());
                let sent = self.conn.with(|c| c.send_ofmp(xid, ds::vendor::OfmpMsg::CapabilityRequest));
                if sent.is_err() {
                    return self.fail(libc::EPROTO, "failed to send CAPABILITY_REQUEST");
                }
                self.state = State::RecvMgmtCapabilityReply;
                FsmResult::Yield
            }

            State::RecvMgmtCapabilityReply => {
                if self.timed_out() {
                    return self.fail(libc::ETIMEDOUT, "timed out waiting for CAPABILITY_REPLY");
                }
                match self.try_recv_ofmp() {
                    Ok(Some(HandshakeFrame::OpenflowError)) => {
                        // the switch doesn't understand the vendor extension
                        // at all; treat it as a plain, non-management switch.
                        self.state = State::CheckSwitchAuth;
                        FsmResult::Yield
                    }
                    Ok(Some(HandshakeFrame::Ofmp(_, ds::vendor::OfmpMsg::CapabilityReply(cfg)))) => {
                        let mgmt_capable = cfg.get_bool("com.nicira.mgmt.manager", 0).unwrap_or(false);
                        if !mgmt_capable {
                            self.state = State::CheckSwitchAuth;
                            return FsmResult::Yield;
                        }
                        let mgmt_id = match cfg.get_int("com.nicira.mgmt.id", 0) {
                            Some(raw) => DatapathId::new(raw as u64),
                            None => {
                                return self.fail(libc::EPROTO, "mgmt capable reply missing com.nicira.mgmt.id")
                            }
                        };
                        self.mgmt_id = Some(mgmt_id);
                        self.capabilities = Some(cfg);
                        self.state = State::SendMgmtResourcesReq;
                        FsmResult::Yield
                    }
                    Ok(Some(HandshakeFrame::Ofmp(_, other))) => {
                        warn!("expected CAPABILITY_REPLY, got {:?}; ignoring", other.ofmp_type());
                        FsmResult::Yield
                    }
                    Ok(None) => self.wait_for_read(),
                    Err(_) => self.fail(libc::EPROTO, "malformed frame while awaiting CAPABILITY_REPLY"),
                }
            }

            State::SendMgmtResourcesReq => {
                let xid = self.conn.with(|c| c.next_xid());
                let sent = self.conn.with(|c| c.send_ofmp(xid, ds::vendor::OfmpMsg::ResourcesRequest));
                if sent.is_err() {
                    return self.fail(libc::EPROTO, "failed to send RESOURCES_REQUEST");
                }
                self.state = State::RecvMgmtResourcesUpdate;
                FsmResult::Yield
            }

            State::RecvMgmtResourcesUpdate => {
                if self.timed_out() {
                    return self.fail(libc::ETIMEDOUT, "timed out waiting for RESOURCES_UPDATE");
                }
                match self.try_recv_ofmp() {
                    Ok(Some(HandshakeFrame::Ofmp(_, ds::vendor::OfmpMsg::ResourcesUpdate(update)))) => {
                        self.resources = Some(update);
                        self.state = State::SendMgmtConfigReq;
                        FsmResult::Yield
                    }
                    Ok(Some(HandshakeFrame::Ofmp(_, other))) => {
                        warn!("expected RESOURCES_UPDATE, got {:?}; ignoring", other.ofmp_type());
                        FsmResult::Yield
                    }
                    Ok(Some(HandshakeFrame::OpenflowError)) => {
                        self.fail(libc::EPROTO, "switch errored on RESOURCES_REQUEST")
                    }
                    Ok(None) => self.wait_for_read(),
                    Err(_) => self.fail(libc::EPROTO, "malformed frame while awaiting RESOURCES_UPDATE"),
                }
            }

            State::SendMgmtConfigReq => {
                let xid = self.conn.with(|c| c.next_xid());
                let sent = self.conn.with(|c| c.send_ofmp(xid, ds::vendor::OfmpMsg::ConfigRequest));
                if sent.is_err() {
                    return self.fail(libc::EPROTO, "failed to send CONFIG_REQUEST");
                }
                self.state = State::RecvMgmtConfigUpdate;
                FsmResult::Yield
            }

            State::RecvMgmtConfigUpdate => {
                if self.timed_out() {
                    return self.fail(libc::ETIMEDOUT, "timed out waiting for initial CONFIG_UPDATE");
                }
                match self.try_recv_ofmp() {
                    Ok(Some(HandshakeFrame::Ofmp(_, ds::vendor::OfmpMsg::ConfigUpdate(update)))) => {
                        self.initial_cfg = Some(update.cfg);
                        self.state = State::CheckMgmtAuth;
                        FsmResult::Yield
                    }
                    Ok(Some(HandshakeFrame::Ofmp(_, other))) => {
                        warn!("expected CONFIG_UPDATE, got {:?}; ignoring", other.ofmp_type());
                        FsmResult::Yield
                    }
                    Ok(Some(HandshakeFrame::OpenflowError)) => {
                        self.fail(libc::EPROTO, "switch errored on CONFIG_REQUEST")
                    }
                    Ok(None) => self.wait_for_read(),
                    Err(_) => self.fail(libc::EPROTO, "malformed frame while awaiting initial CONFIG_UPDATE"),
                }
            }

            State::CheckMgmtAuth => {
                let mgmt_id = self.mgmt_id.unwrap();
                self.check_auth(mgmt_id, State::RegisterMgmt)
            }

            State::RegisterMgmt => {
                let mgmt_id = self.mgmt_id.unwrap();
                let capabilities = self.capabilities.clone().unwrap_or_else(Cfg::new);
                let initial_cfg = self.initial_cfg.clone().unwrap_or_else(Cfg::new);
                let mut mgr = SwitchMgr::new(capabilities, initial_cfg);
                if let Some(resources) = self.resources.clone() {
                    mgr.apply_resources_update(mgmt_id, resources);
                }
                self.registry.insert_switch_mgr(mgmt_id, Arc::new(Mutex::new(mgr)));
                self.finalize_registration();
                self.bus.post(Event::SwitchMgrJoin { mgmt_id });
                self.outcome = Some(0);
                FsmResult::Exit
            }

            State::CheckSwitchAuth => {
                let dpid = self.dpid.unwrap();
                self.check_auth(dpid, State::RegisterSwitch)
            }

            State::RegisterSwitch => {
                self.finalize_registration();
                let dpid = self.dpid.unwrap();
                let features = self.features.clone().unwrap();
                self.bus.post(Event::DatapathJoin { dpid, features });
                self.outcome = Some(0);
                FsmResult::Exit
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::loopback_pair;
    use crate::connection::Connection;
    use std::io::{Read, Write};
    use std::thread;

    /// steps `fsm` to completion, pumping its bus between steps so that a
    /// `Rest`-while-waiting-on-a-handler state (e.g. `check_auth` awaiting
    /// the `auth-verdict` a handler writes) actually gets unblocked, the
    /// same way `PollLoop::run` drains the bus once per pass.
    fn drive_to_exit(fsm: &mut HandshakeFsm, budget: Duration) {
        let start = Instant::now();
        loop {
            fsm.bus.drain();
            if let FsmResult::Exit = fsm.step() {
                return;
            }
            if Instant::now().duration_since(start) > budget {
                panic!("handshake did not reach a terminal state in time");
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn read_frame(stream: &mut std::net::TcpStream) -> (ds::Header, Vec<u8>) {
        let mut header_bytes = [0u8; ds::HEADER_LENGTH];
        stream.read_exact(&mut header_bytes).unwrap();
        let header = ds::Header::try_from(&header_bytes[..]).unwrap();
        let body_len = *header.length() as usize - ds::HEADER_LENGTH;
        let mut body = vec![0u8; body_len];
        stream.read_exact(&mut body).unwrap();
        (header, body)
    }

    fn write_msg(stream: &mut std::net::TcpStream, msg: ds::OfMsg) {
        let bytes: Vec<u8> = msg.into();
        stream.write_all(&bytes).unwrap();
    }

    #[test]
    fn basic_join_registers_datapath_and_posts_join() {
        let (controller_side, mut switch_side) = loopback_pair();
        switch_side.set_nonblocking(false).unwrap();

        let conn = ConnectionHandle::new(Connection::new(controller_side).unwrap());
        let bus = EventBus::new();
        let registry = Arc::new(Registry::new());

        let joined = Arc::new(Mutex::new(None));
        let joined2 = joined.clone();
        bus.register_handler("datapath-join", 0, move |event| {
            if let Event::DatapathJoin { dpid, .. } = event {
                *joined2.lock().unwrap() = Some(*dpid);
            }
            Disposition::Continue
        });

        let switch_thread = thread::spawn(move || {
            read_frame(&mut switch_side); // HELLO
            write_msg(&mut switch_side, ds::OfMsg::new(1, ds::OfPayload::Hello(Vec::new())));

            read_frame(&mut switch_side); // FEATURES_REQUEST
            read_frame(&mut switch_side); // SET_CONFIG

            let features = ds::features::SwitchFeatures {
                datapath_id: 1,
                n_buffers: 256,
                n_tables: 1,
                capabilities: ds::features::Capabilities::empty(),
                actions: ds::features::SupportedActions::empty(),
                ports: Vec::new(),
            };
            write_msg(&mut switch_side, ds::OfMsg::new(2, ds::OfPayload::FeaturesReply(features)));

            let (_header, _body) = read_frame(&mut switch_side); // CAPABILITY_REQUEST
            let error = ds::error_msg::ErrorMsg {
                etype: ds::error_msg::ErrorType::BadRequest,
                code: 0,
                data: Vec::new(),
            };
            write_msg(&mut switch_side, ds::OfMsg::new(3, ds::OfPayload::Error(error)));

            read_frame(&mut switch_side) // the wildcard FLOW_MOD/DELETE
        });

        let mut fsm = HandshakeFsm::new(conn, bus, registry.clone(), Arc::new(AllowAll), Duration::from_secs(5));
        drive_to_exit(&mut fsm, Duration::from_secs(5));

        let (header, body) = switch_thread.join().unwrap();
        assert_eq!(*header.ttype(), ds::Type::FlowMod);
        let flow_mod = ds::flow_mod::FlowMod::try_from(&body[..]).unwrap();
        assert_eq!(flow_mod.command, ds::flow_mod::FlowModCommand::Delete);

        assert_eq!(fsm.outcome(), Some(0));
        assert_eq!(*joined.lock().unwrap(), Some(DatapathId::new(1)));
        assert_eq!(registry.lookup_dpid(DatapathId::new(1)).map(|c| c.id()), Some(fsm.conn.id()));
    }

    #[test]
    fn handshake_times_out_without_hello() {
        let (controller_side, _switch_side) = loopback_pair();
        let conn = ConnectionHandle::new(Connection::new(controller_side).unwrap());
        let bus = EventBus::new();
        let registry = Arc::new(Registry::new());

        let mut fsm = HandshakeFsm::new(conn, bus, registry, Arc::new(AllowAll), Duration::from_millis(50));
        // SendHello, then RecvHello should observe the deadline passing.
        assert!(matches!(fsm.step(), FsmResult::Yield));
        thread::sleep(Duration::from_millis(60));
        loop {
            match fsm.step() {
                FsmResult::Exit => break,
                FsmResult::Block(_) => continue,
                other => panic!("unexpected result while timing out: {:?}", std::mem::discriminant(&other)),
            }
        }
        assert_eq!(fsm.outcome(), Some(libc::ETIMEDOUT));
    }
}
