//! one switch connection: send/receive buffers, the steady-state state
//! machine, extended-data reassembly, and the outbound command primitives
//! exposed to handlers.

use std::collections::VecDeque;
use std::convert::TryFrom;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::codec::{self, Reassembly};
use super::datapath_id::DatapathId;
use super::ds;
use super::err::*;
use super::event::Event;

/// how long a connection may sit without switch activity before the core
/// probes it with an echo request; 15s, as recommended.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// the per-connection state machine driving send/receive, independent FSMs
/// over a shared transport. `SendHello`/`RecvHello` straddle the version
/// negotiation; everything after `Connected` is steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    SendHello,
    RecvHello,
    Connected,
    Idle,
    SendError,
    Disconnected,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// one switch's connection: owns the transport exclusively, buffers partial
/// reads/writes, and tracks the handshake-derived identity once learned.
pub struct Connection {
    id: u64,
    stream: TcpStream,
    pub dpid: Option<DatapathId>,
    pub mgmt_id: Option<DatapathId>,
    pub version: Option<u8>,
    pub state: ConnState,
    read_buf: Vec<u8>,
    write_queue: VecDeque<Vec<u8>>,
    reassembly: Option<Reassembly>,
    next_xid: u32,
    pub last_activity: Instant,
    pub probe_interval: Duration,
}

impl Connection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            dpid: None,
            mgmt_id: None,
            version: None,
            state: ConnState::Connecting,
            read_buf: Vec::new(),
            write_queue: VecDeque::new(),
            reassembly: None,
            next_xid: 1,
            last_activity: Instant::now(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// a monotonically increasing outbound transaction id.
    pub fn next_xid(&mut self) -> u32 {
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        xid
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.write_queue.is_empty()
    }

    /// enqueues `msg` for sending and attempts an immediate, non-blocking
    /// flush. if the socket isn't write-ready the bytes stay queued for the
    /// poll loop's next writable wakeup.
    pub fn send_msg(&mut self, msg: ds::OfMsg) -> io::Result<()> {
        let bytes: Vec<u8> = msg.into();
        self.write_queue.push_back(bytes);
        self.flush()
    }

    /// drains as much of the write queue as the socket accepts right now.
    /// returns `Ok(())` with bytes still queued on `WouldBlock`; any other
    /// error is connection-fatal.
    pub fn flush(&mut self) -> io::Result<()> {
        while let Some(front) = self.write_queue.front_mut() {
            match self.stream.write(front) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed on write"));
                }
                Ok(n) if n == front.len() => {
                    self.write_queue.pop_front();
                }
                Ok(n) => {
                    front.drain(0..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// reads whatever is available non-blocking, parses as many complete
    /// OpenFlow frames as the buffer now holds, and returns the events each
    /// produced. an `Err` here is connection-fatal; `Ok(events)` (possibly
    /// empty) means the caller stays open.
    pub fn poll_read(&mut self, dpid_for_events: Option<DatapathId>) -> Result<Vec<Event>> {
        let mut scratch = [0u8; 4096];
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => bail!(ErrorKind::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed connection",
                ))),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&scratch[..n]);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.last_activity = Instant::now();
        let mut events = Vec::new();
        loop {
            let consumed = match codec::try_frame(&self.read_buf) {
                Ok(Some((header, body, total_len))) => {
                    if let Some(event) = self.dispatch_frame(header, body, dpid_for_events)? {
                        events.push(event);
                    }
                    total_len
                }
                Ok(None) => break,
                Err(e) => return Err(e),
            };
            self.read_buf.drain(0..consumed);
        }
        Ok(events)
    }

    /// reads available bytes and, if a full frame is now buffered, pops and
    /// returns its header and body without interpreting the payload. used by
    /// the handshake state machine, which parses specific expected message
    /// types itself against its own reassembly buffer rather than going
    /// through [`Connection::poll_read`]'s event dispatch.
    pub fn try_recv_raw(&mut self) -> Result<Option<(ds::Header, Vec<u8>)>> {
        let mut scratch = [0u8; 4096];
        loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => bail!(ErrorKind::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed connection",
                ))),
                Ok(n) => self.read_buf.extend_from_slice(&scratch[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match codec::try_frame(&self.read_buf)? {
            Some((header, body, total_len)) => {
                self.read_buf.drain(0..total_len);
                self.last_activity = Instant::now();
                Ok(Some((header, body)))
            }
            None => Ok(None),
        }
    }

    fn dispatch_frame(
        &mut self,
        header: ds::Header,
        body: Vec<u8>,
        dpid: Option<DatapathId>,
    ) -> Result<Option<Event>> {
        let framed = codec::parse(header.clone(), &body)?;
        let xid = *framed.header.xid();

        match framed.payload {
            ds::OfPayload::EchoRequest(data) => {
                let reply = ds::OfMsg::new(xid, ds::OfPayload::EchoReply(data.clone()));
                let _ = self.send_msg(reply);
                Ok(dpid.map(|dpid| Event::EchoRequest { dpid, xid, data }))
            }
            ds::OfPayload::EchoReply(_) => {
                // idle timer already reset by the read above; nothing further to do.
                Ok(None)
            }
            ds::OfPayload::PacketIn(packet_in) => Ok(dpid.map(|dpid| Event::PacketIn { dpid, packet_in })),
            ds::OfPayload::PortStatus(port_status) => {
                Ok(dpid.map(|dpid| Event::PortStatus { dpid, port_status }))
            }
            ds::OfPayload::FlowRemoved(flow_removed) => {
                Ok(dpid.map(|dpid| Event::FlowRemoved { dpid, flow_removed }))
            }
            ds::OfPayload::BarrierReply => Ok(dpid.map(|dpid| Event::BarrierReply { dpid, xid })),
            ds::OfPayload::Error(error) => Ok(dpid.map(|dpid| Event::ErrorMsg { dpid, error })),
            ds::OfPayload::StatsReply { reply, .. } => match reply {
                Ok(stats) => Ok(dpid.map(|dpid| Event::StatsReply { dpid, stats })),
                Err(e) => {
                    warn!("dropping stats reply with unparseable body: {}", e);
                    Ok(None)
                }
            },
            ds::OfPayload::Vendor(vendor) => self.dispatch_vendor(xid, vendor, dpid),
            ds::OfPayload::FeaturesReply(_) => {
                warn!("unexpected FEATURES_REPLY outside handshake, dropping");
                Ok(None)
            }
            _ => Ok(dpid.map(|dpid| Event::OpenflowMsg { dpid, frame: framed.raw })),
        }
    }

    fn dispatch_vendor(
        &mut self,
        xid: u32,
        vendor: ds::vendor::VendorData,
        dpid: Option<DatapathId>,
    ) -> Result<Option<Event>> {
        let ofmp = match vendor.as_ofmp() {
            Some(parsed) => parsed?,
            None => {
                warn!("dropping VENDOR message from unrecognized vendor/subtype");
                return Ok(None);
            }
        };

        match ofmp {
            ds::vendor::OfmpMsg::ExtendedData(fragment) => {
                match codec::feed_extended_data(&mut self.reassembly, xid, fragment)? {
                    codec::FeedResult::Pending => Ok(None),
                    codec::FeedResult::Complete { buf, .. } => self.dispatch_reassembled(xid, &buf, dpid),
                }
            }
            ds::vendor::OfmpMsg::ResourcesUpdate(update) => {
                Ok(dpid.map(|dpid| Event::OfmpResourcesUpdate { mgmt_id: dpid, update }))
            }
            ds::vendor::OfmpMsg::ConfigUpdate(update) => Ok(dpid.map(|dpid| Event::OfmpConfigUpdate {
                mgmt_id: dpid,
                xid,
                old_cookie: update.old_cookie,
                cfg: update.cfg,
            })),
            ds::vendor::OfmpMsg::ConfigUpdateAck(ack) => Ok(dpid.map(|dpid| Event::OfmpConfigUpdateAck {
                mgmt_id: dpid,
                xid,
                success: ack.success,
                cookie: ack.cookie,
            })),
            ds::vendor::OfmpMsg::Error(data) => {
                warn!("OFMP error message: {:?}", data);
                Ok(None)
            }
            ds::vendor::OfmpMsg::CapabilityRequest
            | ds::vendor::OfmpMsg::CapabilityReply(_)
            | ds::vendor::OfmpMsg::ResourcesRequest
            | ds::vendor::OfmpMsg::ConfigRequest => {
                warn!("unexpected OFMP message outside handshake, dropping");
                Ok(None)
            }
        }
    }

    /// a complete reassembly buffer is exactly the wire encoding of one
    /// OFMP message (version + type + pad + body), the same shape
    /// [`ds::vendor::OfmpMsg::try_from`] already parses for single-frame
    /// messages.
    fn dispatch_reassembled(&mut self, xid: u32, buf: &[u8], dpid: Option<DatapathId>) -> Result<Option<Event>> {
        match ds::vendor::OfmpMsg::try_from(buf)? {
            ds::vendor::OfmpMsg::ConfigUpdate(update) => Ok(dpid.map(|dpid| Event::OfmpConfigUpdate {
                mgmt_id: dpid,
                xid,
                old_cookie: update.old_cookie,
                cfg: update.cfg,
            })),
            ds::vendor::OfmpMsg::ResourcesUpdate(update) => {
                Ok(dpid.map(|dpid| Event::OfmpResourcesUpdate { mgmt_id: dpid, update }))
            }
            ds::vendor::OfmpMsg::ConfigUpdateAck(ack) => Ok(dpid.map(|dpid| Event::OfmpConfigUpdateAck {
                mgmt_id: dpid,
                xid,
                success: ack.success,
                cookie: ack.cookie,
            })),
            other => {
                warn!("dropping reassembled OFMP message of unsupported type: {:?}", other.ofmp_type());
                Ok(None)
            }
        }
    }

    /// sends an already-wrapped OFMP message, transparently fragmenting it
    /// across EXTENDED_DATA frames when its encoding would exceed the
    /// single-frame threshold. every fragment shares `xid`; the outer
    /// header's length is set to 0 as the fragmentation sentinel.
    pub fn send_ofmp(&mut self, xid: u32, msg: ds::vendor::OfmpMsg) -> io::Result<()> {
        let inner_type = msg.ofmp_type();
        let encoded: Vec<u8> = msg.clone().into();
        if encoded.len() < ds::vendor::FRAGMENTATION_THRESHOLD {
            let vendor = ds::vendor::VendorData::wrap_ofmp(msg);
            return self.send_msg(ds::OfMsg::new(xid, ds::OfPayload::Vendor(vendor)));
        }

        for fragment in ds::vendor::fragment(inner_type, &encoded) {
            let vendor = ds::vendor::VendorData::wrap_ofmp(ds::vendor::OfmpMsg::ExtendedData(fragment));
            let mut msg = ds::OfMsg::new(xid, ds::OfPayload::Vendor(vendor));
            msg.header = ds::Header::new(ds::Type::Vendor, 0, xid);
            self.send_msg(msg)?;
        }
        Ok(())
    }
}

/// a cheap, cloneable reference to a [`Connection`], shared between the
/// poll loop, the registry, and event handlers. the registry stores these
/// rather than owning connections directly, so a handler reacting to an
/// event can still reach the connection that produced it.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<Mutex<Connection>>);

impl ConnectionHandle {
    pub fn new(conn: Connection) -> Self {
        ConnectionHandle(Arc::new(Mutex::new(conn)))
    }

    pub fn id(&self) -> u64 {
        self.0.lock().unwrap().id()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Connection) -> R) -> R {
        let mut guard = self.0.lock().unwrap();
        f(&mut guard)
    }

    pub fn dpid(&self) -> Option<DatapathId> {
        self.0.lock().unwrap().dpid
    }

    pub fn mgmt_id(&self) -> Option<DatapathId> {
        self.0.lock().unwrap().mgmt_id
    }

    pub fn queue_len(&self) -> usize {
        self.0.lock().unwrap().write_queue.len()
    }

    pub fn close(&self) {
        self.0.lock().unwrap().state = ConnState::Disconnected;
    }
}

/// builds the wildcard `FLOW_MOD/DELETE` every newly-registered switch
/// receives as its first command, clearing out whatever flow state the
/// switch booted with. cookie and buffer_id are exposed as parameters
/// rather than hardcoded to zero, since callers may want to tag or
/// correlate the clearing command.
pub fn wildcard_flow_delete(xid: u32, cookie: u64, buffer_id: u32) -> ds::OfMsg {
    let flow_mod = ds::flow_mod::FlowMod::new(
        ds::flow_match::Match::any(),
        cookie,
        ds::flow_mod::FlowModCommand::Delete,
        0,
        0,
        0,
        buffer_id,
        ds::ports::PortNumber::Reserved(ds::ports::PortNo::None),
        ds::flow_mod::FlowModFlags::empty(),
        Vec::new(),
    );
    ds::OfMsg::new(xid, ds::OfPayload::FlowMod(flow_mod))
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    /// a connected loopback pair, for tests that need a real non-blocking
    /// socket without a live switch on the other end.
    pub fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    pub fn dummy_handle(_seed: u64) -> ConnectionHandle {
        let (a, _b) = loopback_pair();
        ConnectionHandle::new(Connection::new(a).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::loopback_pair;

    #[test]
    fn send_and_receive_echo_roundtrip() {
        let (client, server) = loopback_pair();
        let mut client_conn = Connection::new(client).unwrap();
        let mut server_conn = Connection::new(server).unwrap();

        client_conn
            .send_msg(ds::OfMsg::new(1, ds::OfPayload::EchoRequest(vec![9, 9])))
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let events = server_conn.poll_read(Some(DatapathId::new(1))).unwrap();
        // an EchoRequest auto-replies and, lacking a dpid binding at this
        // layer in the test, still surfaces as an event since dpid is Some.
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::EchoRequest { data, .. } => assert_eq!(data, &vec![9, 9]),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn wildcard_flow_delete_targets_all_flows() {
        let msg = wildcard_flow_delete(1, 0, 0xffff_ffff);
        match msg.payload {
            ds::OfPayload::FlowMod(fm) => {
                assert_eq!(fm.command, ds::flow_mod::FlowModCommand::Delete);
                assert_eq!(fm.cookie, 0);
            }
            _ => panic!("expected FlowMod"),
        }
    }
}
