//! the outbound command surface: typed operations handlers call against a
//! registered datapath, each returning `0` on success or a positive errno.
//! every command resolves `dpid` through the registry and is otherwise a
//! thin wrapper around [`ConnectionHandle::send_msg`]/[`Connection::send_ofmp`].

use super::super::connection::ConnectionHandle;
use super::super::datapath_id::DatapathId;
use super::super::ds;
use super::super::registry::Registry;

/// outbound frames queued but not yet written to the wire before a
/// non-blocking send reports `EAGAIN` rather than growing unbounded.
pub const MAX_OUTBOUND_QUEUE: usize = 1024;

fn resolve(registry: &Registry, dpid: DatapathId) -> Result<ConnectionHandle, i32> {
    registry.lookup_dpid(dpid).ok_or(libc::ESRCH)
}

/// enqueues `msg` on `dpid`'s connection. a non-blocking caller whose queue
/// is already saturated gets `EAGAIN` rather than piling on more backlog;
/// a blocking caller always enqueues (the send-FSM drains it in turn).
fn enqueue(registry: &Registry, dpid: DatapathId, msg: ds::OfMsg, blocking: bool) -> i32 {
    let conn = match resolve(registry, dpid) {
        Ok(conn) => conn,
        Err(errno) => return errno,
    };
    if !blocking && conn.queue_len() >= MAX_OUTBOUND_QUEUE {
        return libc::EAGAIN;
    }
    match conn.with(|c| c.send_msg(msg)) {
        Ok(()) => 0,
        Err(_) => libc::EINVAL,
    }
}

/// sends an already-built OpenFlow message as-is.
pub fn send_openflow_command(registry: &Registry, dpid: DatapathId, msg: ds::OfMsg, blocking: bool) -> i32 {
    enqueue(registry, dpid, msg, blocking)
}

/// replays a buffered packet, or injects raw bytes, through `actions`.
pub fn send_openflow_packet_out(
    registry: &Registry,
    dpid: DatapathId,
    packet_out: ds::packet_out::PacketOut,
    blocking: bool,
) -> i32 {
    let conn = match resolve(registry, dpid) {
        Ok(conn) => conn,
        Err(errno) => return errno,
    };
    let xid = conn.with(|c| c.next_xid());
    enqueue(registry, dpid, ds::OfMsg::new(xid, ds::OfPayload::PacketOut(packet_out)), blocking)
}

/// installs, modifies or deletes a flow entry.
pub fn send_flow_command(registry: &Registry, dpid: DatapathId, flow_mod: ds::flow_mod::FlowMod, blocking: bool) -> i32 {
    let conn = match resolve(registry, dpid) {
        Ok(conn) => conn,
        Err(errno) => return errno,
    };
    let xid = conn.with(|c| c.next_xid());
    enqueue(registry, dpid, ds::OfMsg::new(xid, ds::OfPayload::FlowMod(flow_mod)), blocking)
}

/// installs a flow entry that rewrites the source address of matching
/// traffic out `out_port`, the flow-level shape port-level source NAT
/// reduces to once the packet-classifier rule engine isn't in the path.
pub fn send_add_snat(
    registry: &Registry,
    dpid: DatapathId,
    m: ds::flow_match::Match,
    new_src: u32,
    out_port: ds::ports::PortNumber,
    priority: u16,
    blocking: bool,
) -> i32 {
    let actions = vec![
        ds::actions::ActionHeader::SetNwSrc(new_src),
        ds::actions::ActionHeader::Output { port: out_port, max_len: 0 },
    ];
    let flow_mod = ds::flow_mod::FlowMod::new(
        m,
        0,
        ds::flow_mod::FlowModCommand::Add,
        0,
        0,
        priority,
        0xffff_ffff,
        ds::ports::PortNumber::Reserved(ds::ports::PortNo::None),
        ds::flow_mod::FlowModFlags::empty(),
        actions,
    );
    send_flow_command(registry, dpid, flow_mod, blocking)
}

/// removes a previously installed source-NAT flow entry matching `m`.
pub fn send_del_snat(registry: &Registry, dpid: DatapathId, m: ds::flow_match::Match, blocking: bool) -> i32 {
    let flow_mod = ds::flow_mod::FlowMod::new(
        m,
        0,
        ds::flow_mod::FlowModCommand::Delete,
        0,
        0,
        0,
        0xffff_ffff,
        ds::ports::PortNumber::Reserved(ds::ports::PortNo::None),
        ds::flow_mod::FlowModFlags::empty(),
        Vec::new(),
    );
    send_flow_command(registry, dpid, flow_mod, blocking)
}

/// remote command invocation and log-streaming channels existed in the
/// original system only above the Python scripting-binding layer, which is
/// out of scope here; this core has no modeled wire sub-protocol for either
/// one. both return `EINVAL` rather than silently doing nothing, so a caller
/// doesn't mistake a no-op for a dispatched command.
pub fn send_switch_command(registry: &Registry, dpid: DatapathId, _name: &str, _args: &[String]) -> i32 {
    match resolve(registry, dpid) {
        Ok(_) => libc::EINVAL,
        Err(errno) => errno,
    }
}

pub fn fetch_switch_logs(registry: &Registry, dpid: DatapathId, _out_path: &str) -> i32 {
    match resolve(registry, dpid) {
        Ok(_) => libc::EINVAL,
        Err(errno) => errno,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::super::connection::test_support::loopback_pair;
    use super::super::super::connection::Connection;

    #[test]
    fn unknown_dpid_returns_esrch() {
        let registry = Registry::new();
        assert_eq!(
            send_openflow_command(&registry, DatapathId::new(1), ds::OfMsg::new(0, ds::OfPayload::EchoRequest(Vec::new())), true),
            libc::ESRCH
        );
    }

    #[test]
    fn known_dpid_enqueues_successfully() {
        let registry = Registry::new();
        let (client, _server) = loopback_pair();
        let handle = ConnectionHandle::new(Connection::new(client).unwrap());
        registry.insert_dpid(DatapathId::new(1), handle);

        let rc = send_openflow_command(
            &registry,
            DatapathId::new(1),
            ds::OfMsg::new(0, ds::OfPayload::EchoRequest(Vec::new())),
            true,
        );
        assert_eq!(rc, 0);
    }
}
