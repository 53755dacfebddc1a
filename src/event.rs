//! the event bus: named events dispatched through ordered, synchronous
//! handler chains. one bus instance lives per cooperative group; handlers
//! registered on a bus only ever run on that group's thread.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use super::datapath_id::DatapathId;
use super::ds;

/// the verdict a handler returns: whether the chain for this event keeps walking.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Disposition {
    Continue,
    Stop,
}

/// an immutable, owned payload posted to the bus. large variants box their
/// data so `Event` itself stays cheap to move through the post queue.
#[derive(Debug, Clone)]
pub enum Event {
    DatapathJoin {
        dpid: DatapathId,
        features: ds::features::SwitchFeatures,
    },
    DatapathLeave {
        dpid: DatapathId,
    },
    SwitchMgrJoin {
        mgmt_id: DatapathId,
    },
    SwitchMgrLeave {
        mgmt_id: DatapathId,
    },
    PacketIn {
        dpid: DatapathId,
        packet_in: ds::packet_in::PacketIn,
    },
    PortStatus {
        dpid: DatapathId,
        port_status: ds::port_status::PortStatus,
    },
    FlowRemoved {
        dpid: DatapathId,
        flow_removed: ds::flow_removed::FlowRemoved,
    },
    BarrierReply {
        dpid: DatapathId,
        xid: u32,
    },
    EchoRequest {
        dpid: DatapathId,
        xid: u32,
        data: Vec<u8>,
    },
    ErrorMsg {
        dpid: DatapathId,
        error: ds::error_msg::ErrorMsg,
    },
    StatsReply {
        dpid: DatapathId,
        stats: ds::stats::StatsReply,
    },
    OfmpConfigUpdate {
        mgmt_id: DatapathId,
        xid: u32,
        old_cookie: [u8; 20],
        cfg: super::cfg::Cfg,
    },
    OfmpConfigUpdateAck {
        mgmt_id: DatapathId,
        xid: u32,
        success: bool,
        cookie: [u8; 20],
    },
    OfmpResourcesUpdate {
        mgmt_id: DatapathId,
        update: ds::vendor::ResourcesUpdate,
    },
    OpenflowMsg {
        dpid: DatapathId,
        frame: Vec<u8>,
    },
    /// the pluggable authorizer's verdict for a connection awaiting
    /// registration, delivered through the bus rather than a direct
    /// callback so it never re-enters the handshake FSM synchronously.
    AuthVerdict {
        connection_id: u64,
        approved: bool,
    },
    Shutdown,
}

impl Event {
    /// the stable string name used to key the handler chain; kept distinct
    /// from the enum variant name so logging/config can refer to it by a
    /// name that does not change if the Rust representation is refactored.
    pub fn name(&self) -> &'static str {
        match self {
            Event::DatapathJoin { .. } => "datapath-join",
            Event::DatapathLeave { .. } => "datapath-leave",
            Event::SwitchMgrJoin { .. } => "switch-mgr-join",
            Event::SwitchMgrLeave { .. } => "switch-mgr-leave",
            Event::PacketIn { .. } => "packet-in",
            Event::PortStatus { .. } => "port-status",
            Event::FlowRemoved { .. } => "flow-removed",
            Event::BarrierReply { .. } => "barrier-reply",
            Event::EchoRequest { .. } => "echo-request",
            Event::ErrorMsg { .. } => "error-msg",
            Event::StatsReply { .. } => "stats-reply",
            Event::OfmpConfigUpdate { .. } => "ofmp-config-update",
            Event::OfmpConfigUpdateAck { .. } => "ofmp-config-update-ack",
            Event::OfmpResourcesUpdate { .. } => "ofmp-resources-update",
            Event::OpenflowMsg { .. } => "openflow-msg",
            Event::AuthVerdict { .. } => "auth-verdict",
            Event::Shutdown => "shutdown",
        }
    }
}

type HandlerFn = Box<dyn Fn(&Event) -> Disposition + Send>;

struct Registered {
    order: i32,
    seq: u64,
    handler: HandlerFn,
}

/// one bus per cooperative group. `register_handler` is expected to run
/// during init; `post` may be called from any thread, including ones that
/// do not own this bus, which is why the queue is behind a mutex and a
/// channel rather than a bare `Vec`.
pub struct EventBus {
    chains: Mutex<HashMap<&'static str, Vec<Registered>>>,
    next_seq: Mutex<u64>,
    queue_tx: Sender<Event>,
    queue_rx: Mutex<Receiver<Event>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = channel();
        Arc::new(EventBus {
            chains: Mutex::new(HashMap::new()),
            next_seq: Mutex::new(0),
            queue_tx: tx,
            queue_rx: Mutex::new(rx),
        })
    }

    /// adds `handler` to the chain for `event_name`, invoked in ascending
    /// `order`; ties broken by registration order.
    pub fn register_handler<F>(&self, event_name: &'static str, order: i32, handler: F)
    where
        F: Fn(&Event) -> Disposition + Send + 'static,
    {
        let mut seq_guard = self.next_seq.lock().unwrap();
        let seq = *seq_guard;
        *seq_guard += 1;
        drop(seq_guard);

        let mut chains = self.chains.lock().unwrap();
        let chain = chains.entry(event_name).or_insert_with(Vec::new);
        chain.push(Registered {
            order,
            seq,
            handler: Box::new(handler),
        });
        chain.sort_by(|a, b| a.order.cmp(&b.order).then(a.seq.cmp(&b.seq)));
    }

    /// appends `event` to the group's queue. safe to call from any thread;
    /// the owning group drains the queue on its own loop iteration.
    pub fn post(&self, event: Event) {
        // a disconnected receiver means the owning group has shut down;
        // there is nothing left to deliver to.
        let _ = self.queue_tx.send(event);
    }

    /// drains every event currently queued, invoking its chain synchronously.
    /// called once per poll loop iteration from the owning group's thread.
    pub fn drain(&self) {
        let rx = self.queue_rx.lock().unwrap();
        while let Ok(event) = rx.try_recv() {
            self.dispatch(&event);
        }
    }

    fn dispatch(&self, event: &Event) {
        let chains = self.chains.lock().unwrap();
        if let Some(chain) = chains.get(event.name()) {
            for registered in chain {
                if (registered.handler)(event) == Disposition::Stop {
                    break;
                }
            }
        }
    }
}
