//! per-switch configuration manager: the optimistic-concurrency commit
//! protocol over the [`Cfg`] document, OFMP extended-data framing for
//! oversized commits, and the port/management/network/vif resource maps
//! replaced wholesale by each resources-update.

use std::collections::HashMap;

use uuid::Uuid;

use super::cfg::{Cfg, Cookie};
use super::datapath_id::DatapathId;
use super::ds::vendor::{ConfigUpdate, ConfigUpdateAck, ResourcesUpdate};

/// one virtual interface's resource details, as carried in a resources
/// update and indexed by name.
#[derive(Debug, Clone)]
pub struct VifInfo {
    pub vif_uuid: Uuid,
    pub mac: [u8; 6],
    pub vm_uuid: Uuid,
    pub net_uuid: Uuid,
}

/// a commit awaiting acknowledgement: the snapshot that was sent, the
/// cookie it produced, the cookie it was conditioned on, and the caller's
/// callback, invoked exactly once when the matching ack arrives (or never,
/// if the switch manager is torn down first).
pub struct CommitInfo {
    pub cfg: Cfg,
    pub cookie: Cookie,
    pub old_cookie: Cookie,
    pub callback: Box<dyn FnOnce(bool) + Send>,
}

/// the per-switch configuration manager, one per management-capable
/// switch. owned exclusively by handlers running on that switch's
/// connection's group; callers elsewhere reach it only via events.
pub struct SwitchMgr {
    global_cfg: Cfg,
    global_cookie: Cookie,
    local_cfg: Cfg,
    last_commit: Cfg,
    capabilities: Cfg,
    commits: HashMap<u32, CommitInfo>,

    port_names: HashMap<DatapathId, String>,
    mgmt_uuids: HashMap<DatapathId, Uuid>,
    network_uuids: HashMap<DatapathId, Vec<Uuid>>,
    vif_details: HashMap<String, VifInfo>,
}

impl SwitchMgr {
    /// constructs a manager from the capability reply and the switch's
    /// initial configuration (the CONFIG_UPDATE received during
    /// `RECV_MGMT_CONFIG_UPDATE`). `global_cfg` and `local_cfg` both start
    /// at that snapshot.
    pub fn new(capabilities: Cfg, initial_cfg: Cfg) -> Self {
        let mut global_cfg = initial_cfg;
        let global_cookie = global_cfg.cookie();
        let local_cfg = global_cfg.clone();
        let last_commit = global_cfg.clone();
        SwitchMgr {
            global_cfg,
            global_cookie,
            local_cfg,
            last_commit,
            capabilities,
            commits: HashMap::new(),
            port_names: HashMap::new(),
            mgmt_uuids: HashMap::new(),
            network_uuids: HashMap::new(),
            vif_details: HashMap::new(),
        }
    }

    pub fn capabilities(&self) -> &Cfg {
        &self.capabilities
    }

    pub fn global_cfg(&self) -> &Cfg {
        &self.global_cfg
    }

    pub fn global_cookie(&self) -> Cookie {
        self.global_cookie
    }

    /// the document under local mutation. handlers call `set_*`/`del_entry`
    /// on this, then [`SwitchMgr::commit`].
    pub fn local_cfg_mut(&mut self) -> &mut Cfg {
        &mut self.local_cfg
    }

    pub fn local_cfg(&self) -> &Cfg {
        &self.local_cfg
    }

    pub fn pending_commit_count(&self) -> usize {
        self.commits.len()
    }

    /// captures a snapshot of `local_cfg`, records it as a pending commit
    /// under `xid` (the caller assigns xid from the owning connection's
    /// outbound counter), and returns the OFMP message to send. `old_cookie`
    /// is the cookie of the version `local_cfg`'s changes were based on —
    /// the compare-and-swap token the switch checks before applying.
    ///
    /// `last_commit` is updated to the new snapshot immediately, before any
    /// acknowledgement arrives, so a second commit issued before the first
    /// is acked stacks on top of it rather than reverting it.
    pub fn commit<F>(&mut self, xid: u32, callback: F) -> ConfigUpdate
    where
        F: FnOnce(bool) + Send + 'static,
    {
        // `last_commit` from a prior `commit()` is a snapshot of `local_cfg`
        // at that moment and carries its `dirty` flag along with it, so its
        // cached cookie (`cookie_unchecked`) is stale — recompute here
        // rather than reading the pre-change value a stacked commit would
        // otherwise hand the switch as its compare-and-swap token.
        let old_cookie = self.last_commit.cookie();
        let snapshot = self.local_cfg.clone();
        let mut snapshot_for_cookie = snapshot.clone();
        let new_cookie = snapshot_for_cookie.cookie();

        self.commits.insert(
            xid,
            CommitInfo {
                cfg: snapshot.clone(),
                cookie: new_cookie,
                old_cookie,
                callback: Box::new(callback),
            },
        );
        self.last_commit = snapshot.clone();

        ConfigUpdate {
            old_cookie,
            cfg: snapshot,
        }
    }

    /// processes a `CONFIG_UPDATE_ACK` for `xid`. returns the stored
    /// callback so the caller can invoke it outside this borrow (avoiding
    /// a callback that itself wants to touch this same `SwitchMgr`). exactly
    /// one commit entry exists for `xid` at the moment of processing, and
    /// it is gone afterward regardless of outcome.
    pub fn apply_ack(&mut self, xid: u32, ack: ConfigUpdateAck) -> Option<(bool, Box<dyn FnOnce(bool) + Send>)> {
        let commit = self.commits.remove(&xid)?;

        if ack.success {
            // adopt-on-cookie-match: when the ack's cookie matches the
            // snapshot's but `old_cookie` no longer matches `global_cookie`
            // (another committer raced us), still adopt, logging the
            // inconsistency rather than discarding a switch-acknowledged
            // configuration.
            if ack.cookie == commit.cookie {
                if commit.old_cookie != self.global_cookie {
                    warn!(
                        "config commit xid={} acked with matching cookie but old_cookie diverged from global_cookie; adopting anyway",
                        xid
                    );
                }
                self.global_cfg = commit.cfg;
                self.global_cookie = commit.cookie;
            } else {
                warn!("config commit xid={} acked success but cookie mismatch", xid);
            }
        } else {
            self.local_cfg = self.global_cfg.clone();
            self.last_commit = self.global_cfg.clone();
        }

        Some((ack.success, commit.callback))
    }

    /// an unsolicited `CONFIG_UPDATE` pushed by the switch outside the
    /// commit protocol. replaces `global_cfg`; if `local_cfg` carries no
    /// local mutations it is replaced too, otherwise it is left dirty
    /// unless its cookie already matches the new global one.
    pub fn apply_unsolicited_config_update(&mut self, update: ConfigUpdate) {
        let mut new_cfg = update.cfg;
        let new_cookie = new_cfg.cookie();
        self.global_cfg = new_cfg.clone();
        self.global_cookie = new_cookie;

        if !self.local_cfg.is_dirty() {
            self.local_cfg = new_cfg.clone();
            self.last_commit = new_cfg;
        } else {
            let mut probe = self.local_cfg.clone();
            if probe.cookie() == new_cookie {
                self.local_cfg.mark_clean();
            }
        }
    }

    /// replaces the port-name, management-uuid, network-uuid and
    /// vif-details maps wholesale, as every resources-update does.
    pub fn apply_resources_update(&mut self, dpid: DatapathId, update: ResourcesUpdate) {
        self.port_names.clear();
        for (dp, name) in update.ports {
            self.port_names.insert(dp, name);
        }

        self.mgmt_uuids.insert(dpid, Uuid::from_bytes(update.mgmt_uuid));

        let networks = update
            .network_uuids
            .into_iter()
            .map(Uuid::from_bytes)
            .collect();
        self.network_uuids.insert(dpid, networks);

        self.vif_details.clear();
        for vif in update.vifs {
            self.vif_details.insert(
                vif.name,
                VifInfo {
                    vif_uuid: Uuid::from_bytes(vif.vif_uuid),
                    mac: vif.mac,
                    vm_uuid: Uuid::from_bytes(vif.vm_uuid),
                    net_uuid: Uuid::from_bytes(vif.net_uuid),
                },
            );
        }
    }

    pub fn port_name(&self, dpid: DatapathId) -> Option<&str> {
        self.port_names.get(&dpid).map(|s| s.as_str())
    }

    pub fn mgmt_uuid(&self, dpid: DatapathId) -> Option<Uuid> {
        self.mgmt_uuids.get(&dpid).cloned()
    }

    pub fn network_uuids(&self, dpid: DatapathId) -> Option<&[Uuid]> {
        self.network_uuids.get(&dpid).map(|v| v.as_slice())
    }

    pub fn vif(&self, name: &str) -> Option<&VifInfo> {
        self.vif_details.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn cfg_with(k: &str, v: &str) -> Cfg {
        let mut cfg = Cfg::new();
        cfg.add_entry(k.to_string(), v.to_string());
        cfg
    }

    #[test]
    fn commit_then_success_ack_adopts_global() {
        let mut mgr = SwitchMgr::new(Cfg::new(), cfg_with("net.ports", "eth0"));
        mgr.local_cfg_mut().set_string("net.ports", "eth1");

        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        let update = mgr.commit(0x11, move |ok| {
            assert!(ok);
            called2.store(true, Ordering::SeqCst);
        });

        assert_eq!(update.cfg.canonical(), "net.ports=eth1\n");
        assert_eq!(mgr.pending_commit_count(), 1);

        let mut new_cfg = update.cfg.clone();
        let new_cookie = new_cfg.cookie();
        let ack = ConfigUpdateAck {
            success: true,
            cookie: new_cookie,
        };
        let (ok, cb) = mgr.apply_ack(0x11, ack).unwrap();
        cb(ok);

        assert!(called.load(Ordering::SeqCst));
        assert_eq!(mgr.global_cfg().canonical(), "net.ports=eth1\n");
        assert_eq!(mgr.pending_commit_count(), 0);
    }

    #[test]
    fn stacked_commits_conflict_resolution() {
        let mut mgr = SwitchMgr::new(Cfg::new(), Cfg::new());

        mgr.local_cfg_mut().set_string("k", "a");
        let update_a = mgr.commit(1, |ok| assert!(ok));
        let mut cfg_a = update_a.cfg.clone();
        let cookie_a = cfg_a.cookie();

        mgr.local_cfg_mut().set_string("k", "b");
        let update_b = mgr.commit(2, |ok| assert!(!ok));
        // B stacks on A: its compare-and-swap token must be A's cookie, not
        // whatever `global_cookie` was before A was even committed.
        assert_eq!(update_b.old_cookie, cookie_a);

        let (ok_a, cb_a) = mgr.apply_ack(1, ConfigUpdateAck { success: true, cookie: cookie_a }).unwrap();
        cb_a(ok_a);
        assert_eq!(mgr.global_cfg().canonical(), "k=a\n");

        let (ok_b, cb_b) = mgr
            .apply_ack(2, ConfigUpdateAck { success: false, cookie: [0u8; 20] })
            .unwrap();
        cb_b(ok_b);

        assert_eq!(mgr.local_cfg().canonical(), mgr.global_cfg().canonical());
        assert_eq!(mgr.last_commit.canonical(), mgr.global_cfg().canonical());
        let _ = update_b;
    }

    #[test]
    fn resources_update_replaces_maps_wholesale() {
        let mut mgr = SwitchMgr::new(Cfg::new(), Cfg::new());
        let dpid = DatapathId::new(1);
        let update = ResourcesUpdate {
            ports: vec![(dpid, "eth0".to_string())],
            mgmt_uuid: [1u8; 16],
            network_uuids: vec![[2u8; 16]],
            vifs: vec![],
        };
        mgr.apply_resources_update(dpid, update);
        assert_eq!(mgr.port_name(dpid), Some("eth0"));
        assert!(mgr.mgmt_uuid(dpid).is_some());
    }
}
