//! dpid → connection, dpid → mgmt-id, and mgmt-id → switch-manager tables.
//!
//! these tables are conceptually mutated only from the main scheduler
//! group; other groups observe changes through the event bus rather than
//! reading the registry directly. this implementation still guards the
//! tables with a mutex so that invariant is enforced by the type system
//! rather than by convention alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::connection::ConnectionHandle;
use super::datapath_id::DatapathId;
use super::switch_mgr::SwitchMgr;

struct Inner {
    by_dpid: HashMap<DatapathId, ConnectionHandle>,
    dpid_to_mgmt: HashMap<DatapathId, DatapathId>,
    by_mgmt: HashMap<DatapathId, Arc<Mutex<SwitchMgr>>>,
}

/// a second connection claiming an already-registered dpid closes the old
/// registration first. `insert_dpid` returns the connection it displaced,
/// if any, so the caller can close it and post `DatapathLeave` strictly
/// before posting `DatapathJoin` for the new one.
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            inner: Mutex::new(Inner {
                by_dpid: HashMap::new(),
                dpid_to_mgmt: HashMap::new(),
                by_mgmt: HashMap::new(),
            }),
        }
    }

    /// inserts `conn` under `dpid`, returning the connection it replaced
    /// (if `dpid` was already registered) so the caller can close it first.
    pub fn insert_dpid(&self, dpid: DatapathId, conn: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_dpid.insert(dpid, conn)
    }

    pub fn lookup_dpid(&self, dpid: DatapathId) -> Option<ConnectionHandle> {
        self.inner.lock().unwrap().by_dpid.get(&dpid).cloned()
    }

    pub fn remove_dpid(&self, dpid: DatapathId) -> Option<ConnectionHandle> {
        self.inner.lock().unwrap().by_dpid.remove(&dpid)
    }

    pub fn insert_dpid_mgmt(&self, dpid: DatapathId, mgmt_id: DatapathId) {
        self.inner.lock().unwrap().dpid_to_mgmt.insert(dpid, mgmt_id);
    }

    pub fn mgmt_for_dpid(&self, dpid: DatapathId) -> Option<DatapathId> {
        self.inner.lock().unwrap().dpid_to_mgmt.get(&dpid).cloned()
    }

    pub fn insert_switch_mgr(&self, mgmt_id: DatapathId, mgr: Arc<Mutex<SwitchMgr>>) -> Option<Arc<Mutex<SwitchMgr>>> {
        self.inner.lock().unwrap().by_mgmt.insert(mgmt_id, mgr)
    }

    pub fn lookup_switch_mgr(&self, mgmt_id: DatapathId) -> Option<Arc<Mutex<SwitchMgr>>> {
        self.inner.lock().unwrap().by_mgmt.get(&mgmt_id).cloned()
    }

    pub fn remove_switch_mgr(&self, mgmt_id: DatapathId) -> Option<Arc<Mutex<SwitchMgr>>> {
        self.inner.lock().unwrap().by_mgmt.remove(&mgmt_id)
    }

    pub fn dpid_count(&self) -> usize {
        self.inner.lock().unwrap().by_dpid.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::connection::test_support::dummy_handle;

    #[test]
    fn second_registration_displaces_first() {
        let registry = Registry::new();
        let dpid = DatapathId::new(7);
        let first = dummy_handle(1);
        let second = dummy_handle(2);

        assert!(registry.insert_dpid(dpid, first.clone()).is_none());
        let displaced = registry.insert_dpid(dpid, second.clone());
        assert_eq!(displaced.map(|h| h.id()), Some(first.id()));
        assert_eq!(registry.lookup_dpid(dpid).map(|h| h.id()), Some(second.id()));
    }
}
