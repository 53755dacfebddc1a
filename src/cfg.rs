//! the per-switch configuration document: a multimap of string key/value
//! pairs, canonically serialized and content-addressed by a SHA-1 cookie.

use std::cmp::Ordering;

use sha1::Sha1;

/// a 20 byte SHA-1 digest over the canonical serialization of a [`Cfg`].
pub type Cookie = [u8; 20];

const EMPTY_COOKIE: Cookie = [0u8; 20];

/// a multimap from key to value. duplicate keys are allowed and addressed
/// by their zero-based index among entries sharing that key; insertion
/// order of distinct keys is not observable, only the canonical sorted
/// order is.
#[derive(Debug, Clone)]
pub struct Cfg {
    entries: Vec<(String, String)>,
    cookie: Cookie,
    dirty: bool,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg::new()
    }
}

impl Cfg {
    pub fn new() -> Self {
        Cfg {
            entries: Vec::new(),
            cookie: EMPTY_COOKIE,
            dirty: true,
        }
    }

    /// parses entries out of a canonical `key=value\n` blob, as received in
    /// an OFMP CONFIG_UPDATE or CAPABILITY_REPLY payload. malformed lines
    /// (missing `=`) are skipped.
    pub fn from_canonical(blob: &str) -> Self {
        let mut cfg = Cfg::new();
        for line in blob.lines() {
            if let Some(idx) = line.find('=') {
                let (k, v) = line.split_at(idx);
                cfg.add_entry(k.to_string(), v[1..].to_string());
            }
        }
        cfg.dirty = true;
        cfg
    }

    /// the `key=value\n` lines of every entry, sorted lexicographically by
    /// the full line. this is the sole input to the cookie hash and the
    /// wire payload of an OFMP CONFIG_UPDATE.
    pub fn canonical(&self) -> String {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect();
        lines.sort();
        lines.concat()
    }

    /// recomputes and returns the cookie if the document is dirty, then
    /// clears the dirty flag. idempotent when already clean.
    pub fn cookie(&mut self) -> Cookie {
        if self.dirty {
            let mut hasher = Sha1::new();
            hasher.update(self.canonical().as_bytes());
            self.cookie = hasher.digest().bytes();
            self.dirty = false;
        }
        self.cookie
    }

    /// the last computed cookie, without forcing a recompute. callers that
    /// need the up to date value should call [`Cfg::cookie`] first.
    pub fn cookie_unchecked(&self) -> Cookie {
        self.cookie
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        let _ = self.cookie();
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// appends a duplicate entry; does not replace any existing value for `k`.
    pub fn add_entry(&mut self, k: String, v: String) {
        self.entries.push((k, v));
        self.dirty = true;
    }

    /// removes the first entry matching `(k, v)` exactly, if any.
    pub fn del_entry(&mut self, k: &str, v: &str) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|(ek, ev)| ek == k && ev == v)
        {
            self.entries.remove(pos);
            self.dirty = true;
        }
    }

    /// returns the value at `index` among entries sharing key `k`, zero-based.
    pub fn get_string(&self, k: &str, index: usize) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(ek, _)| ek == k)
            .nth(index)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_int(&self, k: &str, index: usize) -> Option<i64> {
        self.get_string(k, index).and_then(|v| v.parse().ok())
    }

    pub fn get_bool(&self, k: &str, index: usize) -> Option<bool> {
        self.get_string(k, index).map(|v| v == "true")
    }

    /// VLAN ids are constrained to [0, 4095]; out of range stored values are
    /// treated as absent rather than surfaced, since `set_vlan` never wrote them.
    pub fn get_vlan(&self, k: &str, index: usize) -> Option<u16> {
        self.get_int(k, index).and_then(|v| {
            if v >= 0 && v <= 4095 {
                Some(v as u16)
            } else {
                None
            }
        })
    }

    /// replaces the value at `index` among entries sharing key `k`, or
    /// appends a new entry if `index` is one past the current count.
    fn set_string_at(&mut self, k: &str, index: usize, v: String) {
        let pos = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, (ek, _))| ek == k)
            .nth(index)
            .map(|(pos, _)| pos);
        match pos {
            Some(pos) => self.entries[pos].1 = v,
            None => self.entries.push((k.to_string(), v)),
        }
        self.dirty = true;
    }

    pub fn set_string(&mut self, k: &str, v: &str) {
        self.set_string_at(k, 0, v.to_string());
    }

    pub fn set_int(&mut self, k: &str, v: i64) {
        self.set_string_at(k, 0, v.to_string());
    }

    pub fn set_bool(&mut self, k: &str, v: bool) {
        self.set_string_at(k, 0, if v { "true" } else { "false" }.to_string());
    }

    /// a no-op when `v` is outside [0, 4095].
    pub fn set_vlan(&mut self, k: &str, v: i32) {
        if v < 0 || v > 4095 {
            return;
        }
        self.set_string_at(k, 0, v.to_string());
    }
}

impl PartialEq for Cfg {
    fn eq(&self, other: &Cfg) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Cfg {}

/// entries sorted purely by their canonical line, used when a stable
/// display ordering independent of insertion order is needed.
pub fn canonical_order(a: &(String, String), b: &(String, String)) -> Ordering {
    format!("{}={}\n", a.0, a.1).cmp(&format!("{}={}\n", b.0, b.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_is_sorted_and_stable_under_permutation() {
        let mut a = Cfg::new();
        a.add_entry("b".into(), "2".into());
        a.add_entry("a".into(), "1".into());

        let mut b = Cfg::new();
        b.add_entry("a".into(), "1".into());
        b.add_entry("b".into(), "2".into());

        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "a=1\nb=2\n");
    }

    #[test]
    fn cookie_matches_hash_of_canonical_when_clean() {
        let mut cfg = Cfg::new();
        cfg.add_entry("net.ports".into(), "eth0".into());
        let cookie = cfg.cookie();
        assert!(!cfg.is_dirty());

        let mut hasher = Sha1::new();
        hasher.update(cfg.canonical().as_bytes());
        assert_eq!(cookie, hasher.digest().bytes());
    }

    #[test]
    fn duplicate_keys_are_index_addressed() {
        let mut cfg = Cfg::new();
        cfg.add_entry("net.ports".into(), "eth0".into());
        cfg.add_entry("net.ports".into(), "eth1".into());
        assert_eq!(cfg.get_string("net.ports", 0), Some("eth0"));
        assert_eq!(cfg.get_string("net.ports", 1), Some("eth1"));
    }

    #[test]
    fn del_entry_removes_first_match_only() {
        let mut cfg = Cfg::new();
        cfg.add_entry("k".into(), "v".into());
        cfg.add_entry("k".into(), "v".into());
        cfg.del_entry("k", "v");
        assert_eq!(cfg.entries().len(), 1);
    }

    #[test]
    fn vlan_setter_rejects_out_of_range() {
        let mut cfg = Cfg::new();
        cfg.set_vlan("port.vlan", 10);
        cfg.set_vlan("port.vlan", 4096);
        assert_eq!(cfg.get_vlan("port.vlan", 0), Some(10));
    }

    #[test]
    fn from_canonical_roundtrips() {
        let mut cfg = Cfg::new();
        cfg.add_entry("net.ports".into(), "eth1".into());
        let blob = cfg.canonical();
        let parsed = Cfg::from_canonical(&blob);
        assert_eq!(parsed.canonical(), blob);
    }
}
