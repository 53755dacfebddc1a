//! the Nicira management extension (OFMP) riding inside OpenFlow VENDOR
//! messages: capability exchange, resources update, and the configuration
//! commit protocol, plus the extended-data fragmentation envelope used
//! whenever an OFMP message would not fit in a single OpenFlow frame.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Read, Seek, SeekFrom};

use super::super::cfg::Cfg;
use super::super::datapath_id::DatapathId;
use super::super::err::*;

/// Nicira's vendor id, used to recognize VENDOR messages that carry OFMP
/// rather than some other vendor's extension.
pub const NICIRA_VENDOR_ID: u32 = 0x0000_2320;

/// the only NX vendor subtype the core understands; any other subtype is
/// passed through to the caller as [`super::OfPayload::Raw`].
pub const NX_SUBTYPE_MGMT: u32 = 1;

/// the outermost VENDOR message body: a vendor id, then vendor-specific data.
#[derive(Debug, PartialEq, Clone)]
pub struct VendorData {
    pub vendor_id: u32,
    pub body: Vec<u8>,
}

impl<'a> TryFrom<&'a [u8]> for VendorData {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let vendor_id = cursor.read_u32::<BigEndian>().unwrap();
        let body = Vec::from(&bytes[cursor.position() as usize..]);
        Ok(VendorData { vendor_id, body })
    }
}

impl Into<Vec<u8>> for VendorData {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u32::<BigEndian>(self.vendor_id).unwrap();
        res.extend_from_slice(&self.body[..]);
        res
    }
}

impl VendorData {
    /// `None` if the vendor id is not Nicira's, or the subtype is not MGMT.
    pub fn as_ofmp(&self) -> Option<Result<OfmpMsg>> {
        if self.vendor_id != NICIRA_VENDOR_ID || self.body.len() < 4 {
            return None;
        }
        let mut cursor = Cursor::new(&self.body[..]);
        let subtype = cursor.read_u32::<BigEndian>().unwrap();
        if subtype != NX_SUBTYPE_MGMT {
            return None;
        }
        Some(OfmpMsg::try_from(&self.body[4..]))
    }

    pub fn wrap_ofmp(msg: OfmpMsg) -> Self {
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(NX_SUBTYPE_MGMT).unwrap();
        body.extend_from_slice(&Into::<Vec<u8>>::into(msg)[..]);
        VendorData {
            vendor_id: NICIRA_VENDOR_ID,
            body,
        }
    }
}

/// OFMP message type discriminant. `ConfigRequest` is not part of the
/// original wire catalogue; the handshake needs an explicit way to ask a
/// management-capable switch for its current configuration rather than
/// waiting on an unsolicited push, so it is added here as an empty-bodied
/// sibling of `ResourcesRequest`, numbered past the original range so it
/// never collides with a value already observed on the wire.
#[derive(Primitive, PartialEq, Debug, Clone, Copy)]
pub enum OfmpType {
    CapabilityRequest = 0,
    CapabilityReply = 1,
    ResourcesRequest = 2,
    ResourcesUpdate = 3,
    ConfigUpdate = 4,
    ConfigUpdateAck = 5,
    ExtendedData = 6,
    Error = 7,
    ConfigRequest = 8,
}

/// a decoded OFMP message: the 4 byte header (version, type, 2 bytes pad)
/// followed by a type-specific body.
#[derive(Debug, PartialEq, Clone)]
pub enum OfmpMsg {
    CapabilityRequest,
    CapabilityReply(Cfg),
    ResourcesRequest,
    ResourcesUpdate(ResourcesUpdate),
    ConfigRequest,
    ConfigUpdate(ConfigUpdate),
    ConfigUpdateAck(ConfigUpdateAck),
    ExtendedData(ExtendedData),
    Error(Vec<u8>),
}

const OFMP_VERSION: u8 = 1;

impl OfmpMsg {
    pub fn ofmp_type(&self) -> OfmpType {
        match self {
            OfmpMsg::CapabilityRequest => OfmpType::CapabilityRequest,
            OfmpMsg::CapabilityReply(_) => OfmpType::CapabilityReply,
            OfmpMsg::ResourcesRequest => OfmpType::ResourcesRequest,
            OfmpMsg::ResourcesUpdate(_) => OfmpType::ResourcesUpdate,
            OfmpMsg::ConfigRequest => OfmpType::ConfigRequest,
            OfmpMsg::ConfigUpdate(_) => OfmpType::ConfigUpdate,
            OfmpMsg::ConfigUpdateAck(_) => OfmpType::ConfigUpdateAck,
            OfmpMsg::ExtendedData(_) => OfmpType::ExtendedData,
            OfmpMsg::Error(_) => OfmpType::Error,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for OfmpMsg {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let _version = cursor.read_u8().unwrap();
        let ttype_raw = cursor.read_u8().unwrap();
        let ttype = OfmpType::from_u8(ttype_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(ttype_raw as u64, stringify!(OfmpType)).into())?;
        cursor.seek(SeekFrom::Current(2)).unwrap(); // pad

        let body = &bytes[cursor.position() as usize..];
        Ok(match ttype {
            OfmpType::CapabilityRequest => OfmpMsg::CapabilityRequest,
            OfmpType::CapabilityReply => {
                let blob = String::from_utf8_lossy(body).into_owned();
                OfmpMsg::CapabilityReply(Cfg::from_canonical(&blob))
            }
            OfmpType::ResourcesRequest => OfmpMsg::ResourcesRequest,
            OfmpType::ResourcesUpdate => OfmpMsg::ResourcesUpdate(ResourcesUpdate::try_from(body)?),
            OfmpType::ConfigRequest => OfmpMsg::ConfigRequest,
            OfmpType::ConfigUpdate => OfmpMsg::ConfigUpdate(ConfigUpdate::try_from(body)?),
            OfmpType::ConfigUpdateAck => OfmpMsg::ConfigUpdateAck(ConfigUpdateAck::try_from(body)?),
            OfmpType::ExtendedData => OfmpMsg::ExtendedData(ExtendedData::try_from(body)?),
            OfmpType::Error => OfmpMsg::Error(Vec::from(body)),
        })
    }
}

impl Into<Vec<u8>> for OfmpMsg {
    fn into(self) -> Vec<u8> {
        let ttype = self.ofmp_type();
        let mut res = Vec::new();
        res.write_u8(OFMP_VERSION).unwrap();
        res.write_u8(ttype.to_u8().unwrap()).unwrap();
        res.write_u16::<BigEndian>(0).unwrap(); // pad

        let body: Vec<u8> = match self {
            OfmpMsg::CapabilityRequest | OfmpMsg::ResourcesRequest | OfmpMsg::ConfigRequest => Vec::new(),
            OfmpMsg::CapabilityReply(cfg) => cfg.canonical().into_bytes(),
            OfmpMsg::ResourcesUpdate(update) => update.into(),
            OfmpMsg::ConfigUpdate(update) => update.into(),
            OfmpMsg::ConfigUpdateAck(ack) => ack.into(),
            OfmpMsg::ExtendedData(ext) => ext.into(),
            OfmpMsg::Error(data) => data,
        };
        res.extend_from_slice(&body[..]);
        res
    }
}

/// one virtual interface as carried in a resources-update.
#[derive(Debug, PartialEq, Clone)]
pub struct VifDetails {
    pub name: String,
    pub mac: [u8; 6],
    pub vif_uuid: [u8; 16],
    pub vm_uuid: [u8; 16],
    pub net_uuid: [u8; 16],
}

fn write_str(res: &mut Vec<u8>, s: &str) {
    res.write_u16::<BigEndian>(s.len() as u16).unwrap();
    res.extend_from_slice(s.as_bytes());
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> String {
    let len = cursor.read_u16::<BigEndian>().unwrap() as usize;
    let pos = cursor.position() as usize;
    let s = String::from_utf8_lossy(&cursor.get_ref()[pos..pos + len]).into_owned();
    cursor.seek(SeekFrom::Current(len as i64)).unwrap();
    s
}

fn read_uuid(cursor: &mut Cursor<&[u8]>) -> [u8; 16] {
    let mut uuid = [0u8; 16];
    cursor.read_exact(&mut uuid).unwrap();
    uuid
}

/// replaces the switch manager's port name / management-uuid / network-uuid
/// / vif-details maps wholesale. see `switch_mgr::SwitchMgr::apply_resources_update`.
#[derive(Debug, PartialEq, Clone)]
pub struct ResourcesUpdate {
    pub ports: Vec<(DatapathId, String)>,
    pub mgmt_uuid: [u8; 16],
    pub network_uuids: Vec<[u8; 16]>,
    pub vifs: Vec<VifDetails>,
}

impl<'a> TryFrom<&'a [u8]> for ResourcesUpdate {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let mgmt_uuid = read_uuid(&mut cursor);

        let port_count = cursor.read_u16::<BigEndian>().unwrap();
        let mut ports = Vec::with_capacity(port_count as usize);
        for _ in 0..port_count {
            let dp = DatapathId::new(cursor.read_u64::<BigEndian>().unwrap());
            let name = read_str(&mut cursor);
            ports.push((dp, name));
        }

        let net_count = cursor.read_u16::<BigEndian>().unwrap();
        let mut network_uuids = Vec::with_capacity(net_count as usize);
        for _ in 0..net_count {
            network_uuids.push(read_uuid(&mut cursor));
        }

        let vif_count = cursor.read_u16::<BigEndian>().unwrap();
        let mut vifs = Vec::with_capacity(vif_count as usize);
        for _ in 0..vif_count {
            let name = read_str(&mut cursor);
            let mut mac = [0u8; 6];
            cursor.read_exact(&mut mac).unwrap();
            let vif_uuid = read_uuid(&mut cursor);
            let vm_uuid = read_uuid(&mut cursor);
            let net_uuid = read_uuid(&mut cursor);
            vifs.push(VifDetails {
                name,
                mac,
                vif_uuid,
                vm_uuid,
                net_uuid,
            });
        }

        Ok(ResourcesUpdate {
            ports,
            mgmt_uuid,
            network_uuids,
            vifs,
        })
    }
}

impl Into<Vec<u8>> for ResourcesUpdate {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.extend_from_slice(&self.mgmt_uuid);

        res.write_u16::<BigEndian>(self.ports.len() as u16).unwrap();
        for (dp, name) in &self.ports {
            res.write_u64::<BigEndian>(dp.raw()).unwrap();
            write_str(&mut res, name);
        }

        res.write_u16::<BigEndian>(self.network_uuids.len() as u16).unwrap();
        for uuid in &self.network_uuids {
            res.extend_from_slice(uuid);
        }

        res.write_u16::<BigEndian>(self.vifs.len() as u16).unwrap();
        for vif in &self.vifs {
            write_str(&mut res, &vif.name);
            res.extend_from_slice(&vif.mac);
            res.extend_from_slice(&vif.vif_uuid);
            res.extend_from_slice(&vif.vm_uuid);
            res.extend_from_slice(&vif.net_uuid);
        }
        res
    }
}

/// an OFMP CONFIG_UPDATE, sent either by the controller as a commit or
/// pushed unsolicited by the switch.
#[derive(Debug, PartialEq, Clone)]
pub struct ConfigUpdate {
    pub old_cookie: [u8; 20],
    pub cfg: Cfg,
}

impl<'a> TryFrom<&'a [u8]> for ConfigUpdate {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 20 {
            return Err(ErrorKind::InvalidSliceLength(20, bytes.len(), stringify!(ConfigUpdate)).into());
        }
        let mut old_cookie = [0u8; 20];
        old_cookie.copy_from_slice(&bytes[0..20]);
        let blob = String::from_utf8_lossy(&bytes[20..]).into_owned();
        Ok(ConfigUpdate {
            old_cookie,
            cfg: Cfg::from_canonical(&blob),
        })
    }
}

impl Into<Vec<u8>> for ConfigUpdate {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.extend_from_slice(&self.old_cookie);
        res.extend_from_slice(self.cfg.canonical().as_bytes());
        res
    }
}

/// the switch's acknowledgement of a CONFIG_UPDATE commit.
#[derive(Debug, PartialEq, Clone)]
pub struct ConfigUpdateAck {
    pub success: bool,
    pub cookie: [u8; 20],
}

impl<'a> TryFrom<&'a [u8]> for ConfigUpdateAck {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 21 {
            return Err(ErrorKind::InvalidSliceLength(21, bytes.len(), stringify!(ConfigUpdateAck)).into());
        }
        let success = bytes[0] != 0;
        let mut cookie = [0u8; 20];
        cookie.copy_from_slice(&bytes[1..21]);
        Ok(ConfigUpdateAck { success, cookie })
    }
}

impl Into<Vec<u8>> for ConfigUpdateAck {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u8(if self.success { 1 } else { 0 }).unwrap();
        res.extend_from_slice(&self.cookie);
        res
    }
}

/// one fragment of a message too large for a single OpenFlow frame. `xid`
/// lives in the outer OpenFlow header, not here; the reassembler keys on it.
#[derive(Debug, PartialEq, Clone)]
pub struct ExtendedData {
    pub more_data: bool,
    pub inner_type: OfmpType,
    pub payload: Vec<u8>,
}

impl<'a> TryFrom<&'a [u8]> for ExtendedData {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(ErrorKind::InvalidSliceLength(4, bytes.len(), stringify!(ExtendedData)).into());
        }
        let more_data = bytes[0] != 0;
        let inner_type = OfmpType::from_u8(bytes[1])
            .ok_or::<Error>(ErrorKind::UnknownValue(bytes[1] as u64, stringify!(OfmpType)).into())?;
        // bytes[2..4] pad
        let payload = Vec::from(&bytes[4..]);
        Ok(ExtendedData {
            more_data,
            inner_type,
            payload,
        })
    }
}

impl Into<Vec<u8>> for ExtendedData {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u8(if self.more_data { 1 } else { 0 }).unwrap();
        res.write_u8(self.inner_type.to_u8().unwrap()).unwrap();
        res.write_u16::<BigEndian>(0).unwrap();
        res.extend_from_slice(&self.payload[..]);
        res
    }
}

/// the maximum whole-message size before extended-data fragmentation kicks in.
pub const FRAGMENTATION_THRESHOLD: usize = 65_536;
/// the maximum payload bytes per EXTENDED_DATA fragment.
pub const MAX_FRAGMENT_PAYLOAD: usize = 65_535 - 4;

/// splits `payload` (the wire encoding of some OFMP message) into a sequence
/// of EXTENDED_DATA fragments, all carrying `inner_type`, with `MORE_DATA`
/// clear only on the last one.
pub fn fragment(inner_type: OfmpType, payload: &[u8]) -> Vec<ExtendedData> {
    if payload.is_empty() {
        return vec![ExtendedData {
            more_data: false,
            inner_type,
            payload: Vec::new(),
        }];
    }
    let chunks: Vec<&[u8]> = payload.chunks(MAX_FRAGMENT_PAYLOAD).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| ExtendedData {
            more_data: i != last,
            inner_type,
            payload: Vec::from(chunk),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_update_roundtrip() {
        let mut cfg = Cfg::new();
        cfg.add_entry("net.ports".into(), "eth1".into());
        let update = ConfigUpdate {
            old_cookie: [7u8; 20],
            cfg,
        };
        let bytes: Vec<u8> = update.clone().into();
        let back = ConfigUpdate::try_from(&bytes[..]).unwrap();
        assert_eq!(update.old_cookie, back.old_cookie);
        assert_eq!(update.cfg.canonical(), back.cfg.canonical());
    }

    #[test]
    fn ack_roundtrip() {
        let ack = ConfigUpdateAck {
            success: true,
            cookie: [9u8; 20],
        };
        let bytes: Vec<u8> = ack.clone().into();
        assert_eq!(ConfigUpdateAck::try_from(&bytes[..]).unwrap(), ack);
    }

    #[test]
    fn fragment_reassemble_roundtrip() {
        let payload = vec![0xABu8; MAX_FRAGMENT_PAYLOAD * 2 + 10];
        let fragments = fragment(OfmpType::ConfigUpdate, &payload);
        assert_eq!(fragments.len(), 3);
        assert!(fragments[0].more_data);
        assert!(fragments[1].more_data);
        assert!(!fragments[2].more_data);

        let mut reassembled = Vec::new();
        for f in &fragments {
            reassembled.extend_from_slice(&f.payload);
        }
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn resources_update_roundtrip() {
        let update = ResourcesUpdate {
            ports: vec![(DatapathId::new(1), "eth0".to_string())],
            mgmt_uuid: [1u8; 16],
            network_uuids: vec![[2u8; 16]],
            vifs: vec![VifDetails {
                name: "vif1".to_string(),
                mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
                vif_uuid: [3u8; 16],
                vm_uuid: [4u8; 16],
                net_uuid: [5u8; 16],
            }],
        };
        let bytes: Vec<u8> = update.clone().into();
        assert_eq!(ResourcesUpdate::try_from(&bytes[..]).unwrap(), update);
    }
}
