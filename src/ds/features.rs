use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::{Into, TryFrom};
use std::io::Cursor;

use super::super::err::*;
use super::ports::Port;

/// the FEATURES_REPLY body: everything the handshake learns about a switch
/// before it can be registered, including its initial port list.
#[derive(Debug, PartialEq, Clone)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: Capabilities,
    pub actions: SupportedActions,
    pub ports: Vec<Port>,
}

impl<'a> TryFrom<&'a [u8]> for SwitchFeatures {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 24 {
            bail!(ErrorKind::InvalidSliceLength(24, bytes.len(), stringify!(SwitchFeatures)));
        }
        let mut cursor = Cursor::new(bytes);
        let datapath_id = cursor.read_u64::<BigEndian>().unwrap();
        let n_buffers = cursor.read_u32::<BigEndian>().unwrap();
        let n_tables = cursor.read_u8().unwrap();
        cursor.set_position(cursor.position() + 3); // pad

        let capabilities_raw = cursor.read_u32::<BigEndian>().unwrap();
        let capabilities = Capabilities::from_bits(capabilities_raw).ok_or::<Error>(
            ErrorKind::UnknownValue(capabilities_raw as u64, stringify!(Capabilities)).into(),
        )?;
        let actions_raw = cursor.read_u32::<BigEndian>().unwrap();
        let actions = SupportedActions::from_bits(actions_raw).ok_or::<Error>(
            ErrorKind::UnknownValue(actions_raw as u64, stringify!(SupportedActions)).into(),
        )?;

        let port_bytes = &bytes[cursor.position() as usize..];
        if port_bytes.len() % super::ports::PORT_LENGTH != 0 {
            bail!(ErrorKind::InvalidSliceLength(
                super::ports::PORT_LENGTH,
                port_bytes.len(),
                stringify!(Port),
            ));
        }
        let ports = port_bytes
            .chunks(super::ports::PORT_LENGTH)
            .map(Port::try_from)
            .collect::<Result<Vec<Port>>>()?;

        Ok(SwitchFeatures {
            datapath_id,
            n_buffers,
            n_tables,
            capabilities,
            actions,
            ports,
        })
    }
}

impl Into<Vec<u8>> for SwitchFeatures {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u64::<BigEndian>(self.datapath_id).unwrap();
        res.write_u32::<BigEndian>(self.n_buffers).unwrap();
        res.write_u8(self.n_tables).unwrap();
        res.write_u8(0).unwrap();
        res.write_u16::<BigEndian>(0).unwrap(); // pad 3 bytes total
        res.write_u32::<BigEndian>(self.capabilities.bits()).unwrap();
        res.write_u32::<BigEndian>(self.actions.bits()).unwrap();
        for port in self.ports {
            res.extend_from_slice(&Into::<Vec<u8>>::into(port)[..]);
        }
        res
    }
}

bitflags! {
    /// ofp_capabilities: datapath-wide features the switch supports.
    pub struct Capabilities: u32 {
        const FLOW_STATS = 1 << 0;
        const TABLE_STATS = 1 << 1;
        const PORT_STATS = 1 << 2;
        const STP = 1 << 3;
        const IP_REASM = 1 << 5;
        const QUEUE_STATS = 1 << 6;
        const ARP_MATCH_IP = 1 << 7;
    }
}

bitflags! {
    /// ofp_action_type bitmap: actions the switch supports in a flow-mod / packet-out.
    pub struct SupportedActions: u32 {
        const OUTPUT = 1 << 0;
        const SET_VLAN_VID = 1 << 1;
        const SET_VLAN_PCP = 1 << 2;
        const STRIP_VLAN = 1 << 3;
        const SET_DL_SRC = 1 << 4;
        const SET_DL_DST = 1 << 5;
        const SET_NW_SRC = 1 << 6;
        const SET_NW_DST = 1 << 7;
        const SET_NW_TOS = 1 << 8;
        const SET_TP_SRC = 1 << 9;
        const SET_TP_DST = 1 << 10;
        const ENQUEUE = 1 << 11;
        const VENDOR = 1 << 12;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_with_no_ports() {
        let features = SwitchFeatures {
            datapath_id: 1,
            n_buffers: 256,
            n_tables: 1,
            capabilities: Capabilities::empty(),
            actions: SupportedActions::empty(),
            ports: Vec::new(),
        };
        let bytes: Vec<u8> = features.clone().into();
        assert_eq!(SwitchFeatures::try_from(&bytes[..]).unwrap(), features);
    }
}
