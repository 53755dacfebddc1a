//! OpenFlow 1.0 actions: the flat, fixed-shape action set carried by
//! FLOW_MOD and PACKET_OUT (no instruction wrapping, unlike later versions).
//! every action is an 8 byte `type, length` header followed by a body padded
//! to a multiple of 8 bytes.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::super::err::*;
use super::hw_addr::{self, EthernetAddress};
use super::ports::PortNumber;

#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum ActionType {
    Output = 0,
    SetVlanVid = 1,
    SetVlanPcp = 2,
    StripVlan = 3,
    SetDlSrc = 4,
    SetDlDst = 5,
    SetNwSrc = 6,
    SetNwDst = 7,
    SetNwTos = 8,
    SetTpSrc = 9,
    SetTpDst = 10,
    Enqueue = 11,
    Vendor = 0xffff,
}

/// the typed body of an action, excluding its 8 byte header.
#[derive(Debug, PartialEq, Clone)]
pub enum ActionHeader {
    Output { port: PortNumber, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc(EthernetAddress),
    SetDlDst(EthernetAddress),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue { port: PortNumber, queue_id: u32 },
    Vendor { vendor_id: u32, data: Vec<u8> },
}

impl ActionHeader {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionHeader::Output { .. } => ActionType::Output,
            ActionHeader::SetVlanVid(_) => ActionType::SetVlanVid,
            ActionHeader::SetVlanPcp(_) => ActionType::SetVlanPcp,
            ActionHeader::StripVlan => ActionType::StripVlan,
            ActionHeader::SetDlSrc(_) => ActionType::SetDlSrc,
            ActionHeader::SetDlDst(_) => ActionType::SetDlDst,
            ActionHeader::SetNwSrc(_) => ActionType::SetNwSrc,
            ActionHeader::SetNwDst(_) => ActionType::SetNwDst,
            ActionHeader::SetNwTos(_) => ActionType::SetNwTos,
            ActionHeader::SetTpSrc(_) => ActionType::SetTpSrc,
            ActionHeader::SetTpDst(_) => ActionType::SetTpDst,
            ActionHeader::Enqueue { .. } => ActionType::Enqueue,
            ActionHeader::Vendor { .. } => ActionType::Vendor,
        }
    }

    /// on-wire length of this action including its 8 byte header, always a
    /// multiple of 8.
    pub fn wire_len(&self) -> u16 {
        match self {
            ActionHeader::StripVlan
            | ActionHeader::SetVlanVid(_)
            | ActionHeader::SetVlanPcp(_)
            | ActionHeader::SetDlSrc(_)
            | ActionHeader::SetDlDst(_)
            | ActionHeader::SetNwSrc(_)
            | ActionHeader::SetNwDst(_)
            | ActionHeader::SetNwTos(_)
            | ActionHeader::Output { .. }
            | ActionHeader::SetTpSrc(_)
            | ActionHeader::SetTpDst(_)
            | ActionHeader::Enqueue { .. } => 8,
            ActionHeader::Vendor { data, .. } => {
                let body = 4 + data.len();
                (8 + ((body + 7) / 8) * 8) as u16
            }
        }
    }

    /// reads the `type, length` header without consuming the body, so the
    /// caller can slice out exactly `length` bytes for [`ActionHeader::try_from`].
    pub fn read_len(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
        let start = cursor.position();
        cursor.seek(SeekFrom::Current(2)).unwrap();
        let len = cursor.read_u16::<BigEndian>().chain_err(|| "could not read action length")?;
        cursor.seek(SeekFrom::Start(start)).unwrap();
        Ok(len as usize)
    }
}

pub fn calc_actions_len(actions: &[ActionHeader]) -> u16 {
    actions.iter().map(ActionHeader::wire_len).sum()
}

impl<'a> TryFrom<&'a [u8]> for ActionHeader {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 8 {
            bail!(ErrorKind::InvalidSliceLength(8, bytes.len(), stringify!(ActionHeader)));
        }
        let mut cursor = Cursor::new(bytes);
        let ttype_raw = cursor.read_u16::<BigEndian>().unwrap();
        let ttype = ActionType::from_u16(ttype_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(ttype_raw as u64, stringify!(ActionType)).into())?;
        let _len = cursor.read_u16::<BigEndian>().unwrap();
        let body = &bytes[4..];

        Ok(match ttype {
            ActionType::Output => {
                let mut c = Cursor::new(body);
                let port = PortNumber::try_from(c.read_u16::<BigEndian>().unwrap())?;
                let max_len = c.read_u16::<BigEndian>().unwrap();
                ActionHeader::Output { port, max_len }
            }
            ActionType::SetVlanVid => {
                ActionHeader::SetVlanVid(Cursor::new(body).read_u16::<BigEndian>().unwrap())
            }
            ActionType::SetVlanPcp => ActionHeader::SetVlanPcp(body[0]),
            ActionType::StripVlan => ActionHeader::StripVlan,
            ActionType::SetDlSrc => ActionHeader::SetDlSrc(hw_addr::from_slice_eth(&body[0..6])?),
            ActionType::SetDlDst => ActionHeader::SetDlDst(hw_addr::from_slice_eth(&body[0..6])?),
            ActionType::SetNwSrc => {
                ActionHeader::SetNwSrc(Cursor::new(body).read_u32::<BigEndian>().unwrap())
            }
            ActionType::SetNwDst => {
                ActionHeader::SetNwDst(Cursor::new(body).read_u32::<BigEndian>().unwrap())
            }
            ActionType::SetNwTos => ActionHeader::SetNwTos(body[0]),
            ActionType::SetTpSrc => {
                ActionHeader::SetTpSrc(Cursor::new(body).read_u16::<BigEndian>().unwrap())
            }
            ActionType::SetTpDst => {
                ActionHeader::SetTpDst(Cursor::new(body).read_u16::<BigEndian>().unwrap())
            }
            ActionType::Enqueue => {
                let mut c = Cursor::new(body);
                let port = PortNumber::try_from(c.read_u16::<BigEndian>().unwrap())?;
                c.seek(SeekFrom::Current(6)).unwrap();
                let queue_id = c.read_u32::<BigEndian>().unwrap();
                ActionHeader::Enqueue { port, queue_id }
            }
            ActionType::Vendor => {
                let mut c = Cursor::new(body);
                let vendor_id = c.read_u32::<BigEndian>().unwrap();
                ActionHeader::Vendor {
                    vendor_id,
                    data: Vec::from(&body[4..]),
                }
            }
        })
    }
}

impl Into<Vec<u8>> for ActionHeader {
    fn into(self) -> Vec<u8> {
        let ttype = self.action_type();
        let len = self.wire_len();
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(ttype.to_u16().unwrap()).unwrap();
        res.write_u16::<BigEndian>(len).unwrap();
        match self {
            ActionHeader::Output { port, max_len } => {
                res.write_u16::<BigEndian>(port.into()).unwrap();
                res.write_u16::<BigEndian>(max_len).unwrap();
            }
            ActionHeader::SetVlanVid(vid) => {
                res.write_u16::<BigEndian>(vid).unwrap();
                res.write_u16::<BigEndian>(0).unwrap();
            }
            ActionHeader::SetVlanPcp(pcp) => {
                res.write_u8(pcp).unwrap();
                res.extend_from_slice(&[0u8; 3]);
            }
            ActionHeader::StripVlan => res.extend_from_slice(&[0u8; 4]),
            ActionHeader::SetDlSrc(addr) | ActionHeader::SetDlDst(addr) => {
                res.extend_from_slice(&addr);
                res.extend_from_slice(&[0u8; 2]);
            }
            ActionHeader::SetNwSrc(addr) | ActionHeader::SetNwDst(addr) => {
                res.write_u32::<BigEndian>(addr).unwrap();
            }
            ActionHeader::SetNwTos(tos) => {
                res.write_u8(tos).unwrap();
                res.extend_from_slice(&[0u8; 3]);
            }
            ActionHeader::SetTpSrc(port) | ActionHeader::SetTpDst(port) => {
                res.write_u16::<BigEndian>(port).unwrap();
                res.write_u16::<BigEndian>(0).unwrap();
            }
            ActionHeader::Enqueue { port, queue_id } => {
                res.write_u16::<BigEndian>(port.into()).unwrap();
                res.extend_from_slice(&[0u8; 6]);
                res.write_u32::<BigEndian>(queue_id).unwrap();
            }
            ActionHeader::Vendor { vendor_id, data } => {
                res.write_u32::<BigEndian>(vendor_id).unwrap();
                res.extend_from_slice(&data);
                while res.len() % 8 != 0 {
                    res.push(0);
                }
            }
        }
        res
    }
}

/// the action a port-level source-NAT command installs: rewrite `nw_src` to
/// `addr` before forwarding. grounded in §6 `send_add_snat`.
pub fn snat_action(addr: u32) -> ActionHeader {
    ActionHeader::SetNwSrc(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_roundtrips() {
        let a = ActionHeader::Output {
            port: PortNumber::Reserved(super::super::ports::PortNo::Flood),
            max_len: 0,
        };
        let bytes: Vec<u8> = a.clone().into();
        assert_eq!(bytes.len(), 8);
        assert_eq!(ActionHeader::try_from(&bytes[..]).unwrap(), a);
    }

    #[test]
    fn vendor_pads_to_8_bytes() {
        let a = ActionHeader::Vendor {
            vendor_id: 0x2320,
            data: vec![1, 2, 3],
        };
        let bytes: Vec<u8> = a.clone().into();
        assert_eq!(bytes.len() % 8, 0);
        assert_eq!(ActionHeader::try_from(&bytes[..]).unwrap(), a);
    }

    #[test]
    fn calc_actions_len_sums_wire_lengths() {
        let actions = vec![
            ActionHeader::StripVlan,
            ActionHeader::SetNwSrc(0x0a00_0001),
        ];
        assert_eq!(calc_actions_len(&actions), 16);
    }
}
