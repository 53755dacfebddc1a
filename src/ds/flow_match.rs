//! the OpenFlow 1.0 fixed-layout match (`ofp_match`): 40 bytes, every field
//! always present, with a wildcard bitmap marking which fields are "don't
//! care". used by FLOW_MOD, FLOW_REMOVED and PACKET_IN.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::super::err::*;
use super::hw_addr::{self, EthernetAddress};
use super::ports::PortNumber;

pub const MATCH_LENGTH: usize = 40;

bitflags! {
    /// OFPFW_*: which fields of a [`Match`] are wildcarded (ignored).
    pub struct Wildcards: u32 {
        const IN_PORT = 1 << 0;
        const DL_VLAN = 1 << 1;
        const DL_SRC = 1 << 2;
        const DL_DST = 1 << 3;
        const DL_TYPE = 1 << 4;
        const NW_PROTO = 1 << 5;
        const TP_SRC = 1 << 6;
        const TP_DST = 1 << 7;
        const DL_VLAN_PCP = 1 << 20;
        const NW_TOS = 1 << 21;
        const ALL = 0x003f_ffff;
    }
}

/// a netmask width for `nw_src`/`nw_dst`, packed into bits 8..14 and 14..20
/// of the wildcard word (0 = exact match, 32 = fully wildcarded).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NwMaskLen {
    pub src_bits: u8,
    pub dst_bits: u8,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Match {
    pub wildcards: Wildcards,
    pub nw_mask: NwMaskLen,
    pub in_port: PortNumber,
    pub dl_src: EthernetAddress,
    pub dl_dst: EthernetAddress,
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Match {
    /// a match that wildcards everything.
    pub fn any() -> Self {
        Match {
            wildcards: Wildcards::ALL,
            nw_mask: NwMaskLen { src_bits: 32, dst_bits: 32 },
            in_port: PortNumber::NormalPort(0),
            dl_src: [0u8; 6],
            dl_dst: [0u8; 6],
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: 0,
            nw_dst: 0,
            tp_src: 0,
            tp_dst: 0,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Match {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != MATCH_LENGTH {
            bail!(ErrorKind::InvalidSliceLength(MATCH_LENGTH, bytes.len(), stringify!(Match)));
        }
        let mut cursor = Cursor::new(bytes);
        let wildcards_raw = cursor.read_u32::<BigEndian>().unwrap();
        let wildcards = Wildcards::from_bits_truncate(wildcards_raw);
        let nw_mask = NwMaskLen {
            src_bits: ((wildcards_raw >> 8) & 0x3f) as u8,
            dst_bits: ((wildcards_raw >> 14) & 0x3f) as u8,
        };
        let in_port = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        let dl_src = hw_addr::from_slice_eth(&bytes[6..12])?;
        let dl_dst = hw_addr::from_slice_eth(&bytes[12..18])?;
        cursor.seek(SeekFrom::Start(18)).unwrap();
        let dl_vlan = cursor.read_u16::<BigEndian>().unwrap();
        let dl_vlan_pcp = cursor.read_u8().unwrap();
        cursor.seek(SeekFrom::Current(1)).unwrap(); // pad
        let dl_type = cursor.read_u16::<BigEndian>().unwrap();
        let nw_tos = cursor.read_u8().unwrap();
        let nw_proto = cursor.read_u8().unwrap();
        cursor.seek(SeekFrom::Current(2)).unwrap(); // pad
        let nw_src = cursor.read_u32::<BigEndian>().unwrap();
        let nw_dst = cursor.read_u32::<BigEndian>().unwrap();
        let tp_src = cursor.read_u16::<BigEndian>().unwrap();
        let tp_dst = cursor.read_u16::<BigEndian>().unwrap();

        Ok(Match {
            wildcards,
            nw_mask,
            in_port,
            dl_src,
            dl_dst,
            dl_vlan,
            dl_vlan_pcp,
            dl_type,
            nw_tos,
            nw_proto,
            nw_src,
            nw_dst,
            tp_src,
            tp_dst,
        })
    }
}

impl Into<Vec<u8>> for Match {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        let packed = self.wildcards.bits()
            | ((self.nw_mask.src_bits as u32 & 0x3f) << 8)
            | ((self.nw_mask.dst_bits as u32 & 0x3f) << 14);
        res.write_u32::<BigEndian>(packed).unwrap();
        res.write_u16::<BigEndian>(self.in_port.into()).unwrap();
        res.extend_from_slice(&self.dl_src);
        res.extend_from_slice(&self.dl_dst);
        res.write_u16::<BigEndian>(self.dl_vlan).unwrap();
        res.write_u8(self.dl_vlan_pcp).unwrap();
        res.write_u8(0).unwrap(); // pad
        res.write_u16::<BigEndian>(self.dl_type).unwrap();
        res.write_u8(self.nw_tos).unwrap();
        res.write_u8(self.nw_proto).unwrap();
        res.write_u16::<BigEndian>(0).unwrap(); // pad
        res.write_u32::<BigEndian>(self.nw_src).unwrap();
        res.write_u32::<BigEndian>(self.nw_dst).unwrap();
        res.write_u16::<BigEndian>(self.tp_src).unwrap();
        res.write_u16::<BigEndian>(self.tp_dst).unwrap();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_roundtrips_and_has_fixed_length() {
        let m = Match::any();
        let bytes: Vec<u8> = m.clone().into();
        assert_eq!(MATCH_LENGTH, bytes.len());
        assert_eq!(Match::try_from(&bytes[..]).unwrap(), m);
    }

    #[test]
    fn wildcard_bits_are_independent_of_mask_lengths() {
        let mut m = Match::any();
        m.wildcards.remove(Wildcards::DL_TYPE);
        m.dl_type = 0x0800;
        m.nw_mask = NwMaskLen { src_bits: 8, dst_bits: 0 };
        let bytes: Vec<u8> = m.clone().into();
        let back = Match::try_from(&bytes[..]).unwrap();
        assert_eq!(back.dl_type, 0x0800);
        assert_eq!(back.nw_mask, m.nw_mask);
        assert!(!back.wildcards.contains(Wildcards::DL_TYPE));
    }
}
