use super::super::err::*;
use super::hw_addr;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::ffi::CString;
use std::io::{Cursor, Seek, SeekFrom, Write};

/// OpenFlow 1.0 port struct length is 48 bytes.
pub const PORT_LENGTH: usize = 48;

/// OpenFlow port description, as carried in FEATURES_REPLY and PORT_STATUS.
#[derive(Getters, Debug, PartialEq, Clone)]
pub struct Port {
    #[get = "pub"]
    port_no: PortNumber,
    #[get = "pub"]
    hw_addr: hw_addr::EthernetAddress,
    /// null-terminated, 16 bytes including the terminator
    #[get = "pub"]
    name: CString,
    #[get = "pub"]
    config: PortConfig,
    #[get = "pub"]
    state: PortState,
    #[get = "pub"]
    curr: PortFeatures,
    #[get = "pub"]
    advertised: PortFeatures,
    #[get = "pub"]
    supported: PortFeatures,
    #[get = "pub"]
    peer: PortFeatures,
}

impl<'a> TryFrom<&'a [u8]> for Port {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != PORT_LENGTH {
            bail!(ErrorKind::InvalidSliceLength(
                PORT_LENGTH,
                bytes.len(),
                stringify!(Port),
            ));
        }
        let mut cursor = Cursor::new(bytes);
        let port_no = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        cursor.seek(SeekFrom::Current(6)).unwrap(); // pad

        let hw_addr = hw_addr::from_slice_eth(&bytes[8..14])?;
        let name = unsafe { CString::from_vec_unchecked(Vec::from(&bytes[14..30])) };
        cursor.seek(SeekFrom::Start(30)).unwrap();

        let config = cursor.read_u32::<BigEndian>().unwrap();
        let config = PortConfig::from_bits(config)
            .ok_or::<Error>(ErrorKind::UnknownValue(config as u64, stringify!(PortConfig)).into())?;
        let state = cursor.read_u32::<BigEndian>().unwrap();
        let state = PortState::from_bits(state)
            .ok_or::<Error>(ErrorKind::UnknownValue(state as u64, stringify!(PortState)).into())?;
        let curr = cursor.read_u32::<BigEndian>().unwrap();
        let curr = PortFeatures::from_bits(curr)
            .ok_or::<Error>(ErrorKind::UnknownValue(curr as u64, stringify!(PortFeatures)).into())?;
        let advertised = cursor.read_u32::<BigEndian>().unwrap();
        let advertised = PortFeatures::from_bits(advertised)
            .ok_or::<Error>(ErrorKind::UnknownValue(advertised as u64, stringify!(PortFeatures)).into())?;
        let supported = cursor.read_u32::<BigEndian>().unwrap();
        let supported = PortFeatures::from_bits(supported)
            .ok_or::<Error>(ErrorKind::UnknownValue(supported as u64, stringify!(PortFeatures)).into())?;
        let peer = cursor.read_u32::<BigEndian>().unwrap();
        let peer = PortFeatures::from_bits(peer)
            .ok_or::<Error>(ErrorKind::UnknownValue(peer as u64, stringify!(PortFeatures)).into())?;

        Ok(Port {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
        })
    }
}

impl Into<Vec<u8>> for Port {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(self.port_no.into()).unwrap();
        res.write_u32::<BigEndian>(0).unwrap(); // 6 bytes pad (4 + 2 below)
        res.write_u16::<BigEndian>(0).unwrap();
        res.extend_from_slice(&self.hw_addr[..]);

        let name_bytes = self.name.into_bytes();
        let mut written = res.write(&name_bytes[..]).unwrap();
        while written < 16 {
            res.write_u8(0u8).unwrap();
            written += 1;
        }

        res.write_u32::<BigEndian>(self.config.bits()).unwrap();
        res.write_u32::<BigEndian>(self.state.bits()).unwrap();
        res.write_u32::<BigEndian>(self.curr.bits()).unwrap();
        res.write_u32::<BigEndian>(self.advertised.bits()).unwrap();
        res.write_u32::<BigEndian>(self.supported.bits()).unwrap();
        res.write_u32::<BigEndian>(self.peer.bits()).unwrap();
        res
    }
}

/// a port number as it appears on the wire: either a reserved pseudo-port
/// or a real, switch-assigned port number.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PortNumber {
    Reserved(PortNo),
    NormalPort(u16),
}

impl TryFrom<u16> for PortNumber {
    type Error = Error;
    fn try_from(port_no: u16) -> Result<Self> {
        Ok(match PortNo::from_u16(port_no) {
            Some(port) => PortNumber::Reserved(port),
            None => PortNumber::NormalPort(port_no),
        })
    }
}

impl Into<u16> for PortNumber {
    fn into(self) -> u16 {
        match self {
            PortNumber::Reserved(port_no) => port_no.to_u16().unwrap(),
            PortNumber::NormalPort(port_no) => port_no,
        }
    }
}

/// reserved OpenFlow 1.0 port numbers (OFPP_*). real ports are numbered [1, MAX].
#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum PortNo {
    Max = 0xff00,
    InPort = 0xfff8,
    Table = 0xfff9,
    Normal = 0xfffa,
    Flood = 0xfffb,
    All = 0xfffc,
    Controller = 0xfffd,
    Local = 0xfffe,
    None = 0xffff,
}

impl Into<PortNumber> for PortNo {
    fn into(self) -> PortNumber {
        PortNumber::Reserved(self)
    }
}

bitflags! {
    /// ofp_port_config: describes the current and desired administrative
    /// configuration of a port.
    pub struct PortConfig: u32 {
        const PORT_DOWN = 1 << 0;
        const NO_STP = 1 << 1;
        const NO_RECV = 1 << 2;
        const NO_RECV_STP = 1 << 3;
        const NO_FLOOD = 1 << 4;
        const NO_FWD = 1 << 5;
        const NO_PACKET_IN = 1 << 6;
    }
}

bitflags! {
    /// ofp_port_state: not configurable by the controller.
    pub struct PortState: u32 {
        const LINK_DOWN = 1 << 0;
        const STP_LISTEN = 0 << 8;
        const STP_LEARN = 1 << 8;
        const STP_FORWARD = 2 << 8;
        const STP_BLOCK = 3 << 8;
        const STP_MASK = 3 << 8;
    }
}

bitflags! {
    /// ofp_port_features: advertised/supported/peer link speeds and modes.
    pub struct PortFeatures: u32 {
        const MB10_HD = 1 << 0;
        const MB10_FD = 1 << 1;
        const MB100_HD = 1 << 2;
        const MB100_FD = 1 << 3;
        const GB1_HD = 1 << 4;
        const GB1_FD = 1 << 5;
        const GB10_FD = 1 << 6;
        const COPPER = 1 << 7;
        const FIBER = 1 << 8;
        const AUTONEG = 1 << 9;
        const PAUSE = 1 << 10;
        const PAUSE_ASYM = 1 << 11;
    }
}

#[cfg(test)]
mod tests {
    use super::super::hw_addr;
    use super::*;

    fn sample_port() -> Port {
        Port {
            port_no: PortNumber::NormalPort(1),
            hw_addr: hw_addr::from_slice_eth(&[0u8; 6]).unwrap(),
            name: ::std::ffi::CString::new(b"eth0".to_vec()).unwrap(),
            config: PortConfig::empty(),
            state: PortState::empty(),
            curr: PortFeatures::MB10_HD,
            advertised: PortFeatures::MB10_HD,
            supported: PortFeatures::MB10_HD,
            peer: PortFeatures::MB10_HD,
        }
    }

    #[test]
    fn tryfrom_wrong_length_errs() {
        assert!(Port::try_from(&[0u8; PORT_LENGTH - 1][..]).is_err());
    }

    #[test]
    fn into_has_fixed_length() {
        let bytes: Vec<u8> = sample_port().into();
        assert_eq!(PORT_LENGTH, bytes.len());
    }

    #[test]
    fn roundtrip() {
        let testee = sample_port();
        let bytes = Into::<Vec<u8>>::into(testee.clone());
        let back = Port::try_from(&bytes[..]).expect("decode port");
        assert_eq!(testee.port_no, back.port_no);
        assert_eq!(testee.hw_addr, back.hw_addr);
        assert_eq!(testee.curr, back.curr);
    }

    #[test]
    fn reserved_port_roundtrips() {
        let n = PortNumber::Reserved(PortNo::Flood);
        let raw: u16 = n.into();
        assert_eq!(PortNumber::try_from(raw).unwrap(), n);
    }
}
