use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::hw_addr::{from_slice_eth, EthernetAddress};
use super::ports::{PortConfig, PortFeatures, PortNumber};

use super::super::err::*;

pub const PORT_MOD_LENGTH: usize = 24;

/// PORT_MOD: requests a change to a port's administrative configuration.
/// the switch must check `hw_addr` against its current idea of the port
/// before applying, rejecting the command if it has changed.
#[derive(Debug, PartialEq, Clone)]
pub struct PortMod {
    pub port_no: PortNumber,
    pub hw_addr: EthernetAddress,
    pub config: PortConfig,
    pub mask: PortConfig,
    pub advertise: PortFeatures,
    // pad 4 bytes
}

unsafe impl Send for PortMod {}

impl<'a> TryFrom<&'a [u8]> for PortMod {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != PORT_MOD_LENGTH {
            bail!(ErrorKind::InvalidSliceLength(
                PORT_MOD_LENGTH,
                bytes.len(),
                stringify!(PortMod),
            ));
        }
        let mut cursor = Cursor::new(bytes);
        let port_no = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        let hw_addr = from_slice_eth(&bytes[2..8])?;
        cursor.seek(SeekFrom::Start(8)).unwrap();

        let config = cursor.read_u32::<BigEndian>().unwrap();
        let config = PortConfig::from_bits(config)
            .ok_or::<Error>(ErrorKind::UnknownValue(config as u64, stringify!(PortConfig)).into())?;
        let mask = cursor.read_u32::<BigEndian>().unwrap();
        let mask = PortConfig::from_bits(mask)
            .ok_or::<Error>(ErrorKind::UnknownValue(mask as u64, stringify!(PortConfig)).into())?;
        let advertise = cursor.read_u32::<BigEndian>().unwrap();
        let advertise = PortFeatures::from_bits(advertise)
            .ok_or::<Error>(ErrorKind::UnknownValue(advertise as u64, stringify!(PortFeatures)).into())?;

        Ok(PortMod {
            port_no,
            hw_addr,
            config,
            mask,
            advertise,
        })
    }
}

impl Into<Vec<u8>> for PortMod {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(self.port_no.into()).unwrap();
        res.extend_from_slice(&self.hw_addr[..]);
        res.write_u32::<BigEndian>(self.config.bits()).unwrap();
        res.write_u32::<BigEndian>(self.mask.bits()).unwrap();
        res.write_u32::<BigEndian>(self.advertise.bits()).unwrap();
        res.write_u32::<BigEndian>(0).unwrap(); // pad 4 bytes
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_with_fixed_length() {
        let pm = PortMod {
            port_no: PortNumber::NormalPort(3),
            hw_addr: from_slice_eth(&[1, 2, 3, 4, 5, 6]).unwrap(),
            config: PortConfig::PORT_DOWN,
            mask: PortConfig::PORT_DOWN,
            advertise: PortFeatures::empty(),
        };
        let bytes: Vec<u8> = pm.clone().into();
        assert_eq!(bytes.len(), PORT_MOD_LENGTH);
        assert_eq!(PortMod::try_from(&bytes[..]).unwrap(), pm);
    }
}
