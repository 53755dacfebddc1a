use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::super::err::*;
use super::ports::PortNumber;

/// PACKET_IN: a frame the datapath could not match (or was told to send up)
/// along with enough of it to decide what to do. OpenFlow 1.0 carries no
/// match or table id here, only the ingress port.
#[derive(Debug, PartialEq, Clone)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: PortNumber,
    pub reason: InReason,
    // pad 1 byte
    pub data: Vec<u8>,
}

unsafe impl Send for PacketIn {}

impl<'a> TryFrom<&'a [u8]> for PacketIn {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 10 {
            bail!(ErrorKind::InvalidSliceLength(10, bytes.len(), stringify!(PacketIn)));
        }
        let mut cursor = Cursor::new(bytes);
        let buffer_id = cursor.read_u32::<BigEndian>().unwrap();
        let total_len = cursor.read_u16::<BigEndian>().unwrap();
        let in_port = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        let reason_raw = cursor.read_u8().unwrap();
        let reason = InReason::from_u8(reason_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(reason_raw as u64, stringify!(InReason)).into())?;
        cursor.seek(SeekFrom::Current(1)).unwrap(); // pad

        let data = Vec::from(&bytes[cursor.position() as usize..]);

        Ok(PacketIn {
            buffer_id,
            total_len,
            in_port,
            reason,
            data,
        })
    }
}

impl Into<Vec<u8>> for PacketIn {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u32::<BigEndian>(self.buffer_id).unwrap();
        res.write_u16::<BigEndian>(self.total_len).unwrap();
        res.write_u16::<BigEndian>(self.in_port.into()).unwrap();
        res.write_u8(self.reason.to_u8().unwrap()).unwrap();
        res.write_u8(0).unwrap(); // pad
        res.extend_from_slice(&self.data[..]);
        res
    }
}

/// why is this packet being sent to the controller?
#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum InReason {
    /// no matching flow (table-miss).
    NoMatch = 0,
    /// action explicitly output to controller.
    Action = 1,
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ports::PortNo;

    fn sample() -> PacketIn {
        PacketIn {
            buffer_id: 7,
            total_len: 64,
            in_port: PortNumber::NormalPort(3),
            reason: InReason::NoMatch,
            data: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    #[test]
    fn roundtrips() {
        let pi = sample();
        let bytes: Vec<u8> = pi.clone().into();
        assert_eq!(PacketIn::try_from(&bytes[..]).unwrap(), pi);
    }

    #[test]
    fn buffer_id_none_means_full_packet_included() {
        let mut pi = sample();
        pi.buffer_id = 0xffff_ffff;
        let bytes: Vec<u8> = pi.clone().into();
        let back = PacketIn::try_from(&bytes[..]).unwrap();
        assert_eq!(back.buffer_id, 0xffff_ffff);
        assert_eq!(back.data, pi.data);
    }

    #[test]
    fn reserved_in_port_roundtrips() {
        let mut pi = sample();
        pi.in_port = PortNumber::Reserved(PortNo::Local);
        let bytes: Vec<u8> = pi.clone().into();
        assert_eq!(PacketIn::try_from(&bytes[..]).unwrap(), pi);
    }
}
