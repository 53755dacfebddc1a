use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::actions::{calc_actions_len, ActionHeader};
use super::ports::PortNumber;

use super::super::err::*;

/// fixed header length before the actions list (buffer_id + in_port + actions_len).
pub const PACKET_OUT_HEADER_LEN: usize = 8;

/// PACKET_OUT: either replay a buffered packet or inject raw `data`, through
/// `actions`. when `buffer_id` is `0xffffffff` the full frame travels in `data`.
#[derive(Debug, PartialEq, Clone)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: PortNumber,
    pub actions_len: u16,
    pub actions: Vec<ActionHeader>,
    pub data: Vec<u8>,
}

impl PacketOut {
    pub fn new(buffer_id: u32, in_port: PortNumber, actions: Vec<ActionHeader>, data: Vec<u8>) -> Self {
        PacketOut {
            buffer_id,
            in_port,
            actions_len: calc_actions_len(&actions),
            actions,
            data,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for PacketOut {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < PACKET_OUT_HEADER_LEN {
            bail!(ErrorKind::InvalidSliceLength(
                PACKET_OUT_HEADER_LEN,
                bytes.len(),
                stringify!(PacketOut),
            ));
        }
        let mut cursor = Cursor::new(bytes);
        let buffer_id = cursor.read_u32::<BigEndian>().unwrap();
        let in_port = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        let actions_len = cursor.read_u16::<BigEndian>().unwrap();

        let mut actions = Vec::new();
        let mut bytes_remaining = actions_len as usize;
        while bytes_remaining > 0 {
            let action_len = ActionHeader::read_len(&mut cursor)?;
            let start = cursor.position() as usize;
            let action = ActionHeader::try_from(&bytes[start..start + action_len])?;
            actions.push(action);
            bytes_remaining -= action_len;
            cursor.seek(SeekFrom::Current(action_len as i64)).unwrap();
        }

        let data = Vec::from(&bytes[cursor.position() as usize..]);

        Ok(PacketOut {
            buffer_id,
            in_port,
            actions_len,
            actions,
            data,
        })
    }
}

impl Into<Vec<u8>> for PacketOut {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u32::<BigEndian>(self.buffer_id).unwrap();
        res.write_u16::<BigEndian>(self.in_port.into()).unwrap();
        res.write_u16::<BigEndian>(self.actions_len).unwrap();
        for action in self.actions {
            res.extend_from_slice(&Into::<Vec<u8>>::into(action)[..]);
        }
        res.extend_from_slice(&self.data[..]);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ports::PortNo;

    #[test]
    fn roundtrips_with_actions_and_data() {
        let po = PacketOut::new(
            0xffff_ffff,
            PortNumber::Reserved(PortNo::None),
            vec![ActionHeader::Output {
                port: PortNumber::Reserved(PortNo::Flood),
                max_len: 0,
            }],
            vec![1, 2, 3],
        );
        let bytes: Vec<u8> = po.clone().into();
        assert_eq!(PacketOut::try_from(&bytes[..]).unwrap(), po);
    }

    #[test]
    fn empty_actions_still_parses() {
        let po = PacketOut::new(1, PortNumber::NormalPort(2), Vec::new(), vec![]);
        let bytes: Vec<u8> = po.clone().into();
        assert_eq!(bytes.len(), PACKET_OUT_HEADER_LEN);
        assert_eq!(PacketOut::try_from(&bytes[..]).unwrap(), po);
    }
}
