use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::flow_match::{Match, MATCH_LENGTH};

use super::super::err::*;

/// FLOW_REMOVED: a flow entry expired or was evicted. the match comes first
/// on the wire in OpenFlow 1.0, unlike later versions.
#[derive(Debug, PartialEq, Clone)]
pub struct FlowRemoved {
    pub mmatch: Match,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    // pad 1 byte
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: u16,
    // pad 2 bytes
    pub packet_count: u64,
    pub byte_count: u64,
}

impl<'a> TryFrom<&'a [u8]> for FlowRemoved {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < MATCH_LENGTH + 40 {
            bail!(ErrorKind::InvalidSliceLength(
                MATCH_LENGTH + 40,
                bytes.len(),
                stringify!(FlowRemoved),
            ));
        }
        let mmatch = Match::try_from(&bytes[0..MATCH_LENGTH])?;

        let mut cursor = Cursor::new(bytes);
        cursor.seek(SeekFrom::Start(MATCH_LENGTH as u64)).unwrap();
        let cookie = cursor.read_u64::<BigEndian>().unwrap();
        let priority = cursor.read_u16::<BigEndian>().unwrap();
        let reason_raw = cursor.read_u8().unwrap();
        let reason = FlowRemovedReason::from_u8(reason_raw).ok_or::<Error>(
            ErrorKind::UnknownValue(reason_raw as u64, stringify!(FlowRemovedReason)).into(),
        )?;
        cursor.seek(SeekFrom::Current(1)).unwrap(); // pad
        let duration_sec = cursor.read_u32::<BigEndian>().unwrap();
        let duration_nsec = cursor.read_u32::<BigEndian>().unwrap();
        let idle_timeout = cursor.read_u16::<BigEndian>().unwrap();
        cursor.seek(SeekFrom::Current(2)).unwrap(); // pad
        let packet_count = cursor.read_u64::<BigEndian>().unwrap();
        let byte_count = cursor.read_u64::<BigEndian>().unwrap();

        Ok(FlowRemoved {
            mmatch,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
        })
    }
}

impl Into<Vec<u8>> for FlowRemoved {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.extend_from_slice(&Into::<Vec<u8>>::into(self.mmatch)[..]);
        res.write_u64::<BigEndian>(self.cookie).unwrap();
        res.write_u16::<BigEndian>(self.priority).unwrap();
        res.write_u8(self.reason.to_u8().unwrap()).unwrap();
        res.write_u8(0).unwrap(); // pad
        res.write_u32::<BigEndian>(self.duration_sec).unwrap();
        res.write_u32::<BigEndian>(self.duration_nsec).unwrap();
        res.write_u16::<BigEndian>(self.idle_timeout).unwrap();
        res.write_u16::<BigEndian>(0).unwrap(); // pad
        res.write_u64::<BigEndian>(self.packet_count).unwrap();
        res.write_u64::<BigEndian>(self.byte_count).unwrap();
        res
    }
}

/// why was this flow removed?
#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum FlowRemovedReason {
    /// flow idle time exceeded idle_timeout.
    IdleTimeout = 0,
    /// time exceeded hard_timeout.
    HardTimeout = 1,
    /// evicted by a DELETE flow mod.
    Delete = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let fr = FlowRemoved {
            mmatch: Match::any(),
            cookie: 42,
            priority: 1,
            reason: FlowRemovedReason::Delete,
            duration_sec: 10,
            duration_nsec: 0,
            idle_timeout: 0,
            packet_count: 5,
            byte_count: 500,
        };
        let bytes: Vec<u8> = fr.clone().into();
        assert_eq!(FlowRemoved::try_from(&bytes[..]).unwrap(), fr);
    }
}
