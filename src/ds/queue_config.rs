use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::packet_queue;
use super::ports::PortNumber;

use super::super::err::*;

pub const QUEUE_GET_CONFIG_REQUEST_LEN: usize = 4;

#[derive(Debug, PartialEq, Clone)]
pub struct QueueGetConfigRequest {
    pub port: PortNumber,
    // pad 2 bytes
}

impl Into<Vec<u8>> for QueueGetConfigRequest {
    fn into(self) -> Vec<u8> {
        let mut vec = Vec::new();
        vec.write_u16::<BigEndian>(self.port.into()).unwrap();
        vec.write_u16::<BigEndian>(0).unwrap(); // pad
        vec
    }
}

impl<'a> TryFrom<&'a [u8]> for QueueGetConfigRequest {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != QUEUE_GET_CONFIG_REQUEST_LEN {
            bail!(ErrorKind::InvalidSliceLength(
                QUEUE_GET_CONFIG_REQUEST_LEN,
                bytes.len(),
                stringify!(QueueGetConfigRequest),
            ));
        }
        let mut cursor = Cursor::new(bytes);
        Ok(QueueGetConfigRequest {
            port: PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?,
        })
    }
}

unsafe impl Send for QueueGetConfigRequest {}

pub const QUEUE_GET_CONFIG_REPLY_HEADER_LEN: usize = 8;

#[derive(Debug, PartialEq, Clone)]
pub struct QueueGetConfigReply {
    pub port: PortNumber,
    // pad 6 bytes
    pub queues: Vec<packet_queue::PacketQueue>,
}

impl Into<Vec<u8>> for QueueGetConfigReply {
    fn into(self) -> Vec<u8> {
        let mut vec = Vec::new();
        vec.write_u16::<BigEndian>(self.port.into()).unwrap();
        vec.write_u16::<BigEndian>(0).unwrap();
        vec.write_u32::<BigEndian>(0).unwrap(); // pad, 6 bytes total
        for queue in self.queues {
            vec.extend_from_slice(&Into::<Vec<u8>>::into(queue)[..]);
        }
        vec
    }
}

impl<'a> TryFrom<&'a [u8]> for QueueGetConfigReply {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < QUEUE_GET_CONFIG_REPLY_HEADER_LEN {
            bail!(ErrorKind::InvalidSliceLength(
                QUEUE_GET_CONFIG_REPLY_HEADER_LEN,
                bytes.len(),
                stringify!(QueueGetConfigReply),
            ));
        }
        let mut cursor = Cursor::new(bytes);
        let port = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        cursor.seek(SeekFrom::Start(QUEUE_GET_CONFIG_REPLY_HEADER_LEN as u64)).unwrap();

        let mut queues = Vec::new();
        let mut pos = cursor.position() as usize;
        while pos < bytes.len() {
            let queue_len = packet_queue::PacketQueue::read_len(&mut cursor)?;
            let queue = packet_queue::PacketQueue::try_from(&bytes[pos..pos + queue_len])?;
            queues.push(queue);
            pos += queue_len;
            cursor.seek(SeekFrom::Start(pos as u64)).unwrap();
        }

        Ok(QueueGetConfigReply { port, queues })
    }
}

unsafe impl Send for QueueGetConfigReply {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let req = QueueGetConfigRequest {
            port: PortNumber::NormalPort(5),
        };
        let bytes: Vec<u8> = req.clone().into();
        assert_eq!(QueueGetConfigRequest::try_from(&bytes[..]).unwrap(), req);
    }

    #[test]
    fn reply_with_no_queues_roundtrips() {
        let reply = QueueGetConfigReply {
            port: PortNumber::NormalPort(5),
            queues: Vec::new(),
        };
        let bytes: Vec<u8> = reply.clone().into();
        assert_eq!(bytes.len(), QUEUE_GET_CONFIG_REPLY_HEADER_LEN);
        assert_eq!(QueueGetConfigReply::try_from(&bytes[..]).unwrap(), reply);
    }
}
