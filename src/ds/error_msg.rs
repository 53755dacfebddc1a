use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::Cursor;

use super::super::err::*;

/// an OpenFlow ERROR message. the controller does not interpret `data`
/// beyond logging it; per-type code enums (HELLO_FAILED, BAD_REQUEST, ...)
/// are left as raw integers since the core never branches on them.
#[derive(Debug, PartialEq, Clone)]
pub struct ErrorMsg {
    pub etype: ErrorType,
    pub code: u16,
    pub data: Vec<u8>,
}

impl<'a> TryFrom<&'a [u8]> for ErrorMsg {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let etype_raw = cursor.read_u16::<BigEndian>().unwrap();
        let etype = ErrorType::from_u16(etype_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(etype_raw as u64, stringify!(ErrorType)).into())?;
        let code = cursor.read_u16::<BigEndian>().unwrap();
        let data = Vec::from(&bytes[cursor.position() as usize..]);
        Ok(ErrorMsg { etype, code, data })
    }
}

impl Into<Vec<u8>> for ErrorMsg {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(self.etype.to_u16().unwrap()).unwrap();
        res.write_u16::<BigEndian>(self.code).unwrap();
        res.extend_from_slice(&self.data[..]);
        res
    }
}

/// OFPET_* error categories (OpenFlow 1.0).
#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorType {
    HelloFailed = 0,
    BadRequest = 1,
    BadAction = 2,
    FlowModFailed = 3,
    PortModFailed = 4,
    QueueOpFailed = 5,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_tryfrom() {
        let msg = ErrorMsg {
            etype: ErrorType::HelloFailed,
            code: 1,
            data: vec![1, 2, 3],
        };
        let bytes: Vec<u8> = msg.clone().into();
        assert_eq!(ErrorMsg::try_from(&bytes[..]).unwrap(), msg);
    }
}
