//! opaque 64-bit switch and management identifiers

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::{Into, TryFrom};
use std::fmt;
use std::io::Cursor;

use super::err::*;

/// identifies a switch's datapath, learned from a features reply.
/// also used to represent a management endpoint id learned from a capability reply;
/// the two id spaces are disjoint in the wire protocol but share this representation.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct DatapathId(u64);

impl DatapathId {
    pub fn new(raw: u64) -> Self {
        DatapathId(raw)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for DatapathId {
    fn from(raw: u64) -> Self {
        DatapathId(raw)
    }
}

impl Into<u64> for DatapathId {
    fn into(self) -> u64 {
        self.0
    }
}

impl<'a> TryFrom<&'a [u8]> for DatapathId {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != 8 {
            return Err(ErrorKind::InvalidSliceLength(8, bytes.len(), stringify!(DatapathId)).into());
        }
        let mut cursor = Cursor::new(bytes);
        Ok(DatapathId(cursor.read_u64::<BigEndian>().unwrap()))
    }
}

impl Into<Vec<u8>> for DatapathId {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u64::<BigEndian>(self.0).unwrap();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_hex() {
        let id = DatapathId::new(1);
        assert_eq!(format!("{}", id), "0x0000000000000001");
    }

    #[test]
    fn roundtrip() {
        let id = DatapathId::new(0xdead_beef_1234_5678);
        let bytes: Vec<u8> = id.into();
        let back = DatapathId::try_from(&bytes[..]).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(DatapathId::new(1) < DatapathId::new(2));
    }
}
