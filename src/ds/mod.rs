//! OpenFlow 1.0 wire types: the header, the message type tag, and the
//! `OfPayload` dispatch enum the codec parses bodies into once the header's
//! `ttype` is known.

pub mod actions;
pub mod error_msg;
pub mod features;
pub mod flow_match;
pub mod flow_mod;
pub mod flow_removed;
pub mod hw_addr;
pub mod packet_in;
pub mod packet_out;
pub mod packet_queue;
pub mod port_mod;
pub mod port_status;
pub mod ports;
pub mod queue_config;
pub mod stats;
pub mod switch_config;
pub mod vendor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::Cursor;

use super::err::*;

/// OpenFlow message header length is 8 bytes.
pub const HEADER_LENGTH: usize = 8;

/// OpenFlow header struct.
#[derive(Getters, Debug, PartialEq, Clone)]
pub struct Header {
    /// OpenFlow version identifier
    #[get = "pub"]
    version: Version,
    /// OpenFlow message type
    #[get = "pub"]
    ttype: Type,
    /// length of message including this header
    #[get = "pub"]
    length: u16,
    /// transaction id, echoed back by the switch on replies
    #[get = "pub"]
    xid: u32,
}

impl Header {
    pub fn new(ttype: Type, length: u16, xid: u32) -> Self {
        Header {
            version: Version::V1_0,
            ttype,
            length,
            xid,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Header {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != HEADER_LENGTH {
            bail!(ErrorKind::InvalidSliceLength(HEADER_LENGTH, bytes.len(), stringify!(Header)));
        }
        let mut cursor = Cursor::new(bytes);
        let version_raw = cursor.read_u8().unwrap();
        let version = Version::from_u8(version_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(version_raw as u64, stringify!(Version)).into())?;
        if version != Version::V1_0 {
            bail!(ErrorKind::VersionMismatch(Version::V1_0.to_u8().unwrap(), version_raw));
        }
        let ttype_raw = cursor.read_u8().unwrap();
        let ttype = Type::from_u8(ttype_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(ttype_raw as u64, stringify!(Type)).into())?;
        let length = cursor.read_u16::<BigEndian>().unwrap();
        let xid = cursor.read_u32::<BigEndian>().unwrap();
        Ok(Header { version, ttype, length, xid })
    }
}

impl Into<Vec<u8>> for Header {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u8(self.version.to_u8().unwrap()).unwrap();
        res.write_u8(self.ttype.to_u8().unwrap()).unwrap();
        res.write_u16::<BigEndian>(self.length).unwrap();
        res.write_u32::<BigEndian>(self.xid).unwrap();
        res
    }
}

/// OpenFlow version identifier. this core speaks 1.0 only; any other value
/// observed in a HELLO or message header is a version mismatch.
#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum Version {
    V1_0 = 0x01,
}

/// ofp_type: the 1-byte message type tag in every OpenFlow 1.0 header.
#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum Type {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Vendor = 4,

    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,

    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,

    PacketOut = 13,
    FlowMod = 14,
    PortMod = 15,

    StatsRequest = 16,
    StatsReply = 17,

    BarrierRequest = 18,
    BarrierReply = 19,

    QueueGetConfigRequest = 20,
    QueueGetConfigReply = 21,
}

/// a parsed message body, keyed by [`Type`]. `Hello`/`EchoRequest`/
/// `EchoReply`/`BarrierRequest`/`BarrierReply`/`GetConfigRequest` carry no
/// body of their own (or an opaque one) and so are represented by their raw
/// bytes or unit.
#[derive(Debug, PartialEq, Clone)]
pub enum OfPayload {
    Hello(Vec<u8>),
    Error(error_msg::ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    Vendor(vendor::VendorData),

    FeaturesRequest,
    FeaturesReply(features::SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(switch_config::SwitchConfig),
    SetConfig(switch_config::SwitchConfig),

    PacketIn(packet_in::PacketIn),
    FlowRemoved(flow_removed::FlowRemoved),
    PortStatus(port_status::PortStatus),

    PacketOut(packet_out::PacketOut),
    FlowMod(flow_mod::FlowMod),
    PortMod(port_mod::PortMod),

    StatsRequest(stats::StatsRequest),
    StatsReply { stype: stats::StatsType, reply: Result<stats::StatsReply> },

    BarrierRequest,
    BarrierReply,

    QueueGetConfigRequest(queue_config::QueueGetConfigRequest),
    QueueGetConfigReply(queue_config::QueueGetConfigReply),
}

impl OfPayload {
    /// parse a message body given the type already read from its header.
    /// `StatsReply`'s subtype parse errors are carried rather than
    /// propagated, since an unrecognized stats subtype is a warning, not a
    /// reason to drop the whole frame (see the core's error taxonomy).
    pub fn parse(ttype: Type, body: &[u8]) -> Result<Self> {
        use std::convert::TryFrom;
        Ok(match ttype {
            Type::Hello => OfPayload::Hello(Vec::from(body)),
            Type::Error => OfPayload::Error(error_msg::ErrorMsg::try_from(body)?),
            Type::EchoRequest => OfPayload::EchoRequest(Vec::from(body)),
            Type::EchoReply => OfPayload::EchoReply(Vec::from(body)),
            Type::Vendor => OfPayload::Vendor(vendor::VendorData::try_from(body)?),

            Type::FeaturesRequest => OfPayload::FeaturesRequest,
            Type::FeaturesReply => OfPayload::FeaturesReply(features::SwitchFeatures::try_from(body)?),
            Type::GetConfigRequest => OfPayload::GetConfigRequest,
            Type::GetConfigReply => OfPayload::GetConfigReply(switch_config::SwitchConfig::try_from(body)?),
            Type::SetConfig => OfPayload::SetConfig(switch_config::SwitchConfig::try_from(body)?),

            Type::PacketIn => OfPayload::PacketIn(packet_in::PacketIn::try_from(body)?),
            Type::FlowRemoved => OfPayload::FlowRemoved(flow_removed::FlowRemoved::try_from(body)?),
            Type::PortStatus => OfPayload::PortStatus(port_status::PortStatus::try_from(body)?),

            Type::PacketOut => OfPayload::PacketOut(packet_out::PacketOut::try_from(body)?),
            Type::FlowMod => OfPayload::FlowMod(flow_mod::FlowMod::try_from(body)?),
            Type::PortMod => OfPayload::PortMod(port_mod::PortMod::try_from(body)?),

            Type::StatsRequest => OfPayload::StatsRequest(stats::StatsRequest::try_from(body)?),
            Type::StatsReply => {
                let req = stats::StatsRequest::try_from(body)?;
                let reply = stats::StatsReply::parse(req.stype, &req.body);
                OfPayload::StatsReply { stype: req.stype, reply }
            }

            Type::BarrierRequest => OfPayload::BarrierRequest,
            Type::BarrierReply => OfPayload::BarrierReply,

            Type::QueueGetConfigRequest => {
                OfPayload::QueueGetConfigRequest(queue_config::QueueGetConfigRequest::try_from(body)?)
            }
            Type::QueueGetConfigReply => {
                OfPayload::QueueGetConfigReply(queue_config::QueueGetConfigReply::try_from(body)?)
            }
        })
    }

    pub fn ttype(&self) -> Type {
        match self {
            OfPayload::Hello(_) => Type::Hello,
            OfPayload::Error(_) => Type::Error,
            OfPayload::EchoRequest(_) => Type::EchoRequest,
            OfPayload::EchoReply(_) => Type::EchoReply,
            OfPayload::Vendor(_) => Type::Vendor,
            OfPayload::FeaturesRequest => Type::FeaturesRequest,
            OfPayload::FeaturesReply(_) => Type::FeaturesReply,
            OfPayload::GetConfigRequest => Type::GetConfigRequest,
            OfPayload::GetConfigReply(_) => Type::GetConfigReply,
            OfPayload::SetConfig(_) => Type::SetConfig,
            OfPayload::PacketIn(_) => Type::PacketIn,
            OfPayload::FlowRemoved(_) => Type::FlowRemoved,
            OfPayload::PortStatus(_) => Type::PortStatus,
            OfPayload::PacketOut(_) => Type::PacketOut,
            OfPayload::FlowMod(_) => Type::FlowMod,
            OfPayload::PortMod(_) => Type::PortMod,
            OfPayload::StatsRequest(_) => Type::StatsRequest,
            OfPayload::StatsReply { .. } => Type::StatsReply,
            OfPayload::BarrierRequest => Type::BarrierRequest,
            OfPayload::BarrierReply => Type::BarrierReply,
            OfPayload::QueueGetConfigRequest(_) => Type::QueueGetConfigRequest,
            OfPayload::QueueGetConfigReply(_) => Type::QueueGetConfigReply,
        }
    }
}

/// an OpenFlow message: header plus a payload already interpreted from the
/// header's type tag.
#[derive(Debug, PartialEq, Clone)]
pub struct OfMsg {
    pub header: Header,
    pub payload: OfPayload,
}

impl OfMsg {
    pub fn new(xid: u32, payload: OfPayload) -> Self {
        let body_len: u16 = match &payload {
            OfPayload::Hello(b) | OfPayload::EchoRequest(b) | OfPayload::EchoReply(b) => b.len() as u16,
            OfPayload::Error(e) => Into::<Vec<u8>>::into(e.clone()).len() as u16,
            OfPayload::Vendor(v) => Into::<Vec<u8>>::into(v.clone()).len() as u16,
            OfPayload::FeaturesReply(f) => Into::<Vec<u8>>::into(f.clone()).len() as u16,
            OfPayload::GetConfigReply(c) | OfPayload::SetConfig(c) => Into::<Vec<u8>>::into(c.clone()).len() as u16,
            OfPayload::PacketIn(p) => Into::<Vec<u8>>::into(p.clone()).len() as u16,
            OfPayload::FlowRemoved(f) => Into::<Vec<u8>>::into(f.clone()).len() as u16,
            OfPayload::PortStatus(p) => Into::<Vec<u8>>::into(p.clone()).len() as u16,
            OfPayload::PacketOut(p) => Into::<Vec<u8>>::into(p.clone()).len() as u16,
            OfPayload::FlowMod(f) => Into::<Vec<u8>>::into(f.clone()).len() as u16,
            OfPayload::PortMod(p) => Into::<Vec<u8>>::into(p.clone()).len() as u16,
            OfPayload::StatsRequest(s) => Into::<Vec<u8>>::into(s.clone()).len() as u16,
            OfPayload::QueueGetConfigRequest(q) => Into::<Vec<u8>>::into(q.clone()).len() as u16,
            OfPayload::QueueGetConfigReply(q) => Into::<Vec<u8>>::into(q.clone()).len() as u16,
            OfPayload::FeaturesRequest
            | OfPayload::GetConfigRequest
            | OfPayload::BarrierRequest
            | OfPayload::BarrierReply
            | OfPayload::StatsReply { .. } => 0,
        };
        OfMsg {
            header: Header::new(payload.ttype(), HEADER_LENGTH as u16 + body_len, xid),
            payload,
        }
    }
}

/// serializes a full message, header followed by body, to wire bytes. the
/// header's `length` field was already fixed at construction time by
/// [`OfMsg::new`]; this only needs to append each payload's own encoding.
impl Into<Vec<u8>> for OfMsg {
    fn into(self) -> Vec<u8> {
        let mut res: Vec<u8> = self.header.into();
        let body: Vec<u8> = match self.payload {
            OfPayload::Hello(b) | OfPayload::EchoRequest(b) | OfPayload::EchoReply(b) => b,
            OfPayload::Error(e) => e.into(),
            OfPayload::Vendor(v) => v.into(),
            OfPayload::FeaturesReply(f) => f.into(),
            OfPayload::GetConfigReply(c) | OfPayload::SetConfig(c) => c.into(),
            OfPayload::PacketIn(p) => p.into(),
            OfPayload::FlowRemoved(f) => f.into(),
            OfPayload::PortStatus(p) => p.into(),
            OfPayload::PacketOut(p) => p.into(),
            OfPayload::FlowMod(f) => f.into(),
            OfPayload::PortMod(p) => p.into(),
            OfPayload::StatsRequest(s) => s.into(),
            OfPayload::QueueGetConfigRequest(q) => q.into(),
            OfPayload::QueueGetConfigReply(q) => q.into(),
            OfPayload::FeaturesRequest
            | OfPayload::GetConfigRequest
            | OfPayload::BarrierRequest
            | OfPayload::BarrierReply
            | OfPayload::StatsReply { .. } => Vec::new(),
        };
        res.extend_from_slice(&body[..]);
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn header_roundtrips() {
        let h = Header::new(Type::Hello, 8, 42);
        let bytes: Vec<u8> = h.clone().into();
        assert_eq!(Header::try_from(&bytes[..]).unwrap(), h);
    }

    #[test]
    fn header_rejects_non_1_0_version() {
        let bytes = [0x04u8, 0, 0, 8, 0, 0, 0, 1];
        assert!(Header::try_from(&bytes[..]).is_err());
    }

    #[test]
    fn payload_parse_dispatches_by_type() {
        let body: Vec<u8> = Vec::new();
        let parsed = OfPayload::parse(Type::FeaturesRequest, &body).unwrap();
        assert_eq!(parsed, OfPayload::FeaturesRequest);
    }

    #[test]
    fn msg_serializes_header_then_body() {
        let msg = OfMsg::new(7, OfPayload::EchoRequest(vec![1, 2, 3]));
        let bytes: Vec<u8> = msg.into();
        assert_eq!(bytes.len(), HEADER_LENGTH + 3);
        let header = Header::try_from(&bytes[0..HEADER_LENGTH]).unwrap();
        assert_eq!(*header.length(), (HEADER_LENGTH + 3) as u16);
        assert_eq!(&bytes[HEADER_LENGTH..], &[1, 2, 3]);
    }
}
