//! multipart (stats) request/reply bodies. the core only interprets the
//! subtypes named in the inbound-event table (Desc, Table, Port, Aggregate,
//! Flow, Queue); anything else arrives as a raw body the caller can still
//! inspect but that the core does not parse further.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::super::err::*;
use super::actions::{calc_actions_len, ActionHeader};
use super::flow_match::{Match, MATCH_LENGTH};
use super::ports::PortNumber;

#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum StatsType {
    Desc = 0,
    Flow = 1,
    Aggregate = 2,
    Table = 3,
    Port = 4,
    Queue = 5,
}

bitflags! {
    pub struct StatsRequestFlags: u16 {
        const NONE = 0;
    }
}

/// a STATS_REQUEST: a type selector plus a type-specific, possibly empty
/// body (e.g. a port number for PORT stats).
#[derive(Debug, PartialEq, Clone)]
pub struct StatsRequest {
    pub stype: StatsType,
    pub flags: StatsRequestFlags,
    pub body: Vec<u8>,
}

impl<'a> TryFrom<&'a [u8]> for StatsRequest {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let stype_raw = cursor.read_u16::<BigEndian>().unwrap();
        let stype = StatsType::from_u16(stype_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(stype_raw as u64, stringify!(StatsType)).into())?;
        let flags_raw = cursor.read_u16::<BigEndian>().unwrap();
        let flags = StatsRequestFlags::from_bits(flags_raw).unwrap_or(StatsRequestFlags::NONE);
        let body = Vec::from(&bytes[cursor.position() as usize..]);
        Ok(StatsRequest { stype, flags, body })
    }
}

impl Into<Vec<u8>> for StatsRequest {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(self.stype.to_u16().unwrap()).unwrap();
        res.write_u16::<BigEndian>(self.flags.bits()).unwrap();
        res.extend_from_slice(&self.body[..]);
        res
    }
}

impl StatsRequest {
    pub fn new(stype: StatsType, body: Vec<u8>) -> Self {
        StatsRequest {
            stype,
            flags: StatsRequestFlags::NONE,
            body,
        }
    }
}

/// fixed-size DESC reply record. the C strings are stored without their
/// trailing NUL padding.
#[derive(Debug, PartialEq, Clone)]
pub struct DescStats {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

const DESC_FIELD_LEN: usize = 256;
const DESC_SERIAL_LEN: usize = 32;
const DESC_STATS_LEN: usize = DESC_FIELD_LEN * 3 + DESC_SERIAL_LEN + DESC_FIELD_LEN;

fn read_fixed_str(bytes: &[u8], len: usize) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(len).min(len);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_fixed_str(res: &mut Vec<u8>, s: &str, len: usize) {
    let mut buf = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf[..n].copy_from_slice(&bytes[..n]);
    res.extend_from_slice(&buf);
}

impl<'a> TryFrom<&'a [u8]> for DescStats {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != DESC_STATS_LEN {
            return Err(ErrorKind::InvalidSliceLength(DESC_STATS_LEN, bytes.len(), stringify!(DescStats)).into());
        }
        let mut off = 0;
        let mfr_desc = read_fixed_str(&bytes[off..off + DESC_FIELD_LEN], DESC_FIELD_LEN);
        off += DESC_FIELD_LEN;
        let hw_desc = read_fixed_str(&bytes[off..off + DESC_FIELD_LEN], DESC_FIELD_LEN);
        off += DESC_FIELD_LEN;
        let sw_desc = read_fixed_str(&bytes[off..off + DESC_FIELD_LEN], DESC_FIELD_LEN);
        off += DESC_FIELD_LEN;
        let serial_num = read_fixed_str(&bytes[off..off + DESC_SERIAL_LEN], DESC_SERIAL_LEN);
        off += DESC_SERIAL_LEN;
        let dp_desc = read_fixed_str(&bytes[off..off + DESC_FIELD_LEN], DESC_FIELD_LEN);
        Ok(DescStats {
            mfr_desc,
            hw_desc,
            sw_desc,
            serial_num,
            dp_desc,
        })
    }
}

impl Into<Vec<u8>> for DescStats {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::with_capacity(DESC_STATS_LEN);
        write_fixed_str(&mut res, &self.mfr_desc, DESC_FIELD_LEN);
        write_fixed_str(&mut res, &self.hw_desc, DESC_FIELD_LEN);
        write_fixed_str(&mut res, &self.sw_desc, DESC_FIELD_LEN);
        write_fixed_str(&mut res, &self.serial_num, DESC_SERIAL_LEN);
        write_fixed_str(&mut res, &self.dp_desc, DESC_FIELD_LEN);
        res
    }
}

/// one TABLE stats record, repeated once per flow table.
#[derive(Debug, PartialEq, Clone)]
pub struct TableStats {
    pub table_id: u8,
    pub name: String,
    pub wildcards: u32,
    pub max_entries: u32,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

const TABLE_NAME_LEN: usize = 32;
const TABLE_STATS_LEN: usize = 4 + TABLE_NAME_LEN + 4 + 4 + 4 + 8 + 8;

impl<'a> TryFrom<&'a [u8]> for TableStats {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != TABLE_STATS_LEN {
            return Err(ErrorKind::InvalidSliceLength(TABLE_STATS_LEN, bytes.len(), stringify!(TableStats)).into());
        }
        let mut cursor = Cursor::new(bytes);
        let table_id = cursor.read_u8().unwrap();
        cursor.seek(SeekFrom::Current(3)).unwrap(); // pad
        let name = read_fixed_str(&bytes[4..4 + TABLE_NAME_LEN], TABLE_NAME_LEN);
        cursor.seek(SeekFrom::Start((4 + TABLE_NAME_LEN) as u64)).unwrap();
        let wildcards = cursor.read_u32::<BigEndian>().unwrap();
        let max_entries = cursor.read_u32::<BigEndian>().unwrap();
        let active_count = cursor.read_u32::<BigEndian>().unwrap();
        let lookup_count = cursor.read_u64::<BigEndian>().unwrap();
        let matched_count = cursor.read_u64::<BigEndian>().unwrap();
        Ok(TableStats {
            table_id,
            name,
            wildcards,
            max_entries,
            active_count,
            lookup_count,
            matched_count,
        })
    }
}

impl Into<Vec<u8>> for TableStats {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u8(self.table_id).unwrap();
        res.write_u8(0).unwrap();
        res.write_u16::<BigEndian>(0).unwrap();
        write_fixed_str(&mut res, &self.name, TABLE_NAME_LEN);
        res.write_u32::<BigEndian>(self.wildcards).unwrap();
        res.write_u32::<BigEndian>(self.max_entries).unwrap();
        res.write_u32::<BigEndian>(self.active_count).unwrap();
        res.write_u64::<BigEndian>(self.lookup_count).unwrap();
        res.write_u64::<BigEndian>(self.matched_count).unwrap();
        res
    }
}

/// one PORT stats record, repeated once per reported port.
#[derive(Debug, PartialEq, Clone)]
pub struct PortStats {
    pub port_no: PortNumber,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
}

const PORT_STATS_LEN: usize = 8 + 8 * 12;

impl<'a> TryFrom<&'a [u8]> for PortStats {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != PORT_STATS_LEN {
            return Err(ErrorKind::InvalidSliceLength(PORT_STATS_LEN, bytes.len(), stringify!(PortStats)).into());
        }
        let mut cursor = Cursor::new(bytes);
        let port_no = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        cursor.seek(SeekFrom::Current(6)).unwrap(); // pad
        let rx_packets = cursor.read_u64::<BigEndian>().unwrap();
        let tx_packets = cursor.read_u64::<BigEndian>().unwrap();
        let rx_bytes = cursor.read_u64::<BigEndian>().unwrap();
        let tx_bytes = cursor.read_u64::<BigEndian>().unwrap();
        let rx_dropped = cursor.read_u64::<BigEndian>().unwrap();
        let tx_dropped = cursor.read_u64::<BigEndian>().unwrap();
        let rx_errors = cursor.read_u64::<BigEndian>().unwrap();
        let tx_errors = cursor.read_u64::<BigEndian>().unwrap();
        let rx_frame_err = cursor.read_u64::<BigEndian>().unwrap();
        let rx_over_err = cursor.read_u64::<BigEndian>().unwrap();
        let rx_crc_err = cursor.read_u64::<BigEndian>().unwrap();
        let collisions = cursor.read_u64::<BigEndian>().unwrap();
        Ok(PortStats {
            port_no,
            rx_packets,
            tx_packets,
            rx_bytes,
            tx_bytes,
            rx_dropped,
            tx_dropped,
            rx_errors,
            tx_errors,
            rx_frame_err,
            rx_over_err,
            rx_crc_err,
            collisions,
        })
    }
}

impl Into<Vec<u8>> for PortStats {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(self.port_no.into()).unwrap();
        res.write_u32::<BigEndian>(0).unwrap();
        res.write_u16::<BigEndian>(0).unwrap(); // pad, 6 bytes total
        res.write_u64::<BigEndian>(self.rx_packets).unwrap();
        res.write_u64::<BigEndian>(self.tx_packets).unwrap();
        res.write_u64::<BigEndian>(self.rx_bytes).unwrap();
        res.write_u64::<BigEndian>(self.tx_bytes).unwrap();
        res.write_u64::<BigEndian>(self.rx_dropped).unwrap();
        res.write_u64::<BigEndian>(self.tx_dropped).unwrap();
        res.write_u64::<BigEndian>(self.rx_errors).unwrap();
        res.write_u64::<BigEndian>(self.tx_errors).unwrap();
        res.write_u64::<BigEndian>(self.rx_frame_err).unwrap();
        res.write_u64::<BigEndian>(self.rx_over_err).unwrap();
        res.write_u64::<BigEndian>(self.rx_crc_err).unwrap();
        res.write_u64::<BigEndian>(self.collisions).unwrap();
        res
    }
}

/// the single AGGREGATE reply record.
#[derive(Debug, PartialEq, Clone)]
pub struct AggregateStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
}

const AGGREGATE_STATS_LEN: usize = 24;

impl<'a> TryFrom<&'a [u8]> for AggregateStats {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != AGGREGATE_STATS_LEN {
            return Err(ErrorKind::InvalidSliceLength(AGGREGATE_STATS_LEN, bytes.len(), stringify!(AggregateStats)).into());
        }
        let mut cursor = Cursor::new(bytes);
        let packet_count = cursor.read_u64::<BigEndian>().unwrap();
        let byte_count = cursor.read_u64::<BigEndian>().unwrap();
        let flow_count = cursor.read_u32::<BigEndian>().unwrap();
        Ok(AggregateStats {
            packet_count,
            byte_count,
            flow_count,
        })
    }
}

impl Into<Vec<u8>> for AggregateStats {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u64::<BigEndian>(self.packet_count).unwrap();
        res.write_u64::<BigEndian>(self.byte_count).unwrap();
        res.write_u32::<BigEndian>(self.flow_count).unwrap();
        res.write_u32::<BigEndian>(0).unwrap();
        res
    }
}

/// one FLOW stats record, variable length because it embeds a `Match` and a
/// trailing action list. the match follows immediately after the header,
/// unlike later OpenFlow versions which put it last.
#[derive(Debug, PartialEq, Clone)]
pub struct FlowStats {
    pub table_id: u8,
    pub mmatch: Match,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<ActionHeader>,
}

const FLOW_STATS_HEADER_LEN: usize = 2 + 2 + MATCH_LENGTH + 4 + 4 + 2 + 2 + 2 + 6 + 8 + 8 + 8;

impl<'a> TryFrom<&'a [u8]> for FlowStats {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < FLOW_STATS_HEADER_LEN {
            return Err(ErrorKind::InvalidSliceLength(FLOW_STATS_HEADER_LEN, bytes.len(), stringify!(FlowStats)).into());
        }
        let mut cursor = Cursor::new(bytes);
        cursor.seek(SeekFrom::Current(2)).unwrap(); // length
        let table_id = cursor.read_u8().unwrap();
        cursor.seek(SeekFrom::Current(1)).unwrap(); // pad

        let match_start = cursor.position() as usize;
        let mmatch = Match::try_from(&bytes[match_start..match_start + MATCH_LENGTH])?;
        cursor.seek(SeekFrom::Start((match_start + MATCH_LENGTH) as u64)).unwrap();

        let duration_sec = cursor.read_u32::<BigEndian>().unwrap();
        let duration_nsec = cursor.read_u32::<BigEndian>().unwrap();
        let priority = cursor.read_u16::<BigEndian>().unwrap();
        let idle_timeout = cursor.read_u16::<BigEndian>().unwrap();
        let hard_timeout = cursor.read_u16::<BigEndian>().unwrap();
        cursor.seek(SeekFrom::Current(6)).unwrap(); // pad
        let cookie = cursor.read_u64::<BigEndian>().unwrap();
        let packet_count = cursor.read_u64::<BigEndian>().unwrap();
        let byte_count = cursor.read_u64::<BigEndian>().unwrap();

        let mut actions = Vec::new();
        let mut pos = cursor.position() as usize;
        while pos < bytes.len() {
            let action_len = ActionHeader::read_len(&mut cursor)?;
            actions.push(ActionHeader::try_from(&bytes[pos..pos + action_len])?);
            pos += action_len;
            cursor.seek(SeekFrom::Start(pos as u64)).unwrap();
        }

        Ok(FlowStats {
            table_id,
            mmatch,
            duration_sec,
            duration_nsec,
            priority,
            idle_timeout,
            hard_timeout,
            cookie,
            packet_count,
            byte_count,
            actions,
        })
    }
}

impl Into<Vec<u8>> for FlowStats {
    fn into(self) -> Vec<u8> {
        let mmatch: Vec<u8> = self.mmatch.into();
        let actions_len = calc_actions_len(&self.actions) as usize;
        let length = FLOW_STATS_HEADER_LEN + actions_len;

        let mut res = Vec::new();
        res.write_u16::<BigEndian>(length as u16).unwrap();
        res.write_u8(self.table_id).unwrap();
        res.write_u8(0).unwrap();
        res.extend_from_slice(&mmatch[..]);
        res.write_u32::<BigEndian>(self.duration_sec).unwrap();
        res.write_u32::<BigEndian>(self.duration_nsec).unwrap();
        res.write_u16::<BigEndian>(self.priority).unwrap();
        res.write_u16::<BigEndian>(self.idle_timeout).unwrap();
        res.write_u16::<BigEndian>(self.hard_timeout).unwrap();
        res.write_u32::<BigEndian>(0).unwrap();
        res.write_u16::<BigEndian>(0).unwrap(); // pad, 6 bytes total
        res.write_u64::<BigEndian>(self.cookie).unwrap();
        res.write_u64::<BigEndian>(self.packet_count).unwrap();
        res.write_u64::<BigEndian>(self.byte_count).unwrap();
        for action in self.actions {
            res.extend_from_slice(&Into::<Vec<u8>>::into(action)[..]);
        }
        res
    }
}

/// one QUEUE stats record.
#[derive(Debug, PartialEq, Clone)]
pub struct QueueStats {
    pub port_no: PortNumber,
    pub queue_id: u32,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
}

const QUEUE_STATS_LEN: usize = 2 + 2 + 4 + 8 + 8 + 8;

impl<'a> TryFrom<&'a [u8]> for QueueStats {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != QUEUE_STATS_LEN {
            return Err(ErrorKind::InvalidSliceLength(QUEUE_STATS_LEN, bytes.len(), stringify!(QueueStats)).into());
        }
        let mut cursor = Cursor::new(bytes);
        let port_no = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        cursor.seek(SeekFrom::Current(2)).unwrap(); // pad
        let queue_id = cursor.read_u32::<BigEndian>().unwrap();
        let tx_bytes = cursor.read_u64::<BigEndian>().unwrap();
        let tx_packets = cursor.read_u64::<BigEndian>().unwrap();
        let tx_errors = cursor.read_u64::<BigEndian>().unwrap();
        Ok(QueueStats {
            port_no,
            queue_id,
            tx_bytes,
            tx_packets,
            tx_errors,
        })
    }
}

impl Into<Vec<u8>> for QueueStats {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.write_u16::<BigEndian>(self.port_no.into()).unwrap();
        res.write_u16::<BigEndian>(0).unwrap();
        res.write_u32::<BigEndian>(self.queue_id).unwrap();
        res.write_u64::<BigEndian>(self.tx_bytes).unwrap();
        res.write_u64::<BigEndian>(self.tx_packets).unwrap();
        res.write_u64::<BigEndian>(self.tx_errors).unwrap();
        res
    }
}

/// a decoded STATS_REPLY. flow stats bodies are self-delimiting via their
/// embedded length field; the other record types are fixed-size and simply
/// repeated until the body is exhausted. a body whose length is not an
/// exact multiple of the fixed record size is a protocol warning (see the
/// core's error taxonomy), not a panic.
#[derive(Debug, PartialEq, Clone)]
pub enum StatsReply {
    Desc(DescStats),
    Table(Vec<TableStats>),
    Port(Vec<PortStats>),
    Aggregate(AggregateStats),
    Flow(Vec<FlowStats>),
    Queue(Vec<QueueStats>),
}

fn parse_fixed_records<T, F>(body: &[u8], record_len: usize, parse: F) -> Result<Vec<T>>
where
    F: Fn(&[u8]) -> Result<T>,
{
    if record_len == 0 || body.len() % record_len != 0 {
        return Err(ErrorKind::InvalidSliceLength(record_len, body.len(), stringify!(StatsReply)).into());
    }
    body.chunks(record_len).map(parse).collect()
}

impl StatsReply {
    pub fn parse(stype: StatsType, body: &[u8]) -> Result<Self> {
        Ok(match stype {
            StatsType::Desc => StatsReply::Desc(DescStats::try_from(body)?),
            StatsType::Table => {
                StatsReply::Table(parse_fixed_records(body, TABLE_STATS_LEN, |b| TableStats::try_from(b))?)
            }
            StatsType::Port => {
                StatsReply::Port(parse_fixed_records(body, PORT_STATS_LEN, |b| PortStats::try_from(b))?)
            }
            StatsType::Aggregate => StatsReply::Aggregate(AggregateStats::try_from(body)?),
            StatsType::Flow => {
                let mut cursor = Cursor::new(body);
                let mut flows = Vec::new();
                while (cursor.position() as usize) < body.len() {
                    let start = cursor.position() as usize;
                    let len = Cursor::new(&body[start..]).read_u16::<BigEndian>().map_err(|_| {
                        Error::from(ErrorKind::CouldNotReadLength(stringify!(FlowStats)))
                    })? as usize;
                    if len == 0 || start + len > body.len() {
                        return Err(ErrorKind::InvalidSliceLength(len, body.len() - start, stringify!(FlowStats)).into());
                    }
                    flows.push(FlowStats::try_from(&body[start..start + len])?);
                    cursor.seek(SeekFrom::Start((start + len) as u64)).unwrap();
                }
                StatsReply::Flow(flows)
            }
            StatsType::Queue => {
                StatsReply::Queue(parse_fixed_records(body, QUEUE_STATS_LEN, |b| QueueStats::try_from(b))?)
            }
        })
    }

    pub fn stype(&self) -> StatsType {
        match self {
            StatsReply::Desc(_) => StatsType::Desc,
            StatsReply::Table(_) => StatsType::Table,
            StatsReply::Port(_) => StatsType::Port,
            StatsReply::Aggregate(_) => StatsType::Aggregate,
            StatsReply::Flow(_) => StatsType::Flow,
            StatsReply::Queue(_) => StatsType::Queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_stats_roundtrip() {
        let desc = DescStats {
            mfr_desc: "acme".to_string(),
            hw_desc: "switch-1".to_string(),
            sw_desc: "v1".to_string(),
            serial_num: "0001".to_string(),
            dp_desc: "top-of-rack".to_string(),
        };
        let bytes: Vec<u8> = desc.clone().into();
        assert_eq!(bytes.len(), DESC_STATS_LEN);
        assert_eq!(DescStats::try_from(&bytes[..]).unwrap(), desc);
    }

    #[test]
    fn table_stats_reply_parses_repeated_records() {
        let one: Vec<u8> = TableStats {
            table_id: 0,
            name: "classifier".to_string(),
            wildcards: 0,
            max_entries: 1024,
            active_count: 3,
            lookup_count: 10,
            matched_count: 9,
        }
        .into();
        let mut body = one.clone();
        body.extend_from_slice(&one);
        let reply = StatsReply::parse(StatsType::Table, &body).unwrap();
        match reply {
            StatsReply::Table(records) => assert_eq!(records.len(), 2),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn port_stats_reply_rejects_truncated_body() {
        let body = vec![0u8; PORT_STATS_LEN - 1];
        assert!(StatsReply::parse(StatsType::Port, &body).is_err());
    }

    #[test]
    fn flow_stats_roundtrips_with_actions() {
        let fs = FlowStats {
            table_id: 0,
            mmatch: Match::any(),
            duration_sec: 5,
            duration_nsec: 0,
            priority: 100,
            idle_timeout: 0,
            hard_timeout: 0,
            cookie: 1,
            packet_count: 2,
            byte_count: 200,
            actions: vec![ActionHeader::StripVlan],
        };
        let bytes: Vec<u8> = fs.clone().into();
        assert_eq!(FlowStats::try_from(&bytes[..]).unwrap(), fs);
    }
}
