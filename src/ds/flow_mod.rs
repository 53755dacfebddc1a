use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::convert::{Into, TryFrom};
use std::io::{Cursor, Seek, SeekFrom};

use super::actions::{calc_actions_len, ActionHeader};
use super::flow_match::{Match, MATCH_LENGTH};
use super::ports::PortNumber;

use super::super::err::*;

/// FLOW_MOD: install, modify or delete a flow table entry. OpenFlow 1.0
/// carries the match first, then a flat action list (no instruction layer).
#[derive(Debug, PartialEq, Clone)]
pub struct FlowMod {
    pub mmatch: Match,
    pub cookie: u64,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: PortNumber,
    pub flags: FlowModFlags,
    pub actions: Vec<ActionHeader>,
}

unsafe impl Send for FlowMod {}

impl FlowMod {
    pub fn new(
        mmatch: Match,
        cookie: u64,
        command: FlowModCommand,
        idle_timeout: u16,
        hard_timeout: u16,
        priority: u16,
        buffer_id: u32,
        out_port: PortNumber,
        flags: FlowModFlags,
        actions: Vec<ActionHeader>,
    ) -> Self {
        FlowMod {
            mmatch,
            cookie,
            command,
            idle_timeout,
            hard_timeout,
            priority,
            buffer_id,
            out_port,
            flags,
            actions,
        }
    }

    pub fn actions_len(&self) -> u16 {
        calc_actions_len(&self.actions)
    }
}

impl<'a> TryFrom<&'a [u8]> for FlowMod {
    type Error = Error;
    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < MATCH_LENGTH + 24 {
            bail!(ErrorKind::InvalidSliceLength(
                MATCH_LENGTH + 24,
                bytes.len(),
                stringify!(FlowMod),
            ));
        }
        let mmatch = Match::try_from(&bytes[0..MATCH_LENGTH])?;

        let mut cursor = Cursor::new(bytes);
        cursor.seek(SeekFrom::Start(MATCH_LENGTH as u64)).unwrap();
        let cookie = cursor.read_u64::<BigEndian>().unwrap();
        let command_raw = cursor.read_u16::<BigEndian>().unwrap();
        let command = FlowModCommand::from_u16(command_raw).ok_or::<Error>(
            ErrorKind::UnknownValue(command_raw as u64, stringify!(FlowModCommand)).into(),
        )?;
        let idle_timeout = cursor.read_u16::<BigEndian>().unwrap();
        let hard_timeout = cursor.read_u16::<BigEndian>().unwrap();
        let priority = cursor.read_u16::<BigEndian>().unwrap();
        let buffer_id = cursor.read_u32::<BigEndian>().unwrap();
        let out_port = PortNumber::try_from(cursor.read_u16::<BigEndian>().unwrap())?;
        let flags_raw = cursor.read_u16::<BigEndian>().unwrap();
        let flags = FlowModFlags::from_bits(flags_raw)
            .ok_or::<Error>(ErrorKind::UnknownValue(flags_raw as u64, stringify!(FlowModFlags)).into())?;

        let mut actions = Vec::new();
        let mut pos = cursor.position() as usize;
        while pos < bytes.len() {
            let action_len = ActionHeader::read_len(&mut cursor)?;
            let action = ActionHeader::try_from(&bytes[pos..pos + action_len])?;
            actions.push(action);
            pos += action_len;
            cursor.seek(SeekFrom::Start(pos as u64)).unwrap();
        }

        Ok(FlowMod {
            mmatch,
            cookie,
            command,
            idle_timeout,
            hard_timeout,
            priority,
            buffer_id,
            out_port,
            flags,
            actions,
        })
    }
}

impl Into<Vec<u8>> for FlowMod {
    fn into(self) -> Vec<u8> {
        let mut res = Vec::new();
        res.extend_from_slice(&Into::<Vec<u8>>::into(self.mmatch)[..]);
        res.write_u64::<BigEndian>(self.cookie).unwrap();
        res.write_u16::<BigEndian>(self.command.to_u16().unwrap()).unwrap();
        res.write_u16::<BigEndian>(self.idle_timeout).unwrap();
        res.write_u16::<BigEndian>(self.hard_timeout).unwrap();
        res.write_u16::<BigEndian>(self.priority).unwrap();
        res.write_u32::<BigEndian>(self.buffer_id).unwrap();
        res.write_u16::<BigEndian>(self.out_port.into()).unwrap();
        res.write_u16::<BigEndian>(self.flags.bits()).unwrap();
        for action in self.actions {
            res.extend_from_slice(&Into::<Vec<u8>>::into(action)[..]);
        }
        res
    }
}

#[derive(Primitive, PartialEq, Eq, Debug, Clone, Copy)]
pub enum FlowModCommand {
    /// new flow.
    Add = 0,
    /// modify all matching flows.
    Modify = 1,
    /// modify entry strictly matching wildcards and priority.
    ModifyStrict = 2,
    /// delete all matching flows.
    Delete = 3,
    /// delete entry strictly matching wildcards and priority.
    DeleteStrict = 4,
}

bitflags! {
    pub struct FlowModFlags: u16 {
        /// send flow removed message when flow expires or is deleted.
        const SEND_FLOW_REM = 1 << 0;
        /// check for overlapping entries first.
        const CHECK_OVERLAP = 1 << 1;
        /// remember effect of flow for emergencies.
        const EMERG = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ports::PortNo;

    #[test]
    fn add_with_no_actions_roundtrips() {
        let fm = FlowMod::new(
            Match::any(),
            0,
            FlowModCommand::Add,
            0,
            0,
            0x8000,
            0xffff_ffff,
            PortNumber::Reserved(PortNo::None),
            FlowModFlags::SEND_FLOW_REM,
            Vec::new(),
        );
        let bytes: Vec<u8> = fm.clone().into();
        assert_eq!(FlowMod::try_from(&bytes[..]).unwrap(), fm);
    }

    #[test]
    fn delete_with_output_action_roundtrips() {
        let fm = FlowMod::new(
            Match::any(),
            7,
            FlowModCommand::Delete,
            0,
            0,
            0,
            0xffff_ffff,
            PortNumber::Reserved(PortNo::None),
            FlowModFlags::empty(),
            vec![ActionHeader::Output {
                port: PortNumber::Reserved(PortNo::Flood),
                max_len: 0,
            }],
        );
        let bytes: Vec<u8> = fm.clone().into();
        assert_eq!(FlowMod::try_from(&bytes[..]).unwrap(), fm);
    }
}
