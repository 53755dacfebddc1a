//! frames and parses the OpenFlow wire format, and reassembles OFMP
//! extended-data fragments into embedded OFMP messages. shared by the
//! steady-state [`crate::connection::Connection`] receive loop and the
//! [`crate::handshake`] FSM, which each own a distinct reassembly buffer
//! (the handshake's is local to the FSM and discarded with it; the
//! steady-state one lives for the life of the connection).

use std::convert::TryFrom;

use super::ds;
use super::err::*;

/// one fully-framed OpenFlow message read off the wire, plus the raw bytes
/// that produced it (carried by the catch-all `OpenflowMsg` event).
pub struct Framed {
    pub header: ds::Header,
    pub payload: ds::OfPayload,
    pub raw: Vec<u8>,
}

/// attempts to split one complete OpenFlow frame off the front of `buf`.
/// returns `None` if fewer than a full frame's worth of bytes are
/// available yet. a frame whose header is malformed (bad version, length
/// shorter than the header) is a connection-fatal error; a frame whose
/// body fails to parse for a narrower reason is the caller's concern
/// (protocol warning vs. fatal depends on the message type).
pub fn try_frame(buf: &[u8]) -> Result<Option<(ds::Header, Vec<u8>, usize)>> {
    if buf.len() < ds::HEADER_LENGTH {
        return Ok(None);
    }
    let header = ds::Header::try_from(&buf[0..ds::HEADER_LENGTH])?;
    let length = *header.length() as usize;
    if length < ds::HEADER_LENGTH {
        bail!(ErrorKind::UndersizedFrame(length));
    }
    if buf.len() < length {
        return Ok(None);
    }
    let body = Vec::from(&buf[ds::HEADER_LENGTH..length]);
    Ok(Some((header, body, length)))
}

/// parses a fully-collected frame into a [`Framed`] message.
pub fn parse(header: ds::Header, body: &[u8]) -> Result<Framed> {
    let payload = ds::OfPayload::parse(*header.ttype(), body)?;
    let mut raw = Vec::new();
    raw.extend_from_slice(&Into::<Vec<u8>>::into(header.clone())[..]);
    raw.extend_from_slice(body);
    Ok(Framed { header, payload, raw })
}

/// per-connection (or per-handshake) extended-data reassembly state. only
/// one xid is ever active at a time: receiving a fragment whose xid
/// differs from the buffer's resets it, rather than tracking multiple
/// concurrent reassemblies. "no active reassembly" is represented as
/// `None` at the call site rather than a sentinel xid.
pub struct Reassembly {
    xid: u32,
    inner_type: ds::vendor::OfmpType,
    buf: Vec<u8>,
}

/// the result of feeding one EXTENDED_DATA fragment to the reassembler.
pub enum FeedResult {
    /// more fragments are still expected for this xid.
    Pending,
    /// the sequence is complete; `buf` is the reassembled message body for
    /// `inner_type`, which must not itself be EXTENDED_DATA.
    Complete { inner_type: ds::vendor::OfmpType, buf: Vec<u8> },
}

/// feeds one EXTENDED_DATA fragment (already parsed) into `slot`, creating
/// a new reassembly if `slot` is empty or the fragment's xid differs from
/// the one in progress.
pub fn feed_extended_data(
    slot: &mut Option<Reassembly>,
    xid: u32,
    fragment: ds::vendor::ExtendedData,
) -> Result<FeedResult> {
    if fragment.inner_type == ds::vendor::OfmpType::ExtendedData {
        bail!(ErrorKind::UnsupportedValue(
            ds::vendor::OfmpType::ExtendedData as u64,
            stringify!(ExtendedData),
        ));
    }

    let needs_reset = match slot {
        Some(existing) => existing.xid != xid,
        None => true,
    };
    if needs_reset {
        *slot = Some(Reassembly {
            xid,
            inner_type: fragment.inner_type,
            buf: Vec::new(),
        });
    }

    let reassembly = slot.as_mut().unwrap();
    reassembly.buf.extend_from_slice(&fragment.payload);

    if fragment.more_data {
        return Ok(FeedResult::Pending);
    }

    let complete = slot.take().unwrap();
    if complete.buf.len() < ds::vendor::FRAGMENTATION_THRESHOLD {
        bail!(ErrorKind::UndersizedReassembly(complete.buf.len()));
    }
    Ok(FeedResult::Complete {
        inner_type: complete.inner_type,
        buf: complete.buf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn try_frame_waits_for_full_body() {
        let header = ds::Header::new(ds::Type::Hello, 8, 1);
        let bytes: Vec<u8> = header.into();
        let partial = &bytes[0..4];
        assert!(try_frame(partial).unwrap().is_none());
        assert!(try_frame(&bytes).unwrap().is_some());
    }

    #[test]
    fn try_frame_rejects_undersized_length() {
        let mut bytes = vec![0x01u8, ds::Type::Hello as u8, 0, 4, 0, 0, 0, 1];
        bytes[3] = 4;
        assert!(try_frame(&bytes).is_err());
    }

    #[test]
    fn extended_data_reassembly_resets_on_new_xid() {
        let mut slot = None;
        let frag_a = ds::vendor::ExtendedData {
            more_data: true,
            inner_type: ds::vendor::OfmpType::ConfigUpdate,
            payload: vec![1, 2, 3],
        };
        matches_pending(feed_extended_data(&mut slot, 1, frag_a).unwrap());

        // a fragment under a different xid discards the in-flight buffer.
        let frag_b = ds::vendor::ExtendedData {
            more_data: true,
            inner_type: ds::vendor::OfmpType::ConfigUpdate,
            payload: vec![9],
        };
        matches_pending(feed_extended_data(&mut slot, 2, frag_b).unwrap());
        assert_eq!(slot.as_ref().unwrap().buf, vec![9]);
    }

    fn matches_pending(result: FeedResult) {
        assert!(matches!(result, FeedResult::Pending));
    }

    #[test]
    fn undersized_reassembly_is_rejected() {
        let mut slot = None;
        let frag = ds::vendor::ExtendedData {
            more_data: false,
            inner_type: ds::vendor::OfmpType::ConfigUpdate,
            payload: vec![0u8; 10],
        };
        assert!(feed_extended_data(&mut slot, 1, frag).is_err());
        assert!(slot.is_none());
    }

    #[test]
    fn complete_reassembly_reaching_threshold_succeeds() {
        let mut slot = None;
        let frag = ds::vendor::ExtendedData {
            more_data: false,
            inner_type: ds::vendor::OfmpType::ConfigUpdate,
            payload: vec![0u8; ds::vendor::FRAGMENTATION_THRESHOLD],
        };
        match feed_extended_data(&mut slot, 1, frag).unwrap() {
            FeedResult::Complete { inner_type, buf } => {
                assert_eq!(inner_type, ds::vendor::OfmpType::ConfigUpdate);
                assert_eq!(buf.len(), ds::vendor::FRAGMENTATION_THRESHOLD);
            }
            _ => panic!("expected Complete"),
        }
    }
}
