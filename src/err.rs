error_chain!{
    types{
        Error, ErrorKind, ResultExt, Result;
    }

    links {

    }

    foreign_links{
        Io(::std::io::Error);
    }

    errors{
        InvalidSliceLength(expected: usize, actual: usize, ttype: &'static str) {
            description("Invalid slice length received."),
            display("Expected '{}' but got '{}' bytes for '{}'.", expected, actual, ttype),
        }

        UnknownValue(val: u64, ttype: &'static str) {
            description("Encountered unknown value."),
            display("Encountered unknown value '{}' for type '{}.", val, ttype),
        }

        IllegalValue(val: u64, ttype: &'static str) {
            description("Encountered illegal value."),
            display("Encountered illegal value '{}' for type '{}.", val, ttype),
        }

        CouldNotReadLength(ttype: &'static str) {
            description("Could not determine the on-wire length of a value."),
            display("Could not determine the on-wire length of '{}'.", ttype),
        }

        UnsupportedValue(val: u64, ttype: &'static str) {
            description("Encountered a value that is recognized but not supported."),
            display("Value '{}' of type '{}' is recognized but not supported.", val, ttype),
        }

        /// a frame claimed a length shorter than the minimal OpenFlow header
        UndersizedFrame(length: usize) {
            description("OpenFlow frame shorter than the header length."),
            display("OpenFlow frame of length {} is shorter than the 8 byte header.", length),
        }

        /// the negotiated/peer OpenFlow version did not match what was expected
        VersionMismatch(expected: u8, actual: u8) {
            description("OpenFlow version mismatch."),
            display("Expected OpenFlow version '{}' but got '{}'.", expected, actual),
        }

        /// a handshake step did not complete before its deadline
        HandshakeTimeout(state: &'static str) {
            description("Handshake step timed out."),
            display("Handshake step '{}' timed out.", state),
        }

        /// a connection was rejected during registration
        RegistrationDenied(reason: &'static str) {
            description("Connection registration was denied."),
            display("Connection registration denied: {}.", reason),
        }

        /// a reassembly buffer did not reach the minimum size that justifies fragmentation
        UndersizedReassembly(len: usize) {
            description("Reassembled OFMP extended-data buffer below the fragmentation threshold."),
            display("Reassembled buffer of {} bytes is below the 65536 byte fragmentation threshold.", len),
        }

        /// an outbound command was issued against an unknown datapath id
        UnknownDatapath(dpid: u64) {
            description("No connection registered for this datapath id."),
            display("No connection registered for datapath id '{:#x}'.", dpid),
        }

        /// a non-blocking outbound command found its send queue full
        SendQueueFull(dpid: u64) {
            description("Outbound send queue is full."),
            display("Outbound send queue for datapath id '{:#x}' is full.", dpid),
        }
    }
}
