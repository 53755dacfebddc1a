use super::super::err::*;

/// length of ethernet address in bytes (6)
pub const ETHERNET_ADDRESS_LENGTH: usize = 6;
pub type EthernetAddress = [u8; ETHERNET_ADDRESS_LENGTH];

pub fn from_slice_eth(slice: &[u8]) -> Result<EthernetAddress> {
    if slice.len() != ETHERNET_ADDRESS_LENGTH {
        bail!(ErrorKind::InvalidSliceLength(
            ETHERNET_ADDRESS_LENGTH,
            slice.len(),
            stringify!(EthernetAddress),
        ));
    }
    let mut addr = [0u8; ETHERNET_ADDRESS_LENGTH];
    addr.copy_from_slice(slice);
    Ok(addr)
}

/// length of ipv4 address in bytes (4)
pub const IPV4_ADDRESS_LENGTH: usize = 4;
pub type IPv4Address = [u8; IPV4_ADDRESS_LENGTH];

pub fn from_slice_v4(slice: &[u8]) -> Result<IPv4Address> {
    if slice.len() != IPV4_ADDRESS_LENGTH {
        bail!(ErrorKind::InvalidSliceLength(
            IPV4_ADDRESS_LENGTH,
            slice.len(),
            stringify!(IPv4Address),
        ));
    }
    let mut addr = [0u8; IPV4_ADDRESS_LENGTH];
    addr.copy_from_slice(slice);
    Ok(addr)
}
