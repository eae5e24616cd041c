use crate::consts::RDM_MAX_PDL;

/// Parameter data payload, bounded to the RDM maximum PDL of 231 bytes.
pub type DataPack = heapless::Vec<u8, RDM_MAX_PDL>;

/// Response status carried in the port id / response type field of an RDM response.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ResponseType {
    /// The request was acknowledged.
    Ack = 0x00,
    /// The request was acknowledged but the result isn't ready yet; retry after the given delay.
    AckTimer = 0x01,
    /// The request was not acknowledged.
    Nack = 0x02,
    /// The request was acknowledged but the response didn't fit into a single package.
    AckOverflow = 0x03,
}

impl TryFrom<u8> for ResponseType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        Ok(match value {
            0x00 => Self::Ack,
            0x01 => Self::AckTimer,
            0x02 => Self::Nack,
            0x03 => Self::AckOverflow,
            _ => return Err(()),
        })
    }
}
