//! Wire-level constants for DMX512 and RDM framing.
//!
//! <https://erg.abdn.ac.uk/users/gorry/eg3576/start-codes.html>

/// DMX512 null start code.
pub const DMX_START_CODE: u8 = 0x00;
/// RDM start code, multiplexed onto the same DMX512 line.
pub const RDM_START_CODE: u8 = 0xCC;
/// Maximum number of DMX512 slots in a single frame.
pub const DMX_MAX_LENGTH: usize = 512;

pub const RDM_SUB_START_CODE: u8 = 0x01;
pub const RDM_UID_LENGTH: usize = 6;

pub const RDM_CC_DISCOVER: u8 = 0x10;
pub const RDM_CC_DISCOVER_RESP: u8 = 0x11;
pub const RDM_CC_GET_COMMAND: u8 = 0x20;
pub const RDM_CC_GET_COMMAND_RESP: u8 = 0x21;
pub const RDM_CC_SET_COMMAND: u8 = 0x30;
pub const RDM_CC_SET_COMMAND_RESP: u8 = 0x31;

pub const RDM_RESP_ACK: u8 = 0x00;
pub const RDM_RESP_ACK_TIMER: u8 = 0x01;
pub const RDM_RESP_NACK: u8 = 0x02;
pub const RDM_RESP_ACK_OVERFLOW: u8 = 0x03;

pub const RDM_PID_DISC_UNIQUE_BRANCH: u16 = 0x0001;
pub const RDM_PID_DISC_MUTE: u16 = 0x0002;
pub const RDM_PID_DISC_UNMUTE: u16 = 0x0003;
pub const RDM_PID_PROXIED_DEVICES: u16 = 0x0010;
pub const RDM_PID_PROXY_DEV_COUNT: u16 = 0x0011;
pub const RDM_PID_QUEUED_MESSAGE: u16 = 0x0020;

pub const RDM_STATUS_ERROR: u8 = 0x04;
/// Bit 0 of the DISC_MUTE/DISC_UNMUTE control field.
pub const RDM_CONTROL_MANAGED_PROXY_BITMASK: u16 = 0x0001;

pub const RDM_UID_BROADCAST: u64 = 0xFFFF_FFFF_FFFF;
pub const RDM_UID_MAX: u64 = 0xFFFF_FFFF_FFFE;
/// Open Lighting ETSA manufacturer code, used as a last-resort controller UID prefix.
pub const RDM_UID_MFR: u16 = 0x7A70;

pub const RDM_MAX_PDL: usize = 231;
/// Sub-start-code through PDL, plus two checksum bytes: minimum framing overhead.
pub const RDM_MIN_PACKET_LENGTH: usize = 26;

pub const PREAMBLE_BYTE: u8 = 0xFE;
pub const SEPARATOR_BYTE: u8 = 0xAA;
/// Maximum number of preamble bytes preceding the discovery response separator.
pub const MAX_PREAMBLE_BYTES: usize = 7;
/// 6 UID bytes + 2 checksum bytes, each AND-pair encoded as two bytes on the wire.
pub const DISCOVERY_RESPONSE_ENCODED_LEN: usize = (RDM_UID_LENGTH + 2) * 2;

/// FTDI vendor id for the supported adapter family.
pub const OPENRDM_VID: u16 = 0x0403;
/// FTDI product id for the supported adapter family.
pub const OPENRDM_PID: u16 = 0x6001;

pub const DMX_BAUD_RATE: u32 = 250_000;
pub const BREAK_MICROS: u64 = 92;

pub const USB_READ_TIMEOUT_MS: u64 = 50;
pub const USB_WRITE_TIMEOUT_MS: u64 = 50;
/// Backoff applied after a device-unavailable transport error, to avoid log spam.
pub const DEVICE_UNAVAILABLE_BACKOFF_MS: u64 = 1_000;

/// Default DMX refresh period; resent even when the frame hasn't changed.
pub const DEFAULT_DMX_REFRESH_MS: u32 = 25;
pub const MIN_DMX_REFRESH_MS: u32 = 5;
pub const MAX_DMX_REFRESH_MS: u32 = 60_000;

pub const RDM_DEFAULT_RETRIES: u32 = 10;
pub const RDM_DEFAULT_MAX_TIME_MS: u64 = 2_000;
pub const RDM_QUEUE_SEMA_TIMEOUT_MS: u64 = 1_000;
pub const RDM_QUEUE_MAX_LENGTH: usize = 100;

/// Maximum number of UIDs reportable by PROXIED_DEVICES in one fragment (0xE4 / 6).
pub const PROXIED_DEVICES_MAX_PDL: u8 = 0xE4;
