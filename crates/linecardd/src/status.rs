//! Slot status query and decoding.
//!
//! A slot information record is a fixed 16-byte, big-endian payload:
//!
//! | Offset | Size | Field                                          |
//! |--------|------|------------------------------------------------|
//! | 0      | 1    | slot index (1-based)                           |
//! | 1      | 1    | flags: bit 0 provisioned, bit 1 sr_valid, bit 2 active |
//! | 2      | 1    | ready state (0 = not ready, 1 = ready)         |
//! | 3      | 1    | card type                                      |
//! | 4      | 2    | hardware revision                              |
//! | 6      | 2    | firmware major                                 |
//! | 8      | 2    | firmware minor                                 |
//! | 10     | 2    | firmware subminor                              |
//! | 12     | 4    | reserved                                       |

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::error::{LinecardError, LinecardResult};
use crate::linecard::SlotIndex;
use crate::transport::LinecardTransport;

/// Length of an encoded slot information record.
pub const SLOT_INFO_LEN: usize = 16;

const OFF_SLOT_INDEX: usize = 0;
const OFF_FLAGS: usize = 1;
const OFF_READY: usize = 2;
const OFF_CARD_TYPE: usize = 3;
const OFF_HW_REVISION: usize = 4;
const OFF_FW_MAJOR: usize = 6;
const OFF_FW_MINOR: usize = 8;
const OFF_FW_SUBMINOR: usize = 10;

const FLAG_PROVISIONED: u8 = 1 << 0;
const FLAG_SR_VALID: u8 = 1 << 1;
const FLAG_ACTIVE: u8 = 1 << 2;

/// Hardware-reported readiness of a line card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    #[default]
    NotReady,
    Ready,
}

impl ReadyState {
    fn from_raw(raw: u8) -> LinecardResult<Self> {
        match raw {
            0 => Ok(ReadyState::NotReady),
            1 => Ok(ReadyState::Ready),
            other => Err(LinecardError::malformed(format!(
                "unknown ready state {}",
                other
            ))),
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            ReadyState::NotReady => 0,
            ReadyState::Ready => 1,
        }
    }

    pub fn is_ready(self) -> bool {
        self == ReadyState::Ready
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::NotReady => "not_ready",
            ReadyState::Ready => "ready",
        }
    }
}

/// Line card type as reported by the chassis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardType(pub u8);

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Line card firmware (INI file) version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub subminor: u16,
}

impl FirmwareVersion {
    pub const fn new(major: u16, minor: u16, subminor: u16) -> Self {
        Self {
            major,
            minor,
            subminor,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.subminor)
    }
}

impl FromStr for FirmwareVersion {
    type Err = LinecardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(LinecardError::Configuration(format!(
                "firmware version '{}' must be major.minor.subminor",
                s
            )));
        }

        let mut fields = [0u16; 3];
        for (field, part) in fields.iter_mut().zip(&parts) {
            *field = part.parse().map_err(|_| {
                LinecardError::Configuration(format!("invalid firmware version '{}'", s))
            })?;
        }

        Ok(Self::new(fields[0], fields[1], fields[2]))
    }
}

/// Decoded status record for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot_index: SlotIndex,
    pub provisioned: bool,
    /// Status record valid bit. Informational only.
    pub sr_valid: bool,
    pub ready: ReadyState,
    pub active: bool,
    pub hw_revision: u16,
    pub firmware_version: FirmwareVersion,
    pub card_type: CardType,
}

impl SlotInfo {
    /// Record for an empty slot.
    pub fn unprovisioned(slot_index: SlotIndex) -> Self {
        Self {
            slot_index,
            provisioned: false,
            sr_valid: true,
            ready: ReadyState::NotReady,
            active: false,
            hw_revision: 0,
            firmware_version: FirmwareVersion::default(),
            card_type: CardType::default(),
        }
    }

    /// Record for a provisioned, ready and active card.
    pub fn active(
        slot_index: SlotIndex,
        hw_revision: u16,
        firmware_version: FirmwareVersion,
    ) -> Self {
        Self {
            provisioned: true,
            ready: ReadyState::Ready,
            active: true,
            hw_revision,
            firmware_version,
            ..Self::unprovisioned(slot_index)
        }
    }

    /// Decodes a slot information payload.
    pub fn decode(payload: &[u8]) -> LinecardResult<Self> {
        if payload.len() < SLOT_INFO_LEN {
            return Err(LinecardError::malformed(format!(
                "slot info payload is {} bytes, expected {}",
                payload.len(),
                SLOT_INFO_LEN
            )));
        }

        let flags = payload[OFF_FLAGS];
        Ok(Self {
            slot_index: payload[OFF_SLOT_INDEX],
            provisioned: flags & FLAG_PROVISIONED != 0,
            sr_valid: flags & FLAG_SR_VALID != 0,
            ready: ReadyState::from_raw(payload[OFF_READY])?,
            active: flags & FLAG_ACTIVE != 0,
            hw_revision: BigEndian::read_u16(&payload[OFF_HW_REVISION..]),
            firmware_version: FirmwareVersion::new(
                BigEndian::read_u16(&payload[OFF_FW_MAJOR..]),
                BigEndian::read_u16(&payload[OFF_FW_MINOR..]),
                BigEndian::read_u16(&payload[OFF_FW_SUBMINOR..]),
            ),
            card_type: CardType(payload[OFF_CARD_TYPE]),
        })
    }

    /// Encodes the record into its wire form.
    pub fn encode(&self) -> [u8; SLOT_INFO_LEN] {
        let mut payload = [0u8; SLOT_INFO_LEN];
        let mut flags = 0;
        if self.provisioned {
            flags |= FLAG_PROVISIONED;
        }
        if self.sr_valid {
            flags |= FLAG_SR_VALID;
        }
        if self.active {
            flags |= FLAG_ACTIVE;
        }

        payload[OFF_SLOT_INDEX] = self.slot_index;
        payload[OFF_FLAGS] = flags;
        payload[OFF_READY] = self.ready.to_raw();
        payload[OFF_CARD_TYPE] = self.card_type.0;
        BigEndian::write_u16(&mut payload[OFF_HW_REVISION..], self.hw_revision);
        BigEndian::write_u16(&mut payload[OFF_FW_MAJOR..], self.firmware_version.major);
        BigEndian::write_u16(&mut payload[OFF_FW_MINOR..], self.firmware_version.minor);
        BigEndian::write_u16(
            &mut payload[OFF_FW_SUBMINOR..],
            self.firmware_version.subminor,
        );
        payload
    }

    /// Fails with [`LinecardError::SlotMismatch`] unless the record is for `expected`.
    pub fn ensure_slot(self, expected: SlotIndex) -> LinecardResult<Self> {
        if self.slot_index != expected {
            return Err(LinecardError::SlotMismatch {
                expected,
                actual: self.slot_index,
            });
        }
        Ok(self)
    }
}

/// Queries and decodes the status of one slot.
///
/// The caller is responsible for checking the decoded slot index against
/// the slot it asked for (see [`SlotInfo::ensure_slot`]).
pub fn query_slot_info(
    transport: &dyn LinecardTransport,
    slot_index: SlotIndex,
) -> LinecardResult<SlotInfo> {
    let payload = transport.query_slot_info(slot_index, false)?;
    SlotInfo::decode(&payload)
}
