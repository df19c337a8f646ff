//! Hardware transport seam.
//!
//! The transport turns logical requests (query slot status, toggle event
//! delivery, activate a card) into register accesses. The line card core
//! treats every call as fallible, blocking I/O.

mod memory;

pub use memory::MemoryTransport;

use crate::error::LinecardResult;
use crate::linecard::SlotIndex;

/// Request/response channel to the chassis management hardware.
pub trait LinecardTransport: Send + Sync {
    /// Returns the number of hot-swappable slots in the chassis.
    fn query_slot_count(&self) -> LinecardResult<u8>;

    /// Reads the raw slot information record for `slot_index`.
    ///
    /// `event_delivery` is echoed into the request so the same register
    /// access can arm unsolicited status notifications.
    fn query_slot_info(&self, slot_index: SlotIndex, event_delivery: bool) -> LinecardResult<Vec<u8>>;

    /// Enables or disables unsolicited status-change events for a slot.
    fn set_event_delivery(&self, slot_index: SlotIndex, enable: bool) -> LinecardResult<()>;

    /// Issues the device activation command for a slot that became ready.
    fn activate(&self, slot_index: SlotIndex) -> LinecardResult<()>;
}
