//! In-memory chassis used when no hardware transport is linked in.
//!
//! Holds one status record per slot and answers requests from it. Test
//! code and the daemon's simulation mode mutate the records to emulate
//! card insertion, removal and transport faults.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::LinecardTransport;
use crate::error::{LinecardError, LinecardResult};
use crate::linecard::SlotIndex;
use crate::status::{FirmwareVersion, ReadyState, SlotInfo};

#[derive(Debug, Clone)]
struct SlotRecord {
    info: SlotInfo,
    event_delivery: bool,
    activations: u32,
    fail_query: bool,
    fail_event_delivery: bool,
    fail_activate: bool,
    reported_slot: Option<SlotIndex>,
}

impl SlotRecord {
    fn new(info: SlotInfo) -> Self {
        Self {
            info,
            event_delivery: false,
            activations: 0,
            fail_query: false,
            fail_event_delivery: false,
            fail_activate: false,
            reported_slot: None,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut info = self.info;
        if let Some(reported) = self.reported_slot {
            info.slot_index = reported;
        }
        info.encode().to_vec()
    }
}

#[derive(Debug, Default)]
struct ChassisState {
    slots: Vec<SlotRecord>,
    fail_capability: bool,
}

/// Simulated chassis answering slot requests from memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<ChassisState>,
    queries: AtomicU64,
}

impl MemoryTransport {
    /// Creates a chassis with `slot_count` empty slots.
    pub fn new(slot_count: u8) -> Self {
        Self::from_slots((1..=slot_count).map(SlotInfo::unprovisioned))
    }

    /// Creates a chassis from per-slot records. Slot indices are reassigned
    /// by position, starting at 1.
    pub fn from_slots(slots: impl IntoIterator<Item = SlotInfo>) -> Self {
        let slots = slots
            .into_iter()
            .zip(1..=SlotIndex::MAX)
            .map(|(mut info, slot_index)| {
                info.slot_index = slot_index;
                SlotRecord::new(info)
            })
            .collect();

        Self {
            state: Mutex::new(ChassisState {
                slots,
                fail_capability: false,
            }),
            queries: AtomicU64::new(0),
        }
    }

    fn with_slot<T>(
        &self,
        slot_index: SlotIndex,
        f: impl FnOnce(&mut SlotRecord) -> T,
    ) -> LinecardResult<T> {
        let mut state = self.state.lock();
        let count = state.slots.len() as u8;
        if slot_index == 0 {
            return Err(LinecardError::SlotOutOfRange {
                slot: slot_index,
                count,
            });
        }
        state
            .slots
            .get_mut(usize::from(slot_index) - 1)
            .map(f)
            .ok_or(LinecardError::SlotOutOfRange {
                slot: slot_index,
                count,
            })
    }

    /// Returns the current hardware record of a slot.
    pub fn slot_info(&self, slot_index: SlotIndex) -> LinecardResult<SlotInfo> {
        self.with_slot(slot_index, |record| record.info)
    }

    /// Replaces the hardware record of `info.slot_index`.
    pub fn set_slot_info(&self, info: SlotInfo) -> LinecardResult<()> {
        self.with_slot(info.slot_index, |record| record.info = info)
    }

    /// Emulates insertion of a card that powers up fully.
    pub fn insert_card(
        &self,
        slot_index: SlotIndex,
        hw_revision: u16,
        firmware_version: FirmwareVersion,
    ) -> LinecardResult<()> {
        self.set_slot_info(SlotInfo::active(slot_index, hw_revision, firmware_version))
    }

    /// Emulates removal of the card in a slot.
    pub fn remove_card(&self, slot_index: SlotIndex) -> LinecardResult<()> {
        self.set_slot_info(SlotInfo::unprovisioned(slot_index))
    }

    /// Updates the ready/active bits of a slot without touching provisioning.
    pub fn set_ready_active(
        &self,
        slot_index: SlotIndex,
        ready: ReadyState,
        active: bool,
    ) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| {
            record.info.ready = ready;
            record.info.active = active;
        })
    }

    /// Payload the hardware would push for an unsolicited status change.
    pub fn event_payload(&self, slot_index: SlotIndex) -> LinecardResult<Vec<u8>> {
        self.with_slot(slot_index, |record| record.payload())
    }

    pub fn event_delivery_enabled(&self, slot_index: SlotIndex) -> bool {
        self.with_slot(slot_index, |record| record.event_delivery)
            .unwrap_or(false)
    }

    /// Number of activation commands the slot has received.
    pub fn activations(&self, slot_index: SlotIndex) -> u32 {
        self.with_slot(slot_index, |record| record.activations)
            .unwrap_or(0)
    }

    /// Number of slot status queries served, including failed ones.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn fail_queries(&self, slot_index: SlotIndex, fail: bool) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| record.fail_query = fail)
    }

    pub fn fail_event_delivery(&self, slot_index: SlotIndex, fail: bool) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| record.fail_event_delivery = fail)
    }

    pub fn fail_activate(&self, slot_index: SlotIndex, fail: bool) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| record.fail_activate = fail)
    }

    pub fn fail_capability_query(&self, fail: bool) {
        self.state.lock().fail_capability = fail;
    }

    /// Makes the slot answer with another slot's index.
    pub fn misreport_slot(
        &self,
        slot_index: SlotIndex,
        reported: Option<SlotIndex>,
    ) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| record.reported_slot = reported)
    }
}

impl LinecardTransport for MemoryTransport {
    fn query_slot_count(&self) -> LinecardResult<u8> {
        let state = self.state.lock();
        if state.fail_capability {
            return Err(LinecardError::transport(
                "capability_query",
                0,
                "injected failure",
            ));
        }
        Ok(state.slots.len() as u8)
    }

    fn query_slot_info(&self, slot_index: SlotIndex, event_delivery: bool) -> LinecardResult<Vec<u8>> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.with_slot(slot_index, |record| {
            if record.fail_query {
                return Err(LinecardError::transport(
                    "slot_info_query",
                    slot_index,
                    "injected failure",
                ));
            }
            if event_delivery {
                record.event_delivery = true;
            }
            Ok(record.payload())
        })?
    }

    fn set_event_delivery(&self, slot_index: SlotIndex, enable: bool) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| {
            if record.fail_event_delivery {
                return Err(LinecardError::transport(
                    "event_delivery_set",
                    slot_index,
                    "injected failure",
                ));
            }
            debug!(slot = slot_index, enable, "event delivery updated");
            record.event_delivery = enable;
            Ok(())
        })?
    }

    fn activate(&self, slot_index: SlotIndex) -> LinecardResult<()> {
        self.with_slot(slot_index, |record| {
            if record.fail_activate {
                return Err(LinecardError::transport(
                    "activate",
                    slot_index,
                    "injected failure",
                ));
            }
            record.activations += 1;
            Ok(())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chassis_is_empty() {
        let transport = MemoryTransport::new(3);
        assert_eq!(transport.query_slot_count().unwrap(), 3);
        for slot in 1..=3 {
            let info = transport.slot_info(slot).unwrap();
            assert_eq!(info.slot_index, slot);
            assert!(!info.provisioned);
        }
    }

    #[test]
    fn test_from_slots_renumbers() {
        let transport = MemoryTransport::from_slots(vec![
            SlotInfo::unprovisioned(9),
            SlotInfo::active(9, 1, FirmwareVersion::new(1, 0, 0)),
        ]);
        assert_eq!(transport.slot_info(1).unwrap().slot_index, 1);
        assert!(transport.slot_info(2).unwrap().active);
    }

    #[test]
    fn test_out_of_range_slot() {
        let transport = MemoryTransport::new(2);
        assert!(transport.query_slot_info(0, false).is_err());
        assert!(transport.query_slot_info(3, false).is_err());
        assert!(!transport.event_delivery_enabled(3));
    }

    #[test]
    fn test_query_returns_encoded_record() {
        let transport = MemoryTransport::new(2);
        transport
            .insert_card(2, 4, FirmwareVersion::new(1, 2, 3))
            .unwrap();

        let payload = transport.query_slot_info(2, false).unwrap();
        let info = SlotInfo::decode(&payload).unwrap();
        assert_eq!(info.slot_index, 2);
        assert!(info.active);
        assert_eq!(transport.query_count(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let transport = MemoryTransport::new(1);
        transport.fail_queries(1, true).unwrap();
        transport.fail_activate(1, true).unwrap();
        transport.fail_event_delivery(1, true).unwrap();
        transport.fail_capability_query(true);

        assert!(transport.query_slot_info(1, false).is_err());
        assert!(transport.activate(1).is_err());
        assert!(transport.set_event_delivery(1, true).is_err());
        assert!(transport.query_slot_count().is_err());
        assert_eq!(transport.activations(1), 0);
    }

    #[test]
    fn test_event_delivery_and_activation() {
        let transport = MemoryTransport::new(1);
        transport.set_event_delivery(1, true).unwrap();
        assert!(transport.event_delivery_enabled(1));
        transport.activate(1).unwrap();
        transport.activate(1).unwrap();
        assert_eq!(transport.activations(1), 2);
    }

    #[test]
    fn test_misreported_slot() {
        let transport = MemoryTransport::new(2);
        transport.misreport_slot(1, Some(2)).unwrap();
        let info = SlotInfo::decode(&transport.query_slot_info(1, false).unwrap()).unwrap();
        assert_eq!(info.slot_index, 2);
    }
}
