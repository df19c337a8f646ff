//! Per-slot line card state.

use std::fmt;

use parking_lot::{Mutex, MutexGuard};

use crate::status::{CardType, FirmwareVersion};

/// 1-based physical slot number.
pub type SlotIndex = u8;

/// Lifecycle flags and metadata of one slot.
///
/// Flags only change through the transition engine while the owning
/// [`Linecard`] lock is held. Subscribers see this type by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinecardState {
    slot_index: SlotIndex,
    provisioned: bool,
    ready: bool,
    active: bool,
    card_type: Option<CardType>,
    metadata: Option<(u16, FirmwareVersion)>,
}

impl LinecardState {
    fn new(slot_index: SlotIndex) -> Self {
        Self {
            slot_index,
            provisioned: false,
            ready: false,
            active: false,
            card_type: None,
            metadata: None,
        }
    }

    pub fn slot_index(&self) -> SlotIndex {
        self.slot_index
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Card type recorded when the slot was provisioned.
    pub fn card_type(&self) -> Option<CardType> {
        self.card_type
    }

    /// Hardware revision, known only while the card is active.
    pub fn hw_revision(&self) -> Option<u16> {
        self.metadata.map(|(hw_revision, _)| hw_revision)
    }

    /// Firmware version, known only while the card is active.
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        self.metadata.map(|(_, firmware_version)| firmware_version)
    }

    /// `(provisioned, ready, active)`
    pub fn flags(&self) -> (bool, bool, bool) {
        (self.provisioned, self.ready, self.active)
    }

    pub(crate) fn set_provisioned(&mut self, card_type: CardType) {
        self.provisioned = true;
        self.card_type = Some(card_type);
    }

    pub(crate) fn clear_provisioned(&mut self) {
        self.provisioned = false;
        self.card_type = None;
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Metadata is recorded right before the slot turns active, so
    /// `on_active` handlers can read it.
    pub(crate) fn set_metadata(&mut self, hw_revision: u16, firmware_version: FirmwareVersion) {
        self.metadata = Some((hw_revision, firmware_version));
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.metadata = None;
        }
    }
}

impl fmt::Display for LinecardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot {} (provisioned={}, ready={}, active={})",
            self.slot_index, self.provisioned, self.ready, self.active
        )
    }
}

/// One physical line card slot.
#[derive(Debug)]
pub struct Linecard {
    slot_index: SlotIndex,
    state: Mutex<LinecardState>,
}

impl Linecard {
    pub(crate) fn new(slot_index: SlotIndex) -> Self {
        Self {
            slot_index,
            state: Mutex::new(LinecardState::new(slot_index)),
        }
    }

    pub fn slot_index(&self) -> SlotIndex {
        self.slot_index
    }

    /// Returns a snapshot of the slot state.
    pub fn state(&self) -> LinecardState {
        self.state.lock().clone()
    }

    /// Acquires the slot lock for a transition.
    pub(crate) fn lock(&self) -> MutexGuard<'_, LinecardState> {
        self.state.lock()
    }
}
