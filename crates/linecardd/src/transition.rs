//! Line card state machine.
//!
//! Given the current state of a slot and a freshly reported status record,
//! the engine applies the required transitions in a fixed order:
//!
//! 1. provision (transactional subscriber fan-out)
//! 2. ready (device activation)
//! 3. active (metadata update, `on_active`)
//! 4. inactive (`on_inactive`)
//! 5. not ready
//! 6. unprovision (`on_unprovisioned`)
//!
//! The reported record is clamped so that `active ⇒ ready ⇒ provisioned`
//! holds in every committed state, even if hardware reports an
//! inconsistent combination.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::LinecardResult;
use crate::linecard::{LinecardState, SlotIndex};
use crate::registry::SubscriberRegistry;
use crate::stats::LinecardCounters;
use crate::status::SlotInfo;
use crate::transport::LinecardTransport;

/// How much of the state machine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// All six steps.
    Full,
    /// Provisioning only. Used during chassis bring-up, before subscribers
    /// exist, so that ready/active side effects are deferred.
    ProvisionOnly,
}

/// Transitions applied by one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionReport {
    pub provisioned: bool,
    pub ready: bool,
    pub active: bool,
    pub inactive: bool,
    pub not_ready: bool,
    pub unprovisioned: bool,
}

impl TransitionReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for TransitionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps = [
            (self.provisioned, "provisioned"),
            (self.ready, "ready"),
            (self.active, "active"),
            (self.inactive, "inactive"),
            (self.not_ready, "not_ready"),
            (self.unprovisioned, "unprovisioned"),
        ];
        let applied: Vec<&str> = steps
            .iter()
            .filter(|(done, _)| *done)
            .map(|(_, name)| *name)
            .collect();
        if applied.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", applied.join(","))
        }
    }
}

/// Applies status records to slot state.
///
/// The caller must hold the slot lock (the engine only ever sees the
/// state through the lock guard) and a read guard on the registry for
/// the whole run.
pub struct TransitionEngine<'a> {
    transport: &'a dyn LinecardTransport,
    subscribers: &'a SubscriberRegistry,
    counters: &'a LinecardCounters,
}

impl<'a> TransitionEngine<'a> {
    pub fn new(
        transport: &'a dyn LinecardTransport,
        subscribers: &'a SubscriberRegistry,
        counters: &'a LinecardCounters,
    ) -> Self {
        Self {
            transport,
            subscribers,
            counters,
        }
    }

    /// Runs the state machine for one slot.
    ///
    /// A provisioning failure leaves the state untouched. A failure in a
    /// later step keeps the steps already committed.
    pub fn apply(
        &self,
        state: &mut LinecardState,
        info: &SlotInfo,
        mode: TransitionMode,
    ) -> LinecardResult<TransitionReport> {
        let slot = state.slot_index();
        let mut report = TransitionReport::default();

        if !info.sr_valid {
            debug!(slot, "status record valid bit not set");
        }

        if info.provisioned && !state.is_provisioned() {
            self.notify_provisioned(state)?;
            state.set_provisioned(info.card_type);
            report.provisioned = true;
            info!(slot, card_type = %info.card_type, "line card provisioned");
        }

        if mode == TransitionMode::ProvisionOnly {
            self.finish(slot, &report);
            return Ok(report);
        }

        let target_ready = info.provisioned && info.ready.is_ready();
        let target_active = target_ready && info.active;

        if target_ready && !state.is_ready() {
            if let Err(err) = self.transport.activate(slot) {
                self.finish(slot, &report);
                return Err(err);
            }
            state.set_ready(true);
            report.ready = true;
            info!(slot, "line card ready");
        }

        if target_active && !state.is_active() {
            state.set_metadata(info.hw_revision, info.firmware_version);
            for subscriber in self.subscribers.forward() {
                subscriber.active(state);
            }
            state.set_active(true);
            report.active = true;
            info!(
                slot,
                hw_revision = info.hw_revision,
                firmware = %info.firmware_version,
                "line card active"
            );
        }

        if !target_active && state.is_active() {
            for subscriber in self.subscribers.forward() {
                subscriber.inactive(state);
            }
            state.set_active(false);
            report.inactive = true;
            info!(slot, "line card inactive");
        }

        if !target_ready && state.is_ready() {
            state.set_ready(false);
            report.not_ready = true;
            info!(slot, "line card not ready");
        }

        if !info.provisioned && state.is_provisioned() {
            state.clear_provisioned();
            for subscriber in self.subscribers.reverse() {
                subscriber.unprovisioned(state);
            }
            report.unprovisioned = true;
            info!(slot, "line card unprovisioned");
        }

        self.finish(slot, &report);
        Ok(report)
    }

    fn finish(&self, slot: SlotIndex, report: &TransitionReport) {
        if !report.is_empty() {
            self.counters.record_transition();
            debug!(slot, transitions = %report, "slot state updated");
        }
    }

    /// Notifies every subscriber of the new slot, all or nothing.
    ///
    /// On the first refusal, subscribers already notified are told to
    /// unprovision in reverse order and the refusal is returned.
    fn notify_provisioned(&self, state: &LinecardState) -> LinecardResult<()> {
        for (position, subscriber) in self.subscribers.forward().enumerate() {
            if let Err(err) = subscriber.provisioned(state) {
                warn!(
                    slot = state.slot_index(),
                    subscriber = position,
                    error = %err,
                    "provisioning rejected, rolling back"
                );
                self.subscribers
                    .forward()
                    .take(position)
                    .rev()
                    .for_each(|done| done.unprovisioned(state));
                self.counters.record_rollback();
                return Err(err);
            }
        }
        Ok(())
    }
}
