//! Chassis-wide line card collection.
//!
//! # Lifecycle
//!
//! 1. [`LinecardSet::init`]: discover the slot count and seed every slot in
//!    provision-only mode. No subscribers exist yet.
//! 2. [`LinecardSet::register`]: subscribers attach and are told about the
//!    slots seeded so far.
//! 3. [`LinecardSet::post_init`]: arm event delivery and run a full pass,
//!    which resolves ready/active against the registered subscribers.
//! 4. Scans and unsolicited events (see `scan`).
//! 5. [`LinecardSet::pre_fini`]: disarm event delivery and drain in-flight
//!    transitions.
//! 6. Subscribers detach, then [`LinecardSet::fini`].
//!
//! # Locking
//!
//! Each slot has its own lock, held for a whole transition. The subscriber
//! registry sits behind a read/write lock: transitions take the read side
//! after the slot lock. Registration takes every slot lock in slot order,
//! then the write side. Subscriber callbacks must therefore never register
//! or unregister.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{LinecardError, LinecardResult};
use crate::linecard::{Linecard, LinecardState, SlotIndex};
use crate::registry::{LinecardEventOps, Subscriber, SubscriberContext, SubscriberRegistry};
use crate::stats::{LinecardCounters, LinecardStats};
use crate::status::{self, SlotInfo};
use crate::transition::{TransitionEngine, TransitionMode, TransitionReport};
use crate::transport::LinecardTransport;

/// All line card slots of a chassis plus their subscribers.
pub struct LinecardSet {
    count: u8,
    linecards: Box<[Linecard]>,
    subscribers: RwLock<SubscriberRegistry>,
    transport: Arc<dyn LinecardTransport>,
    pub(crate) counters: LinecardCounters,
    running: AtomicBool,
}

impl LinecardSet {
    /// Discovers the chassis slots and seeds their provisioning state.
    ///
    /// Returns `Ok(None)` for a chassis without hot-swap slots. Any slot
    /// failure aborts creation and releases the slots already seeded.
    pub fn init(transport: Arc<dyn LinecardTransport>) -> LinecardResult<Option<Self>> {
        let count = transport.query_slot_count()?;
        if count == 0 {
            info!("Chassis has no line card slots");
            return Ok(None);
        }

        let linecards = Self {
            count,
            linecards: (1..=count).map(Linecard::new).collect(),
            subscribers: RwLock::new(SubscriberRegistry::new()),
            transport,
            counters: LinecardCounters::default(),
            running: AtomicBool::new(false),
        };

        for slot in 1..=count {
            if let Err(err) = linecards.status_get_and_process(slot, TransitionMode::ProvisionOnly) {
                error!(slot, error = %err, "Failed to initialize line card");
                debug!(released = slot - 1, "Releasing initialized line cards");
                return Err(err);
            }
        }

        info!(count, "Line cards initialized");
        Ok(Some(linecards))
    }

    /// Number of slots in the chassis.
    pub fn count(&self) -> u8 {
        self.count
    }

    /// Returns the line card in `slot_index` (1-based).
    pub fn linecard(&self, slot_index: SlotIndex) -> Option<&Linecard> {
        usize::from(slot_index)
            .checked_sub(1)
            .and_then(|i| self.linecards.get(i))
    }

    pub fn linecards(&self) -> impl Iterator<Item = &Linecard> {
        self.linecards.iter()
    }

    pub(crate) fn linecard_checked(&self, slot_index: SlotIndex) -> LinecardResult<&Linecard> {
        self.linecard(slot_index)
            .ok_or(LinecardError::SlotOutOfRange {
                slot: slot_index,
                count: self.count,
            })
    }

    pub(crate) fn transport(&self) -> &dyn LinecardTransport {
        self.transport.as_ref()
    }

    pub fn stats(&self) -> LinecardStats {
        self.counters.snapshot()
    }

    /// True between post-init and pre-fini.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Appends a subscriber and announces the slots it missed.
    ///
    /// Slots already provisioned (typically by the provision-only pass of
    /// [`LinecardSet::init`]) are replayed to the new subscriber as
    /// `on_provisioned`, followed by `on_active` for active slots. If the
    /// subscriber refuses a slot, its replay is unwound and it is not
    /// registered. Blocks while any slot is mid-transition.
    pub fn register(
        &self,
        ops: Arc<LinecardEventOps>,
        context: SubscriberContext,
    ) -> LinecardResult<()> {
        let states: Vec<MutexGuard<'_, LinecardState>> =
            self.linecards.iter().map(Linecard::lock).collect();
        let mut subscribers = self.subscribers.write();
        subscribers.reserve()?;

        let subscriber = Subscriber::new(ops, context);
        for (replayed, state) in states.iter().enumerate() {
            if let Err(err) = Self::replay(&subscriber, state) {
                warn!(
                    slot = state.slot_index(),
                    error = %err,
                    "Subscriber rejected existing line card"
                );
                for done in states[..replayed].iter().rev() {
                    Self::unwind(&subscriber, done);
                }
                return Err(err);
            }
        }

        subscribers.push(subscriber);
        debug!(subscribers = subscribers.len(), "Line card event subscriber registered");
        Ok(())
    }

    fn replay(subscriber: &Subscriber, state: &LinecardState) -> LinecardResult<()> {
        if state.is_provisioned() {
            subscriber.provisioned(state)?;
        }
        if state.is_active() {
            subscriber.active(state);
        }
        Ok(())
    }

    fn unwind(subscriber: &Subscriber, state: &LinecardState) {
        if state.is_active() {
            subscriber.inactive(state);
        }
        if state.is_provisioned() {
            subscriber.unprovisioned(state);
        }
    }

    /// Removes every registration of this ops/context pair.
    pub fn unregister(&self, ops: &Arc<LinecardEventOps>, context: &SubscriberContext) {
        let mut subscribers = self.subscribers.write();
        let removed = subscribers.unregister(ops, context);
        debug!(
            removed,
            subscribers = subscribers.len(),
            "Line card event subscriber unregistered"
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Runs the state machine for one slot under its lock.
    ///
    /// Full passes are dropped once `pre_fini` has cleared the running
    /// flag; the check is made under the slot lock so a query that was
    /// still outstanding when teardown began cannot apply afterwards.
    pub(crate) fn process(
        &self,
        linecard: &Linecard,
        info: &SlotInfo,
        mode: TransitionMode,
    ) -> LinecardResult<TransitionReport> {
        let mut state = linecard.lock();
        if mode == TransitionMode::Full && !self.is_running() {
            debug!(
                slot = linecard.slot_index(),
                "Line card stopped, dropping status"
            );
            return Ok(TransitionReport::default());
        }
        let subscribers = self.subscribers.read();
        TransitionEngine::new(self.transport(), &subscribers, &self.counters).apply(
            &mut state,
            info,
            mode,
        )
    }

    /// Queries one slot and applies its status.
    pub(crate) fn status_get_and_process(
        &self,
        slot_index: SlotIndex,
        mode: TransitionMode,
    ) -> LinecardResult<TransitionReport> {
        let linecard = self.linecard_checked(slot_index)?;
        let info = status::query_slot_info(self.transport(), slot_index)?.ensure_slot(slot_index)?;
        self.process(linecard, &info, mode)
    }

    /// Arms event delivery and runs a full pass over every slot.
    ///
    /// On failure, event delivery is disarmed again for the failing slot
    /// and every slot before it.
    pub fn post_init(&self) -> LinecardResult<()> {
        self.running.store(true, Ordering::Release);

        for slot in 1..=self.count {
            if let Err(err) = self.post_init_slot(slot) {
                error!(slot, error = %err, "Line card post-init failed");
                self.running.store(false, Ordering::Release);
                for done in (1..slot).rev() {
                    self.disable_event_delivery(done);
                }
                return Err(err);
            }
        }

        info!(count = self.count, "Line card post-init complete");
        Ok(())
    }

    fn post_init_slot(&self, slot_index: SlotIndex) -> LinecardResult<()> {
        self.transport.set_event_delivery(slot_index, true)?;
        if let Err(err) = self.status_get_and_process(slot_index, TransitionMode::Full) {
            self.disable_event_delivery(slot_index);
            return Err(err);
        }
        Ok(())
    }

    fn disable_event_delivery(&self, slot_index: SlotIndex) {
        if let Err(err) = self.transport.set_event_delivery(slot_index, false) {
            warn!(slot = slot_index, error = %err, "Failed to disable line card event delivery");
        }
    }

    /// Stops event processing and waits for in-flight transitions.
    pub fn pre_fini(&self) {
        self.running.store(false, Ordering::Release);
        for slot in 1..=self.count {
            self.disable_event_delivery(slot);
        }
        for linecard in self.linecards.iter() {
            drop(linecard.lock());
        }
        debug!("Line card transitions drained");
    }

    /// Releases the slots.
    ///
    /// Every subscriber must have unregistered first; remaining
    /// subscribers are reported as an error, not detached.
    pub fn fini(self) -> LinecardResult<()> {
        let remaining = self.subscriber_count();
        if remaining > 0 {
            error!(remaining, "Line cards released with subscribers still registered");
            return Err(LinecardError::SubscribersRemaining { count: remaining });
        }
        info!(count = self.count, "Line cards released");
        Ok(())
    }
}

impl std::fmt::Debug for LinecardSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinecardSet")
            .field("count", &self.count)
            .field("linecards", &self.linecards)
            .field("subscribers", &self.subscriber_count())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{FirmwareVersion, SlotInfo};
    use crate::transport::MemoryTransport;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    type EventLog = Arc<Mutex<Vec<(&'static str, SlotIndex)>>>;

    fn chassis(slots: u8) -> Arc<MemoryTransport> {
        Arc::new(MemoryTransport::new(slots))
    }

    /// Ops that log every callback; refuses provisioning of `refuse_slot`.
    fn recorder(log: &EventLog, refuse_slot: Option<SlotIndex>) -> Arc<LinecardEventOps> {
        let (p, u, a, i) = (log.clone(), log.clone(), log.clone(), log.clone());
        Arc::new(
            LinecardEventOps::new()
                .on_provisioned(move |slot, _, _| {
                    p.lock().push(("provisioned", slot));
                    if refuse_slot == Some(slot) {
                        return Err(LinecardError::subscriber(slot, "refused"));
                    }
                    Ok(())
                })
                .on_unprovisioned(move |slot, _, _| u.lock().push(("unprovisioned", slot)))
                .on_active(move |slot, _, _| a.lock().push(("active", slot)))
                .on_inactive(move |slot, _, _| i.lock().push(("inactive", slot))),
        )
    }

    /// Slot 1 fully up, slot 2 empty, slot 3 provisioned but not ready.
    fn mixed_chassis() -> Arc<MemoryTransport> {
        let transport = chassis(3);
        transport
            .insert_card(1, 2, FirmwareVersion::new(1, 0, 0))
            .unwrap();
        transport
            .set_slot_info(SlotInfo {
                provisioned: true,
                ..SlotInfo::unprovisioned(3)
            })
            .unwrap();
        transport
    }

    #[test]
    fn test_init_without_slots() {
        let set = LinecardSet::init(chassis(0)).unwrap();
        assert!(set.is_none());
    }

    #[test]
    fn test_init_capability_failure() {
        let transport = chassis(2);
        transport.fail_capability_query(true);
        assert!(LinecardSet::init(transport).is_err());
    }

    #[test]
    fn test_slot_indices_are_stable() {
        let set = LinecardSet::init(chassis(4)).unwrap().unwrap();
        assert_eq!(set.count(), 4);
        for (i, linecard) in set.linecards().enumerate() {
            assert_eq!(usize::from(linecard.slot_index()), i + 1);
        }
        assert!(set.linecard(0).is_none());
        assert!(set.linecard(5).is_none());
        assert_eq!(set.linecard(4).unwrap().slot_index(), 4);
    }

    #[test]
    fn test_init_query_failure_aborts() {
        let transport = chassis(3);
        transport.fail_queries(2, true).unwrap();
        let err = LinecardSet::init(transport.clone()).unwrap_err();
        assert!(err.is_transport());
        // Slot 3 is never queried once slot 2 fails
        assert_eq!(transport.query_count(), 2);
    }

    #[test]
    fn test_init_slot_mismatch_aborts() {
        let transport = chassis(2);
        transport.misreport_slot(1, Some(2)).unwrap();
        let err = LinecardSet::init(transport).unwrap_err();
        assert!(matches!(
            err,
            LinecardError::SlotMismatch {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_post_init_arms_event_delivery() {
        let transport = chassis(2);
        transport
            .insert_card(1, 1, FirmwareVersion::new(1, 0, 0))
            .unwrap();
        let set = LinecardSet::init(transport.clone()).unwrap().unwrap();
        assert!(!set.is_running());

        set.post_init().unwrap();
        assert!(set.is_running());
        assert!(transport.event_delivery_enabled(1));
        assert!(transport.event_delivery_enabled(2));
        assert_eq!(set.linecard(1).unwrap().state().flags(), (true, true, true));

        set.pre_fini();
        assert!(!set.is_running());
        assert!(!transport.event_delivery_enabled(1));
        assert!(!transport.event_delivery_enabled(2));
        set.fini().unwrap();
    }

    #[test]
    fn test_post_init_failure_disarms_earlier_slots() {
        let transport = chassis(3);
        let set = LinecardSet::init(transport.clone()).unwrap().unwrap();
        transport.fail_queries(3, true).unwrap();

        assert!(set.post_init().is_err());
        assert!(!set.is_running());
        for slot in 1..=3 {
            assert!(!transport.event_delivery_enabled(slot));
        }
    }

    #[test]
    fn test_post_init_event_delivery_failure() {
        let transport = chassis(2);
        let set = LinecardSet::init(transport.clone()).unwrap().unwrap();
        transport.fail_event_delivery(2, true).unwrap();

        assert!(set.post_init().is_err());
        assert!(!transport.event_delivery_enabled(1));
    }

    #[test]
    fn test_register_replays_seeded_slots() {
        let set = LinecardSet::init(mixed_chassis()).unwrap().unwrap();
        let early: EventLog = Arc::default();
        set.register(recorder(&early, None), Arc::new(())).unwrap();
        assert_eq!(*early.lock(), vec![("provisioned", 1), ("provisioned", 3)]);

        set.post_init().unwrap();
        assert_eq!(
            *early.lock(),
            vec![("provisioned", 1), ("provisioned", 3), ("active", 1)]
        );

        let late: EventLog = Arc::default();
        set.register(recorder(&late, None), Arc::new(())).unwrap();
        assert_eq!(
            *late.lock(),
            vec![("provisioned", 1), ("active", 1), ("provisioned", 3)]
        );
        assert_eq!(set.subscriber_count(), 2);
    }

    #[test]
    fn test_register_refusal_unwinds_replay() {
        let set = LinecardSet::init(mixed_chassis()).unwrap().unwrap();
        set.post_init().unwrap();

        let log: EventLog = Arc::default();
        let err = set
            .register(recorder(&log, Some(3)), Arc::new(()))
            .unwrap_err();
        assert!(matches!(err, LinecardError::Subscriber { slot: 3, .. }));
        assert_eq!(
            *log.lock(),
            vec![
                ("provisioned", 1),
                ("active", 1),
                ("provisioned", 3),
                ("inactive", 1),
                ("unprovisioned", 1),
            ]
        );
        assert_eq!(set.subscriber_count(), 0);
    }

    #[test]
    fn test_fini_with_subscribers_remaining() {
        let set = LinecardSet::init(chassis(1)).unwrap().unwrap();
        set.register(Arc::new(LinecardEventOps::new()), Arc::new(()))
            .unwrap();

        match set.fini() {
            Err(LinecardError::SubscribersRemaining { count }) => assert_eq!(count, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unregister_allows_fini() {
        let set = LinecardSet::init(chassis(1)).unwrap().unwrap();
        let ops = Arc::new(LinecardEventOps::new());
        let ctx: SubscriberContext = Arc::new(());
        set.register(ops.clone(), ctx.clone()).unwrap();
        assert_eq!(set.subscriber_count(), 1);

        set.unregister(&ops, &ctx);
        assert_eq!(set.subscriber_count(), 0);
        assert!(set.fini().is_ok());
    }
}
