//! Line card event subscribers.
//!
//! Subscribers are kept in registration order. The order is part of the
//! contract: provisioning notifies front to back and rolls back back to
//! front, so a later subscriber may rely on resources set up by an
//! earlier one.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{LinecardError, LinecardResult};
use crate::linecard::{LinecardState, SlotIndex};

/// Opaque subscriber context handed back on every callback.
pub type SubscriberContext = Arc<dyn Any + Send + Sync>;

/// Handler for a slot becoming provisioned. May refuse.
pub type ProvisionedHandler =
    Box<dyn Fn(SlotIndex, &LinecardState, &(dyn Any + Send + Sync)) -> LinecardResult<()> + Send + Sync>;

/// Handler for the non-failing notifications.
pub type NotifyHandler = Box<dyn Fn(SlotIndex, &LinecardState, &(dyn Any + Send + Sync)) + Send + Sync>;

/// The set of callbacks a subscriber is interested in.
///
/// Every handler is optional; absent handlers are skipped.
#[derive(Default)]
pub struct LinecardEventOps {
    on_provisioned: Option<ProvisionedHandler>,
    on_unprovisioned: Option<NotifyHandler>,
    on_active: Option<NotifyHandler>,
    on_inactive: Option<NotifyHandler>,
}

impl LinecardEventOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_provisioned<F>(mut self, handler: F) -> Self
    where
        F: Fn(SlotIndex, &LinecardState, &(dyn Any + Send + Sync)) -> LinecardResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.on_provisioned = Some(Box::new(handler));
        self
    }

    pub fn on_unprovisioned<F>(mut self, handler: F) -> Self
    where
        F: Fn(SlotIndex, &LinecardState, &(dyn Any + Send + Sync)) + Send + Sync + 'static,
    {
        self.on_unprovisioned = Some(Box::new(handler));
        self
    }

    pub fn on_active<F>(mut self, handler: F) -> Self
    where
        F: Fn(SlotIndex, &LinecardState, &(dyn Any + Send + Sync)) + Send + Sync + 'static,
    {
        self.on_active = Some(Box::new(handler));
        self
    }

    pub fn on_inactive<F>(mut self, handler: F) -> Self
    where
        F: Fn(SlotIndex, &LinecardState, &(dyn Any + Send + Sync)) + Send + Sync + 'static,
    {
        self.on_inactive = Some(Box::new(handler));
        self
    }

    pub fn handles_provisioned(&self) -> bool {
        self.on_provisioned.is_some()
    }

    pub fn handles_unprovisioned(&self) -> bool {
        self.on_unprovisioned.is_some()
    }
}

impl fmt::Debug for LinecardEventOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinecardEventOps")
            .field("on_provisioned", &self.on_provisioned.is_some())
            .field("on_unprovisioned", &self.on_unprovisioned.is_some())
            .field("on_active", &self.on_active.is_some())
            .field("on_inactive", &self.on_inactive.is_some())
            .finish()
    }
}

/// A registered (ops, context) pair.
#[derive(Clone)]
pub struct Subscriber {
    ops: Arc<LinecardEventOps>,
    context: SubscriberContext,
}

impl Subscriber {
    pub(crate) fn new(ops: Arc<LinecardEventOps>, context: SubscriberContext) -> Self {
        Self { ops, context }
    }

    fn matches(&self, ops: &Arc<LinecardEventOps>, context: &SubscriberContext) -> bool {
        Arc::ptr_eq(&self.ops, ops) && Arc::ptr_eq(&self.context, context)
    }

    pub fn ops(&self) -> &LinecardEventOps {
        &self.ops
    }

    pub(crate) fn provisioned(&self, state: &LinecardState) -> LinecardResult<()> {
        match &self.ops.on_provisioned {
            Some(handler) => handler(state.slot_index(), state, &*self.context),
            None => Ok(()),
        }
    }

    pub(crate) fn unprovisioned(&self, state: &LinecardState) {
        if let Some(handler) = &self.ops.on_unprovisioned {
            handler(state.slot_index(), state, &*self.context);
        }
    }

    pub(crate) fn active(&self, state: &LinecardState) {
        if let Some(handler) = &self.ops.on_active {
            handler(state.slot_index(), state, &*self.context);
        }
    }

    pub(crate) fn inactive(&self, state: &LinecardState) {
        if let Some(handler) = &self.ops.on_inactive {
            handler(state.slot_index(), state, &*self.context);
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("ops", &self.ops).finish()
    }
}

/// Insertion-ordered list of subscribers.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: Vec<Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a subscriber.
    pub fn register(
        &mut self,
        ops: Arc<LinecardEventOps>,
        context: SubscriberContext,
    ) -> LinecardResult<()> {
        self.reserve()?;
        self.push(Subscriber::new(ops, context));
        Ok(())
    }

    /// Makes room for one more entry so the following `push` cannot fail.
    pub(crate) fn reserve(&mut self) -> LinecardResult<()> {
        self.entries
            .try_reserve(1)
            .map_err(|e| LinecardError::ResourceExhausted {
                what: format!("subscriber entry: {}", e),
            })
    }

    pub(crate) fn push(&mut self, subscriber: Subscriber) {
        self.entries.push(subscriber);
    }

    /// Removes every entry registered with exactly this ops/context pair.
    ///
    /// Returns the number of entries removed.
    pub fn unregister(&mut self, ops: &Arc<LinecardEventOps>, context: &SubscriberContext) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.matches(ops, context));
        before - self.entries.len()
    }

    /// Subscribers in registration order.
    pub fn forward(&self) -> std::slice::Iter<'_, Subscriber> {
        self.entries.iter()
    }

    /// Subscribers in reverse registration order.
    pub fn reverse(&self) -> std::iter::Rev<std::slice::Iter<'_, Subscriber>> {
        self.entries.iter().rev()
    }
}
