//! Status event processing and periodic chassis scans.
//!
//! Two sources feed the state machine once the line cards are running:
//! unsolicited status events pushed by the hardware, and scans that query
//! every slot. Both go through the same per-slot locked transition, so a
//! scan racing an event on the same slot simply finds nothing left to do.
//!
//! [`ScanDriver`] schedules both on the tokio blocking pool, since every
//! transport call may block. Events are applied one at a time in queue
//! order; scans run alongside them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::{self, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{LinecardError, LinecardResult};
use crate::linecard::SlotIndex;
use crate::linecards::LinecardSet;
use crate::status::{self, SlotInfo};
use crate::transition::{TransitionMode, TransitionReport};

/// Outcome of one pass over every slot.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Slots visited.
    pub scanned: usize,
    /// Slots whose state changed, with what changed.
    pub transitions: Vec<(SlotIndex, TransitionReport)>,
    /// Slots that could not be queried or processed.
    pub failures: Vec<(SlotIndex, LinecardError)>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl LinecardSet {
    /// Applies an unsolicited status record pushed by the hardware.
    ///
    /// Events arriving outside post-init/pre-fini are dropped. The slot
    /// index is taken from the payload and checked against the chassis.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn process_event(&self, payload: &[u8]) -> LinecardResult<TransitionReport> {
        if !self.is_running() {
            debug!("Line cards not running, dropping status event");
            return Ok(TransitionReport::default());
        }

        let (linecard, info) = match SlotInfo::decode(payload)
            .and_then(|info| Ok((self.linecard_checked(info.slot_index)?, info)))
        {
            Ok(found) => found,
            Err(err) => {
                self.counters.record_event(false);
                warn!(error = %err, "Rejected line card status event");
                return Err(err);
            }
        };

        self.counters.record_event(true);
        self.process(linecard, &info, TransitionMode::Full)
            .inspect_err(|err| {
                error!(slot = info.slot_index, error = %err, "Failed to process status event");
            })
    }

    /// Queries and processes every slot.
    ///
    /// A failing slot is logged and recorded; the remaining slots are
    /// still scanned.
    #[instrument(skip(self))]
    pub fn scan_all(&self) -> ScanReport {
        let mut report = ScanReport::default();
        if !self.is_running() {
            debug!("Line cards not running, skipping scan");
            return report;
        }

        self.counters.record_scan();
        for linecard in self.linecards() {
            let slot = linecard.slot_index();
            report.scanned += 1;

            let info = match status::query_slot_info(self.transport(), slot)
                .and_then(|info| info.ensure_slot(slot))
            {
                Ok(info) => info,
                Err(err) => {
                    self.counters.record_query_failure();
                    error!(slot, error = %err, "Failed to query line card status");
                    report.failures.push((slot, err));
                    continue;
                }
            };

            match self.process(linecard, &info, TransitionMode::Full) {
                Ok(transitions) if transitions.is_empty() => {}
                Ok(transitions) => report.transitions.push((slot, transitions)),
                Err(err) => {
                    error!(slot, error = %err, "Failed to process line card status");
                    report.failures.push((slot, err));
                }
            }
        }

        debug!(
            scanned = report.scanned,
            changed = report.transitions.len(),
            failed = report.failures.len(),
            "Line card scan complete"
        );
        report
    }
}

/// Raw status payload as delivered by the hardware.
pub type StatusEvent = Vec<u8>;

/// Feeds events and scan requests to a running [`ScanDriver`].
#[derive(Debug, Clone)]
pub struct ScanHandle {
    events: mpsc::Sender<StatusEvent>,
    trigger: Arc<Notify>,
}

impl ScanHandle {
    /// Queues a status event, waiting for room in the queue.
    pub async fn send_event(&self, payload: StatusEvent) -> LinecardResult<()> {
        self.events
            .send(payload)
            .await
            .map_err(|_| LinecardError::Shutdown)
    }

    /// Queues a status event without waiting. Returns false if the queue is
    /// full or the driver has stopped.
    pub fn try_send_event(&self, payload: StatusEvent) -> bool {
        self.events.try_send(payload).is_ok()
    }

    /// Requests a scan ahead of the next periodic one.
    pub fn trigger_scan(&self) {
        self.trigger.notify_one();
    }
}

enum Work {
    Scan(ScanReport),
    Event(LinecardResult<TransitionReport>),
}

/// Runs periodic scans and queued status events until cancelled.
pub struct ScanDriver {
    linecards: Arc<LinecardSet>,
    interval: Duration,
    events: mpsc::Receiver<StatusEvent>,
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
}

impl ScanDriver {
    pub fn new(
        linecards: Arc<LinecardSet>,
        interval: Duration,
        queue_depth: usize,
        shutdown: CancellationToken,
    ) -> (Self, ScanHandle) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let trigger = Arc::new(Notify::new());
        let driver = Self {
            linecards,
            interval,
            events: rx,
            trigger: trigger.clone(),
            shutdown,
        };
        (driver, ScanHandle { events: tx, trigger })
    }

    /// Drives scans and events until the shutdown token fires, then waits
    /// for work already handed to the blocking pool.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> LinecardResult<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Line card scan driver started"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<Work> = JoinSet::new();
        let mut events_open = true;
        // At most one event is in flight so a slot never sees records out of order.
        let mut event_task: Option<task::Id> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.spawn_scan(&mut in_flight),
                _ = self.trigger.notified() => self.spawn_scan(&mut in_flight),
                event = self.events.recv(), if events_open && event_task.is_none() => match event {
                    Some(payload) => {
                        let linecards = self.linecards.clone();
                        let handle = in_flight
                            .spawn_blocking(move || Work::Event(linecards.process_event(&payload)));
                        event_task = Some(handle.id());
                    }
                    None => {
                        debug!("Status event channel closed");
                        events_open = false;
                    }
                },
                Some(done) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    let id = match &done {
                        Ok((id, _)) => *id,
                        Err(err) => err.id(),
                    };
                    if event_task == Some(id) {
                        event_task = None;
                    }
                    Self::complete(done.map(|(_, work)| work));
                }
            }
        }

        debug!(pending = in_flight.len(), "Draining line card work");
        while let Some(done) = in_flight.join_next().await {
            Self::complete(done);
        }

        info!("Line card scan driver stopped");
        Ok(())
    }

    fn spawn_scan(&self, in_flight: &mut JoinSet<Work>) {
        let linecards = self.linecards.clone();
        in_flight.spawn_blocking(move || Work::Scan(linecards.scan_all()));
    }

    fn complete(done: Result<Work, task::JoinError>) {
        match done {
            Ok(Work::Scan(report)) => {
                for (slot, transitions) in &report.transitions {
                    info!(slot, %transitions, "Line card state changed");
                }
            }
            Ok(Work::Event(Ok(transitions))) if !transitions.is_empty() => {
                info!(%transitions, "Line card state changed on event");
            }
            Ok(Work::Event(_)) => {}
            Err(err) => error!(error = %err, "Line card worker task failed"),
        }
    }
}
