//! linecardd - Line card slot lifecycle manager
//!
//! Tracks the hot-swappable line card slots of a modular chassis. Each slot
//! moves through `provisioned → ready → active` and back as the hardware
//! reports changes, and every registered subscriber is told about each
//! step. Provisioning is transactional: if any subscriber refuses a card,
//! the subscribers that already accepted it are unwound in reverse order.
//!
//! # Architecture
//!
//! ```text
//! ScanDriver (tokio) ─┬─ periodic scan ──► LinecardSet::scan_all
//!                     └─ status event  ──► LinecardSet::process_event
//!                                                │  slot lock
//!                                                ▼
//!                           TransitionEngine ──► SubscriberRegistry
//!                                 │
//!                                 ▼
//!                          LinecardTransport (hardware / in-memory)
//! ```

pub mod config;
pub mod error;
pub mod linecard;
pub mod linecards;
pub mod logging;
pub mod registry;
pub mod scan;
pub mod stats;
pub mod status;
pub mod transition;
pub mod transport;

pub use config::{LinecarddConfig, DEFAULT_CONFIG_PATH};
pub use error::{LinecardError, LinecardResult};
pub use linecard::{Linecard, LinecardState, SlotIndex};
pub use linecards::LinecardSet;
pub use logging::init_logging;
pub use registry::{LinecardEventOps, SubscriberContext, SubscriberRegistry};
pub use scan::{ScanDriver, ScanHandle, ScanReport, StatusEvent};
pub use stats::LinecardStats;
pub use status::{CardType, FirmwareVersion, ReadyState, SlotInfo};
pub use transition::{TransitionMode, TransitionReport};
pub use transport::{LinecardTransport, MemoryTransport};
