//! Device records, identity and the registry that owns them.

pub mod identity;
pub mod record;
pub mod registry;

pub use identity::{is_placeholder_name, DeviceId};
pub use record::{
    derive_state, CommandOutcome, DeviceRecord, DeviceSummary, MediaKind, PlayerData, PlayerState,
};
pub use registry::{DeviceRegistry, ReconcileOutcome, ReconcileScope, ZoneIndex};
