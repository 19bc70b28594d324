//! Runtime item registry core.
//!
//! `registry-core` holds the pure data machinery of the item registry:
//! the sorted record state with derived replication indices, payload
//! schemas, hierarchical checksums, binary snapshots, redirects, item
//! handles and their network codec, and defaults propagation. Nothing
//! here touches the filesystem beyond explicit snapshot calls or spawns
//! threads; the synchronized runtime surface lives in
//! `registry-service`.
pub mod error;
pub mod id;
pub mod item;
pub mod net;
pub mod payload;
pub mod propagate;
pub mod record;
pub mod redirects;
mod snapshot;
pub mod state;
pub mod tags;
pub use error::{LoadError, SaveError};
pub use id::{ArchetypeName, ItemId, ItemName};
pub use item::{Item, ItemStack};
pub use net::{BitReader, BitWriter, NetSerializeContext};
pub use payload::{
    ConsumablePayload, CosmeticPayload, CountersPayload, Payload, PayloadFields, PayloadKind,
    WeaponPayload,
};
pub use propagate::{
    DefaultsPropagator, GatherFilter, PropagationContext, PropagationObserver,
    PropagationObserverHandle, PropagationTarget,
};
pub use record::{INVALID_REP_INDEX, RecordData, RegistryRecord, SharedData};
pub use redirects::{Redirector, Redirects};
pub use state::{ArchetypeGroup, RegistryState};
pub use tags::ItemTags;
