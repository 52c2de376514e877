//! Lifecycle Module
//!
//! Deployment versions: precache manifest, install/activate state machine
//! and client control.

mod clients;
mod controller;
mod precache;

pub use clients::{ClientInfo, ClientRegistry};
pub use controller::{
    ActivationReport, InstallReport, LifecycleController, LifecycleOptions, LifecycleState,
};
pub use precache::{
    is_precache_store, precache_store_name, PrecacheEntry, PrecacheManifest, ResolvedEntry,
    PRECACHE_FORMAT, REVISION_PARAM,
};
