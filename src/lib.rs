//! # budgetsync
//!
//! Projects budget-allocation decisions onto advertising delivery networks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Optimizer output (allocation nodes + MeasureSets) │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [export]
//! ┌─────────────────────────────────────────────────────────┐
//! │   CampaignExportReconciler  → ExportReport + metrics     │
//! └─────────────────────────────────────────────────────────┘
//!          │ targeting lookups             │ remote calls
//!          ▼ [measure]                     ▼ [remote]
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │ MeasureCatalog           │   │ RemoteCampaignClient     │
//! │  ← cached MeasureSources │   │  (AppNexus, DFP, memory) │
//! └──────────────────────────┘   └──────────────────────────┘
//!          │
//!          ▼ [cache]
//! ┌─────────────────────────────────────────────────────────┐
//! │         CacheStore (SQLite / in-memory snapshots)        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod export;
pub mod logging;
pub mod measure;
pub mod remote;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore, SystemClock};
    pub use crate::config::Settings;
    pub use crate::export::{
        CampaignExportReconciler, ExportReport, ExportRequest, PerNodeBudgetAllocationResult,
    };
    pub use crate::measure::{
        DeliveryNetwork, Measure, MeasureCatalog, MeasureId, MeasureSet, MeasureSource,
        SourceContext, SourceEnv, StandardSourceProvider,
    };
    pub use crate::remote::{RemoteCampaignClient, RemoteClientError};
}
