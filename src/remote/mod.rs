//! Delivery network boundary.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  CampaignExportReconciler        RemoteInventorySource          │
//! │  (create / replace / delete)     (live targeting enumeration)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   dyn RemoteCampaignClient                      │
//! │   network bindings (external)  │  InMemoryCampaignClient        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod client;
mod error;
pub mod memory;
mod types;

pub use client::{RemoteCampaignClient, RemoteCampaignClientExt};
pub use error::{RemoteClientError, RemoteResult};
pub use memory::{InMemoryCampaignClient, RemoteCall, RemoteOperation};
pub use types::*;
