//! Campaign export: allocation nodes in, remote campaigns out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  DesiredNodes (MeasureSet -> PerNodeBudgetAllocationResult)     │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  CampaignExportReconciler                       │
//! │   create pass  →  update pass  →  deactivation pass             │
//! │   TargetingTranslator: MeasureSet + MeasureCatalog → profile    │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │ dyn RemoteCampaignClient
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      ExportReport  (ids per outcome + ExportMetrics)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod line_item;
mod metrics;
mod node;
mod reconciler;
mod report;
pub mod simulate;
mod targeting;

pub use error::{ExportError, ExportResult, NodeFailure, NodeResult};
pub use line_item::{LineItemOutcome, LineItemRequest, LineItemState};
pub use metrics::{ExportMetrics, MetricsSummary};
pub use node::{desired_nodes, AllocationId, DesiredNodes, PerNodeBudgetAllocationResult};
pub use reconciler::{CampaignExportReconciler, ExportRequest};
pub use report::ExportReport;
pub use simulate::{simulate, ExistingCampaign, SimulationOutcome, SimulationPlan};
pub use targeting::{NodeTargeting, TargetingTranslator};
