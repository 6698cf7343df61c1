//! Built-in workflow kinds
//!
//! - `maintenance` - Predictive Maintenance (5 steps)
//! - `route` - Route Optimization (5 steps)
//! - `emergency` - Emergency Response (4 steps)
//! - `data_source` - telemetry and route inputs
//! - `helpers` - prompt rendering and embedding shared by the steps

pub mod data_source;
pub mod emergency;
pub mod helpers;
pub mod maintenance;
pub mod route;

use std::sync::Arc;

use crate::engine::WorkflowDefinition;

pub use data_source::{DataSource, RouteDraft, SyntheticDataSource};
pub use emergency::EmergencyWorkflow;
pub use maintenance::{Assessment, MaintenanceWorkflow, RiskLevel, Urgency};
pub use route::{route_id_for, RoutePlan, RouteWorkflow};

/// One definition per `WorkflowKind`
pub fn builtin_definitions() -> Vec<Arc<dyn WorkflowDefinition>> {
    vec![
        Arc::new(MaintenanceWorkflow::new()),
        Arc::new(RouteWorkflow::new()),
        Arc::new(EmergencyWorkflow::new()),
    ]
}
