//! Background fleet monitor
//!
//! Periodically scans every stored vehicle and raises a `vehicle_alert` event
//! when its telemetry crosses the maintenance thresholds. A vehicle is
//! alerted once when it enters the alert state and again only after it has
//! recovered in between. Runs independently of any workflow run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::{EventLog, LogisticsEvent, NewEvent, Severity, StoreError};
use crate::workflow::MonitorConfig;
use crate::workflows::Assessment;

pub const ALERT_EVENT_TYPE: &str = "vehicle_alert";

pub struct FleetMonitor {
    events: Arc<dyn EventLog>,
    config: MonitorConfig,
    alerting: Mutex<HashSet<String>>,
}

impl FleetMonitor {
    pub fn new(events: Arc<dyn EventLog>, config: MonitorConfig) -> Self {
        Self {
            events,
            config,
            alerting: Mutex::new(HashSet::new()),
        }
    }

    /// One scan; returns the alerts raised by it
    pub async fn tick(&self) -> Result<Vec<LogisticsEvent>, StoreError> {
        let vehicles = self.events.list_vehicles().await?;
        let mut alerting = self.alerting.lock().await;
        let mut raised = Vec::new();

        for vehicle in vehicles {
            let assessment = Assessment::from_metrics(&vehicle.metrics);
            if assessment.severity < Severity::High {
                alerting.remove(&vehicle.vehicle_id);
                continue;
            }
            if alerting.contains(&vehicle.vehicle_id) {
                continue;
            }

            let mut event = NewEvent::new(
                ALERT_EVENT_TYPE,
                Severity::High,
                format!(
                    "Vehicle {} needs attention: brake wear {:.1}%, engine temperature {:.1}C",
                    vehicle.vehicle_id, vehicle.metrics.brake_wear, vehicle.metrics.engine_temp
                ),
            );
            event.vehicle_id = Some(vehicle.vehicle_id.clone());
            event.metadata = json!({
                "metrics": vehicle.metrics,
                "riskLevel": assessment.risk_level,
                "urgency": assessment.urgency,
            });

            let stored = self.events.insert_event(event).await?;
            warn!(vehicle_id = %vehicle.vehicle_id, "{}", stored.description);
            alerting.insert(vehicle.vehicle_id);
            raised.push(stored);
        }

        debug!(alerts = raised.len(), "Fleet scan complete");
        Ok(raised)
    }

    /// Scan on the configured interval until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_millis(self.config.interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        info!("Fleet monitor started (every {}ms)", period.as_millis());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!("Fleet scan failed: {}", e);
                    }
                }
            }
        }

        info!("Fleet monitor stopped");
    }
}
