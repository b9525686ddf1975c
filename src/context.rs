use std::sync::Arc;

use anyhow::Result;

use crate::config::RuntimeConfig;
use crate::team::{AdkTeam, TeamCollaborator};
use crate::telemetry::TelemetrySink;

/// Everything the session loop needs, built once in `main` and borrowed for the process lifetime.
pub struct AppContext {
    pub cfg: RuntimeConfig,
    pub team: Arc<dyn TeamCollaborator>,
    pub telemetry: TelemetrySink,
}

impl AppContext {
    pub fn new(
        cfg: RuntimeConfig,
        team: Arc<dyn TeamCollaborator>,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            cfg,
            team,
            telemetry,
        }
    }

    pub async fn build(cfg: RuntimeConfig) -> Result<Self> {
        let telemetry = TelemetrySink::new(&cfg);
        let team = AdkTeam::build(&cfg, telemetry.clone()).await?;
        Ok(Self::new(cfg, Arc::new(team), telemetry))
    }
}
