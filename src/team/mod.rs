//! The advisor team: descriptors, ADK agent construction, and the runner seam
//! the session loop talks to.

pub mod build;
pub mod descriptor;
pub mod response;

use std::sync::Arc;

use adk_rust::futures::StreamExt;
use adk_rust::prelude::*;
use adk_rust::{SessionId, UserId};
use adk_session::SessionService;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::config::RuntimeConfig;
use crate::memory::MemoryStore;
use crate::provider::resolve_model;
use crate::search::{build_search_client, build_web_search_tool};
use crate::session::{build_session_service, ensure_session_exists};
use crate::telemetry::TelemetrySink;

pub use build::TeamResources;
pub use descriptor::{AgentDescriptor, TeamDescriptor, ToolKind, default_team};
pub use response::{MemberResponse, TeamResponse, ToolCallRecord};

/// The one call the session loop makes per input line.
#[async_trait]
pub trait TeamCollaborator: Send + Sync {
    async fn run(&self, input: &str) -> Result<TeamResponse>;

    fn show_member_responses(&self) -> bool {
        false
    }
}

pub struct AdkTeam {
    runner: Runner,
    descriptor: TeamDescriptor,
    user_id: UserId,
    session_id: SessionId,
    telemetry: TelemetrySink,
}

impl AdkTeam {
    /// Resolves the model, opens storage and memory, and assembles the team.
    pub async fn build(cfg: &RuntimeConfig, telemetry: TelemetrySink) -> Result<Self> {
        let (model, provider, model_name) = resolve_model(cfg)?;
        tracing::info!(provider = ?provider, model = %model_name, "Using model");

        let descriptor = default_team(&cfg.model, cfg.team_mode, cfg.debug_mode);

        tracing::info!("Setting up memory...🧠");
        let (team_memory, agent_memory) = open_memory_stores(cfg, &descriptor).await?;
        tracing::info!("Memory setup complete ✅");

        let search_tool = if descriptor
            .members
            .iter()
            .any(|member| member.has_tool(ToolKind::WebSearch))
        {
            Some(build_web_search_tool(build_search_client()?))
        } else {
            None
        };

        let resources = TeamResources {
            model,
            search_tool,
            team_memory,
            agent_memory,
            user_id: cfg.user_id.clone(),
        };
        let session_service = build_session_service(cfg, descriptor.enable_team_history).await?;

        Self::from_parts(descriptor, resources, session_service, cfg, telemetry).await
    }

    pub async fn from_parts(
        descriptor: TeamDescriptor,
        resources: TeamResources,
        session_service: Arc<dyn SessionService>,
        cfg: &RuntimeConfig,
        telemetry: TelemetrySink,
    ) -> Result<Self> {
        tracing::info!("Setting up agents...🤖");
        let now = Utc::now();
        let root = build::build_team_agent(&descriptor, &resources, now)?;
        tracing::info!(members = descriptor.members.len(), "Agents setup complete ✅");

        tracing::info!("Setting up team...👥");
        ensure_session_exists(&session_service, cfg).await?;
        let runner = Runner::new(RunnerConfig {
            app_name: cfg.app_name.clone(),
            agent: root,
            session_service,
            artifact_service: None,
            memory_service: None,
            plugin_manager: None,
            run_config: None,
            compaction_config: None,
            context_cache_config: None,
            cache_capable: None,
            request_context: None,
            cancellation_token: None,
        })
        .context("failed to build team runner")?;
        tracing::info!(
            team = %descriptor.name,
            mode = crate::cli::team_mode_label(descriptor.mode),
            history_runs = descriptor.num_history_runs,
            storage = %descriptor.storage_table,
            "Team setup complete ✅"
        );

        let user_id = UserId::try_from(cfg.user_id.as_str())
            .with_context(|| format!("invalid user id '{}'", cfg.user_id))?;
        let session_id = SessionId::try_from(cfg.session_id.as_str())
            .with_context(|| format!("invalid session id '{}'", cfg.session_id))?;

        Ok(Self {
            runner,
            descriptor,
            user_id,
            session_id,
            telemetry,
        })
    }

    pub fn descriptor(&self) -> &TeamDescriptor {
        &self.descriptor
    }
}

async fn open_memory_stores(
    cfg: &RuntimeConfig,
    descriptor: &TeamDescriptor,
) -> Result<(Option<Arc<MemoryStore>>, Option<Arc<MemoryStore>>)> {
    let db_url = cfg.db_url();
    crate::session::ensure_parent_dir_for_sqlite_url(&db_url)?;

    let team_memory = if descriptor.enable_agentic_memory {
        let store = MemoryStore::open(&db_url, &descriptor.memory_table)
            .await
            .context("failed to open team memory store")?;
        Some(Arc::new(store))
    } else {
        None
    };

    // Members share one table, as they share one memory in the team setup.
    let agent_table = descriptor
        .members
        .iter()
        .find(|member| member.enable_agentic_memory)
        .map(|member| member.memory_table.clone());
    let agent_memory = match agent_table {
        Some(table) => Some(Arc::new(
            MemoryStore::open(&db_url, &table)
                .await
                .context("failed to open agent memory store")?,
        )),
        None => None,
    };

    Ok((team_memory, agent_memory))
}

#[async_trait]
impl TeamCollaborator for AdkTeam {
    async fn run(&self, input: &str) -> Result<TeamResponse> {
        let mut stream = self
            .runner
            .run(
                self.user_id.clone(),
                self.session_id.clone(),
                Content::new("user").with_text(input),
            )
            .await
            .context("failed to start team run")?;

        let leader = self.descriptor.slug();
        let mut collector = response::ResponseCollector::for_members(
            self.descriptor.members.iter().map(AgentDescriptor::slug).collect(),
        );

        while let Some(event_result) = stream.next().await {
            let event = event_result.context("team run failed")?;
            let text = response::event_text(&event);

            tracing::debug!(
                author = %event.author,
                is_final = event.is_final_response(),
                partial = event.llm_response.partial,
                text_len = text.len(),
                "received team event"
            );

            if event.author == "user" {
                continue;
            }

            response::observe_tool_events(
                &event,
                &mut collector,
                &self.telemetry,
                self.descriptor.show_tool_calls,
            );
            collector.ingest_text(
                &event.author,
                &text,
                event.llm_response.partial,
                event.is_final_response(),
            );
        }

        let response = collector.finish(&leader)?;
        self.telemetry.emit(
            "team.responded",
            json!({
                "members_responded": response.member_responses.len(),
                "tool_calls": response.tool_calls.len(),
            }),
        );
        Ok(response)
    }

    fn show_member_responses(&self) -> bool {
        self.descriptor.show_members_responses
    }
}
