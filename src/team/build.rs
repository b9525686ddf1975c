use std::sync::Arc;

use adk_rust::prelude::*;
use adk_rust::tool::AgentTool;
use anyhow::Result;
use chrono::{DateTime, Utc};

use super::descriptor::{AgentDescriptor, TeamDescriptor, ToolKind};
use crate::cli::TeamMode;
use crate::memory::{MemoryStore, build_memory_tools};

/// Shared handles the agent builders draw from. Built once at startup.
#[derive(Clone)]
pub struct TeamResources {
    pub model: Arc<dyn Llm>,
    pub search_tool: Option<Arc<dyn Tool>>,
    pub team_memory: Option<Arc<MemoryStore>>,
    pub agent_memory: Option<Arc<MemoryStore>>,
    pub user_id: String,
}

fn is_user_text(content: &Content) -> bool {
    content.role == "user"
        && content
            .parts
            .iter()
            .any(|part| matches!(part, Part::Text { .. }))
}

/// Keeps the current user turn plus the `num_history_runs` turns before it.
///
/// The first `preamble` entries are the agent's instruction, which the agent
/// sends as user-role text; they are never trimmed or counted as turns.
pub fn trim_history(contents: &mut Vec<Content>, preamble: usize, num_history_runs: usize) {
    let preamble = preamble.min(contents.len());
    let user_turns = contents[preamble..]
        .iter()
        .enumerate()
        .filter(|(_, content)| is_user_text(content))
        .map(|(idx, _)| preamble + idx)
        .collect::<Vec<usize>>();

    let keep = num_history_runs + 1;
    if user_turns.len() <= keep {
        return;
    }
    let cut = user_turns[user_turns.len() - keep];
    contents.drain(preamble..cut);
}

/// Sets the sampling temperature and bounds replayed history on every model call.
pub fn with_request_shaping(
    builder: LlmAgentBuilder,
    instruction: &str,
    temperature: Option<f32>,
    num_history_runs: Option<usize>,
) -> LlmAgentBuilder {
    if temperature.is_none() && num_history_runs.is_none() {
        return builder;
    }
    let preamble = usize::from(!instruction.trim().is_empty());
    builder.before_model_callback(Box::new(move |_ctx, mut request| {
        Box::pin(async move {
            if let Some(temperature) = temperature {
                request
                    .config
                    .get_or_insert_with(adk_rust::GenerateContentConfig::default)
                    .temperature = Some(temperature);
            }
            if let Some(runs) = num_history_runs {
                trim_history(&mut request.contents, preamble, runs);
            }
            Ok(BeforeModelResult::Continue(request))
        })
    }))
}

fn attach_memory_tools(
    mut builder: LlmAgentBuilder,
    store: Option<&Arc<MemoryStore>>,
    user_id: &str,
) -> LlmAgentBuilder {
    if let Some(store) = store {
        for tool in build_memory_tools(store.clone(), user_id) {
            builder = builder.tool(tool);
        }
    }
    builder
}

pub fn member_output_key(member: &AgentDescriptor) -> String {
    format!("{}_answer", member.slug())
}

pub fn build_member_agent(
    member: &AgentDescriptor,
    resources: &TeamResources,
    now: DateTime<Utc>,
    num_history_runs: Option<usize>,
    output_key: Option<String>,
) -> Result<Arc<dyn Agent>> {
    let instruction = member.render_instruction(now);
    let mut builder = LlmAgentBuilder::new(member.slug())
        .description(member.role.clone())
        .instruction(instruction.clone())
        .model(resources.model.clone());
    builder = with_request_shaping(builder, &instruction, member.temperature, num_history_runs);

    if member.has_tool(ToolKind::WebSearch)
        && let Some(search) = &resources.search_tool
    {
        builder = builder.tool(search.clone());
    }
    if member.enable_agentic_memory && member.has_tool(ToolKind::AgenticMemory) {
        builder = attach_memory_tools(builder, resources.agent_memory.as_ref(), &resources.user_id);
    }
    if let Some(key) = output_key {
        builder = builder.output_key(key);
    }

    tracing::debug!(
        agent = %member.name,
        slug = %member.slug(),
        temperature = ?member.temperature,
        debug_mode = member.debug_mode,
        "built member agent"
    );
    Ok(Arc::new(builder.build()?))
}

fn history_window(team: &TeamDescriptor) -> Option<usize> {
    team.enable_team_history.then_some(team.num_history_runs)
}

/// Returns the root agent for the runner.
///
/// The runner resumes whichever agent in the root's tree authored the last
/// event, so members are never exposed as sub-agents: every turn has to start
/// at the root for the whole team to be addressed. The leader is always named
/// `team.slug()`.
pub fn build_team_agent(
    team: &TeamDescriptor,
    resources: &TeamResources,
    now: DateTime<Utc>,
) -> Result<Arc<dyn Agent>> {
    match team.mode {
        TeamMode::Coordinate => build_coordinating_team(team, resources, now),
        TeamMode::Collaborate => build_collaborating_team(team, resources, now),
    }
}

fn leader_builder(
    team: &TeamDescriptor,
    resources: &TeamResources,
    instruction: String,
) -> LlmAgentBuilder {
    let builder = LlmAgentBuilder::new(team.slug())
        .description(team.description.clone())
        .instruction(instruction.clone())
        .model(resources.model.clone());
    let builder = with_request_shaping(builder, &instruction, team.temperature, history_window(team));
    if team.enable_agentic_memory {
        attach_memory_tools(builder, resources.team_memory.as_ref(), &resources.user_id)
    } else {
        builder
    }
}

/// The leader consults members as tools and writes the final answer itself.
fn build_coordinating_team(
    team: &TeamDescriptor,
    resources: &TeamResources,
    now: DateTime<Utc>,
) -> Result<Arc<dyn Agent>> {
    let mut builder = leader_builder(team, resources, team.render_instruction(now));
    for member in &team.members {
        // Members run in their own tool session, so history bounding happens on the leader only.
        let agent = build_member_agent(member, resources, now, None, None)?;
        builder = builder.tool(Arc::new(AgentTool::new(agent)));
    }
    Ok(Arc::new(builder.build()?))
}

/// Members answer in parallel into `{slug}_answer` state, then the leader synthesises.
fn build_collaborating_team(
    team: &TeamDescriptor,
    resources: &TeamResources,
    now: DateTime<Utc>,
) -> Result<Arc<dyn Agent>> {
    let mut members = Vec::with_capacity(team.members.len());
    let mut answer_slots = Vec::with_capacity(team.members.len());
    for member in &team.members {
        let key = member_output_key(member);
        answer_slots.push(format!("{}: {{{}?}}", member.name, key));
        members.push(build_member_agent(
            member,
            resources,
            now,
            history_window(team),
            Some(key),
        )?);
    }

    let parallel = Arc::new(ParallelAgent::new(
        format!("{}_members", team.slug()),
        members,
    ));

    let instruction = format!(
        "{}\n\n<member_answers>\n{}\n</member_answers>",
        team.render_instruction(now),
        answer_slots.join("\n")
    );
    let leader = Arc::new(leader_builder(team, resources, instruction).build()?);

    let pipeline: Arc<dyn Agent> = Arc::new(SequentialAgent::new(
        format!("{}_steps", team.slug()),
        vec![parallel as Arc<dyn Agent>, leader as Arc<dyn Agent>],
    ));

    // No sub-agents are registered on the root, so no member or the leader can be resumed directly.
    let root = CustomAgentBuilder::new(format!("{}_pipeline", team.slug()))
        .description(team.description.clone())
        .handler(move |ctx| {
            let pipeline = pipeline.clone();
            async move { pipeline.run(ctx).await }
        })
        .build()?;
    Ok(Arc::new(root))
}
