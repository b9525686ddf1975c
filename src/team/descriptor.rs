use chrono::{DateTime, Utc};

use crate::cli::TeamMode;
use crate::config::{
    ABOUT_TEAM, AGENT_MEMORY_TABLE, NUM_HISTORY_RUNS, SESSION_TABLE, TEAM_MEMORY_TABLE,
};

pub const TEAM_NAME: &str = "Agent Team for Canadian Small Business";
pub const TEAM_DESCRIPTION: &str = "A team of agents that helps support Canadian small businesses";
pub const MARKDOWN_INSTRUCTION: &str = "Use markdown to format your answers.";

const ASK_QUESTIONS: &str = "Ask lots of questions to understand the user's business and their \
                             needs to ensure you can give them the best advice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    WebSearch,
    AgenticMemory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    pub name: String,
    pub role: String,
    pub additional_context: String,
    pub model_id: String,
    /// `None` leaves sampling to the provider default.
    pub temperature: Option<f32>,
    pub tools: Vec<ToolKind>,
    pub instructions: Vec<String>,
    pub debug_mode: bool,
    pub markdown: bool,
    pub show_tool_calls: bool,
    pub add_datetime_to_instructions: bool,
    pub enable_agentic_memory: bool,
    pub memory_table: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamDescriptor {
    pub name: String,
    pub description: String,
    pub mode: TeamMode,
    pub members: Vec<AgentDescriptor>,
    pub model_id: String,
    pub temperature: Option<f32>,
    pub additional_context: String,
    pub instructions: Vec<String>,
    pub debug_mode: bool,
    pub markdown: bool,
    pub show_tool_calls: bool,
    pub show_members_responses: bool,
    pub add_datetime_to_instructions: bool,
    pub enable_team_history: bool,
    pub num_history_runs: usize,
    pub enable_agentic_memory: bool,
    pub storage_table: String,
    pub memory_table: String,
}

/// ADK addresses agents by identifier; "Finance Agent" becomes `finance_agent`.
pub fn agent_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() { "agent".to_string() } else { slug }
}

fn member(
    name: &str,
    role: &str,
    expertise: &str,
    model_id: &str,
    temperature: Option<f32>,
    debug_mode: bool,
) -> AgentDescriptor {
    AgentDescriptor {
        name: name.to_string(),
        role: role.to_string(),
        additional_context: ABOUT_TEAM.to_string(),
        model_id: model_id.to_string(),
        temperature,
        tools: vec![ToolKind::WebSearch, ToolKind::AgenticMemory],
        instructions: vec![format!("{expertise} {ASK_QUESTIONS}")],
        debug_mode,
        markdown: true,
        show_tool_calls: true,
        add_datetime_to_instructions: true,
        enable_agentic_memory: true,
        memory_table: AGENT_MEMORY_TABLE.to_string(),
    }
}

pub fn default_members(model_id: &str, debug_mode: bool) -> Vec<AgentDescriptor> {
    vec![
        member(
            "Finance Agent",
            "You are a finance agent that helps the user with their business finances.",
            "You are an expert in finance and business finances. You are able to answer questions \
             about business finances and help the user with their business finances.",
            model_id,
            Some(0.0),
            debug_mode,
        ),
        member(
            "Data Science Agent",
            "You are a data science agent that helps the user with their business data.",
            "You are an expert in data science and business data. You are able to answer questions \
             about business data and help the user with their business data.",
            model_id,
            Some(0.0),
            debug_mode,
        ),
        member(
            "Legal Agent",
            "You are a legal agent that helps the user with their business legal needs.",
            "You are an expert in law and business law. You are able to answer questions about \
             business law and help the user with their business law.",
            model_id,
            Some(0.0),
            debug_mode,
        ),
        member(
            "Marketing Agent",
            "You are a marketing agent that helps the user with their business marketing needs.",
            "You are an expert in marketing and business marketing. You are able to answer \
             questions about business marketing and help the user with their business marketing.",
            model_id,
            None,
            debug_mode,
        ),
    ]
}

pub fn default_team(model_id: &str, mode: TeamMode, debug_mode: bool) -> TeamDescriptor {
    TeamDescriptor {
        name: TEAM_NAME.to_string(),
        description: TEAM_DESCRIPTION.to_string(),
        mode,
        members: default_members(model_id, debug_mode),
        model_id: model_id.to_string(),
        temperature: Some(0.0),
        additional_context: ABOUT_TEAM.to_string(),
        instructions: vec![
            "You are a team of agents that helps support Canadian small businesses.".to_string(),
            "You are able to answer questions about business finances, data, law, and marketing."
                .to_string(),
        ],
        debug_mode,
        markdown: true,
        show_tool_calls: true,
        show_members_responses: true,
        add_datetime_to_instructions: true,
        enable_team_history: true,
        num_history_runs: NUM_HISTORY_RUNS,
        enable_agentic_memory: true,
        storage_table: SESSION_TABLE.to_string(),
        memory_table: TEAM_MEMORY_TABLE.to_string(),
    }
}

fn push_common_sections(
    sections: &mut Vec<String>,
    instructions: &[String],
    additional_context: &str,
    markdown: bool,
    datetime: Option<DateTime<Utc>>,
    agentic_memory: bool,
) {
    if !instructions.is_empty() {
        sections.push(format!(
            "<instructions>\n{}\n</instructions>",
            instructions
                .iter()
                .map(|line| format!("- {line}"))
                .collect::<Vec<String>>()
                .join("\n")
        ));
    }
    if agentic_memory {
        sections.push(
            "You can keep memories about the user. Use memory_search before answering, \
             memory_add for new durable facts, and memory_delete for facts that are wrong."
                .to_string(),
        );
    }
    if markdown {
        sections.push(MARKDOWN_INSTRUCTION.to_string());
    }
    if let Some(now) = datetime {
        sections.push(format!("The current time is {}", now.to_rfc3339()));
    }
    let context = additional_context.trim();
    if !context.is_empty() {
        sections.push(format!("<additional_context>\n{context}\n</additional_context>"));
    }
}

impl AgentDescriptor {
    pub fn slug(&self) -> String {
        agent_slug(&self.name)
    }

    pub fn has_tool(&self, kind: ToolKind) -> bool {
        self.tools.contains(&kind)
    }

    /// Renders the system instruction; `now` is only used when the datetime flag is set.
    pub fn render_instruction(&self, now: DateTime<Utc>) -> String {
        let mut sections = vec![format!("Your name is {}.", self.name), self.role.clone()];
        push_common_sections(
            &mut sections,
            &self.instructions,
            &self.additional_context,
            self.markdown,
            self.add_datetime_to_instructions.then_some(now),
            self.enable_agentic_memory && self.has_tool(ToolKind::AgenticMemory),
        );
        sections.join("\n\n")
    }
}

impl TeamDescriptor {
    pub fn slug(&self) -> String {
        agent_slug(&self.name)
    }

    pub fn render_instruction(&self, now: DateTime<Utc>) -> String {
        let roster = self
            .members
            .iter()
            .map(|m| format!("- {} ({}): {}", m.name, m.slug(), m.role))
            .collect::<Vec<String>>()
            .join("\n");

        let mode_directive = match self.mode {
            TeamMode::Coordinate => {
                "You lead this team. Each member is available to you as a tool named after its \
                 identifier. Send the request to every member whose expertise applies, then \
                 combine their answers into one response for the user."
            }
            TeamMode::Collaborate => {
                "Every member has already answered the request. Synthesize their answers into one \
                 coherent response for the user, resolving any disagreement."
            }
        };

        let mut sections = vec![
            format!("You are the leader of the {}. {}", self.name, self.description),
            mode_directive.to_string(),
            format!("<team_members>\n{roster}\n</team_members>"),
        ];
        push_common_sections(
            &mut sections,
            &self.instructions,
            &self.additional_context,
            self.markdown,
            self.add_datetime_to_instructions.then_some(now),
            self.enable_agentic_memory,
        );
        sections.join("\n\n")
    }
}
