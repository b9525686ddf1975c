use std::io::Cursor;
use std::sync::{Arc, Mutex};

use adk_rust::LlmResponse;
use adk_rust::model::MockLlm;
use adk_rust::prelude::*;
use adk_session::{InMemorySessionService, SessionService};
use anyhow::Result;
use async_trait::async_trait;

use crate::cli::{Provider, TeamMode};
use crate::config::*;
use crate::context::AppContext;
use crate::memory::MemoryStore;
use crate::session_loop::*;
use crate::team::descriptor::agent_slug;
use crate::team::*;
use crate::telemetry::TelemetrySink;

fn base_cfg() -> RuntimeConfig {
    RuntimeConfig {
        config_path: ".smallbiz/config.toml".to_string(),
        provider: Provider::Auto,
        model: MODEL_ID.to_string(),
        db_file: "tmp/test-agent.db".to_string(),
        app_name: "test-app".to_string(),
        user_id: "test-user".to_string(),
        session_id: "test-session".to_string(),
        team_mode: TeamMode::Coordinate,
        debug_mode: true,
        telemetry_enabled: false,
        telemetry_path: String::new(),
        show_sensitive_config: false,
    }
}

struct RecordingTeam {
    calls: Mutex<Vec<String>>,
    reply: String,
    fail: bool,
    show_members: bool,
}

impl RecordingTeam {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: reply.to_string(),
            fail: false,
            show_members: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: String::new(),
            fail: true,
            show_members: false,
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TeamCollaborator for RecordingTeam {
    async fn run(&self, input: &str) -> Result<TeamResponse> {
        self.calls.lock().unwrap().push(input.to_string());
        if self.fail {
            return Err(anyhow::anyhow!("provider returned 503"));
        }
        let mut response = TeamResponse::text(format!("{} ({input})", self.reply));
        response.member_responses.push(MemberResponse {
            member: "finance_agent".to_string(),
            content: "Track cash weekly.".to_string(),
        });
        Ok(response)
    }

    fn show_member_responses(&self) -> bool {
        self.show_members
    }
}

fn ctx_with(team: Arc<dyn TeamCollaborator>) -> AppContext {
    AppContext::new(base_cfg(), team, TelemetrySink::disabled())
}

async fn drive(team: Arc<RecordingTeam>, input: &str) -> (Result<LoopSummary>, String) {
    let ctx = ctx_with(team);
    let mut out = Vec::new();
    let result = run_session_loop(&ctx, Cursor::new(input.to_string()), &mut out).await;
    (result, String::from_utf8(out).expect("output is utf-8"))
}

fn response_lines(output: &str) -> usize {
    output.matches(RESPONSE_LABEL).count()
}

#[tokio::test]
async fn exit_in_any_casing_never_reaches_team() {
    for sentinel in ["exit", "EXIT", " Exit ", "eXiT\t"] {
        let team = RecordingTeam::replying("unused");
        let (result, output) = drive(team.clone(), &format!("{sentinel}\n")).await;
        let summary = result.expect("loop ends cleanly");
        assert_eq!(summary.exit_reason, ExitReason::Sentinel);
        assert_eq!(summary.turns, 0);
        assert!(team.calls().is_empty(), "{sentinel:?} must not dispatch");
        assert_eq!(response_lines(&output), 0);
    }
}

#[tokio::test]
async fn non_exit_input_is_dispatched_once_verbatim() {
    let team = RecordingTeam::replying("ok");
    let (result, output) = drive(team.clone(), "  How do I register for GST? \nexit\n").await;
    result.expect("loop ends cleanly");
    assert_eq!(team.calls(), ["  How do I register for GST? "]);
    assert_eq!(response_lines(&output), 1);
    assert!(output.contains("🤖 Agno: ok (  How do I register for GST? )\n"));
}

#[tokio::test]
async fn one_call_per_line_across_many_turns() {
    let team = RecordingTeam::replying("r");
    let (result, output) = drive(team.clone(), "a\nb\n\nc\nexit\nnever read\n").await;
    let summary = result.expect("loop ends cleanly");
    assert_eq!(team.calls(), ["a", "b", "", "c"]);
    assert_eq!(summary.turns, 4);
    assert_eq!(response_lines(&output), 4);
}

#[tokio::test]
async fn hello_then_exit_prints_one_response_and_stops_prompting() {
    let team = RecordingTeam::replying("Hi!");
    let (result, output) = drive(team.clone(), "hello\nexit\n").await;
    result.expect("loop ends cleanly");

    assert!(output.starts_with(READY_BANNER));
    assert_eq!(response_lines(&output), 1);
    // One prompt per line read; none after the sentinel.
    assert_eq!(output.matches(INPUT_PROMPT).count(), 2);
    assert_eq!(team.calls(), ["hello"]);
}

#[tokio::test]
async fn first_input_exit_prints_nothing_from_team() {
    let team = RecordingTeam::replying("unused");
    let (result, output) = drive(team.clone(), "EXIT\n").await;
    assert_eq!(result.unwrap().turns, 0);
    assert_eq!(response_lines(&output), 0);
    assert_eq!(output.matches(INPUT_PROMPT).count(), 1);
}

#[tokio::test]
async fn end_of_input_terminates_without_dispatch() {
    let team = RecordingTeam::replying("unused");
    let (result, _) = drive(team.clone(), "").await;
    assert_eq!(result.unwrap().exit_reason, ExitReason::EndOfInput);
    assert!(team.calls().is_empty());
}

#[tokio::test]
async fn team_failure_propagates_without_retry() {
    let team = RecordingTeam::failing();
    let (result, output) = drive(team.clone(), "hello\nagain\nexit\n").await;
    let err = result.expect_err("failure must propagate");
    assert!(err.to_string().contains("503"));
    assert_eq!(team.calls(), ["hello"]);
    assert_eq!(response_lines(&output), 0);
}

#[tokio::test]
async fn member_responses_print_before_team_line_when_enabled() {
    let team = Arc::new(RecordingTeam {
        calls: Mutex::new(Vec::new()),
        reply: "Combined".to_string(),
        fail: false,
        show_members: true,
    });
    let (result, output) = drive(team, "cash?\nexit\n").await;
    result.expect("loop ends cleanly");
    let member_at = output.find("finance_agent: Track cash weekly.").expect("member shown");
    let team_at = output.find(RESPONSE_LABEL).expect("team line shown");
    assert!(member_at < team_at);
}

fn mock_model(text: &str) -> Arc<dyn Llm> {
    Arc::new(
        MockLlm::new("mock").with_response(LlmResponse::new(Content::new("model").with_text(text))),
    )
}

fn bare_resources(model: Arc<dyn Llm>) -> TeamResources {
    TeamResources {
        model,
        search_tool: None,
        team_memory: None,
        agent_memory: None,
        user_id: "test-user".to_string(),
    }
}

#[tokio::test]
async fn adk_team_returns_leader_text_through_runner() {
    let cfg = base_cfg();
    let session_service: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    let descriptor = default_team(&cfg.model, TeamMode::Coordinate, false);

    let team = AdkTeam::from_parts(
        descriptor,
        bare_resources(mock_model("Let's start with your revenue model.")),
        session_service,
        &cfg,
        TelemetrySink::disabled(),
    )
    .await
    .expect("team should build");

    let response = team.run("I want to start a consultancy").await.expect("run succeeds");
    assert_eq!(response.content, "Let's start with your revenue model.");
    assert!(response.tool_calls.is_empty());
    assert!(team.show_member_responses());
}

#[tokio::test]
async fn adk_team_builds_collaborate_pipeline_with_memory_tools() {
    let dir = tempfile::tempdir().expect("temp directory should create");
    let mut cfg = base_cfg();
    cfg.db_file = dir.path().join("agent.db").to_string_lossy().to_string();
    let db_url = cfg.db_url();

    let mut resources = bare_resources(mock_model("unused"));
    resources.team_memory = Some(Arc::new(
        MemoryStore::open(&db_url, TEAM_MEMORY_TABLE).await.unwrap(),
    ));
    resources.agent_memory = Some(Arc::new(
        MemoryStore::open(&db_url, AGENT_MEMORY_TABLE).await.unwrap(),
    ));

    let session_service: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    let team = AdkTeam::from_parts(
        default_team(&cfg.model, TeamMode::Collaborate, true),
        resources,
        session_service,
        &cfg,
        TelemetrySink::disabled(),
    )
    .await
    .expect("collaborating team should build");

    assert_eq!(team.descriptor().mode, TeamMode::Collaborate);
    assert_eq!(team.descriptor().members.len(), 4);
}

/// What the scripted model saw on one call.
#[derive(Debug, Clone)]
struct SeenRequest {
    speaker: String,
    temperature: Option<f32>,
    texts: Vec<String>,
}

impl SeenRequest {
    fn user_turns(&self) -> usize {
        // The first entry is the speaker's instruction.
        self.texts.len().saturating_sub(1)
    }
}

/// Answers as whichever agent is speaking, recognised by its instruction.
/// A leader holding member tools consults `consult` before summarising.
struct ScriptedTeamLlm {
    consult: Vec<&'static str>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTeamLlm {
    fn consulting(consult: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            consult: consult.to_vec(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen_by(&self, speaker: &str) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.speaker == speaker)
            .cloned()
            .collect()
    }
}

fn content_text(content: &Content) -> String {
    content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn speaker_of(instruction: &str) -> String {
    if instruction.starts_with("You are the leader of") {
        return "leader".to_string();
    }
    instruction
        .strip_prefix("Your name is ")
        .and_then(|rest| rest.split('.').next())
        .map(agent_slug)
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl Llm for ScriptedTeamLlm {
    fn name(&self) -> &str {
        "scripted-team"
    }

    async fn generate_content(
        &self,
        req: LlmRequest,
        _stream: bool,
    ) -> adk_rust::Result<adk_rust::LlmResponseStream> {
        let speaker = req.contents.first().map(content_text).map(|t| speaker_of(&t));
        let speaker = speaker.unwrap_or_else(|| "unknown".to_string());
        let texts = req
            .contents
            .iter()
            .filter(|c| c.role == "user")
            .map(content_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<String>>();
        self.seen.lock().unwrap().push(SeenRequest {
            speaker: speaker.clone(),
            temperature: req.config.as_ref().and_then(|config| config.temperature),
            texts: texts.clone(),
        });

        let answered = req.contents.last().is_some_and(|content| {
            content
                .parts
                .iter()
                .any(|part| matches!(part, Part::FunctionResponse { .. }))
        });
        let holds_members = self.consult.iter().all(|name| req.tools.contains_key(*name));

        let content = if speaker == "leader" && holds_members && !self.consult.is_empty() && !answered {
            let question = texts.last().cloned().unwrap_or_default();
            Content {
                role: "model".to_string(),
                parts: self
                    .consult
                    .iter()
                    .map(|name| Part::FunctionCall {
                        name: name.to_string(),
                        args: serde_json::json!({ "request": question }),
                        id: None,
                        thought_signature: None,
                    })
                    .collect(),
            }
        } else if speaker == "leader" {
            Content::new("model").with_text("leader summary")
        } else {
            Content::new("model").with_text(format!("{speaker} answer"))
        };

        let response: adk_rust::Result<LlmResponse> = Ok(LlmResponse::new(content));
        Ok(Box::pin(adk_rust::futures::stream::iter(vec![response])))
    }
}

async fn scripted_team(mode: TeamMode, llm: Arc<ScriptedTeamLlm>) -> AdkTeam {
    let cfg = base_cfg();
    let session_service: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    AdkTeam::from_parts(
        default_team(&cfg.model, mode, false),
        bare_resources(llm),
        session_service,
        &cfg,
        TelemetrySink::disabled(),
    )
    .await
    .expect("team should build")
}

#[tokio::test]
async fn coordinating_leader_answers_every_turn() {
    let llm = ScriptedTeamLlm::consulting(&["finance_agent"]);
    let team = scripted_team(TeamMode::Coordinate, llm.clone()).await;

    for question in ["How do I price my services?", "And what about payroll?"] {
        let response = team.run(question).await.expect("run succeeds");
        assert_eq!(response.content, "leader summary");
        assert_eq!(
            response.member_responses,
            [MemberResponse {
                member: "finance_agent".to_string(),
                content: "finance_agent answer".to_string(),
            }]
        );
        assert_eq!(
            response.tool_calls,
            [ToolCallRecord {
                author: team.descriptor().slug(),
                tool: "finance_agent".to_string(),
                failed: false,
            }]
        );
    }

    // Each turn: one call to delegate, one to summarise. The member runs once per turn.
    assert_eq!(llm.seen_by("leader").len(), 4);
    assert_eq!(llm.seen_by("finance_agent").len(), 2);
    let second_turn = &llm.seen_by("finance_agent")[1];
    assert_eq!(second_turn.texts.last().unwrap(), "And what about payroll?");
}

#[tokio::test]
async fn collaborating_team_runs_every_member_each_turn() {
    let llm = ScriptedTeamLlm::consulting(&[]);
    let team = scripted_team(TeamMode::Collaborate, llm.clone()).await;

    for question in ["Should I incorporate?", "What should I post on social media?"] {
        let response = team.run(question).await.expect("run succeeds");
        assert_eq!(response.content, "leader summary");
        let mut members = response
            .member_responses
            .iter()
            .map(|r| r.member.as_str())
            .collect::<Vec<&str>>();
        members.sort();
        assert_eq!(
            members,
            ["data_science_agent", "finance_agent", "legal_agent", "marketing_agent"]
        );
    }

    assert_eq!(llm.seen_by("leader").len(), 2);
    for member in ["finance_agent", "data_science_agent", "legal_agent", "marketing_agent"] {
        assert_eq!(llm.seen_by(member).len(), 2, "{member} should answer both turns");
    }
}

#[tokio::test]
async fn configured_temperature_reaches_model_requests() {
    let llm = ScriptedTeamLlm::consulting(&["finance_agent", "marketing_agent"]);
    let team = scripted_team(TeamMode::Coordinate, llm.clone()).await;
    team.run("Plan my launch budget").await.expect("run succeeds");

    let leader = llm.seen_by("leader");
    assert!(!leader.is_empty());
    assert!(leader.iter().all(|req| req.temperature == Some(0.0)));

    let finance = llm.seen_by("finance_agent");
    assert_eq!(finance.len(), 1);
    assert_eq!(finance[0].temperature, Some(0.0));

    let marketing = llm.seen_by("marketing_agent");
    assert_eq!(marketing.len(), 1);
    assert_eq!(marketing[0].temperature, None);
}

#[tokio::test]
async fn leader_history_is_bounded_to_recent_runs() {
    let llm = ScriptedTeamLlm::consulting(&[]);
    let team = scripted_team(TeamMode::Collaborate, llm.clone()).await;

    let turns = NUM_HISTORY_RUNS + 3;
    for turn in 1..=turns {
        team.run(&format!("question {turn}")).await.expect("run succeeds");
    }

    let last = llm.seen_by("leader").pop().expect("leader was called");
    assert!(last.texts[0].starts_with("You are the leader of"));
    assert_eq!(last.user_turns(), NUM_HISTORY_RUNS + 1);
    assert!(!last.texts.iter().any(|t| t == "question 1"));
    assert_eq!(last.texts.last().unwrap(), &format!("question {turns}"));

    let finance = llm.seen_by("finance_agent").pop().expect("member was called");
    assert!(finance.texts[0].starts_with("Your name is Finance Agent."));
    assert_eq!(finance.user_turns(), NUM_HISTORY_RUNS + 1);
}
