use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde_json::json;

use crate::context::AppContext;
use crate::team::TeamResponse;

pub const READY_BANNER: &str = "🤖 Agno CLI Agent is ready. Type 'exit' to quit.";
pub const INPUT_PROMPT: &str = "💁‍♀️ You: ";
pub const RESPONSE_LABEL: &str = "🤖 Agno: ";
pub const EXIT_SENTINEL: &str = "exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingInput,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Sentinel,
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub turns: usize,
    pub exit_reason: ExitReason,
}

pub fn is_exit_command(input: &str) -> bool {
    input.trim().to_lowercase() == EXIT_SENTINEL
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}

pub fn write_response<W: Write>(
    output: &mut W,
    response: &TeamResponse,
    show_member_responses: bool,
) -> Result<()> {
    if show_member_responses {
        for member in &response.member_responses {
            writeln!(output, "  ↳ {}: {}", member.member, member.content)
                .context("failed to write member response")?;
        }
    }
    writeln!(output, "{RESPONSE_LABEL}{}", response.content).context("failed to write response")
}

/// Reads lines until the exit sentinel (or end of input), sending each other line to the
/// team exactly once. Team failures propagate; nothing is retried.
pub async fn run_session_loop<R: BufRead, W: Write>(
    ctx: &AppContext,
    mut input: R,
    output: &mut W,
) -> Result<LoopSummary> {
    writeln!(output, "{READY_BANNER}").context("failed to write banner")?;

    let mut state = LoopState::AwaitingInput;
    let mut turns = 0usize;
    let mut exit_reason = ExitReason::EndOfInput;
    let mut line = String::new();

    while state == LoopState::AwaitingInput {
        write!(output, "{INPUT_PROMPT}").context("failed to write prompt")?;
        output.flush().context("failed to flush output")?;

        line.clear();
        let read = input
            .read_line(&mut line)
            .context("failed to read input line")?;
        if read == 0 {
            writeln!(output).context("failed to write newline")?;
            state = LoopState::Terminated;
            continue;
        }

        let user_input = strip_line_ending(&line);
        if is_exit_command(user_input) {
            exit_reason = ExitReason::Sentinel;
            state = LoopState::Terminated;
            continue;
        }

        turns += 1;
        ctx.telemetry.emit(
            "turn.started",
            json!({ "turn": turns, "input_chars": user_input.chars().count() }),
        );
        tracing::debug!(turn = turns, "dispatching input to team");

        let response = ctx.team.run(user_input).await?;

        write_response(output, &response, ctx.team.show_member_responses())?;
        output.flush().context("failed to flush output")?;
        ctx.telemetry.emit(
            "turn.completed",
            json!({ "turn": turns, "output_chars": response.content.chars().count() }),
        );
    }

    tracing::info!(turns, reason = ?exit_reason, "session ended");
    Ok(LoopSummary { turns, exit_reason })
}
