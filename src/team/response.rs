use std::collections::HashMap;

use adk_rust::prelude::*;
use anyhow::Context;
use serde_json::{Value, json};

use crate::telemetry::TelemetrySink;

#[derive(Debug, Clone, PartialEq)]
pub struct MemberResponse {
    pub member: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub author: String,
    pub tool: String,
    pub failed: bool,
}

/// Result of one `run`: the team's answer plus what it observed along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamResponse {
    pub content: String,
    pub member_responses: Vec<MemberResponse>,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl TeamResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            member_responses: Vec::new(),
            tool_calls: Vec::new(),
        }
    }
}

/// Accumulates streamed text per author. Partial chunks append; non-partial events
/// carry the full snapshot and replace the buffer.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    members: Vec<String>,
    author_order: Vec<String>,
    by_author: HashMap<String, String>,
    final_by_author: HashMap<String, String>,
    tool_calls: Vec<ToolCallRecord>,
}

impl ResponseCollector {
    /// `members` are the tool names under which the leader consults team members.
    pub fn for_members(members: Vec<String>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|member| member == name)
    }

    pub fn ingest_text(&mut self, author: &str, text: &str, partial: bool, is_final: bool) {
        if text.is_empty() {
            return;
        }

        if !self.by_author.contains_key(author) {
            self.author_order.push(author.to_string());
        }
        let buffer = self.by_author.entry(author.to_string()).or_default();
        if partial {
            buffer.push_str(text);
        } else {
            *buffer = text.to_string();
        }

        if is_final && !text.trim().is_empty() {
            self.final_by_author
                .insert(author.to_string(), text.trim().to_string());
        }
    }

    /// A member's answer returned to the leader through its member tool.
    pub fn record_member_answer(&mut self, member: &str, text: &str) {
        self.ingest_text(member, text, false, true);
    }

    pub fn record_tool_call(&mut self, author: &str, tool: &str, failed: bool) {
        self.tool_calls.push(ToolCallRecord {
            author: author.to_string(),
            tool: tool.to_string(),
            failed,
        });
    }

    /// The author's last final text, falling back to whatever was streamed.
    pub fn resolve_text(&self, author: &str) -> Option<String> {
        if let Some(text) = self.final_by_author.get(author) {
            return Some(text.clone());
        }
        let trimmed = self.by_author.get(author)?.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// The leader's text becomes the content; every other author except the user
    /// becomes a member response, in first-seen order. Fails when the leader said nothing.
    pub fn finish(self, leader: &str) -> anyhow::Result<TeamResponse> {
        let content = self
            .resolve_text(leader)
            .with_context(|| format!("team leader '{leader}' produced no text response"))?;
        let member_responses = self
            .author_order
            .iter()
            .filter(|author| author.as_str() != leader && author.as_str() != "user")
            .filter_map(|author| {
                Some(MemberResponse {
                    member: author.clone(),
                    content: self.resolve_text(author)?,
                })
            })
            .collect();

        Ok(TeamResponse {
            content,
            member_responses,
            tool_calls: self.tool_calls,
        })
    }
}

pub fn event_text(event: &Event) -> String {
    match event.content() {
        Some(content) => content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        None => String::new(),
    }
}

pub fn extract_tool_failure_message(response: &Value) -> Option<String> {
    if let Some(message) = response.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(message) = response.get("message").and_then(Value::as_str) {
        let status = response
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if status.eq_ignore_ascii_case("error") || status.eq_ignore_ascii_case("failed") {
            return Some(message.to_string());
        }
    }
    None
}

/// Logs tool lifecycle at info when `show_tool_calls` is set, debug otherwise.
/// Responses from member tools are also collected as member answers.
pub fn observe_tool_events(
    event: &Event,
    collector: &mut ResponseCollector,
    telemetry: &TelemetrySink,
    show_tool_calls: bool,
) {
    let Some(content) = event.content() else {
        return;
    };

    for part in &content.parts {
        match part {
            Part::FunctionCall { name, .. } => {
                if show_tool_calls {
                    tracing::info!(tool = %name, author = %event.author, "Tool call requested");
                } else {
                    tracing::debug!(tool = %name, author = %event.author, "Tool call requested");
                }
                telemetry.emit(
                    "tool.requested",
                    json!({ "tool": name, "author": event.author }),
                );
            }
            Part::FunctionResponse {
                function_response, ..
            } => {
                let failure = extract_tool_failure_message(&function_response.response);
                collector.record_tool_call(
                    &event.author,
                    &function_response.name,
                    failure.is_some(),
                );
                if failure.is_none()
                    && collector.is_member(&function_response.name)
                    && let Some(answer) = function_response
                        .response
                        .get("response")
                        .and_then(Value::as_str)
                {
                    collector.record_member_answer(&function_response.name, answer);
                }
                match failure {
                    Some(error_message) => {
                        tracing::warn!(
                            tool = %function_response.name,
                            author = %event.author,
                            error = %error_message,
                            "Tool execution failed"
                        );
                        telemetry.emit(
                            "tool.failed",
                            json!({
                                "tool": function_response.name,
                                "author": event.author,
                                "error": error_message
                            }),
                        );
                    }
                    None => {
                        if show_tool_calls {
                            tracing::info!(
                                tool = %function_response.name,
                                author = %event.author,
                                "Tool execution completed"
                            );
                        }
                        telemetry.emit(
                            "tool.succeeded",
                            json!({ "tool": function_response.name, "author": event.author }),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}
