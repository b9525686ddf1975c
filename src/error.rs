#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Provider,
    Session,
    Memory,
    Search,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Session => "SESSION",
            ErrorCategory::Memory => "MEMORY",
            ErrorCategory::Search => "SEARCH",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Provider => {
                "Set provider credentials (for example COHERE_API_KEY) or run with --provider ollama."
            }
            ErrorCategory::Session => {
                "Check --db-file points at a writable location; the session history lives there."
            }
            ErrorCategory::Memory => {
                "The memory tables share --db-file with session history. Check file permissions."
            }
            ErrorCategory::Search => "Web search is unreachable. Check network access and retry.",
            ErrorCategory::Input => "Run smallbiz-team --help and correct the arguments or config file.",
            ErrorCategory::Internal => {
                "Retry with DEBUG_MODE=true. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("api_key")
        || msg.contains("no provider could be auto-detected")
        || msg.contains("provider")
        || msg.contains("model")
    {
        return ErrorCategory::Provider;
    }

    if msg.contains("invalid value")
        || msg.contains("invalid configuration")
        || msg.contains("config file")
        || msg.contains("failed to read input")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("memory") {
        return ErrorCategory::Memory;
    }

    if msg.contains("session") || msg.contains("sqlite") || msg.contains("migrat") {
        return ErrorCategory::Session;
    }

    if msg.contains("search") || msg.contains("duckduckgo") {
        return ErrorCategory::Search;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let category = categorize_error(err);
    let rendered_error = render_error_message(err, show_sensitive_config);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        rendered_error,
        category.hint()
    )
}

pub fn render_error_message(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let text = format!("{err:#}");
    if show_sensitive_config {
        text
    } else {
        redact_sqlite_urls(&text)
    }
}

pub fn redact_sqlite_urls(text: &str) -> String {
    const SQLITE_PREFIX: &str = "sqlite:";
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(SQLITE_PREFIX) {
        let start = cursor + offset;
        out.push_str(&text[cursor..start]);

        let remainder = &text[start..];
        let end = remainder
            .find(|ch: char| {
                ch.is_whitespace()
                    || matches!(
                        ch,
                        '"' | '\'' | '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';'
                    )
            })
            .unwrap_or(remainder.len());
        let token = &remainder[..end];
        if token.starts_with("sqlite://") {
            out.push_str("sqlite://[REDACTED]");
        } else {
            out.push_str("sqlite:[REDACTED]");
        }
        cursor = start + end;
    }

    out.push_str(&text[cursor..]);
    out
}
