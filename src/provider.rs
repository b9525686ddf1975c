use std::sync::Arc;

use adk_rust::prelude::*;
use anyhow::{Context, Result};

use crate::cli::Provider;
use crate::config::RuntimeConfig;

/// Cohere serves its chat models over an OpenAI-compatible endpoint.
pub const COHERE_COMPAT_BASE_URL: &str = "https://api.cohere.ai/compatibility/v1";

pub fn validate_model_for_provider(provider: Provider, model_name: &str) -> Result<()> {
    let is_valid = match provider {
        Provider::Cohere => model_name.starts_with("command") || model_name.starts_with("c4ai"),
        Provider::Gemini => model_name.starts_with("gemini"),
        Provider::Openai => {
            model_name.starts_with("gpt-")
                || model_name.starts_with("o1")
                || model_name.starts_with("o3")
        }
        Provider::Anthropic => model_name.starts_with("claude"),
        Provider::Deepseek => model_name.starts_with("deepseek"),
        Provider::Groq => !model_name.trim().is_empty(),
        Provider::Ollama => !model_name.trim().is_empty(),
        Provider::Auto => true,
    };

    if is_valid {
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "model '{}' is not compatible with provider '{:?}'",
        model_name,
        provider
    ))
}

pub fn resolve_model(cfg: &RuntimeConfig) -> Result<(Arc<dyn Llm>, Provider, String)> {
    let provider = match cfg.provider {
        Provider::Auto => detect_provider().context(
            "no provider could be auto-detected. Set one of COHERE_API_KEY, OPENAI_API_KEY, \
             ANTHROPIC_API_KEY, GOOGLE_API_KEY, DEEPSEEK_API_KEY, GROQ_API_KEY, or use --provider ollama",
        )?,
        p => p,
    };
    let model_name = cfg.model.clone();
    validate_model_for_provider(provider, &model_name)?;

    let model: Arc<dyn Llm> = match provider {
        Provider::Cohere => {
            let api_key = cohere_api_key()
                .context("COHERE_API_KEY (or CO_API_KEY) is required for Cohere provider")?;
            Arc::new(OpenAIClient::new(OpenAIConfig::compatible(
                api_key,
                COHERE_COMPAT_BASE_URL,
                model_name.clone(),
            ))?)
        }
        Provider::Gemini => {
            let api_key = std::env::var("GOOGLE_API_KEY")
                .context("GOOGLE_API_KEY is required for Gemini provider")?;
            Arc::new(GeminiModel::new(api_key, model_name.clone())?)
        }
        Provider::Openai => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY is required for OpenAI provider")?;
            Arc::new(OpenAIClient::new(OpenAIConfig::new(
                api_key,
                model_name.clone(),
            ))?)
        }
        Provider::Anthropic => {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .context("ANTHROPIC_API_KEY is required for Anthropic provider")?;
            Arc::new(AnthropicClient::new(AnthropicConfig::new(
                api_key,
                model_name.clone(),
            ))?)
        }
        Provider::Deepseek => {
            let api_key = std::env::var("DEEPSEEK_API_KEY")
                .context("DEEPSEEK_API_KEY is required for DeepSeek provider")?;
            Arc::new(DeepSeekClient::new(DeepSeekConfig::new(
                api_key,
                model_name.clone(),
            ))?)
        }
        Provider::Groq => {
            let api_key = std::env::var("GROQ_API_KEY")
                .context("GROQ_API_KEY is required for Groq provider")?;
            Arc::new(GroqClient::new(GroqConfig::new(api_key, model_name.clone()))?)
        }
        Provider::Ollama => {
            let host = std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string());
            Arc::new(OllamaModel::new(OllamaConfig::with_host(
                host,
                model_name.clone(),
            ))?)
        }
        Provider::Auto => unreachable!("auto provider must be resolved before matching"),
    };

    Ok((model, provider, model_name))
}

fn cohere_api_key() -> Option<String> {
    ["COHERE_API_KEY", "CO_API_KEY"]
        .into_iter()
        .find(|key| env_present(key))
        .and_then(|key| std::env::var(key).ok())
}

/// Cohere comes first: the default model id is a Cohere model.
pub fn detect_provider() -> Option<Provider> {
    if env_present("COHERE_API_KEY") || env_present("CO_API_KEY") {
        return Some(Provider::Cohere);
    }
    if env_present("OPENAI_API_KEY") {
        return Some(Provider::Openai);
    }
    if env_present("ANTHROPIC_API_KEY") {
        return Some(Provider::Anthropic);
    }
    if env_present("DEEPSEEK_API_KEY") {
        return Some(Provider::Deepseek);
    }
    if env_present("GROQ_API_KEY") {
        return Some(Provider::Groq);
    }
    if env_present("GOOGLE_API_KEY") {
        return Some(Provider::Gemini);
    }
    if env_present("OLLAMA_HOST") {
        return Some(Provider::Ollama);
    }
    None
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}
