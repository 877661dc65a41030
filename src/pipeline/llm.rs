//! Vision model seam: one prompt plus one page image in, text out.
//!
//! The transcription driver is generic over [`VisionModel`] so it can be
//! exercised with a scripted model in tests. The production implementation,
//! [`LlmVisionModel`], wraps any `edgequake-llm` provider (Ollama, OpenAI,
//! Anthropic, Gemini, …).
//!
//! There is no retry loop here. A failed call surfaces as
//! [`DocprepError::InferenceFailed`] and stops the run; everything written
//! for earlier pages stays on disk.

use crate::config::{TranscribeConfig, DEFAULT_MODEL};
use crate::error::DocprepError;
use crate::pipeline::encode::{encode_image_bytes, image_mime_type};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Generates text for a single page image.
#[allow(async_fn_in_trait)]
pub trait VisionModel {
    /// Run the model on `image` with `prompt`, generating at most
    /// `max_tokens` tokens. `page_num` is only used for error reporting.
    async fn generate(
        &self,
        page_num: usize,
        prompt: &str,
        image: &Path,
        max_tokens: usize,
    ) -> Result<String, DocprepError>;
}

/// [`VisionModel`] backed by an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }

    /// Resolve the provider named by `config` and wrap it.
    pub fn load(config: &TranscribeConfig) -> Result<Self, DocprepError> {
        let provider = resolve_provider(config)?;
        info!("Loaded vision provider '{}'", provider.name());
        Ok(Self::new(provider, config.temperature))
    }

}

fn completion_options(max_tokens: usize, temperature: f32) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

impl VisionModel for LlmVisionModel {
    async fn generate(
        &self,
        page_num: usize,
        prompt: &str,
        image: &Path,
        max_tokens: usize,
    ) -> Result<String, DocprepError> {
        let mime_type = image_mime_type(image)?;
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| DocprepError::io(image, e))?;
        let image_data = encode_image_bytes(&bytes, mime_type);

        let messages = vec![ChatMessage::user_with_images(prompt, vec![image_data])];
        let options = completion_options(max_tokens, self.temperature);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DocprepError::InferenceFailed {
                page: page_num,
                detail: format!("{}", e),
            })?;

        debug!(
            "Page {}: {} input tokens, {} output tokens",
            page_num, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DocprepError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocprepError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider on the config
/// 2. a named provider, with the configured model or [`DEFAULT_MODEL`]
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. `ProviderFactory::from_env()` auto-detection
fn resolve_provider(config: &TranscribeConfig) -> Result<Arc<dyn LLMProvider>, DocprepError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocprepError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                 Pass --provider ollama (with a local vision model) or set an API key.\n\
                 Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_budget_and_temperature() {
        let opts = completion_options(77, 0.0);
        assert_eq!(opts.max_tokens, Some(77));
        assert_eq!(opts.temperature, Some(0.0));
    }
}
