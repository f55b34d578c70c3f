use std::sync::Arc;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_bedrockruntime::{error::DisplayErrorContext, primitives::Blob};
use rand::Rng;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    config::ImageSettings,
    error::LaasError,
    extract,
    models::{LandingContent, LandingCopy, ThemeInfo},
    prompts::PromptSet,
    retry::{retry_with_backoff, RetryPolicy},
};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Sends a JSON request body to `model_id` and returns the raw response body.
    async fn invoke(&self, model_id: &str, body: &[u8]) -> Result<Vec<u8>, LaasError>;
}

pub struct BedrockInvoker {
    client: aws_sdk_bedrockruntime::Client,
}

impl BedrockInvoker {
    pub fn new(config: &SdkConfig) -> Self {
        Self { client: aws_sdk_bedrockruntime::Client::new(config) }
    }
}

#[async_trait]
impl ModelInvoker for BedrockInvoker {
    async fn invoke(&self, model_id: &str, body: &[u8]) -> Result<Vec<u8>, LaasError> {
        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body.to_vec()))
            .send()
            .await
            .map_err(|e| LaasError::Generation(DisplayErrorContext(&e).to_string()))?;
        Ok(output.body().as_ref().to_vec())
    }
}

pub fn messages_payload(system: &str, user_prompt: &str) -> Value {
    json!({
        "anthropic_version": ANTHROPIC_VERSION,
        "max_tokens": 1024,
        "temperature": 0.7,
        "system": system,
        "messages": [{
            "role": "user",
            "content": [{"type": "text", "text": user_prompt}]
        }]
    })
}

pub fn image_payload(prompt: &str, settings: &ImageSettings) -> Value {
    let seed: u32 = rand::thread_rng().gen_range(12..=858_993_459);
    json!({
        "taskType": "TEXT_IMAGE",
        "textToImageParams": {"text": prompt},
        "imageGenerationConfig": {
            "numberOfImages": 1,
            "quality": "standard",
            "height": settings.height,
            "width": settings.width,
            "cfgScale": settings.cfg_scale,
            "seed": seed
        }
    })
}

pub fn rewrite_payload(prompt: &str) -> Value {
    json!({ "inputText": prompt })
}

/// Model calls with retry, plus decoding of each kind of response.
pub struct Generator {
    invoker: Arc<dyn ModelInvoker>,
    retry: RetryPolicy,
}

impl Generator {
    pub fn new(invoker: Arc<dyn ModelInvoker>, retry: RetryPolicy) -> Self {
        Self { invoker, retry }
    }

    pub async fn invoke_json(&self, model_id: &str, payload: &Value) -> Result<Vec<u8>, LaasError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| LaasError::Unexpected(format!("failed to encode model payload: {e}")))?;
        let invoker = self.invoker.as_ref();
        let body = body.as_slice();
        let raw = retry_with_backoff(&self.retry, move |_| invoker.invoke(model_id, body), tokio::time::sleep).await?;
        info!(model_id, response_length = raw.len(), "model response received");
        Ok(raw)
    }

    pub async fn generate_sections(
        &self,
        model_id: &str,
        prompts: &PromptSet,
        industry: &str,
        theme: &ThemeInfo,
    ) -> Result<LandingContent, LaasError> {
        let payload = messages_payload(&prompts.system_prompt, &prompts.render(industry, theme));
        let raw = self.invoke_json(model_id, &payload).await?;
        extract::extract_landing_content(&raw).inspect_err(|e| error!(error = %e, "invalid landing content"))
    }

    pub async fn generate_copy(&self, model_id: &str, description: &str, theme: &ThemeInfo) -> Result<LandingCopy, LaasError> {
        let prompts = PromptSet::copy();
        let payload = messages_payload(&prompts.system_prompt, &prompts.render(description, theme));
        let raw = self.invoke_json(model_id, &payload).await?;
        extract::extract_copy(&raw).inspect_err(|e| error!(error = %e, "invalid landing copy"))
    }

    pub async fn generate_image(&self, model_id: &str, prompt: &str, settings: &ImageSettings) -> Result<Vec<u8>, LaasError> {
        info!(model_id, prompt = %truncate(prompt, 100), "generating image");
        let raw = self.invoke_json(model_id, &image_payload(prompt, settings)).await?;
        let image = extract::extract_image(&raw)?;
        info!(bytes = image.len(), "image generated");
        Ok(image)
    }

    pub async fn rewrite_html(&self, model_id: &str, prompt: &str) -> Result<String, LaasError> {
        let raw = self.invoke_json(model_id, &rewrite_payload(prompt)).await?;
        extract::extract_output_text(&raw)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
