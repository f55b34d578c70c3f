use async_trait::async_trait;
use aws_config::SdkConfig;
use tracing::{info, warn};

use crate::{config::PromptParams, error::LaasError, models::ThemeInfo};

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert landing page copywriter and visual content specialist. \
Given a business or industry description, respond ONLY with a valid JSON object with the following fields: \
'hero_html' (hero section HTML), 'features_html' (features section HTML), \
'cta_html' (call to action HTML), and 'img_prompts' (array of exactly 4 industry-specific Unsplash-style image descriptions). \
The HTML should be semantic and use the 'lp-' prefix for CSS classes. \
For img_prompts, create vivid, industry-specific descriptions that will yield high-quality, relevant images for the specified industry. \
Do not include any explanation, markdown, or text outside the JSON object.";

const DEFAULT_PROMPT_TEMPLATE: &str = "Industry: {industry}{theme_context}\n\n\
For images, generate 4 industry-specific Unsplash-style prompts that are highly relevant to the {industry} industry. \
The prompts should be:\n\
1. A hero background image that captures the essence of {industry}\n\
2. A feature image showcasing {industry} technology or processes\n\
3. A call-to-action image that motivates {industry} professionals\n\
4. A secondary feature image highlighting {industry} benefits or outcomes\n\n\
Make each image prompt specific, professional, and visually compelling for the {industry} sector.";

const COPY_SYSTEM_PROMPT: &str = "You are an expert landing page copywriter. \
Respond ONLY with a valid JSON object with the fields 'titulo' (headline), 'subtitulo' (supporting line), \
'beneficios' (array of exactly 3 short benefit statements) and 'cta' (call to action button text). \
Write in the same language as the business description. Do not include any text outside the JSON object.";

const COPY_PROMPT_TEMPLATE: &str = "Business: {industry}{theme_context}\n\n\
Write concise, persuasive landing page copy for this business.";

#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<String, LaasError>;
}

pub struct SsmParameters {
    client: aws_sdk_ssm::Client,
}

impl SsmParameters {
    pub fn new(config: &SdkConfig) -> Self {
        Self { client: aws_sdk_ssm::Client::new(config) }
    }
}

#[async_trait]
impl ParameterStore for SsmParameters {
    async fn get_parameter(&self, name: &str) -> Result<String, LaasError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .send()
            .await
            .map_err(|e| LaasError::Config(format!("{name}: {}", aws_sdk_ssm::error::DisplayErrorContext(&e))))?;
        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_owned)
            .ok_or_else(|| LaasError::Config(format!("{name} has no value")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub system_prompt: String,
    pub prompt_template: String,
}

impl PromptSet {
    pub fn defaults() -> Self {
        Self { system_prompt: DEFAULT_SYSTEM_PROMPT.into(), prompt_template: DEFAULT_PROMPT_TEMPLATE.into() }
    }

    pub fn copy() -> Self {
        Self { system_prompt: COPY_SYSTEM_PROMPT.into(), prompt_template: COPY_PROMPT_TEMPLATE.into() }
    }

    /// Fills `{industry}` and `{theme_context}`; other braces are left as they are.
    pub fn render(&self, industry: &str, theme: &ThemeInfo) -> String {
        self.prompt_template
            .replace("{industry}", industry)
            .replace("{theme_context}", &build_theme_context(theme))
    }
}

/// Loads the system prompt and template from the parameter store, falling back
/// to the built-in pair if either lookup fails.
pub async fn load_prompts(store: &dyn ParameterStore, params: &PromptParams) -> PromptSet {
    let fetched = async {
        let system_prompt = store.get_parameter(&params.system_prompt).await?;
        let prompt_template = store.get_parameter(&params.prompt_template).await?;
        Ok::<_, LaasError>(PromptSet { system_prompt, prompt_template })
    };
    match fetched.await {
        Ok(prompts) => {
            info!("prompts loaded from parameter store");
            prompts
        }
        Err(e) => {
            warn!(error = %e, "failed to get prompts from parameter store, using defaults");
            PromptSet::defaults()
        }
    }
}

pub fn build_theme_context(theme: &ThemeInfo) -> String {
    let mut context = String::new();
    if !theme.fonts.is_empty() {
        context.push_str(&format!(" Use fonts: {}. ", theme.fonts.join(", ")));
    }
    if !theme.color_palette.is_empty() {
        context.push_str(&format!(" Use colors: {}. ", theme.color_palette.join(", ")));
    }
    if let Some(logo) = &theme.logo_url {
        context.push_str(&format!(" Include logo from: {logo}. "));
    }
    context
}

pub fn image_prompt(seed: &str, style: &str) -> String {
    format!("{seed}. {style}")
}

pub fn rewrite_prompt(template_html: &str, modifications: Option<&str>) -> String {
    match modifications {
        Some(changes) => format!(
            "Modify the following HTML to create a landing page. Apply these changes: {changes}\n{template_html}"
        ),
        None => format!("Modify the following HTML to create a landing page:\n{template_html}"),
    }
}
