use std::{str::FromStr, time::Duration};

use crate::{error::LaasError, retry::RetryPolicy};

pub const DEFAULT_LLM_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229";
pub const DEFAULT_IMAGE_MODEL_ID: &str = "amazon.titan-image-generator-v1";
pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_SYSTEM_PROMPT_PARAM: &str = "/laas/bedrock/system_prompt";
pub const DEFAULT_PROMPT_TEMPLATE_PARAM: &str = "/laas/bedrock/prompt";

pub const DEFAULT_IMAGE_STYLE: &str = "Ultra realistic professional photograph, DSLR quality. \
    Natural proportions, correct anatomy, business background, studio softbox lighting, shallow depth of field. \
    Sharp focus, no floating objects, no artificial elements.";

/// Which handler a deployed function instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Landing,
    Page,
    Template,
    Inject,
    Theme,
}

impl FromStr for FunctionKind {
    type Err = LaasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "landing" | "gen_landing" => Ok(FunctionKind::Landing),
            "page" | "image_page" => Ok(FunctionKind::Page),
            "template" => Ok(FunctionKind::Template),
            "inject" | "inject_html" => Ok(FunctionKind::Inject),
            "theme" | "fetch_site" => Ok(FunctionKind::Theme),
            other => Err(LaasError::Config(format!("unknown function kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f32,
    pub style: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self { width: 1440, height: 1408, cfg_scale: 5.5, style: DEFAULT_IMAGE_STYLE.to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct PromptParams {
    pub system_prompt: String,
    pub prompt_template: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub input_bucket: Option<String>,
    pub input_key: Option<String>,
    pub output_bucket: String,
    pub rewrite_model_id: String,
    pub text_model_id: String,
    pub image_model_id: String,
    pub region: String,
    pub cdn_domain: Option<String>,
    pub public_bucket: bool,
    pub presign_expiry: Duration,
    pub image: ImageSettings,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    /// Attempts per reference page fetch, doubling `fetch_retry_delay` between them.
    pub fetch_attempts: u32,
    pub fetch_retry_delay: Duration,
    pub prompt_params: PromptParams,
    pub function: Option<FunctionKind>,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, LaasError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LaasError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let output_bucket = get("OUTPUT_BUCKET")
            .ok_or_else(|| LaasError::Config("OUTPUT_BUCKET must be set".into()))?;
        let base_model = get("BEDROCK_MODEL_ID");

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or(get("MAX_RETRIES"), defaults.max_retries, "MAX_RETRIES")?,
            base_delay: Duration::from_millis(parse_or(
                get("BASE_DELAY_MS"),
                defaults.base_delay.as_millis() as u64,
                "BASE_DELAY_MS",
            )?),
            max_total_time: Duration::from_secs(parse_or(
                get("MAX_TOTAL_SECS"),
                defaults.max_total_time.as_secs(),
                "MAX_TOTAL_SECS",
            )?),
            ..defaults
        };

        let image_defaults = ImageSettings::default();
        let image = ImageSettings {
            width: parse_or(get("IMAGE_WIDTH"), image_defaults.width, "IMAGE_WIDTH")?,
            height: parse_or(get("IMAGE_HEIGHT"), image_defaults.height, "IMAGE_HEIGHT")?,
            cfg_scale: parse_or(get("IMAGE_CFG_SCALE"), image_defaults.cfg_scale, "IMAGE_CFG_SCALE")?,
            style: get("IMAGE_STYLE").unwrap_or(image_defaults.style),
        };

        Ok(Self {
            input_bucket: get("INPUT_BUCKET"),
            input_key: get("INPUT_KEY"),
            output_bucket,
            rewrite_model_id: base_model.clone().unwrap_or_else(|| DEFAULT_LLM_MODEL_ID.to_string()),
            text_model_id: get("BEDROCK_LLM_MODEL_ID").unwrap_or_else(|| DEFAULT_LLM_MODEL_ID.to_string()),
            image_model_id: get("BEDROCK_IMAGE_MODEL_ID")
                .or(base_model)
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL_ID.to_string()),
            region: get("BEDROCK_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            cdn_domain: get("CLOUDFRONT_DOMAIN"),
            public_bucket: parse_or(get("PUBLIC_BUCKET"), false, "PUBLIC_BUCKET")?,
            presign_expiry: Duration::from_secs(parse_or(get("PRESIGN_EXPIRY_SECS"), 3600, "PRESIGN_EXPIRY_SECS")?),
            image,
            retry,
            fetch_timeout: Duration::from_secs(parse_or(get("FETCH_TIMEOUT_SECS"), 5, "FETCH_TIMEOUT_SECS")?),
            fetch_attempts: parse_or::<u32>(get("FETCH_ATTEMPTS"), 3, "FETCH_ATTEMPTS")?.max(1),
            fetch_retry_delay: Duration::from_millis(parse_or(
                get("FETCH_RETRY_DELAY_MS"),
                1000,
                "FETCH_RETRY_DELAY_MS",
            )?),
            prompt_params: PromptParams {
                system_prompt: get("SYSTEM_PROMPT_PARAM").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT_PARAM.to_string()),
                prompt_template: get("PROMPT_TEMPLATE_PARAM")
                    .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE_PARAM.to_string()),
            },
            function: get("LAAS_FUNCTION").map(|v| v.parse()).transpose()?,
            port: parse_or(get("PORT"), 8080, "PORT")?,
        })
    }

    /// The template location, required by the handlers that start from a stored template.
    pub fn template_location(&self) -> Result<(&str, &str), LaasError> {
        match (&self.input_bucket, &self.input_key) {
            (Some(bucket), Some(key)) => Ok((bucket, key)),
            _ => Err(LaasError::Config("INPUT_BUCKET and INPUT_KEY must be set".into())),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T, key: &str) -> Result<T, LaasError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| LaasError::Config(format!("{key} has an invalid value: '{raw}'"))),
    }
}
