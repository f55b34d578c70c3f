use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::{
    bedrock::{Generator, ModelInvoker},
    config::{FunctionKind, Settings},
    error::LaasError,
    fetch::{fetch_with_retry, strip_query_params, validate_url, PageFetcher},
    inject::{inject, inject_sections, sanitize_fragment, PageSlots},
    mirror::Mirror,
    models::{FetchedSite, GenerationRequest, GenerationResponse, InjectedPage, LandingCopy, PublishedPage, PublishedUrl},
    prompts::{image_prompt, load_prompts, rewrite_prompt, ParameterStore},
    publish::Publisher,
    storage::ObjectStore,
    theme::extract_theme,
};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// External service handles, shared by every request.
pub struct Services {
    pub store: Arc<dyn ObjectStore>,
    pub model: Arc<dyn ModelInvoker>,
    pub params: Arc<dyn ParameterStore>,
    pub fetcher: Arc<dyn PageFetcher>,
}

/// The landing-page pipeline. Each operation is request-scoped; nothing is
/// mutated between calls.
pub struct Laas {
    settings: Arc<Settings>,
    generator: Generator,
    params: Arc<dyn ParameterStore>,
    fetcher: Arc<dyn PageFetcher>,
    publisher: Publisher,
    store: Arc<dyn ObjectStore>,
}

impl Laas {
    pub fn new(settings: Settings, services: Services) -> Self {
        let publisher = Publisher::new(services.store.clone(), &settings);
        let generator = Generator::new(services.model, settings.retry);
        Self {
            settings: Arc::new(settings),
            generator,
            params: services.params,
            fetcher: services.fetcher,
            publisher,
            store: services.store,
        }
    }

    pub async fn dispatch(&self, kind: FunctionKind, req: &GenerationRequest) -> Result<Value, LaasError> {
        match kind {
            FunctionKind::Landing => to_value(self.generate_landing(req).await?),
            FunctionKind::Page => to_value(self.generate_page(req).await?),
            FunctionKind::Template => to_value(self.rewrite_template(req).await?),
            FunctionKind::Inject => to_value(self.inject_landing(req).await?),
            FunctionKind::Theme => to_value(self.fetch_theme(req).await?),
        }
    }

    /// Generates hero, features and CTA sections and stores them with the theme.
    pub async fn generate_landing(&self, req: &GenerationRequest) -> Result<GenerationResponse, LaasError> {
        let industry = req
            .description()
            .ok_or_else(|| LaasError::Validation("missing field 'prompt'".into()))?;
        let theme = req.theme_info.clone().unwrap_or_default();
        info!("🚀 Generating landing content for: {}", industry);

        let prompts = load_prompts(self.params.as_ref(), &self.settings.prompt_params).await;
        let content = self
            .generator
            .generate_sections(&self.settings.text_model_id, &prompts, industry, &theme)
            .await?;
        let (generation_id, assets) = self.publisher.store_landing_assets(&content, &theme).await?;

        info!(generation_id = %generation_id, "✅ Landing content generated");
        Ok(GenerationResponse { generation_id, assets, status: "generated".into() })
    }

    /// Generates a hero image and copy, fills the stored template and publishes it.
    pub async fn generate_page(&self, req: &GenerationRequest) -> Result<PublishedPage, LaasError> {
        let seed = req
            .image_seed()
            .ok_or_else(|| LaasError::Validation("the 'imagen' field is empty or missing".into()))?;
        let theme = req.theme_info.clone().unwrap_or_default();
        let prompt = image_prompt(seed, &self.settings.image.style);

        let image = self
            .generator
            .generate_image(&self.settings.image_model_id, &prompt, &self.settings.image)
            .await?;
        let image_asset = self.publisher.publish(image, "image/png", "images/").await?;

        let copy = match LandingCopy::from_overrides(&req.copy) {
            Some(copy) => copy,
            None => {
                let description = req.description().unwrap_or(seed);
                self.generator
                    .generate_copy(&self.settings.text_model_id, description, &theme)
                    .await?
                    .with_overrides(&req.copy)
            }
        };

        let template = self.load_template().await?;
        // CDN and public-bucket URLs are permanent. A private bucket embeds a presigned
        // URL that lapses together with the presigned page URL returned below.
        let slots = PageSlots {
            copy: Some(copy),
            hero_image_url: Some(image_asset.url.clone()),
            logo_url: theme.logo_url.clone(),
            favicon_url: theme.favicon_url.clone(),
        };
        let html = inject(&template, &slots, &theme)?;
        let page = self.publisher.publish(html.into_bytes(), HTML_CONTENT_TYPE, "").await?;
        let image_presigned_url = self.publisher.presigned_url(&image_asset.key).await?;

        info!(html_key = %page.key, image_key = %image_asset.key, "✅ Page published");
        Ok(PublishedPage {
            image_s3_url: self.publisher.s3_uri(&image_asset.key),
            image_presigned_url,
            html_url: page.url,
            prompt_usado: prompt,
        })
    }

    /// Has the model rewrite the stored template and publishes the result.
    pub async fn rewrite_template(&self, req: &GenerationRequest) -> Result<PublishedUrl, LaasError> {
        let template = self.load_template().await?;
        let prompt = rewrite_prompt(&template, req.modifications());
        let html = self.generator.rewrite_html(&self.settings.rewrite_model_id, &prompt).await?;
        let html = sanitize_fragment(&html)?;
        let page = self.publisher.publish(html.into_bytes(), HTML_CONTENT_TYPE, "").await?;
        info!(key = %page.key, "template rewritten");
        Ok(PublishedUrl { url: page.url })
    }

    /// Merges generated sections into a reference page styled after it.
    pub async fn inject_landing(&self, req: &GenerationRequest) -> Result<InjectedPage, LaasError> {
        let raw_url = req
            .source_url()
            .ok_or_else(|| LaasError::Validation("missing field 'source_url'".into()))?;
        let industry = req.description();
        if req.landing_content.is_none() && industry.is_none() {
            return Err(LaasError::Validation("missing field 'prompt'".into()));
        }
        let url = validate_url(&strip_query_params(raw_url))?;

        let page = self.fetch_page(&url).await?;
        let scraped = extract_theme(&page, url.as_str(), self.fetcher.as_ref()).await;
        let theme = match &req.theme_info {
            Some(requested) => scraped.overlay(requested),
            None => scraped,
        };

        let content = match (&req.landing_content, industry) {
            (Some(content), _) => content.clone(),
            (None, Some(industry)) => {
                let prompts = load_prompts(self.params.as_ref(), &self.settings.prompt_params).await;
                self.generator
                    .generate_sections(&self.settings.text_model_id, &prompts, industry, &theme)
                    .await?
            }
            (None, None) => return Err(LaasError::Validation("missing field 'prompt'".into())),
        };

        let html = inject_sections(&page, &content, &theme)?;
        let (generation_id, mut assets) = self.publisher.store_landing_assets(&content, &theme).await?;
        let published = self.publisher.publish(html.into_bytes(), HTML_CONTENT_TYPE, "").await?;
        assets.insert("html_key".to_string(), published.key);

        info!(generation_id = %generation_id, source = %url, "✅ Landing injected");
        Ok(InjectedPage { url: published.url, generation_id, assets, theme_info: theme })
    }

    /// Fetches a reference page, extracts its theme and keeps the raw HTML
    /// alongside a copy whose assets are mirrored to the output bucket.
    pub async fn fetch_theme(&self, req: &GenerationRequest) -> Result<FetchedSite, LaasError> {
        let raw_url = req
            .source_url()
            .ok_or_else(|| LaasError::Validation("missing field 'url'".into()))?;
        let url = validate_url(&strip_query_params(raw_url))?;
        info!(url = %url, "fetching reference site");

        let html = self.fetch_page(&url).await?;
        let theme_info = extract_theme(&html, url.as_str(), self.fetcher.as_ref()).await;

        let id = Uuid::new_v4();
        let original_key = format!("raw/{id}/original.html");
        self.publisher.put_html(&original_key, &html).await?;

        let mirrored = Mirror::new(self.fetcher.as_ref(), &self.publisher, format!("raw/{id}/assets/"))
            .mirror_page(&html, &url)
            .await?;
        let rewritten_key = format!("raw/{id}/rewritten.html");
        self.publisher.put_html(&rewritten_key, &mirrored.html).await?;

        info!(url = %url, assets = mirrored.url_map.len(), "✅ Reference site stored");
        Ok(FetchedSite {
            source_url: url.to_string(),
            theme_info,
            s3_keys: BTreeMap::from([
                ("original_html".to_string(), original_key),
                ("rewritten_html".to_string(), rewritten_key),
            ]),
            url_map: mirrored.url_map,
            fetched_at: Utc::now(),
            status: "fetched".into(),
        })
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, LaasError> {
        fetch_with_retry(
            self.fetcher.as_ref(),
            url.as_str(),
            self.settings.fetch_attempts,
            self.settings.fetch_retry_delay,
        )
        .await
    }

    async fn load_template(&self) -> Result<String, LaasError> {
        let (bucket, key) = self.settings.template_location()?;
        let bytes = self.store.get_object(bucket, key).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LaasError::Storage(format!("template s3://{bucket}/{key} is not UTF-8: {e}")))
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, LaasError> {
    serde_json::to_value(value).map_err(|e| LaasError::Unexpected(format!("failed to encode response: {e}")))
}
