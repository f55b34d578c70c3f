use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct LayoutHints {
    #[serde(default)]
    pub has_header: bool,
    #[serde(default)]
    pub has_nav: bool,
    #[serde(default)]
    pub has_main: bool,
    #[serde(default)]
    pub has_footer: bool,
}

/// Stylistic cues for a generated page; every field is optional.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ThemeInfo {
    pub fonts: Vec<String>,
    pub color_palette: Vec<String>,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
    pub hero_image_url: Option<String>,
    pub layout_hints: LayoutHints,
    pub css_links: Vec<String>,
    pub inline_styles: Vec<String>,
}

impl ThemeInfo {
    pub fn primary_color(&self) -> Option<&str> {
        self.color_palette.first().map(String::as_str)
    }

    pub fn primary_font(&self) -> Option<&str> {
        self.fonts.first().map(String::as_str)
    }

    /// Fields set on `other` replace ours; empty ones leave ours alone.
    pub fn overlay(mut self, other: &ThemeInfo) -> Self {
        if !other.fonts.is_empty() { self.fonts = other.fonts.clone(); }
        if !other.color_palette.is_empty() { self.color_palette = other.color_palette.clone(); }
        if other.logo_url.is_some() { self.logo_url = other.logo_url.clone(); }
        if other.favicon_url.is_some() { self.favicon_url = other.favicon_url.clone(); }
        if other.hero_image_url.is_some() { self.hero_image_url = other.hero_image_url.clone(); }
        if other.layout_hints != LayoutHints::default() { self.layout_hints = other.layout_hints.clone(); }
        if !other.css_links.is_empty() { self.css_links = other.css_links.clone(); }
        if !other.inline_styles.is_empty() { self.inline_styles = other.inline_styles.clone(); }
        self
    }
}

/// Plain-text copy slots; a request may fill any of them directly.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CopyOverrides {
    #[serde(default)]
    pub titulo: Option<String>,
    #[serde(default)]
    pub subtitulo: Option<String>,
    #[serde(default)]
    pub beneficios: Option<Vec<String>>,
    #[serde(default)]
    pub cta: Option<String>,
}

impl CopyOverrides {
    pub fn is_complete(&self) -> bool {
        self.titulo.is_some()
            && self.subtitulo.is_some()
            && self.beneficios.as_ref().is_some_and(|b| b.len() >= 3)
            && self.cta.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub imagen: Option<String>,
    #[serde(default, alias = "url")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub modifications: Option<String>,
    #[serde(default)]
    pub theme_info: Option<ThemeInfo>,
    #[serde(default)]
    pub landing_content: Option<LandingContent>,
    #[serde(flatten)]
    pub copy: CopyOverrides,
}

impl GenerationRequest {
    /// The business description, taken from `prompt` or, failing that, `imagen`.
    pub fn description(&self) -> Option<&str> {
        non_empty(&self.prompt).or_else(|| non_empty(&self.imagen))
    }

    /// The image seed, taken from `imagen` or, failing that, `prompt`.
    pub fn image_seed(&self) -> Option<&str> {
        non_empty(&self.imagen).or_else(|| non_empty(&self.prompt))
    }

    pub fn source_url(&self) -> Option<&str> {
        non_empty(&self.source_url)
    }

    pub fn modifications(&self) -> Option<&str> {
        non_empty(&self.modifications)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Section fragments produced by the text model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LandingContent {
    pub hero_html: String,
    pub features_html: String,
    pub cta_html: String,
    pub img_prompts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LandingCopy {
    pub titulo: String,
    pub subtitulo: String,
    pub beneficios: Vec<String>,
    pub cta: String,
}

impl LandingCopy {
    /// Request-supplied values win over generated ones.
    pub fn with_overrides(mut self, overrides: &CopyOverrides) -> Self {
        if let Some(t) = &overrides.titulo { self.titulo = t.clone(); }
        if let Some(s) = &overrides.subtitulo { self.subtitulo = s.clone(); }
        if let Some(b) = &overrides.beneficios { self.beneficios = b.clone(); }
        if let Some(c) = &overrides.cta { self.cta = c.clone(); }
        self
    }

    pub fn from_overrides(overrides: &CopyOverrides) -> Option<Self> {
        if !overrides.is_complete() {
            return None;
        }
        Some(Self {
            titulo: overrides.titulo.clone().unwrap_or_default(),
            subtitulo: overrides.subtitulo.clone().unwrap_or_default(),
            beneficios: overrides.beneficios.clone().unwrap_or_default(),
            cta: overrides.cta.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationResponse {
    pub generation_id: String,
    pub assets: BTreeMap<String, String>,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPage {
    pub image_s3_url: String,
    pub image_presigned_url: String,
    pub html_url: String,
    pub prompt_usado: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PublishedUrl {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InjectedPage {
    pub url: String,
    pub generation_id: String,
    pub assets: BTreeMap<String, String>,
    pub theme_info: ThemeInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FetchedSite {
    pub source_url: String,
    pub theme_info: ThemeInfo,
    pub s3_keys: BTreeMap<String, String>,
    /// Original asset URL to its mirrored copy.
    pub url_map: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_reads_copy_fields_and_aliases() {
        let req: GenerationRequest = serde_json::from_value(json!({
            "imagen": "  modern fintech dashboard ",
            "url": "https://example.com",
            "titulo": "Pay faster",
            "beneficios": ["a", "b", "c"]
        }))
        .unwrap();
        assert_eq!(req.image_seed(), Some("modern fintech dashboard"));
        assert_eq!(req.description(), Some("modern fintech dashboard"));
        assert_eq!(req.source_url(), Some("https://example.com"));
        assert_eq!(req.copy.titulo.as_deref(), Some("Pay faster"));
        assert!(!req.copy.is_complete());
    }

    #[test]
    fn empty_request_has_no_seed() {
        let req: GenerationRequest = serde_json::from_value(json!({ "prompt": "   " })).unwrap();
        assert_eq!(req.description(), None);
        assert_eq!(req.image_seed(), None);
    }

    #[test]
    fn landing_content_requires_every_section() {
        let err = serde_json::from_value::<LandingContent>(json!({
            "hero_html": "<div></div>",
            "features_html": "<div></div>"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("cta_html"));
    }

    #[test]
    fn overrides_win_over_generated_copy() {
        let generated = LandingCopy {
            titulo: "Generated".into(),
            subtitulo: "Sub".into(),
            beneficios: vec!["x".into(), "y".into(), "z".into()],
            cta: "Go".into(),
        };
        let overrides = CopyOverrides { titulo: Some("Mine".into()), ..CopyOverrides::default() };
        let merged = generated.with_overrides(&overrides);
        assert_eq!(merged.titulo, "Mine");
        assert_eq!(merged.cta, "Go");
    }

    #[test]
    fn theme_overlay_keeps_unset_fields() {
        let scraped = ThemeInfo {
            fonts: vec!["Georgia, serif".into()],
            color_palette: vec!["#111111".into()],
            ..ThemeInfo::default()
        };
        let caller = ThemeInfo { color_palette: vec!["#ff0000".into()], ..ThemeInfo::default() };
        let merged = scraped.overlay(&caller);
        assert_eq!(merged.primary_color(), Some("#ff0000"));
        assert_eq!(merged.primary_font(), Some("Georgia, serif"));
    }

    #[test]
    fn published_page_uses_camel_case_keys() {
        let page = PublishedPage {
            image_s3_url: "s3://b/images/x.png".into(),
            image_presigned_url: "https://signed".into(),
            html_url: "https://page".into(),
            prompt_usado: "p".into(),
        };
        let value = serde_json::to_value(page).unwrap();
        assert_eq!(value["imageS3Url"], "s3://b/images/x.png");
        assert_eq!(value["imagePresignedUrl"], "https://signed");
        assert_eq!(value["htmlUrl"], "https://page");
        assert_eq!(value["promptUsado"], "p");
    }
}
