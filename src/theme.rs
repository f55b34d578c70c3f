//! Theme extraction from a reference page.
//!
//! Reads colors and fonts from inline and linked CSS, the logo and favicon,
//! and which structural landmarks exist. Never fails: every stylesheet fetch
//! is independent and anything missing falls back to the default theme.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::{
    fetch::{resolve_reference, validate_url, PageFetcher},
    models::{LayoutHints, ThemeInfo},
};

pub const DEFAULT_FONTS: [&str; 1] = ["Arial, sans-serif"];
pub const DEFAULT_COLORS: [&str; 2] = ["#333333", "#ffffff"];

const MAX_FONTS: usize = 6;
const MAX_COLORS: usize = 12;

static CSS_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment regex"));
static CSS_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("valid rule regex"));

static STYLE: LazyLock<Selector> = LazyLock::new(|| selector("style"));
static STYLESHEET: LazyLock<Selector> = LazyLock::new(|| selector("link[rel][href]"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
static MAIN_IMG: LazyLock<Selector> = LazyLock::new(|| selector("main img[src]"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));
static HEADER: LazyLock<Selector> = LazyLock::new(|| selector("header"));
static NAV: LazyLock<Selector> = LazyLock::new(|| selector("nav"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| selector("main"));
static FOOTER: LazyLock<Selector> = LazyLock::new(|| selector("footer"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub fn default_theme() -> ThemeInfo {
    ThemeInfo::default().with_defaults()
}

impl ThemeInfo {
    /// Fills empty font and color lists with the defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.fonts.is_empty() {
            self.fonts = DEFAULT_FONTS.iter().map(|f| f.to_string()).collect();
        }
        if self.color_palette.is_empty() {
            self.color_palette = DEFAULT_COLORS.iter().map(|c| c.to_string()).collect();
        }
        self
    }
}

/// What a single parse of the document yields before any stylesheet is fetched.
#[derive(Debug, Default)]
struct DocumentScan {
    has_text: bool,
    inline_styles: Vec<String>,
    css_links: Vec<String>,
    logo_url: Option<String>,
    favicon_url: Option<String>,
    hero_image_url: Option<String>,
    layout_hints: LayoutHints,
}

fn scan_document(html: &str, base: Option<&Url>) -> DocumentScan {
    let document = Html::parse_document(html);

    let has_text = document
        .select(&BODY)
        .next()
        .map(|body| body.text().any(|t| !t.trim().is_empty()))
        .unwrap_or(false);

    let inline_styles = document
        .select(&STYLE)
        .map(|s| s.text().collect::<String>())
        .filter(|css| !css.trim().is_empty())
        .collect();

    let mut css_links = Vec::new();
    let mut favicon_url = None;
    for link in document.select(&STYLESHEET) {
        let rel = link.value().attr("rel").unwrap_or_default().to_ascii_lowercase();
        let Some(href) = link.value().attr("href").and_then(|h| resolve_reference(base, h)) else { continue };
        if rel.split_whitespace().any(|r| r == "stylesheet") {
            css_links.push(href);
        } else if favicon_url.is_none() && rel.contains("icon") {
            favicon_url = Some(href);
        }
    }

    let images: Vec<(String, String)> = document
        .select(&IMG)
        .filter_map(|img| {
            let src = img.value().attr("src")?;
            let alt = img.value().attr("alt").unwrap_or_default();
            Some((src.to_string(), alt.to_ascii_lowercase()))
        })
        .collect();
    let logo_url = images
        .iter()
        .find(|(src, alt)| src.to_ascii_lowercase().contains("logo") || alt.contains("logo"))
        .or_else(|| images.first())
        .and_then(|(src, _)| resolve_reference(base, src));

    let hero_image_url = document
        .select(&MAIN_IMG)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| resolve_reference(base, src))
        .find(|src| Some(src) != logo_url.as_ref());

    let layout_hints = LayoutHints {
        has_header: document.select(&HEADER).next().is_some(),
        has_nav: document.select(&NAV).next().is_some(),
        has_main: document.select(&MAIN).next().is_some(),
        has_footer: document.select(&FOOTER).next().is_some(),
    };

    DocumentScan { has_text, inline_styles, css_links, logo_url, favicon_url, hero_image_url, layout_hints }
}

/// Colors, fonts and the usable rule text collected from stylesheets.
#[derive(Debug, Default)]
pub struct StyleCollector {
    pub colors: Vec<String>,
    pub fonts: Vec<String>,
    pub accepted_rules: Vec<String>,
}

impl StyleCollector {
    pub fn collect(&mut self, css: &str) {
        let css = CSS_COMMENT.replace_all(css, "");
        for rule in CSS_RULE.captures_iter(&css) {
            let selector = rule[1].trim();
            let declarations = rule[2].trim();
            if selector.is_empty() || selector.starts_with('@') || uses_unsupported_features(declarations) {
                continue;
            }
            for declaration in declarations.split(';') {
                let Some((property, value)) = declaration.split_once(':') else { continue };
                let value = value.trim().trim_end_matches("!important").trim();
                if value.is_empty() {
                    continue;
                }
                match property.trim().to_ascii_lowercase().as_str() {
                    "color" | "background-color" if is_color_value(value) => {
                        push_unique(&mut self.colors, value, MAX_COLORS);
                    }
                    "font-family" => push_unique(&mut self.fonts, value, MAX_FONTS),
                    _ => {}
                }
            }
            self.accepted_rules.push(format!("{selector} {{ {declarations} }}"));
        }
    }
}

/// Custom properties, flexbox and grid cannot be carried into the generated page safely.
fn uses_unsupported_features(declarations: &str) -> bool {
    let lower = declarations.to_ascii_lowercase();
    lower.contains("--") || lower.contains("var(") || lower.contains("flex") || lower.contains("grid")
}

fn is_color_value(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "inherit" | "initial" | "unset" | "transparent" | "currentcolor" | "revert"
    )
}

fn push_unique(values: &mut Vec<String>, value: &str, limit: usize) {
    if values.len() < limit && !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        values.push(value.to_string());
    }
}

pub async fn extract_theme(html: &str, base_url: &str, fetcher: &dyn PageFetcher) -> ThemeInfo {
    let base = Url::parse(base_url).ok();
    let scan = scan_document(html, base.as_ref());

    if !scan.has_text {
        warn!(base_url, "reference page has no text content, using the default theme");
        return default_theme();
    }

    let mut collector = StyleCollector::default();
    for css in &scan.inline_styles {
        collector.collect(css);
    }
    let mut css_links = Vec::with_capacity(scan.css_links.len());
    for link in scan.css_links {
        if let Err(e) = validate_url(&link) {
            warn!(stylesheet = %link, error = %e, "refusing stylesheet outside the public web");
            continue;
        }
        match fetcher.fetch_text(&link).await {
            Ok(css) => collector.collect(&css),
            Err(e) => warn!(stylesheet = %link, error = %e, "skipping stylesheet"),
        }
        css_links.push(link);
    }

    let theme = ThemeInfo {
        fonts: collector.fonts,
        color_palette: collector.colors,
        logo_url: scan.logo_url,
        favicon_url: scan.favicon_url,
        hero_image_url: scan.hero_image_url,
        layout_hints: scan.layout_hints,
        css_links,
        inline_styles: if collector.accepted_rules.is_empty() {
            Vec::new()
        } else {
            vec![collector.accepted_rules.join("\n")]
        },
    }
    .with_defaults();

    info!(
        fonts = theme.fonts.len(),
        colors = theme.color_palette.len(),
        logo = theme.logo_url.is_some(),
        "theme extracted"
    );
    theme
}
