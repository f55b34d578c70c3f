//! Copies a reference page's assets into the output bucket.
//!
//! Images, stylesheets, icons and scripts are downloaded and republished under
//! a per-fetch prefix. Stylesheets are inlined into the page with their
//! `url(...)` references pointing at mirrored copies. An asset that cannot be
//! copied keeps its original URL.

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap, HashSet},
    sync::LazyLock,
};

use lol_html::{element, html_content::ContentType, rewrite_str, ElementContentHandlers, RewriteStrSettings};
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::{
    error::LaasError,
    fetch::{resolve_reference, validate_url, PageFetcher},
    publish::{guess_content_type, Publisher},
};

const MAX_ASSETS: usize = 150;

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^'"()\s]+))\s*\)"#).expect("valid url() regex")
});
static ASSET_REFS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src], link[href], script[src]").expect("static selector"));

type Handler<'h> = (Cow<'static, lol_html::Selector>, ElementContentHandlers<'h>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetKind {
    File,
    Stylesheet,
}

fn link_kind(rel: &str) -> Option<AssetKind> {
    let rel = rel.to_ascii_lowercase();
    let mut tokens = rel.split_whitespace();
    if tokens.clone().any(|t| t == "stylesheet") {
        Some(AssetKind::Stylesheet)
    } else if tokens.any(|t| t == "icon") {
        Some(AssetKind::File)
    } else {
        None
    }
}

/// A page whose asset references point at mirrored copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirroredPage {
    pub html: String,
    /// Absolute original URL to mirrored URL, for every asset that was copied.
    pub url_map: BTreeMap<String, String>,
}

/// Asset references in document order, resolved and deduplicated.
fn collect_assets(html: &str, base: &Url) -> Vec<(String, AssetKind)> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut assets = Vec::new();
    for el in document.select(&ASSET_REFS) {
        let el = el.value();
        let (attr, kind) = match el.name() {
            "link" => match el.attr("rel").and_then(link_kind) {
                Some(kind) => ("href", kind),
                None => continue,
            },
            _ => ("src", AssetKind::File),
        };
        let Some(url) = el.attr(attr).and_then(|r| resolve_reference(Some(base), r)) else { continue };
        if seen.insert(url.clone()) {
            assets.push((url, kind));
        }
    }
    assets
}

fn css_reference<'c>(caps: &'c Captures) -> Option<&'c str> {
    caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)).map(|m| m.as_str())
}

/// Stylesheet text safe to place inside a `<style>` element.
fn style_element(css: &str) -> String {
    format!("<style>\n{}\n</style>", css.replace("</", "<\\/"))
}

pub struct Mirror<'a> {
    fetcher: &'a dyn PageFetcher,
    publisher: &'a Publisher,
    prefix: String,
    url_map: BTreeMap<String, String>,
    failed: HashSet<String>,
}

impl<'a> Mirror<'a> {
    /// Assets are stored under `prefix`, e.g. `raw/{id}/assets/`.
    pub fn new(fetcher: &'a dyn PageFetcher, publisher: &'a Publisher, prefix: impl Into<String>) -> Self {
        Self { fetcher, publisher, prefix: prefix.into(), url_map: BTreeMap::new(), failed: HashSet::new() }
    }

    pub async fn mirror_page(mut self, html: &str, base: &Url) -> Result<MirroredPage, LaasError> {
        let assets = collect_assets(html, base);
        if assets.len() > MAX_ASSETS {
            warn!(found = assets.len(), limit = MAX_ASSETS, "too many assets, mirroring the first ones");
        }

        let mut stylesheets = HashMap::new();
        for (url, kind) in assets.into_iter().take(MAX_ASSETS) {
            match kind {
                AssetKind::Stylesheet => {
                    if let Some(css) = self.inline_stylesheet(&url).await {
                        stylesheets.insert(url, css);
                    }
                }
                AssetKind::File => {
                    self.copy_asset(&url).await;
                }
            }
        }

        let html = rewrite_references(html, base, &self.url_map, &stylesheets)?;
        info!(mirrored = self.url_map.len(), failed = self.failed.len(), "assets mirrored");
        Ok(MirroredPage { html, url_map: self.url_map })
    }

    /// Copies one asset, returning its mirrored URL. Each URL is attempted once.
    async fn copy_asset(&mut self, url: &str) -> Option<String> {
        if let Some(mirrored) = self.url_map.get(url) {
            return Some(mirrored.clone());
        }
        if self.failed.contains(url) || self.url_map.len() + self.failed.len() >= MAX_ASSETS {
            return None;
        }
        match self.upload(url).await {
            Ok(mirrored) => {
                self.url_map.insert(url.to_string(), mirrored.clone());
                Some(mirrored)
            }
            Err(e) => {
                warn!(asset = url, error = %e, "keeping the original asset URL");
                self.failed.insert(url.to_string());
                None
            }
        }
    }

    async fn upload(&self, url: &str) -> Result<String, LaasError> {
        validate_url(url)?;
        let asset = self.fetcher.fetch_asset(url).await?;
        let content_type = asset
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| guess_content_type(url).to_string());
        let published = self.publisher.publish(asset.body.to_vec(), &content_type, &self.prefix).await?;
        Ok(published.url)
    }

    /// Fetches a stylesheet and returns it with every `url(...)` rewritten.
    /// References that could not be copied are made absolute, since the text
    /// moves from the stylesheet's URL into the page.
    async fn inline_stylesheet(&mut self, url: &str) -> Option<String> {
        if let Err(e) = validate_url(url) {
            warn!(stylesheet = url, error = %e, "refusing stylesheet outside the public web");
            self.failed.insert(url.to_string());
            return None;
        }
        let css = match self.fetcher.fetch_text(url).await {
            Ok(css) => css,
            Err(e) => {
                warn!(stylesheet = url, error = %e, "stylesheet left as a link");
                self.failed.insert(url.to_string());
                return None;
            }
        };

        let css_base = Url::parse(url).ok();
        let references: Vec<String> = CSS_URL
            .captures_iter(&css)
            .filter_map(|caps| css_reference(&caps).and_then(|r| resolve_reference(css_base.as_ref(), r)))
            .collect();
        for reference in references {
            self.copy_asset(&reference).await;
        }

        let rewritten = CSS_URL
            .replace_all(&css, |caps: &Captures| {
                match css_reference(caps).and_then(|r| resolve_reference(css_base.as_ref(), r)) {
                    Some(absolute) => {
                        let target = self.url_map.get(&absolute).unwrap_or(&absolute);
                        format!("url(\"{target}\")")
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();

        match self.publisher.publish(rewritten.clone().into_bytes(), "text/css", &self.prefix).await {
            Ok(published) => {
                self.url_map.insert(url.to_string(), published.url);
            }
            Err(e) => warn!(stylesheet = url, error = %e, "inlined stylesheet was not stored"),
        }
        Some(rewritten)
    }
}

fn rewrite_references(
    html: &str,
    base: &Url,
    url_map: &BTreeMap<String, String>,
    stylesheets: &HashMap<String, String>,
) -> Result<String, LaasError> {
    let lookup = |reference: &str| resolve_reference(Some(base), reference).and_then(|abs| url_map.get(&abs));
    let mirrored = &lookup;

    let mut handlers: Vec<Handler<'_>> = ["img[src]", "script[src]"]
        .into_iter()
        .map(move |selector| {
            element!(selector, move |el| {
                if let Some(target) = el.get_attribute("src").and_then(|src| mirrored(&src).cloned()) {
                    el.set_attribute("src", &target)?;
                }
                Ok(())
            })
        })
        .collect();
    handlers.push(
        element!("link[href]", |el| {
            let Some(kind) = el.get_attribute("rel").as_deref().and_then(link_kind) else { return Ok(()) };
            let Some(href) = el.get_attribute("href") else { return Ok(()) };
            if kind == AssetKind::Stylesheet {
                let inlined = resolve_reference(Some(base), &href).and_then(|abs| stylesheets.get(&abs));
                if let Some(css) = inlined {
                    el.replace(&style_element(css), ContentType::Html);
                    return Ok(());
                }
            }
            if let Some(target) = mirrored(&href).cloned() {
                el.set_attribute("href", &target)?;
            }
            Ok(())
        }),
    );

    rewrite_str(html, RewriteStrSettings { element_content_handlers: handlers, ..RewriteStrSettings::default() })
        .map_err(|e| LaasError::Unexpected(format!("HTML rewrite failed: {e}")))
}
