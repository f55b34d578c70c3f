//! Template injection.
//!
//! Queries go through a parsed document (`scraper`), mutations through a
//! streaming element rewriter (`lol_html`), so each step works on elements
//! rather than string offsets. Missing anchors are skipped silently.

use std::{borrow::Cow, cell::Cell, collections::HashSet, sync::LazyLock};

use lol_html::{element, html_content::ContentType, rewrite_str, ElementContentHandlers, RewriteStrSettings};
use scraper::{Html, Selector};

use crate::{
    error::LaasError,
    models::{LandingContent, LandingCopy, ThemeInfo},
};

pub const LP_PREFIX: &str = "lp-";
pub const LANDING_SECTION_ID: &str = "lp-landing";

const THEME_STYLE_ID: &str = "lp-theme";
const THEME_SOURCE_STYLE_ID: &str = "lp-theme-source";
const RESPONSIVE_STYLE_ID: &str = "lp-responsive";

pub mod anchors {
    pub const TITLE: &str = "titulo";
    pub const SUBTITLE: &str = "subtitulo";
    pub const BENEFITS: [&str; 3] = ["beneficio1", "beneficio2", "beneficio3"];
    pub const CTA: &str = "cta";
    pub const HERO_IMAGE: &str = "hero-image";
    pub const LOGO: &str = "logo";
    pub const FAVICON: &str = "favicon";
}

const RESPONSIVE_CSS: &str = "/* tablet */
@media (max-width: 768px) {
  .lp-hero { padding: 2rem 1rem; text-align: center; }
  .lp-hero h1, #titulo { font-size: 2rem; }
  .lp-features, .lp-cta { padding: 1.5rem 1rem; }
  img { max-width: 100%; height: auto; }
}
/* mobile */
@media (max-width: 480px) {
  .lp-hero h1, #titulo { font-size: 1.5rem; }
  .lp-hero p, .lp-features p, #subtitulo { font-size: 1rem; }
  .lp-cta a, .lp-cta button, .lp-btn, #cta { display: block; width: 100%; }
}";

const GENERIC_FONT_FAMILIES: [&str; 6] = ["serif", "sans-serif", "monospace", "cursive", "fantasy", "system-ui"];

static WITH_ID: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[id]").expect("static selector"));
static HEADER: LazyLock<Selector> = LazyLock::new(|| Selector::parse("header").expect("static selector"));
static MAIN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("main").expect("static selector"));

type Handler<'h> = (Cow<'static, lol_html::Selector>, ElementContentHandlers<'h>);

fn rewrite(html: &str, element_content_handlers: Vec<Handler<'_>>) -> Result<String, LaasError> {
    rewrite_str(html, RewriteStrSettings { element_content_handlers, ..RewriteStrSettings::default() })
        .map_err(|e| LaasError::Unexpected(format!("HTML rewrite failed: {e}")))
}

/// Values for the anchor ids of a template.
#[derive(Debug, Clone, Default)]
pub struct PageSlots {
    pub copy: Option<LandingCopy>,
    pub hero_image_url: Option<String>,
    pub logo_url: Option<String>,
    pub favicon_url: Option<String>,
}

/// Fills a stored template: anchors, theme and responsive styles.
pub fn inject(template: &str, slots: &PageSlots, theme: &ThemeInfo) -> Result<String, LaasError> {
    let html = resolve_duplicate_ids(template)?;
    let html = replace_anchors(&html, slots)?;
    let html = inject_theme_css(&html, theme)?;
    inject_responsive_css(&html)
}

/// Merges generated sections into a reference page.
pub fn inject_sections(page: &str, content: &LandingContent, theme: &ThemeInfo) -> Result<String, LaasError> {
    let prepared = prepare_content(content)?;
    let fragment = format!(
        "<section id=\"{LANDING_SECTION_ID}\" class=\"{LP_PREFIX}landing\">{}{}{}</section>",
        prepared.hero_html, prepared.features_html, prepared.cta_html
    );
    let fragment = namespace_fragment_ids(&fragment, &collect_ids(page))?;
    let merged = merge_sections(page, &fragment, detect_injection_point(page))?;
    let html = inject_theme_css(&merged, theme)?;
    inject_responsive_css(&html)
}

/// Sanitizes every generated section and moves its classes into the `lp-` namespace.
pub fn prepare_content(content: &LandingContent) -> Result<LandingContent, LaasError> {
    let prepare = |html: &str| sanitize_fragment(html).and_then(|clean| prefix_classes(&clean));
    Ok(LandingContent {
        hero_html: prepare(&content.hero_html)?,
        features_html: prepare(&content.features_html)?,
        cta_html: prepare(&content.cta_html)?,
        img_prompts: content.img_prompts.clone(),
    })
}

pub fn prefix_classes(fragment: &str) -> Result<String, LaasError> {
    rewrite(
        fragment,
        vec![element!("[class]", |el| {
            if let Some(classes) = el.get_attribute("class") {
                el.set_attribute("class", &prefix_class_list(&classes))?;
            }
            Ok(())
        })],
    )
}

fn prefix_class_list(classes: &str) -> String {
    classes
        .split_whitespace()
        .map(|class| {
            if class.starts_with(LP_PREFIX) { class.to_string() } else { format!("{LP_PREFIX}{class}") }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops `<script>` and `<iframe>` elements and `on*` event-handler attributes.
pub fn sanitize_fragment(fragment: &str) -> Result<String, LaasError> {
    rewrite(
        fragment,
        vec![
            element!("script", |el| {
                el.remove();
                Ok(())
            }),
            element!("iframe", |el| {
                el.remove();
                Ok(())
            }),
            element!("*", |el| {
                let handlers: Vec<String> = el
                    .attributes()
                    .iter()
                    .map(|attr| attr.name())
                    .filter(|name| name.to_ascii_lowercase().starts_with("on"))
                    .collect();
                for name in handlers {
                    el.remove_attribute(&name);
                }
                Ok(())
            }),
        ],
    )
}

/// Ids in document order, duplicates included.
fn collect_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&WITH_ID)
        .filter_map(|el| el.value().id())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Keeps the first element with a given id and moves later ones to `lp-<id>`.
pub fn resolve_duplicate_ids(html: &str) -> Result<String, LaasError> {
    let taken = collect_ids(html).into_iter().collect();
    rename_ids(html, HashSet::new(), taken)
}

/// Renames fragment ids that collide with the page or repeat within the fragment.
fn namespace_fragment_ids(fragment: &str, page_ids: &[String]) -> Result<String, LaasError> {
    let reserved: HashSet<String> = page_ids.iter().cloned().collect();
    let taken = reserved.iter().cloned().chain(collect_ids(fragment)).collect();
    rename_ids(fragment, reserved, taken)
}

fn rename_ids(html: &str, mut reserved: HashSet<String>, mut taken: HashSet<String>) -> Result<String, LaasError> {
    rewrite(
        html,
        vec![element!("[id]", move |el| {
            let Some(id) = el.get_attribute("id").filter(|id| !id.is_empty()) else {
                return Ok(());
            };
            if reserved.insert(id.clone()) {
                return Ok(());
            }
            let renamed = namespaced_id(&id, &taken);
            taken.insert(renamed.clone());
            reserved.insert(renamed.clone());
            el.set_attribute("id", &renamed)?;
            Ok(())
        })],
    )
}

fn namespaced_id(id: &str, taken: &HashSet<String>) -> String {
    let base = if id.starts_with(LP_PREFIX) { id.to_string() } else { format!("{LP_PREFIX}{id}") };
    if !taken.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

fn text_slot(id: &str, value: String) -> Handler<'static> {
    element!(format!("#{id}"), move |el| {
        el.set_inner_content(&value, ContentType::Text);
        Ok(())
    })
}

fn attr_slot(id: &str, attr: &'static str, value: String) -> Handler<'static> {
    element!(format!("#{id}"), move |el| {
        el.set_attribute(attr, &value)?;
        Ok(())
    })
}

/// Writes copy into text anchors and URLs into `src`/`href` anchors.
pub fn replace_anchors(html: &str, slots: &PageSlots) -> Result<String, LaasError> {
    let mut handlers = Vec::new();
    if let Some(copy) = &slots.copy {
        handlers.push(text_slot(anchors::TITLE, copy.titulo.clone()));
        handlers.push(text_slot(anchors::SUBTITLE, copy.subtitulo.clone()));
        for (id, benefit) in anchors::BENEFITS.iter().zip(&copy.beneficios) {
            handlers.push(text_slot(id, benefit.clone()));
        }
        handlers.push(text_slot(anchors::CTA, copy.cta.clone()));
    }
    if let Some(url) = &slots.hero_image_url {
        handlers.push(attr_slot(anchors::HERO_IMAGE, "src", url.clone()));
    }
    if let Some(url) = &slots.logo_url {
        handlers.push(attr_slot(anchors::LOGO, "src", url.clone()));
    }
    if let Some(url) = &slots.favicon_url {
        handlers.push(attr_slot(anchors::FAVICON, "href", url.clone()));
    }
    if handlers.is_empty() {
        return Ok(html.to_string());
    }
    rewrite(html, handlers)
}

fn css_value(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '{' | '}' | '<' | '>' | ';')).collect::<String>().trim().to_string()
}

fn with_font_fallback(font: &str) -> String {
    let font = css_value(font);
    let last = font.rsplit(',').next().unwrap_or_default().trim().trim_matches(|c| c == '"' || c == '\'');
    if GENERIC_FONT_FAMILIES.iter().any(|g| g.eq_ignore_ascii_case(last)) {
        font
    } else {
        format!("{font}, sans-serif")
    }
}

/// Styles for the `lp-` namespace derived from the theme, if it has colors or fonts.
pub fn theme_css(theme: &ThemeInfo) -> Option<String> {
    if theme.color_palette.is_empty() && theme.fonts.is_empty() {
        return None;
    }
    let mut root = Vec::new();
    if let Some(primary) = theme.primary_color() {
        root.push(format!("--lp-primary: {};", css_value(primary)));
    }
    if let Some(secondary) = theme.color_palette.get(1) {
        root.push(format!("--lp-secondary: {};", css_value(secondary)));
    }
    if let Some(font) = theme.primary_font() {
        root.push(format!("--lp-font: {};", with_font_fallback(font)));
    }

    Some(format!(
        ":root {{ {} }}
.lp-hero, .lp-features, .lp-cta {{ font-family: var(--lp-font, Arial, sans-serif); }}
.lp-hero {{ color: var(--lp-primary, #333333); }}
.lp-features {{ padding: 2rem; }}
.lp-cta a, .lp-cta button, .lp-btn {{ background-color: var(--lp-primary, #333333); color: var(--lp-secondary, #ffffff); }}",
        root.join(" ")
    ))
}

pub fn inject_theme_css(html: &str, theme: &ThemeInfo) -> Result<String, LaasError> {
    let mut blocks = Vec::new();
    if let Some(css) = theme_css(theme) {
        blocks.push((THEME_STYLE_ID, css));
    }
    let source: Vec<String> = theme.inline_styles.iter().map(|css| css.replace('<', "")).collect();
    if !source.is_empty() {
        blocks.push((THEME_SOURCE_STYLE_ID, source.join("\n")));
    }
    upsert_head_styles(html, blocks)
}

pub fn inject_responsive_css(html: &str) -> Result<String, LaasError> {
    upsert_head_styles(html, vec![(RESPONSIVE_STYLE_ID, RESPONSIVE_CSS.to_string())])
}

/// Appends each `<style id=...>` block to `<head>`, replacing earlier copies.
fn upsert_head_styles(html: &str, blocks: Vec<(&'static str, String)>) -> Result<String, LaasError> {
    if blocks.is_empty() {
        return Ok(html.to_string());
    }
    let markup: String = blocks.iter().map(|(id, css)| format!("<style id=\"{id}\">\n{css}\n</style>\n")).collect();
    let appended = Cell::new(false);

    let mut handlers: Vec<Handler<'_>> = blocks
        .iter()
        .map(|(id, _)| {
            element!(format!("style#{id}"), |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();
    handlers.push(element!("head", |el| {
        if !appended.get() {
            el.append(&markup, ContentType::Html);
            appended.set(true);
        }
        Ok(())
    }));

    let output = rewrite(html, handlers)?;
    if appended.get() {
        return Ok(output);
    }

    // Without a <head> the styles open the first <html> or <body>, keeping any doctype first.
    for container in ["html", "body"] {
        let placed = Cell::new(false);
        let result = rewrite(
            &output,
            vec![element!(container, |el| {
                if !placed.get() {
                    el.prepend(&markup, ContentType::Html);
                    placed.set(true);
                }
                Ok(())
            })],
        )?;
        if placed.get() {
            return Ok(result);
        }
    }
    Ok(format!("{markup}{output}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionPoint {
    AfterHeader,
    MainStart,
    BodyStart,
}

pub fn detect_injection_point(html: &str) -> InjectionPoint {
    let document = Html::parse_document(html);
    if document.select(&HEADER).next().is_some() {
        InjectionPoint::AfterHeader
    } else if document.select(&MAIN).next().is_some() {
        InjectionPoint::MainStart
    } else {
        InjectionPoint::BodyStart
    }
}

pub fn merge_sections(html: &str, fragment: &str, point: InjectionPoint) -> Result<String, LaasError> {
    let inserted = Cell::new(false);
    let target = match point {
        InjectionPoint::AfterHeader => "header",
        InjectionPoint::MainStart => "main",
        InjectionPoint::BodyStart => "body",
    };
    let output = rewrite(
        html,
        vec![element!(target, |el| {
            if !inserted.get() {
                match point {
                    InjectionPoint::AfterHeader => el.after(fragment, ContentType::Html),
                    InjectionPoint::MainStart | InjectionPoint::BodyStart => el.prepend(fragment, ContentType::Html),
                }
                inserted.set(true);
            }
            Ok(())
        })],
    )?;
    if inserted.get() { Ok(output) } else { Ok(format!("{output}{fragment}")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Test Site</title>
    <style>.test { color: blue; }</style>
</head>
<body>
    <header>
        <h1>Test Header</h1>
    </header>
    <main>
        <p>Test content</p>
    </main>
</body>
</html>"#;

    const TEMPLATE: &str = r#"<html><head><link id="favicon" rel="icon" href="/old.ico"></head><body>
<img id="logo" src="/old-logo.png">
<h1 id="titulo">Old title</h1>
<p id="subtitulo">Old <em>subtitle</em></p>
<ul><li id="beneficio1">a</li><li id="beneficio2">b</li><li id="beneficio3">c</li></ul>
<img id="hero-image" src="/placeholder.png">
<a id="cta" href="/signup">Old CTA</a>
</body></html>"#;

    fn select_all(html: &str, css: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse(css).unwrap();
        document.select(&selector).map(|el| el.text().collect::<String>()).collect()
    }

    fn attr(html: &str, css: &str, name: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse(css).unwrap();
        document.select(&selector).next().and_then(|el| el.value().attr(name)).map(str::to_owned)
    }

    fn copy() -> LandingCopy {
        LandingCopy {
            titulo: "Pagos sin fricción".into(),
            subtitulo: "Tu dashboard financiero".into(),
            beneficios: vec!["Rápido".into(), "Seguro".into(), "Claro".into()],
            cta: "Empieza hoy".into(),
        }
    }

    #[test]
    fn prefixes_bare_classes() {
        let hero = prefix_classes(r#"<div class="hero"><h1 class="title">Test</h1></div>"#).unwrap();
        assert!(hero.contains(r#"class="lp-hero""#));
        assert!(hero.contains(r#"class="lp-title""#));

        let cta = prefix_classes(r#"<div class="cta lp-keep"><button class="btn  primary">Go</button></div>"#).unwrap();
        assert!(cta.contains(r#"class="lp-cta lp-keep""#));
        assert!(cta.contains(r#"class="lp-btn lp-primary""#));
    }

    #[test]
    fn sanitization_strips_scripts_iframes_and_handlers() {
        let dirty = r#"<div class="lp-hero"><section><script>alert("xss")</script><h1>Hero</h1><div><iframe src="evil.com"><b>inner</b></iframe><button onclick="evil()" onmouseover='x()' type="button">Click</button></div></section><em>sibling</em></div>"#;
        let clean = sanitize_fragment(dirty).unwrap();

        assert!(!clean.contains("<script"));
        assert!(!clean.contains("alert"));
        assert!(!clean.contains("<iframe"));
        assert!(!clean.contains("onclick="));
        assert!(!clean.contains("onmouseover="));
        assert!(clean.contains("<h1>Hero</h1>"));
        assert!(clean.contains("<button"));
        assert!(clean.contains(">Click</button>"));
        assert!(clean.contains("<em>sibling</em>"));
    }

    #[test]
    fn duplicate_ids_keep_the_original() {
        let html = r#"
        <div id="header">Original</div>
        <div id="content">
            <div id="header">Landing Page Header</div>
            <div id="sidebar">Landing Page Sidebar</div>
        </div>"#;
        let resolved = resolve_duplicate_ids(html).unwrap();

        assert_eq!(select_all(&resolved, "#header"), vec!["Original"]);
        assert_eq!(select_all(&resolved, "#lp-header"), vec!["Landing Page Header"]);
        assert_eq!(select_all(&resolved, "#sidebar").len(), 1);
    }

    #[test]
    fn renamed_id_avoids_existing_ids() {
        let html = r#"<p id="a">1</p><p id="a">2</p><p id="lp-a">3</p><p id="a">4</p>"#;
        let resolved = resolve_duplicate_ids(html).unwrap();
        assert_eq!(select_all(&resolved, "#a"), vec!["1"]);
        assert_eq!(select_all(&resolved, "#lp-a"), vec!["3"]);
        assert_eq!(select_all(&resolved, "#lp-a-2"), vec!["2"]);
        assert_eq!(select_all(&resolved, "#lp-a-3"), vec!["4"]);
    }

    #[test]
    fn detects_injection_point() {
        assert_eq!(detect_injection_point(SAMPLE_HTML), InjectionPoint::AfterHeader);
        assert_eq!(detect_injection_point("<html><body><main>x</main></body></html>"), InjectionPoint::MainStart);
        assert_eq!(detect_injection_point("<html><body><p>x</p></body></html>"), InjectionPoint::BodyStart);
    }

    #[test]
    fn theme_css_carries_colors_and_fonts() {
        let theme = ThemeInfo {
            color_palette: vec!["#333333".into(), "#ffffff".into(), "#007bff".into()],
            fonts: vec!["Arial, sans-serif".into(), "Georgia, serif".into()],
            ..ThemeInfo::default()
        };
        let result = inject_theme_css(SAMPLE_HTML, &theme).unwrap();

        assert!(result.contains(".lp-hero"));
        assert!(result.contains(".lp-features"));
        assert!(result.contains(".lp-cta"));
        assert!(result.contains("--lp-primary: #333333;"));
        assert!(result.contains("--lp-font: Arial, sans-serif;"));
        assert_eq!(select_all(&result, "head style#lp-theme").len(), 1);
        assert!(result.contains(".test { color: blue; }"));
    }

    #[test]
    fn font_fallback_is_appended_once() {
        assert_eq!(with_font_fallback("Inter"), "Inter, sans-serif");
        assert_eq!(with_font_fallback("\"Inter\", serif"), "\"Inter\", serif");
        assert_eq!(with_font_fallback("Roboto}</style>"), "Roboto/style, sans-serif");
    }

    #[test]
    fn empty_theme_adds_no_theme_styles() {
        let result = inject_theme_css(SAMPLE_HTML, &ThemeInfo::default()).unwrap();
        assert_eq!(result, SAMPLE_HTML);
    }

    #[test]
    fn collected_theme_css_is_inlined_in_head() {
        let theme = ThemeInfo { inline_styles: vec!["h1 { color: #123456 }".into()], ..ThemeInfo::default() };
        let result = inject_theme_css(SAMPLE_HTML, &theme).unwrap();
        assert_eq!(select_all(&result, "head style#lp-theme-source"), vec!["\nh1 { color: #123456 }\n"]);
    }

    #[test]
    fn responsive_css_is_injected_once() {
        let once = inject_responsive_css(SAMPLE_HTML).unwrap();
        let twice = inject_responsive_css(&once).unwrap();

        assert!(once.contains("@media"));
        assert!(once.contains("max-width"));
        assert!(once.to_lowercase().contains("mobile") || once.to_lowercase().contains("tablet"));
        assert_eq!(select_all(&twice, "style#lp-responsive").len(), 1);
    }

    #[test]
    fn styles_are_prepended_without_head() {
        let result = inject_responsive_css("<p>fragment</p>").unwrap();
        assert!(result.starts_with("<style id=\"lp-responsive\">"));
        assert!(result.ends_with("<p>fragment</p>"));
    }

    #[test]
    fn headless_document_keeps_its_doctype_first() {
        let page = "<!DOCTYPE html>\n<html lang=\"es\"><body><p>Hola</p></body></html>";
        let once = inject_responsive_css(page).unwrap();
        let twice = inject_responsive_css(&once).unwrap();

        assert!(once.starts_with("<!DOCTYPE html>\n<html lang=\"es\"><style id=\"lp-responsive\">"));
        assert!(once.ends_with("<body><p>Hola</p></body></html>"));
        assert_eq!(select_all(&twice, "style#lp-responsive").len(), 1);
        assert!(twice.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn body_only_document_gets_styles_inside_body() {
        let result = inject_responsive_css("<body><main>Hi</main></body>").unwrap();
        assert!(result.starts_with("<body><style id=\"lp-responsive\">"));
        assert!(result.ends_with("<main>Hi</main></body>"));
    }

    #[test]
    fn fills_every_anchor() {
        let slots = PageSlots {
            copy: Some(copy()),
            hero_image_url: Some("https://cdn.test/images/1.png".into()),
            logo_url: Some("https://acme.test/logo.svg".into()),
            favicon_url: Some("https://acme.test/favicon.ico".into()),
        };
        let html = inject(TEMPLATE, &slots, &ThemeInfo::default()).unwrap();

        assert_eq!(select_all(&html, "#titulo"), vec!["Pagos sin fricción"]);
        assert_eq!(select_all(&html, "#subtitulo"), vec!["Tu dashboard financiero"]);
        assert_eq!(select_all(&html, "#beneficio1"), vec!["Rápido"]);
        assert_eq!(select_all(&html, "#beneficio2"), vec!["Seguro"]);
        assert_eq!(select_all(&html, "#beneficio3"), vec!["Claro"]);
        assert_eq!(select_all(&html, "#cta"), vec!["Empieza hoy"]);
        assert_eq!(attr(&html, "#cta", "href").as_deref(), Some("/signup"));
        assert_eq!(attr(&html, "#hero-image", "src").as_deref(), Some("https://cdn.test/images/1.png"));
        assert_eq!(attr(&html, "#logo", "src").as_deref(), Some("https://acme.test/logo.svg"));
        assert_eq!(attr(&html, "#favicon", "href").as_deref(), Some("https://acme.test/favicon.ico"));
    }

    #[test]
    fn anchor_text_is_escaped() {
        let mut text = copy();
        text.titulo = "<script>alert(1)</script>".into();
        let html = replace_anchors(TEMPLATE, &PageSlots { copy: Some(text), ..PageSlots::default() }).unwrap();
        assert!(!html.contains("<script>"));
        assert_eq!(select_all(&html, "#titulo"), vec!["<script>alert(1)</script>"]);
    }

    #[test]
    fn injection_is_idempotent() {
        let slots = PageSlots { copy: Some(copy()), ..PageSlots::default() };
        let theme = ThemeInfo { color_palette: vec!["#0055ff".into()], ..ThemeInfo::default() };
        let once = inject(TEMPLATE, &slots, &theme).unwrap();
        let twice = inject(&once, &slots, &theme).unwrap();

        for id in ["#titulo", "#subtitulo", "#beneficio1", "#beneficio2", "#beneficio3", "#cta"] {
            assert_eq!(select_all(&once, id), select_all(&twice, id), "anchor {id}");
            assert_eq!(select_all(&twice, id).len(), 1);
        }
        assert_eq!(select_all(&twice, "style#lp-theme").len(), 1);
        assert_eq!(select_all(&twice, "style#lp-responsive").len(), 1);
    }

    #[test]
    fn missing_anchors_are_skipped() {
        let html = "<html><head></head><body><h1 id=\"other\">Keep</h1></body></html>";
        let result = replace_anchors(html, &PageSlots { copy: Some(copy()), ..PageSlots::default() }).unwrap();
        assert_eq!(result, html);
    }

    #[test]
    fn malformed_html_is_processed() {
        let malformed = "<html><body><div>Unclosed div<p>Test</body></html>";
        let result = inject(malformed, &PageSlots::default(), &ThemeInfo::default()).unwrap();
        assert!(result.contains("<html>"));
        assert_eq!(select_all(&result, "p"), vec!["Test"]);
    }

    #[test]
    fn sections_land_after_header_with_namespaced_ids() {
        let page = r#"<html><head></head><body><header><div id="header">Original</div></header><main><p>Content</p></main></body></html>"#;
        let content = LandingContent {
            hero_html: r#"<div id="header" class="hero"><h1>Landing Page Header</h1><script>x()</script></div>"#.into(),
            features_html: r#"<div class="features"><p onclick="x()">Fast</p></div>"#.into(),
            cta_html: r#"<div class="cta"><button class="btn">Join</button></div>"#.into(),
            img_prompts: vec![],
        };
        let theme = ThemeInfo { color_palette: vec!["#333333".into()], ..ThemeInfo::default() };
        let html = inject_sections(page, &content, &theme).unwrap();

        assert_eq!(select_all(&html, "#header"), vec!["Original"]);
        assert_eq!(select_all(&html, "#lp-header"), vec!["Landing Page Header"]);
        assert_eq!(select_all(&html, "header + section#lp-landing").len(), 1);
        assert_eq!(select_all(&html, "#lp-header.lp-hero").len(), 1);
        assert_eq!(select_all(&html, ".lp-cta .lp-btn"), vec!["Join"]);
        assert!(!html.contains("<script>"));
        assert!(!html.contains("onclick"));
        assert_eq!(select_all(&html, "style#lp-theme").len(), 1);
    }

    #[test]
    fn sections_go_to_body_start_without_landmarks() {
        let fragment = "<section id=\"lp-landing\">x</section>";
        let html = merge_sections("<html><body><p>a</p></body></html>", fragment, InjectionPoint::BodyStart).unwrap();
        assert!(html.contains("<body><section id=\"lp-landing\">x</section><p>a</p>"));

        let bare = merge_sections("<p>a</p>", fragment, InjectionPoint::BodyStart).unwrap();
        assert_eq!(bare, "<p>a</p><section id=\"lp-landing\">x</section>");
    }
}
