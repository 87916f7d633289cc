//! HTML rewriting.
//!
//! # Responsibilities
//! - Rewrite URL-bearing attributes into proxy URLs
//! - Rewrite inline `style` attributes and `<style>` bodies through the CSS rewriter
//! - Keep exactly one absolute `<base>` in the document
//! - Drop policy meta tags and SRI attributes that would block proxied loads
//! - Insert the runtime shim once
//!
//! # Design Decisions
//! - Streaming tokenizer (`lol_html`), never a DOM
//! - The effective base is found before streaming so every reference in the
//!   document resolves against the same base, matching browser behavior

use std::cell::Cell;

use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::RewriteConfig;
use crate::rewrite::context::{ProxyReference, UrlRewriter};
use crate::rewrite::css::rewrite_css;
use crate::rewrite::shim::{self, SHIM_MARKER};
use crate::rewrite::RewriteError;
use crate::target::{resolve, Resolution, RouteKind};

static BASE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<base\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("base href pattern")
});

static CLOSE_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body\s*>").expect("body pattern"));
static CLOSE_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").expect("head pattern"));

const NAVIGATION_ATTRIBUTES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("area[href]", "href"),
    ("form[action]", "action"),
    ("button[formaction]", "formaction"),
    ("input[formaction]", "formaction"),
    ("iframe[src]", "src"),
    ("frame[src]", "src"),
];

const ASSET_ATTRIBUTES: &[(&str, &str)] = &[
    ("img[src]", "src"),
    ("source[src]", "src"),
    ("script[src]", "src"),
    ("link[href]", "href"),
    ("video[src]", "src"),
    ("video[poster]", "poster"),
    ("audio[src]", "src"),
    ("track[src]", "src"),
    ("embed[src]", "src"),
    ("object[data]", "data"),
    ("input[src]", "src"),
];

const BLOCKING_META: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
];

/// Rewrite an HTML document.
pub fn rewrite_html(
    html: &str,
    rewriter: &UrlRewriter<'_>,
    options: &RewriteConfig,
) -> Result<String, RewriteError> {
    let ctx = rewriter.context();
    let existing_base = find_base_href(html);
    let base = existing_base
        .as_deref()
        .and_then(|href| match resolve(href, &ctx.original_url) {
            Ok(Resolution::Absolute(url)) => Some(url),
            _ => None,
        })
        .unwrap_or_else(|| ctx.original_url.clone());

    let base_tag = format!(
        r#"<base href="{}">"#,
        html_escape::encode_double_quoted_attribute(base.as_str())
    );
    let inject_base = options.inject_base && existing_base.is_none();
    let base_injected = Cell::new(false);

    let strip_policy_meta = options.strip_csp_meta;
    let rw = *rewriter;
    let base_ref = &base;
    let base_injected_ref = &base_injected;

    let mut handlers = Vec::new();

    for &(selector, attribute) in NAVIGATION_ATTRIBUTES {
        handlers.push(element!(selector, move |el| {
            rewrite_attribute(el, attribute, RouteKind::Navigation, &rw, base_ref)
        }));
    }
    for &(selector, attribute) in ASSET_ATTRIBUTES {
        handlers.push(element!(selector, move |el| {
            rewrite_attribute(el, attribute, RouteKind::Asset, &rw, base_ref)
        }));
    }

    handlers.push(element!("img[srcset], source[srcset]", move |el| {
        if let Some(value) = el.get_attribute("srcset") {
            let rewritten = rewrite_srcset(&value, &rw, base_ref);
            if rewritten != value {
                el.set_attribute("srcset", &rewritten)?;
            }
        }
        Ok(())
    }));

    handlers.push(element!("[style]", move |el| {
        if let Some(value) = el.get_attribute("style") {
            let rewritten = rewrite_css(&value, &rw, base_ref);
            if rewritten != value {
                el.set_attribute("style", &rewritten)?;
            }
        }
        Ok(())
    }));

    handlers.push(element!("meta[http-equiv]", move |el| {
        let equiv = el
            .get_attribute("http-equiv")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if equiv == "refresh" {
            if let Some(content) = el.get_attribute("content") {
                if let Some(rewritten) = rewrite_meta_refresh(&content, &rw, base_ref) {
                    el.set_attribute("content", &rewritten)?;
                }
            }
        } else if strip_policy_meta && BLOCKING_META.contains(&equiv.as_str()) {
            el.remove();
        }
        Ok(())
    }));

    handlers.push(element!("base[href]", move |el| {
        if el.get_attribute("href").as_deref() != Some(base_ref.as_str()) {
            el.set_attribute("href", base_ref.as_str())?;
        }
        Ok(())
    }));

    if inject_base {
        let tag = base_tag.clone();
        handlers.push(element!("head", move |el| {
            if !base_injected_ref.get() {
                el.prepend(&tag, ContentType::Html);
                base_injected_ref.set(true);
            }
            Ok(())
        }));
    }

    if options.strip_integrity {
        handlers.push(element!("[integrity]", |el| {
            el.remove_attribute("integrity");
            Ok(())
        }));
    }

    let mut style_buffer = String::new();
    handlers.push(text!("style", move |chunk| {
        style_buffer.push_str(chunk.as_str());
        if chunk.last_in_text_node() {
            let rewritten = rewrite_css(&style_buffer, &rw, base_ref);
            chunk.replace(&rewritten, ContentType::Html);
            style_buffer.clear();
        } else {
            chunk.remove();
        }
        Ok(())
    }));

    let mut output = Vec::with_capacity(html.len() + 1024);
    let mut streamer = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::new()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );
    streamer
        .write(html.as_bytes())
        .map_err(|e| RewriteError::Html(e.to_string()))?;
    streamer.end().map_err(|e| RewriteError::Html(e.to_string()))?;

    let mut document = String::from_utf8(output).map_err(|_| RewriteError::NotUtf8)?;

    if inject_base && !base_injected.get() {
        document.insert_str(0, &base_tag);
    }

    if options.inject_shim {
        document = insert_shim(document, &shim::render(ctx, rewriter.codec()));
    }

    Ok(document)
}

fn rewrite_attribute(
    el: &mut lol_html::html_content::Element<'_, '_>,
    attribute: &str,
    route: RouteKind,
    rewriter: &UrlRewriter<'_>,
    base: &Url,
) -> lol_html::HandlerResult {
    if let Some(value) = el.get_attribute(attribute) {
        if let Some(rewritten) = rewriter.rewrite(ProxyReference::new(attribute, &value, route), base) {
            el.set_attribute(attribute, &rewritten)?;
        }
    }
    Ok(())
}

fn find_base_href(html: &str) -> Option<String> {
    let caps = BASE_HREF.captures(html)?;
    let raw = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    let decoded = html_escape::decode_html_entities(raw.as_str());
    let trimmed = decoded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Rewrite each `srcset` candidate URL, keeping descriptors and separators.
///
/// Returns the value untouched when no candidate was rewritten.
pub(crate) fn rewrite_srcset(value: &str, rewriter: &UrlRewriter<'_>, base: &Url) -> String {
    let mut output = String::with_capacity(value.len());
    let mut changed = false;
    let mut rest = value;

    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        let start = rest.len() - trimmed.len();
        output.push_str(&rest[..start]);
        rest = &rest[start..];
        if rest.is_empty() {
            break;
        }

        let url_end = rest.find(|c: char| c.is_ascii_whitespace()).unwrap_or(rest.len());
        let token = &rest[..url_end];
        let url = token.trim_end_matches(',');
        let trailing = &token[url.len()..];
        rest = &rest[url_end..];

        match rewriter.rewrite(ProxyReference::new("srcset", url, RouteKind::Asset), base) {
            Some(rewritten) => {
                changed = true;
                output.push_str(&rewritten);
            }
            None => output.push_str(url),
        }
        output.push_str(trailing);

        if trailing.is_empty() {
            let desc_end = rest.find(',').unwrap_or(rest.len());
            output.push_str(&rest[..desc_end]);
            rest = &rest[desc_end..];
        }
    }

    if changed {
        output
    } else {
        value.to_string()
    }
}

/// Rewrite the `url=` part of a `<meta http-equiv="refresh">` content value.
fn rewrite_meta_refresh(content: &str, rewriter: &UrlRewriter<'_>, base: &Url) -> Option<String> {
    let (delay, rest) = content.split_once([';', ','])?;
    let rest = rest.trim_start();
    let target = match rest.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("url=") => rest.get(4..).unwrap_or_default(),
        _ => rest,
    };
    let target = target.trim().trim_matches(|c| c == '\'' || c == '"');

    let rewritten = rewriter.rewrite(
        ProxyReference::new("meta refresh", target, RouteKind::Navigation),
        base,
    )?;
    Some(format!("{}; url={}", delay.trim(), rewritten))
}

/// Insert the shim before the last `</body>`, else `</head>`, else at the start.
fn insert_shim(mut document: String, script: &str) -> String {
    if document.contains(SHIM_MARKER) {
        return document;
    }

    let anchor = CLOSE_BODY
        .find_iter(&document)
        .last()
        .or_else(|| CLOSE_HEAD.find(&document))
        .map(|m| m.start());

    match anchor {
        Some(at) => document.insert_str(at, script),
        None => document.insert_str(0, script),
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodecConfig, CodecStrategy, SessionConfig};
    use crate::rewrite::context::RewriteContext;
    use crate::session::SessionStore;
    use crate::target::codec::encode_direct;
    use crate::target::{PathCodec, SessionScope};

    const PROXY: &str = "http://proxy.local";

    fn run_with(html: &str, page: &str, options: &RewriteConfig) -> String {
        let codec = PathCodec::new(&CodecConfig::default());
        let ctx = RewriteContext::new(Url::parse(page).unwrap(), PROXY, None);
        let rewriter = UrlRewriter::new(&codec, &ctx);
        rewrite_html(html, &rewriter, options).unwrap()
    }

    fn run(html: &str) -> String {
        run_with(html, "https://a.com/dir/page.html", &RewriteConfig::default())
    }

    fn nav(url: &str) -> String {
        format!("{PROXY}/proxy/{}", encode_direct(&Url::parse(url).unwrap()))
    }

    fn asset(url: &str) -> String {
        format!("{PROXY}/asset/{}", encode_direct(&Url::parse(url).unwrap()))
    }

    #[test]
    fn test_rewrites_navigation_and_assets() {
        let out = run(r#"<html><head><link rel="stylesheet" href="../x.css"><script src="/y.js"></script></head>
<body><a href="next.html">n</a><img src="//cdn.com/z.png"><form action="/submit"></form></body></html>"#);

        assert!(out.contains(&format!(r#"href="{}""#, asset("https://a.com/x.css"))));
        assert!(out.contains(&format!(r#"src="{}""#, asset("https://a.com/y.js"))));
        assert!(out.contains(&format!(r#"href="{}""#, nav("https://a.com/dir/next.html"))));
        assert!(out.contains(&format!(r#"src="{}""#, asset("https://cdn.com/z.png"))));
        assert!(out.contains(&format!(r#"action="{}""#, nav("https://a.com/submit"))));
    }

    #[test]
    fn test_skip_correctness() {
        let out = run(r##"<body><a href="#top">t</a><a href="javascript:void(0)">j</a><img src="data:image/png;base64,AAAA"><a href="mailto:x@a.com">m</a></body>"##);
        assert!(out.contains(r##"href="#top""##));
        assert!(out.contains(r#"href="javascript:void(0)""#));
        assert!(out.contains(r#"src="data:image/png;base64,AAAA""#));
        assert!(out.contains(r#"href="mailto:x@a.com""#));
    }

    #[test]
    fn test_injects_base_into_head() {
        let out = run("<html><head><title>t</title></head><body></body></html>");
        assert!(out.contains(r#"<head><base href="https://a.com/dir/page.html">"#));
    }

    #[test]
    fn test_injects_base_without_head() {
        let out = run("<p>fragment</p>");
        let base_at = out.find(r#"<base href="https://a.com/dir/page.html">"#).unwrap();
        assert!(base_at < out.find("<p>fragment</p>").unwrap());
    }

    #[test]
    fn test_existing_base_becomes_effective_base() {
        let out = run(r#"<html><head><base href="/static/"></head><body><img src="logo.png"></body></html>"#);
        assert!(out.contains(r#"<base href="https://a.com/static/">"#));
        assert!(out.contains(&asset("https://a.com/static/logo.png")));
        assert_eq!(out.matches("<base").count(), 1);
    }

    #[test]
    fn test_srcset_keeps_descriptors() {
        let out = run(r#"<img srcset="a.png 1x, /b.png 2x,c.png">"#);
        let expected = format!(
            "{} 1x, {} 2x,{}",
            asset("https://a.com/dir/a.png"),
            asset("https://a.com/b.png"),
            asset("https://a.com/dir/c.png")
        );
        assert!(out.contains(&expected), "{out}");
    }

    #[test]
    fn test_srcset_of_skipped_candidates_untouched() {
        let html = r#"<img srcset="data:image/png;base64,AAAA 1x,data:image/png;base64,BBBB 2x">"#;
        let out = run(html);
        assert!(out.contains(r#"srcset="data:image/png;base64,AAAA 1x,data:image/png;base64,BBBB 2x""#), "{out}");
    }

    #[test]
    fn test_inline_style_and_style_element() {
        let out = run(r#"<head><style>body{background:url("bg.png")} a > b{color:red}</style></head><div style="background:url(/d.png)"></div>"#);
        assert!(out.contains(&asset("https://a.com/dir/bg.png")));
        assert!(out.contains("a > b{color:red}"));
        assert!(out.contains(&asset("https://a.com/d.png")));
    }

    #[test]
    fn test_strips_policy_meta_and_integrity() {
        let out = run(r#"<head><meta http-equiv="Content-Security-Policy" content="default-src 'self'"><meta http-equiv="X-Frame-Options" content="deny"><script src="/s.js" integrity="sha384-abc"></script></head>"#);
        assert!(!out.contains("Content-Security-Policy"));
        assert!(!out.contains("X-Frame-Options"));
        assert!(!out.contains("integrity"));
    }

    #[test]
    fn test_integrity_kept_when_disabled() {
        let options = RewriteConfig {
            strip_integrity: false,
            ..RewriteConfig::default()
        };
        let out = run_with(
            r#"<script src="/s.js" integrity="sha384-abc"></script>"#,
            "https://a.com/",
            &options,
        );
        assert!(out.contains(r#"integrity="sha384-abc""#));
    }

    #[test]
    fn test_meta_refresh() {
        let out = run(r#"<meta http-equiv="refresh" content="5; URL='/later'">"#);
        assert!(out.contains(&format!(r#"content="5; url={}""#, nav("https://a.com/later"))));
    }

    #[test]
    fn test_meta_refresh_non_ascii_target() {
        let out = run("<meta http-equiv=\"refresh\" content=\"0; ab\u{20ac}\">");
        assert!(out.contains(&format!("content=\"0; url={PROXY}/proxy/")), "{out}");

        let out = run("<meta http-equiv=\"refresh\" content=\"0; \u{e9}t\u{e9}\">");
        assert!(out.contains(&format!("content=\"0; url={PROXY}/proxy/")), "{out}");
    }

    #[test]
    fn test_shim_placement() {
        let out = run("<html><head></head><body><p>x</p></body></html>");
        let shim_at = out.find(SHIM_MARKER).unwrap();
        let body_close = out.rfind("</body>").unwrap();
        assert!(shim_at < body_close);
        assert!(out.find("<p>x</p>").unwrap() < shim_at);

        let head_only = run("<html><head><title>t</title></head></html>");
        assert!(head_only.find(SHIM_MARKER).unwrap() < head_only.find("</head>").unwrap());

        let bare = run("plain text");
        assert!(bare.find(SHIM_MARKER).unwrap() < bare.find("plain text").unwrap());
    }

    #[test]
    fn test_idempotent() {
        let html = r#"<html><head><meta http-equiv="content-security-policy" content="x"><style>p{background:url(p.png)}</style></head>
<body><a href="/about">a</a><img src="i.png" srcset="i.png 1x, j.png 2x"><div style="background:url(d.png)"></div></body></html>"#;
        let once = run(html);
        let twice = run(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(SHIM_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn test_session_scenario_anchor() {
        let codec = PathCodec::new(&CodecConfig {
            strategy: CodecStrategy::Session,
            ..CodecConfig::default()
        });
        let store = SessionStore::new(&SessionConfig::default());
        let target = Url::parse("https://example.com").unwrap();
        let session = store.create_session(&target);
        let scope = SessionScope {
            id: session.id.clone(),
            base: target.clone(),
        };
        let ctx = RewriteContext::new(Url::parse("https://example.com/").unwrap(), PROXY, Some(scope));
        let rewriter = UrlRewriter::new(&codec, &ctx);

        let out = rewrite_html(
            r#"<html><body><a href="/about">About</a></body></html>"#,
            &rewriter,
            &RewriteConfig::default(),
        )
        .unwrap();

        assert!(out.contains(&format!(r#"href="{PROXY}/proxy/{}/%2Fabout""#, session.id)));
        assert!(out.find(SHIM_MARKER).unwrap() < out.rfind("</body>").unwrap());
    }
}
