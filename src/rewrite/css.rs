//! CSS rewriting.
//!
//! Rewrites `url(...)` tokens and `@import "..."` strings. Quoting style of
//! each occurrence is preserved.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::rewrite::context::{ProxyReference, UrlRewriter};
use crate::target::RouteKind;

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#)
        .expect("css url pattern")
});

static CSS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).expect("css import pattern")
});

/// Rewrite every URL in a stylesheet (or inline style) resolved against `base`.
pub fn rewrite_css(css: &str, rewriter: &UrlRewriter<'_>, base: &Url) -> String {
    let pass = CSS_URL.replace_all(css, |caps: &Captures<'_>| {
        let (quote, raw) = quoted(caps);
        match rewriter.rewrite(ProxyReference::new("css url()", raw, RouteKind::Asset), base) {
            Some(rewritten) => format!("url({quote}{rewritten}{quote})"),
            None => caps[0].to_string(),
        }
    });

    CSS_IMPORT
        .replace_all(&pass, |caps: &Captures<'_>| {
            let (quote, raw) = quoted(caps);
            match rewriter.rewrite(ProxyReference::new("css @import", raw, RouteKind::Asset), base) {
                Some(rewritten) => format!("@import {quote}{rewritten}{quote}"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn quoted<'c>(caps: &'c Captures<'_>) -> (&'static str, &'c str) {
    if let Some(m) = caps.get(1) {
        ("\"", m.as_str())
    } else if let Some(m) = caps.get(2) {
        ("'", m.as_str())
    } else {
        ("", caps.get(3).map_or("", |m| m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;
    use crate::rewrite::context::RewriteContext;
    use crate::target::PathCodec;

    fn run(css: &str) -> String {
        let codec = PathCodec::new(&CodecConfig::default());
        let ctx = RewriteContext::new(
            Url::parse("https://a.com/css/site.css").unwrap(),
            "http://p",
            None,
        );
        let rewriter = UrlRewriter::new(&codec, &ctx);
        rewrite_css(css, &rewriter, &ctx.original_url)
    }

    fn asset(url: &str) -> String {
        format!(
            "http://p/asset/{}",
            crate::target::codec::encode_direct(&Url::parse(url).unwrap())
        )
    }

    #[test]
    fn test_url_forms() {
        let out = run(r#"a{background:url("../img/a.png")} b{background:url('b.png')} c{background:url( /c.png )}"#);
        assert!(out.contains(&format!("url(\"{}\")", asset("https://a.com/img/a.png"))));
        assert!(out.contains(&format!("url('{}')", asset("https://a.com/css/b.png"))));
        assert!(out.contains(&format!("url({})", asset("https://a.com/c.png"))));
    }

    #[test]
    fn test_import() {
        let out = run(r#"@import "reset.css"; @import url(//cdn.com/f.css);"#);
        assert!(out.contains(&format!("@import \"{}\"", asset("https://a.com/css/reset.css"))));
        assert!(out.contains(&format!("url({})", asset("https://cdn.com/f.css"))));
    }

    #[test]
    fn test_data_and_blob_untouched() {
        let css = r#"a{background:url(data:image/png;base64,iVBORw0KGgo=)} b{background:url("blob:https://a.com/1")} c{mask:url(#m)}"#;
        assert_eq!(run(css), css);
    }

    #[test]
    fn test_idempotent() {
        let once = run("a{background:url(x.png)} @import 'y.css';");
        assert_eq!(run(&once), once);
    }
}
