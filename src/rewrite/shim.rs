//! Client runtime shim.
//!
//! A static script template with one substituted configuration object. The
//! script reroutes script-initiated requests and navigations through the
//! proxy and leaves already proxied URLs alone.

use serde::Serialize;

use crate::config::CodecStrategy;
use crate::rewrite::context::RewriteContext;
use crate::target::{PathCodec, RouteKind};

/// Attribute carried by the injected `<script>`; its presence marks a
/// document as already shimmed.
pub const SHIM_MARKER: &str = "data-rewrite-proxy-shim";

const TEMPLATE: &str = include_str!("shim.js");
const PLACEHOLDER: &str = "__RP_CONFIG__";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShimConfig<'a> {
    proxy_base: &'a str,
    target_url: &'a str,
    strategy: CodecStrategy,
    session_id: Option<&'a str>,
    session_base: Option<&'a str>,
    navigation_prefix: &'a str,
    asset_prefix: &'a str,
}

/// Render the `<script>` element for one document.
pub fn render(ctx: &RewriteContext, codec: &PathCodec) -> String {
    let config = ShimConfig {
        proxy_base: &ctx.proxy_base,
        target_url: ctx.original_url.as_str(),
        strategy: codec.strategy(),
        session_id: ctx.session.as_ref().map(|s| s.id.as_str()),
        session_base: ctx.session.as_ref().map(|s| s.base.as_str()),
        navigation_prefix: codec.prefix(RouteKind::Navigation),
        asset_prefix: codec.prefix(RouteKind::Asset),
    };

    // Serializing plain strings and options cannot fail.
    let json = serde_json::to_string(&config)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");

    format!(
        "<script {SHIM_MARKER}>{}</script>",
        TEMPLATE.replacen(PLACEHOLDER, &json, 1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;
    use url::Url;

    #[test]
    fn test_render_substitutes_config() {
        let codec = PathCodec::new(&CodecConfig::default());
        let ctx = RewriteContext::new(
            Url::parse("https://a.com/x?q=</script>").unwrap(),
            "http://proxy.local",
            None,
        );
        let script = render(&ctx, &codec);

        assert!(script.starts_with("<script data-rewrite-proxy-shim>"));
        assert!(script.ends_with("</script>"));
        assert!(!script.contains(PLACEHOLDER));
        assert!(script.contains(r#""proxyBase":"http://proxy.local""#));
        assert!(script.contains(r#""strategy":"direct""#));
        assert!(script.contains(r#""navigationPrefix":"/proxy/""#));
        assert_eq!(script.matches("</script>").count(), 1);
    }
}
