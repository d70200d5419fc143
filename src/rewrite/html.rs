/*
 * Copyright (C) 2025 Jakub Žitník
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

//! HTML Rewriter (spec §4.3): parses the document, strips hostile meta
//! tags, injects the referrer meta / `<base>` / client shim, and rewrites
//! every URL-bearing attribute named in the spec. Any failure degrades to
//! the original bytes unchanged.

use crate::codec;
use crate::context::RewriteContext;
use crate::rewrite::shim;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use kuchikiki::traits::*;
use kuchikiki::{parse_fragment, parse_html, NodeData, NodeRef};
use markup5ever::{local_name, namespace_url, ns, LocalName, QualName};
use std::panic;

/// Standard attributes that contain a single URL reference (spec §4.3 table).
const URL_ATTR_TAGS: &[(&str, &str)] = &[
    ("a", "href"),
    ("link", "href"),
    ("img", "src"),
    ("source", "src"),
    ("script", "src"),
    ("iframe", "src"),
    ("video", "src"),
    ("audio", "src"),
    ("form", "action"),
];

/// Extra attributes some variants rewrite unconditionally regardless of tag
/// name, per the spec's "any `[srcset]`" / "`[data-src]`, `[data-url]`" rows.
const GLOBAL_URL_ATTRS: &[&str] = &["data-src", "data-url"];

pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> String {
    let html_owned = html.to_string();
    let ctx = ctx.clone();
    panic::catch_unwind(move || rewrite_html_inner(&html_owned, &ctx))
        .unwrap_or_else(|_| html.to_string())
}

fn rewrite_html_inner(html: &str, ctx: &RewriteContext) -> String {
    let doc = parse_html().one(html);

    sanitize(&doc);
    walk(&doc, ctx);
    inject_head(&doc, ctx);

    let mut buf = Vec::new();
    let result = serialize(
        &mut buf,
        &doc,
        SerializeOpts {
            scripting_enabled: true,
            traversal_scope: TraversalScope::IncludeNode,
            create_missing_parent: false,
        },
    );

    match result {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| html.to_string()),
        Err(_) => html.to_string(),
    }
}

/// Remove hostile meta tags from `<head>` (spec §4.3 Sanitize).
fn sanitize(doc: &NodeRef) {
    let mut to_detach = Vec::new();

    for node in doc.inclusive_descendants() {
        if let NodeData::Element(ref el) = *node.data() {
            if el.name.local.to_string() != "meta" {
                continue;
            }
            let attrs = el.attributes.borrow();
            let http_equiv = attrs
                .map
                .get(&attr_key("http-equiv"))
                .map(|a| a.value.to_ascii_lowercase())
                .unwrap_or_default();
            let name = attrs
                .map
                .get(&attr_key("name"))
                .map(|a| a.value.to_ascii_lowercase())
                .unwrap_or_default();

            if http_equiv == "content-security-policy"
                || http_equiv == "x-frame-options"
                || name == "referrer"
            {
                to_detach.push(node.clone());
            }
        }
    }

    for node in to_detach {
        node.detach();
    }
}

fn walk(node: &NodeRef, ctx: &RewriteContext) {
    if let NodeData::Element(ref el) = *node.data() {
        let tag = el.name.local.to_string().to_ascii_lowercase();
        let mut attrs = el.attributes.borrow_mut();

        for &(el_tag, attr) in URL_ATTR_TAGS {
            if el_tag != tag {
                continue;
            }
            rewrite_attr(&mut attrs, attr, ctx);
        }

        if attrs.map.contains_key(&attr_key("srcset")) {
            rewrite_srcset(&mut attrs, "srcset", ctx);
        }

        for &attr in GLOBAL_URL_ATTRS {
            rewrite_attr(&mut attrs, attr, ctx);
        }
    }

    for child in node.children() {
        walk(&child, ctx);
    }
}

fn rewrite_attr(attrs: &mut kuchikiki::Attributes, attr: &str, ctx: &RewriteContext) {
    let key = attr_key(attr);
    let current = attrs.map.get(&key).map(|a| a.value.clone());
    if let Some(value) = current {
        let rewritten = codec::rewrite_reference(&value, &ctx.upstream, &ctx.proxy_base);
        if let Some(entry) = attrs.map.get_mut(&key) {
            entry.value = rewritten.into();
        }
    }
}

/// Rewrite a `srcset` value: split on `,`, trim, rewrite only the leftmost
/// (URL) token of each descriptor, rejoin (spec §4.3 table row).
fn rewrite_srcset(attrs: &mut kuchikiki::Attributes, attr: &str, ctx: &RewriteContext) {
    let key = attr_key(attr);
    let current = attrs.map.get(&key).map(|a| a.value.clone());
    let Some(value) = current else { return };

    let rewritten = value
        .split(',')
        .map(|entry| {
            let trimmed = entry.trim();
            let mut parts = trimmed.splitn(2, char::is_whitespace);
            let url = parts.next().unwrap_or("");
            let descriptor = parts.next();
            let encoded = codec::rewrite_reference(url, &ctx.upstream, &ctx.proxy_base);
            match descriptor {
                Some(d) => format!("{encoded} {d}"),
                None => encoded,
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    if let Some(entry) = attrs.map.get_mut(&key) {
        entry.value = rewritten.into();
    }
}

fn attr_key(name: &str) -> kuchikiki::ExpandedName {
    kuchikiki::ExpandedName::new(ns!(), LocalName::from(name))
}

/// Prepend, in order: referrer meta, `<base>`, client shim (spec §4.3
/// Inject). These must precede every other `<head>` element so the browser
/// parses them first (spec §5 Ordering).
fn inject_head(doc: &NodeRef, ctx: &RewriteContext) {
    let head = doc.inclusive_descendants().find(|node| {
        matches!(node.data(), NodeData::Element(el) if el.name.local.to_string() == "head")
    });

    let Some(head) = head else { return };

    let scheme = ctx.upstream.scheme();
    let authority = ctx.upstream.host_str().map(|h| {
        match ctx.upstream.port() {
            Some(p) => format!("{h}:{p}"),
            None => h.to_string(),
        }
    }).unwrap_or_default();

    let base_href = format!(
        "{}/proxy/{}/{}/",
        ctx.proxy_base.as_str(),
        scheme,
        authority
    );

    let markup = format!(
        r#"<meta name="referrer" content="unsafe-url"><base href="{}">{}"#,
        html_escape_attr(&base_href),
        shim::render(ctx.proxy_base.as_str(), scheme, &authority),
    );

    let fragment = parse_fragment(
        QualName::new(None, ns!(html), local_name!("body")),
        Vec::new(),
    )
    .one(markup);
    let children: Vec<NodeRef> = fragment.children().collect();

    match head.children().next() {
        Some(first) => {
            for child in children {
                first.insert_before(child);
            }
        }
        None => {
            for child in children {
                head.append(child);
            }
        }
    }
}

fn html_escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProxyBase;
    use axum::http::{HeaderMap, HeaderValue};
    use url::Url;

    fn ctx() -> RewriteContext {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("p"));
        let proxy_base = ProxyBase::from_headers(&headers, 3001);
        RewriteContext::new(Url::parse("https://example.com/").unwrap(), proxy_base)
    }

    #[test]
    fn rewrites_anchor_href() {
        let html = r#"<html><head></head><body><a href="/a">x</a></body></html>"#;
        let result = rewrite_html(html, &ctx());
        assert!(result.contains(r#"href="http://p/proxy/https/example.com/a""#));
    }

    #[test]
    fn injects_referrer_meta_and_shim() {
        let html = "<html><head></head><body></body></html>";
        let result = rewrite_html(html, &ctx());
        assert!(result.contains(r#"<meta name="referrer" content="unsafe-url">"#));
        assert!(result.contains("<base href="));
        assert!(result.contains("PROXY_BASE"));
    }

    #[test]
    fn strips_csp_meta() {
        let html = r#"<html><head><meta http-equiv="Content-Security-Policy" content="default-src 'none'"></head><body></body></html>"#;
        let result = rewrite_html(html, &ctx());
        assert!(!result.to_ascii_lowercase().contains("content-security-policy"));
    }

    #[test]
    fn strips_referrer_meta_before_reinjecting() {
        let html = r#"<html><head><meta name="referrer" content="no-referrer"></head><body></body></html>"#;
        let result = rewrite_html(html, &ctx());
        assert!(!result.contains("no-referrer"));
        assert!(result.contains("unsafe-url"));
    }

    #[test]
    fn rewrites_srcset_leftmost_token_only() {
        let html = r#"<html><head></head><body><img srcset="/a 1x, /b 2x"></body></html>"#;
        let result = rewrite_html(html, &ctx());
        assert!(result.contains("http://p/proxy/https/example.com/a 1x"));
        assert!(result.contains("http://p/proxy/https/example.com/b 2x"));
    }

    #[test]
    fn leaves_javascript_href_unchanged() {
        let html = r#"<html><head></head><body><a href="javascript:void(0)">x</a></body></html>"#;
        let result = rewrite_html(html, &ctx());
        assert!(result.contains(r#"href="javascript:void(0)""#));
    }

    #[test]
    fn malformed_input_degrades_to_original() {
        let html = "<html><head><<<>not really html";
        let result = rewrite_html(html, &ctx());
        assert!(!result.is_empty());
    }
}
