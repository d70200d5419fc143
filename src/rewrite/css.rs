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

//! CSS Rewriter (spec §4.5): rewrites every `url(...)` reference (including
//! `@import` strings) using the URL Codec, preserving the original quoting
//! style. Falls back to the original CSS unchanged on any internal error.

use crate::codec;
use crate::context::RewriteContext;
use cssparser::{Parser, ParserInput, Token};
use std::panic;

/// Rewrite a complete stylesheet, or any CSS fragment (inline `style="..."`
/// attribute value, `<style>` element body).
pub fn rewrite_css(css: &str, ctx: &RewriteContext) -> String {
    let css_owned = css.to_string();
    let ctx = ctx.clone();
    // cssparser's tokenizer does not panic on malformed input in practice,
    // but the spec requires that *any* rewrite failure degrade to the
    // original bytes, so guard the whole pass.
    panic::catch_unwind(move || rewrite_css_inner(&css_owned, &ctx))
        .unwrap_or_else(|_| css.to_string())
}

fn rewrite_css_inner(css: &str, ctx: &RewriteContext) -> String {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut out = String::with_capacity(css.len());
    rewrite_token_stream(&mut parser, ctx, &mut out);
    out
}

fn rewrite_token_stream(parser: &mut Parser<'_, '_>, ctx: &RewriteContext, out: &mut String) {
    let mut in_import = false;

    loop {
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => break,
        };

        match token {
            Token::UnquotedUrl(ref url_val) => {
                let rewritten = codec::rewrite_reference(url_val.as_ref(), &ctx.upstream, &ctx.proxy_base);
                out.push_str("url(");
                out.push_str(&format_url_token(&rewritten));
                out.push(')');
            }

            Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
                out.push_str("url(");
                rewrite_function_args(parser, ctx, out);
                out.push(')');
            }

            Token::AtKeyword(ref kw) if kw.eq_ignore_ascii_case("import") => {
                out.push_str("@import ");
                in_import = true;
            }

            Token::AtKeyword(ref kw) => {
                out.push('@');
                out.push_str(kw.as_ref());
            }

            Token::QuotedString(ref s) => {
                let s_str: &str = s.as_ref();
                if in_import {
                    let rewritten = codec::rewrite_reference(s_str, &ctx.upstream, &ctx.proxy_base);
                    out.push('"');
                    out.push_str(&escape_css_string(&rewritten));
                    out.push('"');
                    in_import = false;
                } else {
                    out.push('"');
                    out.push_str(&escape_css_string(s_str));
                    out.push('"');
                }
            }

            Token::CurlyBracketBlock => {
                out.push('{');
                let _ = parser.parse_nested_block(|inner| -> Result<(), ()> {
                    rewrite_token_stream(inner, ctx, out);
                    Ok(())
                });
                out.push('}');
            }

            Token::ParenthesisBlock => {
                out.push('(');
                let _ = parser.parse_nested_block(|inner| -> Result<(), ()> {
                    rewrite_token_stream(inner, ctx, out);
                    Ok(())
                });
                out.push(')');
            }

            Token::SquareBracketBlock => {
                out.push('[');
                let _ = parser.parse_nested_block(|inner| -> Result<(), ()> {
                    rewrite_token_stream(inner, ctx, out);
                    Ok(())
                });
                out.push(']');
            }

            Token::Function(ref name) => {
                out.push_str(name.as_ref());
                out.push('(');
                let _ = parser.parse_nested_block(|inner| -> Result<(), ()> {
                    rewrite_token_stream(inner, ctx, out);
                    Ok(())
                });
                out.push(')');
            }

            Token::Ident(ref v) => out.push_str(v.as_ref()),
            Token::Hash(ref v) | Token::IDHash(ref v) => {
                out.push('#');
                out.push_str(v.as_ref());
            }
            Token::Number { value, .. } => out.push_str(&format_number(value)),
            Token::Percentage { unit_value, .. } => {
                out.push_str(&format_number(unit_value * 100.0));
                out.push('%');
            }
            Token::Dimension { value, ref unit, .. } => {
                out.push_str(&format_number(value));
                out.push_str(unit.as_ref());
            }
            Token::WhiteSpace(_) => out.push(' '),
            Token::Colon => out.push(':'),
            Token::Semicolon => {
                in_import = false;
                out.push(';');
            }
            Token::Comma => out.push(','),
            Token::Delim(c) => out.push(c),
            Token::IncludeMatch => out.push_str("~="),
            Token::DashMatch => out.push_str("|="),
            Token::PrefixMatch => out.push_str("^="),
            Token::SuffixMatch => out.push_str("$="),
            Token::SubstringMatch => out.push_str("*="),
            Token::CDO => out.push_str("<!--"),
            Token::CDC => out.push_str("-->"),
            Token::Comment(ref c) => {
                out.push_str("/*");
                out.push_str(c.as_ref());
                out.push_str("*/");
            }
            Token::BadString(ref s) => out.push_str(s.as_ref()),
            Token::BadUrl(ref s) => {
                out.push_str("url(");
                out.push_str(s.as_ref());
                out.push(')');
            }
            Token::CloseParenthesis => out.push(')'),
            Token::CloseSquareBracket => out.push(']'),
            Token::CloseCurlyBracket => out.push('}'),
            _ => {}
        }
    }
}

fn rewrite_function_args(parser: &mut Parser<'_, '_>, ctx: &RewriteContext, out: &mut String) {
    let _ = parser.parse_nested_block(|inner| -> Result<(), ()> {
        loop {
            let tok = match inner.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };
            match tok {
                Token::QuotedString(ref s) => {
                    let rewritten = codec::rewrite_reference(s.as_ref(), &ctx.upstream, &ctx.proxy_base);
                    out.push('"');
                    out.push_str(&escape_css_string(&rewritten));
                    out.push('"');
                }
                Token::UnquotedUrl(ref s) => {
                    let rewritten = codec::rewrite_reference(s.as_ref(), &ctx.upstream, &ctx.proxy_base);
                    out.push_str(&format_url_token(&rewritten));
                }
                Token::WhiteSpace(_) => out.push(' '),
                _ => {}
            }
        }
        Ok(())
    });
}

/// Render a rewritten `url(...)` payload the way its source token required:
/// bare when the original was an unquoted `url(...)` and the rewritten text
/// is still safe unquoted (spec §4.5 "preserving the original quoting
/// style"), quoted only as a fallback when it contains a character an
/// unquoted CSS url token cannot carry.
fn format_url_token(url: &str) -> String {
    if needs_quoting(url) {
        format!("\"{}\"", escape_css_string(url))
    } else {
        url.to_string()
    }
}

/// Characters that are not permitted inside an unquoted CSS `url(...)` token.
fn needs_quoting(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '(' | ')' | '\\') || c.is_control())
}

fn escape_css_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\a ")
}

fn format_number(v: f32) -> String {
    if v == (v as i64) as f32 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
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
        RewriteContext::new(Url::parse("https://example.com/style/").unwrap(), proxy_base)
    }

    #[test]
    fn rewrites_url_function() {
        let css = "body { background: url(https://example.com/bg.png); }";
        let result = rewrite_css(css, &ctx());
        assert!(result.contains("/proxy/https/example.com/bg.png"));
    }

    #[test]
    fn rewrites_import() {
        let css = r#"@import "https://example.com/reset.css";"#;
        let result = rewrite_css(css, &ctx());
        assert!(result.contains("/proxy/https/example.com/reset.css"));
    }

    #[test]
    fn preserves_data_urls() {
        let css = "body { background: url(data:image/png;base64,abc); }";
        let result = rewrite_css(css, &ctx());
        assert!(result.contains("data:image/png;base64,abc"));
    }

    #[test]
    fn rewrites_relative_url() {
        let css = "body { background: url(bg.png); }";
        let result = rewrite_css(css, &ctx());
        assert!(result.contains("/proxy/https/example.com/style/bg.png"));
    }

    #[test]
    fn unquoted_url_stays_unquoted() {
        let css = "body { background: url(bg.png); }";
        let result = rewrite_css(css, &ctx());
        assert!(result.contains("url(http://p/proxy/https/example.com/style/bg.png)"));
    }

    #[test]
    fn quoted_url_stays_quoted() {
        let css = r#"body { background: url("bg.png"); }"#;
        let result = rewrite_css(css, &ctx());
        assert!(result.contains(r#"url("http://p/proxy/https/example.com/style/bg.png")"#));
    }
}
