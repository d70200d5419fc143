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

//! Charset Detector (spec §4.2): choose a decoder for a response body from
//! the `Content-Type` charset parameter or an HTML `<meta>` sniff, and
//! produce a decoded UTF-8 string.

use encoding_rs::Encoding;

const SNIFF_WINDOW: usize = 1024;

/// Detect the declared charset for a response body.
///
/// `content_type` is the raw `Content-Type` header value (may be absent).
/// `is_html` indicates whether a `<meta>` sniff should be attempted when the
/// header itself carries no `charset` parameter.
pub fn detect(content_type: Option<&str>, is_html: bool, body: &[u8]) -> &'static Encoding {
    if let Some(ct) = content_type {
        if let Some(label) = charset_param(ct) {
            if let Some(enc) = normalize_and_lookup(&label) {
                return enc;
            }
        }
    }

    if is_html {
        if let Some(label) = sniff_meta_charset(body) {
            if let Some(enc) = normalize_and_lookup(&label) {
                return enc;
            }
        }
    }

    encoding_rs::UTF_8
}

/// Decode `body` using the charset selected by [`detect`].
pub fn decode(content_type: Option<&str>, is_html: bool, body: &[u8]) -> String {
    let encoding = detect(content_type, is_html, body);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .map(|part| part.trim())
        .find_map(|part| part.strip_prefix("charset="))
        .map(|v| v.trim_matches('"').trim_matches('\'').to_string())
}

/// Scan the first [`SNIFF_WINDOW`] bytes (as ASCII) for
/// `<meta charset="X">` or `<meta http-equiv="Content-Type" content="...;
/// charset=X">`.
fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let window = &body[..body.len().min(SNIFF_WINDOW)];
    let text = window.iter().map(|&b| b as char).collect::<String>();
    let lower = text.to_ascii_lowercase();

    let mut search_from = 0;
    while let Some(offset) = lower[search_from..].find("<meta") {
        let start = search_from + offset;
        let end = lower[start..].find('>').map(|e| start + e + 1)?;
        let tag = &text[start..end.min(text.len())];
        let tag_lower = &lower[start..end.min(lower.len())];

        if let Some(charset) = extract_attr(tag, tag_lower, "charset=") {
            return Some(charset);
        }

        if tag_lower.contains("http-equiv=\"content-type\"") || tag_lower.contains("http-equiv='content-type'") {
            if let Some(content) = extract_attr(tag, tag_lower, "content=") {
                if let Some(idx) = content.to_ascii_lowercase().find("charset=") {
                    return Some(content[idx + "charset=".len()..].to_string());
                }
            }
        }

        search_from = end;
    }

    None
}

/// Extract the value of `attr="..."` (or unquoted) starting at `needle`
/// within a single tag's source text.
fn extract_attr(tag: &str, tag_lower: &str, needle: &str) -> Option<String> {
    let idx = tag_lower.find(needle)? + needle.len();
    let rest = &tag[idx..];
    let rest = rest.trim_start();
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else if let Some(stripped) = rest.strip_prefix('\'') {
        let end = stripped.find('\'')?;
        Some(stripped[..end].to_string())
    } else {
        let end = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/').unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

/// Normalize a raw label (lowercase, underscores→hyphens, known aliases)
/// and look it up. Falls back to `None` (caller defaults to UTF-8) rather
/// than failing when the label is unsupported.
fn normalize_and_lookup(label: &str) -> Option<&'static Encoding> {
    let mut normalized = label.trim().to_ascii_lowercase().replace('_', "-");
    normalized = match normalized.as_str() {
        "iso-8859-1" | "iso8859-1" => "latin1".to_string(),
        "windows-1252" => "cp1252".to_string(),
        "utf8" => "utf-8".to_string(),
        other => other.to_string(),
    };
    Encoding::for_label(normalized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_content_type_charset() {
        let enc = detect(Some("text/html; charset=iso-8859-1"), true, b"<html></html>");
        assert_eq!(enc.name(), "windows-1252");
    }

    #[test]
    fn sniffs_meta_charset_tag() {
        let html = br#"<html><head><meta charset="windows-1252"></head></html>"#;
        let enc = detect(None, true, html);
        assert_eq!(enc.name(), "windows-1252");
    }

    #[test]
    fn sniffs_meta_http_equiv() {
        let html = br#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=iso-8859-1"></head></html>"#;
        let enc = detect(None, true, html);
        assert_eq!(enc.name(), "windows-1252");
    }

    #[test]
    fn defaults_to_utf8_without_hints() {
        let enc = detect(None, true, b"<html></html>");
        assert_eq!(enc.name(), "UTF-8");
    }

    #[test]
    fn unsupported_label_falls_back_to_utf8() {
        let enc = detect(Some("text/html; charset=bogus-9000"), true, b"");
        assert_eq!(enc.name(), "UTF-8");
    }

    #[test]
    fn decodes_latin1_body_to_valid_utf8() {
        // "café" in Latin-1: c a f \xE9
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        let decoded = decode(Some("text/html; charset=iso-8859-1"), true, &bytes);
        assert_eq!(decoded, "café");
    }
}
