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

//! Client Shim (spec §4.4): a small script emitted into `<head>`,
//! parameterized with the proxy base, scheme, and authority, that
//! intercepts `fetch`, `XMLHttpRequest`, form submission, and DOM mutations
//! so dynamically constructed URLs are also kept in-proxy.
//!
//! The shim's URL-rewriting logic mirrors the URL Codec (§4.1) exactly: the
//! same short-circuit schemes, the same path-form encoding.

/// Render the client shim as a `<script>` element ready for injection, with
/// the three runtime literals baked in.
pub fn render(proxy_base: &str, scheme: &str, authority: &str) -> String {
    format!(
        r#"<script>(function() {{
  var PROXY_BASE = {proxy_base};
  var UPSTREAM_SCHEME = {scheme};
  var UPSTREAM_AUTHORITY = {authority};
  var SHORT_CIRCUIT = ["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

  function isShortCircuit(raw) {{
    if (!raw || raw === "#") return true;
    var lower = String(raw).trim().toLowerCase();
    if (lower === "#") return true;
    for (var i = 0; i < SHORT_CIRCUIT.length; i++) {{
      if (lower.indexOf(SHORT_CIRCUIT[i]) === 0) return true;
    }}
    return false;
  }}

  function toProxyUrl(raw) {{
    if (isShortCircuit(raw)) return raw;
    var absolute;
    try {{
      absolute = new URL(raw, UPSTREAM_SCHEME + "://" + UPSTREAM_AUTHORITY + location.pathname).href;
    }} catch (e) {{
      return raw;
    }}
    var parsed;
    try {{
      parsed = new URL(absolute);
    }} catch (e) {{
      return raw;
    }}
    if (parsed.protocol !== "http:" && parsed.protocol !== "https:") return raw;
    var scheme = parsed.protocol.slice(0, -1);
    return PROXY_BASE + "/proxy/" + scheme + "/" + parsed.host + parsed.pathname + parsed.search + parsed.hash;
  }}

  window.__proxyRewriteUrl = toProxyUrl;

  var nativeFetch = window.fetch;
  if (nativeFetch) {{
    window.fetch = function(input, init) {{
      init = init || {{}};
      if (init.credentials === undefined) init.credentials = "include";
      if (typeof input === "string") {{
        return nativeFetch.call(window, toProxyUrl(input), init);
      }}
      if (input && input.url) {{
        return nativeFetch.call(window, toProxyUrl(input.url), init);
      }}
      return nativeFetch.call(window, input, init);
    }};
  }}

  var nativeOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function(method, url) {{
    var rest = Array.prototype.slice.call(arguments, 2);
    return nativeOpen.apply(this, [method, toProxyUrl(url)].concat(rest));
  }};

  var nativeSend = XMLHttpRequest.prototype.send;
  XMLHttpRequest.prototype.send = function() {{
    this.withCredentials = true;
    return nativeSend.apply(this, arguments);
  }};

  document.addEventListener("submit", function(event) {{
    var form = event.target;
    if (!form || form.tagName !== "FORM") return;
    var action = form.getAttribute("action");
    if (!action) {{
      action = location.pathname + location.search;
    }}
    form.setAttribute("action", toProxyUrl(action));
  }}, true);

  var observer = new MutationObserver(function(mutations) {{
    mutations.forEach(function(mutation) {{
      mutation.addedNodes.forEach(function(node) {{
        if (!node.tagName) return;
        var tag = node.tagName.toLowerCase();
        if (tag === "script" || tag === "img") {{
          var src = node.getAttribute("src");
          if (src && src.indexOf(PROXY_BASE) !== 0) {{
            node.setAttribute("src", toProxyUrl(src));
          }}
        }} else if (tag === "link") {{
          var href = node.getAttribute("href");
          if (href && href.indexOf(PROXY_BASE) !== 0) {{
            node.setAttribute("href", toProxyUrl(href));
          }}
        }}
      }});
    }});
  }});
  observer.observe(document.documentElement, {{ childList: true, subtree: true }});
}})();</script>"#,
        proxy_base = serde_json::to_string(proxy_base).unwrap_or_else(|_| "\"\"".to_string()),
        scheme = serde_json::to_string(scheme).unwrap_or_else(|_| "\"\"".to_string()),
        authority = serde_json::to_string(authority).unwrap_or_else(|_| "\"\"".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_the_three_literals() {
        let rendered = render("http://p", "https", "example.com");
        assert!(rendered.contains("\"http://p\""));
        assert!(rendered.contains("\"https\""));
        assert!(rendered.contains("\"example.com\""));
    }

    #[test]
    fn is_a_single_script_element() {
        let rendered = render("http://p", "https", "example.com");
        assert!(rendered.starts_with("<script>"));
        assert!(rendered.ends_with("</script>"));
    }
}
