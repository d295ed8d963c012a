//! Control UI rewriting.
//!
//! The gateway's browser UI asks the user to paste the gateway token. For
//! the few entry pages listed in [`CONTROL_UI_PATHS`] we fetch the page
//! ourselves and insert a script that hands the token to the UI, so a user
//! who passed `/setup` auth never sees the prompt.

use {
    axum::{
        http::{
            HeaderValue, Method, StatusCode, Uri,
            header::{AUTHORIZATION, CONTENT_TYPE},
        },
        response::{IntoResponse, Response},
    },
    clawgate_auth::GatewayToken,
    tracing::{debug, warn},
};

use crate::state::GatewayState;

/// Paths whose HTML responses may be rewritten.
pub const CONTROL_UI_PATHS: &[&str] = &["/", "/openclaw", "/openclaw/"];

/// Rewrites selected upstream HTML responses.
pub trait ResponseTransformer: Send + Sync {
    /// Whether a request for `path` should be fetched and rewritten.
    fn applies_to(&self, method: &Method, path: &str) -> bool;

    fn transform(&self, html: &str) -> String;
}

const TOKEN_PLACEHOLDER: &str = "__CLAWGATE_TOKEN__";

const SCRIPT_TEMPLATE: &str = r#"<script data-auto-token>
(function () {
  var TOKEN = __CLAWGATE_TOKEN__;
  var KEYS = ["gateway-token", "gatewayToken", "openclaw-token", "token",
              "oc:gateway-token", "oc:token", "openclaw-gateway-token"];
  try { KEYS.forEach(function (k) { localStorage.setItem(k, TOKEN); }); } catch (e) {}
  document.cookie = "token=" + encodeURIComponent(TOKEN) + "; path=/; SameSite=Lax";
  document.cookie = "gateway-token=" + encodeURIComponent(TOKEN) + "; path=/; SameSite=Lax";

  function looksLikeTokenInput(input) {
    if (input.value === "OPENCLAW_GATEWAY_TOKEN") return true;
    var label = input.id ? document.querySelector('label[for="' + input.id + '"]') : null;
    var context = [input.name, input.id, input.placeholder,
                   input.getAttribute("aria-label"), label && label.textContent,
                   input.parentElement && input.parentElement.textContent]
      .filter(Boolean).join(" ").toLowerCase();
    return context.indexOf("token") !== -1 &&
      !/session|url|password|websocket/.test(context);
  }

  var setValue = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, "value").set;
  var filled = false;

  function fill() {
    var changed = false;
    document.querySelectorAll("input").forEach(function (input) {
      if (input.value === TOKEN || !looksLikeTokenInput(input)) return;
      setValue.call(input, TOKEN);
      input.dispatchEvent(new Event("input", { bubbles: true }));
      input.dispatchEvent(new Event("change", { bubbles: true }));
      changed = true;
    });
    if (changed && !filled) {
      filled = true;
      setTimeout(function () {
        document.querySelectorAll("button").forEach(function (b) {
          if (/connect/i.test(b.textContent || "")) b.click();
        });
      }, 500);
    }
  }

  function start() {
    fill();
    var observer = new MutationObserver(fill);
    observer.observe(document.body, { childList: true, subtree: true });
    setTimeout(function () { observer.disconnect(); }, 20000);
  }

  if (document.readyState === "loading") {
    document.addEventListener("DOMContentLoaded", start);
  } else {
    start();
  }
})();
</script>"#;

/// Inserts the auto-token script into control UI pages.
pub struct TokenInjector {
    script: String,
}

impl TokenInjector {
    pub fn new(token: &GatewayToken) -> Self {
        Self {
            script: render_script(token.expose()),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

impl ResponseTransformer for TokenInjector {
    fn applies_to(&self, method: &Method, path: &str) -> bool {
        *method == Method::GET && CONTROL_UI_PATHS.contains(&path)
    }

    fn transform(&self, html: &str) -> String {
        inject_script(html, &self.script)
    }
}

/// The script with the token embedded as a JSON string literal. `<` is
/// escaped so the value can never close the script element.
fn render_script(token: &str) -> String {
    let literal = serde_json::Value::String(token.to_string())
        .to_string()
        .replace('<', "\\u003c");
    SCRIPT_TEMPLATE.replace(TOKEN_PLACEHOLDER, &literal)
}

/// Insert `script` before the first `</head>`, else before the first
/// `</body>`, else at the end.
pub fn inject_script(html: &str, script: &str) -> String {
    for marker in ["</head>", "</body>"] {
        if let Some(at) = html.find(marker) {
            let mut out = String::with_capacity(html.len() + script.len() + 1);
            out.push_str(&html[..at]);
            out.push_str(script);
            out.push('\n');
            out.push_str(&html[at..]);
            return out;
        }
    }
    format!("{html}{script}")
}

/// Fetch the upstream page for `uri` with the gateway credential and
/// rewrite it.
///
/// `None` means the page is not ours to touch (error, non-2xx, non-HTML)
/// and the caller should pass the request through unchanged.
pub async fn render_control_ui(
    gw: &GatewayState,
    transformer: &dyn ResponseTransformer,
    uri: &Uri,
) -> Option<Response> {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{}{path_and_query}", gw.target);

    let response = match gw
        .page_client
        .get(&url)
        .header(AUTHORIZATION, gw.token().bearer())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, %url, "control UI fetch failed, passing through");
            return None;
        },
    };
    if !response.status().is_success() {
        debug!(status = %response.status(), "control UI not OK, passing through");
        return None;
    }
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"));
    if !is_html {
        return None;
    }

    let html = match response.text().await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "control UI body read failed, passing through");
            return None;
        },
    };
    debug!(path = uri.path(), "injecting token into control UI");
    Some(
        (
            StatusCode::OK,
            [(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
            transformer.transform(&html),
        )
            .into_response(),
    )
}
