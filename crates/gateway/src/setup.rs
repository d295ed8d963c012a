//! The `/setup` namespace: onboarding UI and API.
//!
//! Guarded by HTTP Basic auth against `SETUP_PASSWORD`, except the health
//! check and the loopback-only integration token endpoint.

use std::net::SocketAddr;

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{ConnectInfo, Request, State},
        http::{
            HeaderMap, StatusCode,
            header::{CONTENT_TYPE, WWW_AUTHENTICATE},
        },
        middleware::{self, Next},
        response::{Html, IntoResponse, Response},
        routing::{get, post},
    },
    clawgate_auth::{BasicAuthOutcome, SETUP_REALM, TokenSource, check_basic_auth, is_local_connection},
    clawgate_onboarding::{ChannelMode, Error as OnboardError, OnboardOutcome, OnboardRequest, auth_groups},
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::{info, warn},
};

use crate::{export::export_backup, state::AppState};

const ALREADY_RUNNING: &str = "Onboarding is already in progress. Please wait.";
const ALREADY_CONFIGURED: &str =
    "Already configured.\nUse Reset setup if you want to rerun onboarding.\n";

pub fn setup_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/setup", get(setup_page))
        .route("/setup/", get(setup_page))
        .route("/setup/api/status", get(status))
        .route("/setup/api/debug", get(debug_info))
        .route("/setup/api/run", post(run_onboarding))
        .route("/setup/api/pairing/approve", post(approve_pairing))
        .route("/setup/api/reset", post(reset))
        .route("/setup/export", get(export_backup))
        .route_layer(middleware::from_fn_with_state(state, require_setup_auth));

    Router::new()
        .route("/setup/healthz", get(healthz))
        .route("/setup/api/senpi-token", post(rotate_integration_token))
        .merge(protected)
}

/// Basic auth against the setup password. The username is ignored.
pub async fn require_setup_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let password = state.gateway.settings.setup_password();
    match check_basic_auth(request.headers(), password) {
        BasicAuthOutcome::Granted => next.run(request).await,
        BasicAuthOutcome::NotConfigured => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            "SETUP_PASSWORD is not set. Set it in the deployment variables before using /setup.",
        )
            .into_response(),
        BasicAuthOutcome::Denied => (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, format!("Basic realm=\"{SETUP_REALM}\""))],
            "Auth required",
        )
            .into_response(),
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn setup_page() -> Html<&'static str> {
    Html(SETUP_PAGE)
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let gw = &state.gateway;
    let cli = gw.supervisor.sync().cli();
    let (version, help) = tokio::join!(cli.version(), cli.channels_add_help());
    Json(json!({
        "configured": gw.is_configured(),
        "gatewayTarget": gw.target,
        "openclawVersion": version.output,
        "channelsAddHelp": help.output,
        "onboarding": gw.pipeline.is_running(),
        "authGroups": auth_groups(),
    }))
}

async fn debug_info(State(state): State<AppState>) -> Json<Value> {
    let gw = &state.gateway;
    let settings = &gw.settings;
    let cli = gw.supervisor.sync().cli();
    let (version, help, supervisor) = tokio::join!(
        cli.version(),
        cli.channels_add_help(),
        gw.supervisor.status()
    );
    Json(json!({
        "wrapper": {
            "port": settings.port,
            "stateDir": settings.state_dir(),
            "workspaceDir": settings.workspace_dir(),
            "configPath": settings.config_path(),
            "gatewayTokenFromEnv": gw.token().source() == TokenSource::Env,
            "gatewayTokenPersisted": settings.token_path().exists(),
            "onboarding": gw.pipeline.is_running(),
            "supervisor": supervisor,
        },
        "openclaw": {
            "entry": cli.entry(),
            "node": cli.node(),
            "version": version.output,
            "channelsAddHelpIncludesTelegram": help.output.contains("telegram"),
        },
    }))
}

fn run_response(status: StatusCode, ok: bool, output: impl Into<String>) -> Response {
    (status, Json(json!({ "ok": ok, "output": output.into() }))).into_response()
}

async fn run_onboarding(State(state): State<AppState>, body: Bytes) -> Response {
    let gw = &state.gateway;

    let request: OnboardRequest = if body.iter().all(u8::is_ascii_whitespace) {
        OnboardRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return run_response(StatusCode::BAD_REQUEST, false, format!("Invalid request body: {e}"));
            },
        }
    };

    if gw.pipeline.is_running() {
        return run_response(StatusCode::CONFLICT, false, ALREADY_RUNNING);
    }

    if gw.is_configured() {
        return match gw.supervisor.ensure_running().await {
            Ok(()) => run_response(StatusCode::OK, true, ALREADY_CONFIGURED),
            Err(e) => run_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                format!("Internal error: {e}"),
            ),
        };
    }

    match gw.pipeline.run(&request, ChannelMode::Setup).await {
        Ok(OnboardOutcome::Completed(report)) => run_response(StatusCode::OK, true, report.output),
        Ok(OnboardOutcome::AlreadyRunning) => {
            run_response(StatusCode::CONFLICT, false, ALREADY_RUNNING)
        },
        Err(OnboardError::OnboardFailure { exit_code, output }) => run_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("{output}\n[onboard] exit={exit_code}\n"),
        ),
        Err(e) => run_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("Internal error: {e}"),
        ),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PairingRequest {
    channel: Option<Value>,
    code: Option<Value>,
}

/// Strings and numbers are accepted; anything blank counts as missing.
fn field_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

async fn approve_pairing(State(state): State<AppState>, body: Bytes) -> Response {
    let request: PairingRequest = serde_json::from_slice(&body).unwrap_or_default();
    let (Some(channel), Some(code)) = (
        field_text(request.channel.as_ref()),
        field_text(request.code.as_ref()),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "Missing channel or code" })),
        )
            .into_response();
    };

    info!(%channel, "approving pairing request");
    let out = state
        .gateway
        .supervisor
        .sync()
        .cli()
        .run(["pairing".to_string(), "approve".to_string(), channel, code])
        .await;
    let status = if out.success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    run_response(status, out.success(), out.output)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenRequest {
    token: Option<Value>,
}

/// Replace the MCP integration token. Only processes inside the container
/// may call this; it carries no setup credentials.
async fn rotate_integration_token(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_local_connection(&headers, remote, false) {
        warn!(%remote, "integration token update refused, not a local connection");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "ok": false, "error": "Localhost only" })),
        )
            .into_response();
    }

    let request: TokenRequest = serde_json::from_slice(&body).unwrap_or_default();
    let token = match request.token {
        Some(Value::String(token)) if !token.trim().is_empty() => token.trim().to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "Missing or empty token" })),
            )
                .into_response();
        },
    };

    match state.gateway.pipeline.rotate_integration_token(&token).await {
        Ok(()) => Json(json!({
            "ok": true,
            "message": "Token updated. mcp-remote processes killed; the next MCP call will use the new token.",
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "integration token update failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        },
    }
}

/// Delete the configuration document so onboarding can run again. The
/// running gateway, state directory and workspace are left alone.
async fn reset(State(state): State<AppState>) -> Response {
    let document = state.gateway.supervisor.document();
    match document.remove() {
        Ok(removed) => {
            info!(removed, path = %document.path().display(), "configuration reset");
            (
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                "OK - deleted config file. You can rerun setup now.",
            )
                .into_response()
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            e.to_string(),
        )
            .into_response(),
    }
}

const SETUP_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Openclaw Setup</title>
<style>
  body { font-family: system-ui, sans-serif; background: #050810; color: #e8eaf0; max-width: 760px; margin: 2rem auto; padding: 0 1rem; }
  fieldset { border: 1px solid #2a3142; border-radius: 8px; margin-bottom: 1rem; }
  label { display: block; margin: .5rem 0 .2rem; }
  input, select { width: 100%; padding: .45rem; background: #0d1220; color: inherit; border: 1px solid #2a3142; border-radius: 4px; }
  button { margin: .5rem .5rem 0 0; padding: .5rem 1rem; }
  pre { background: #0d1220; padding: 1rem; white-space: pre-wrap; border-radius: 8px; min-height: 3rem; }
</style>
</head>
<body>
<h1>Openclaw Setup</h1>
<p id="status">Loading status...</p>

<fieldset>
  <legend>Model provider</legend>
  <label for="authGroup">Provider</label>
  <select id="authGroup"></select>
  <label for="authChoice">Method</label>
  <select id="authChoice"></select>
  <label for="authSecret">Key or token</label>
  <input id="authSecret" type="password" autocomplete="off">
</fieldset>

<fieldset>
  <legend>Channels (optional)</legend>
  <label for="telegramToken">Telegram bot token</label>
  <input id="telegramToken" autocomplete="off">
  <label for="discordToken">Discord bot token</label>
  <input id="discordToken" autocomplete="off">
  <label for="slackBotToken">Slack bot token</label>
  <input id="slackBotToken" autocomplete="off">
  <label for="slackAppToken">Slack app token</label>
  <input id="slackAppToken" autocomplete="off">
</fieldset>

<button id="run">Run setup</button>
<button id="reset">Reset setup</button>
<a href="/setup/export"><button type="button">Download backup</button></a>
<a href="/openclaw"><button type="button">Open control UI</button></a>

<fieldset>
  <legend>Approve pairing</legend>
  <label for="pairChannel">Channel</label>
  <input id="pairChannel" value="telegram">
  <label for="pairCode">Code</label>
  <input id="pairCode">
  <button id="approve">Approve</button>
</fieldset>

<pre id="log"></pre>

<script>
(function () {
  var $ = function (id) { return document.getElementById(id); };
  var groups = [];
  function log(text) { $("log").textContent = text; }

  function fillChoices() {
    var group = groups.find(function (g) { return g.value === $("authGroup").value; });
    $("authChoice").innerHTML = "";
    (group ? group.options : []).forEach(function (o) {
      var opt = document.createElement("option");
      opt.value = o.value; opt.textContent = o.label;
      $("authChoice").appendChild(opt);
    });
  }

  fetch("/setup/api/status").then(function (r) { return r.json(); }).then(function (s) {
    $("status").textContent = (s.configured ? "Configured" : "Not configured") +
      " | openclaw " + (s.openclawVersion || "unknown") +
      (s.onboarding ? " | onboarding in progress" : "");
    groups = s.authGroups || [];
    groups.forEach(function (g) {
      var opt = document.createElement("option");
      opt.value = g.value; opt.textContent = g.label + (g.hint ? " (" + g.hint + ")" : "");
      $("authGroup").appendChild(opt);
    });
    fillChoices();
  }).catch(function (e) { $("status").textContent = "Status failed: " + e; });

  $("authGroup").addEventListener("change", fillChoices);

  function post(url, body) {
    return fetch(url, {
      method: "POST",
      headers: { "content-type": "application/json" },
      body: JSON.stringify(body || {})
    });
  }

  $("run").addEventListener("click", function () {
    log("Running onboarding...");
    post("/setup/api/run", {
      flow: "quickstart",
      authChoice: $("authChoice").value,
      authSecret: $("authSecret").value,
      telegramToken: $("telegramToken").value,
      discordToken: $("discordToken").value,
      slackBotToken: $("slackBotToken").value,
      slackAppToken: $("slackAppToken").value
    }).then(function (r) { return r.json(); })
      .then(function (j) { log((j.ok ? "OK\n" : "FAILED\n") + (j.output || "")); })
      .catch(function (e) { log("Request failed: " + e); });
  });

  $("reset").addEventListener("click", function () {
    if (!confirm("Delete the gateway configuration?")) return;
    post("/setup/api/reset").then(function (r) { return r.text(); }).then(log);
  });

  $("approve").addEventListener("click", function () {
    post("/setup/api/pairing/approve", { channel: $("pairChannel").value, code: $("pairCode").value })
      .then(function (r) { return r.json(); })
      .then(function (j) { log(j.output || j.error || ""); });
  });
})();
</script>
</body>
</html>
"#;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn pairing_fields_accept_numbers() {
        let request: PairingRequest =
            serde_json::from_str(r#"{"channel":"telegram","code":123456}"#).unwrap();
        assert_eq!(field_text(request.channel.as_ref()).as_deref(), Some("telegram"));
        assert_eq!(field_text(request.code.as_ref()).as_deref(), Some("123456"));
    }

    #[test]
    fn blank_pairing_fields_are_missing() {
        assert!(field_text(Some(&json!("  "))).is_none());
        assert!(field_text(Some(&json!(null))).is_none());
        assert!(field_text(None).is_none());
    }
}
