//! Configuration synchronization.
//!
//! The gateway's configuration document is only ever mutated through the
//! gateway's own `config set` command. A [`SyncPlan`] is an ordered list of
//! such writes, each tagged with a [`Criticality`]. Best-effort steps may
//! fail and the run carries on; a critical step is read back from the
//! document and any difference aborts the run.

use {
    clawgate_auth::GatewayToken,
    clawgate_common::secret_prefix,
    clawgate_config::{ConfigDocument, lookup},
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::SyncError,
    runner::{CommandOutput, OpenclawCli},
};

/// Key holding the gateway's auth token.
pub const TOKEN_KEY: &str = "gateway.auth.token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure is logged and the run continues.
    BestEffort,
    /// Written value is verified against the document; a mismatch aborts.
    Critical,
}

/// One `config set` invocation.
#[derive(Debug, Clone)]
pub struct SyncStep {
    pub key: String,
    pub value: String,
    /// Pass `--json` so the gateway parses `value` as JSON.
    pub json: bool,
    pub criticality: Criticality,
    /// Never log `value`.
    pub secret: bool,
}

impl SyncStep {
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            json: false,
            criticality: Criticality::BestEffort,
            secret: false,
        }
    }

    pub fn json(key: impl Into<String>, value: &Value) -> Self {
        Self {
            json: true,
            ..Self::text(key, value.to_string())
        }
    }

    pub fn critical(mut self) -> Self {
        self.criticality = Criticality::Critical;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// CLI arguments for this step.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["config".to_string(), "set".to_string()];
        if self.json {
            args.push("--json".into());
        }
        args.push(self.key.clone());
        args.push(self.value.clone());
        args
    }

    fn display_value(&self) -> String {
        if self.secret {
            secret_prefix(&self.value)
        } else {
            self.value.clone()
        }
    }

    /// Whether `actual` (read back from the document) equals what this step
    /// wrote.
    fn is_reflected_by(&self, actual: Option<&Value>) -> bool {
        match actual {
            None => false,
            Some(actual) if self.json => serde_json::from_str::<Value>(&self.value)
                .map(|expected| &expected == actual)
                .unwrap_or(false),
            Some(Value::String(s)) => s.as_bytes() == self.value.as_bytes(),
            Some(_) => false,
        }
    }
}

/// Ordered list of sync steps.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    steps: Vec<SyncStep>,
}

impl SyncPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Just the critical token write. Runs before every gateway spawn.
    pub fn token_only(token: &GatewayToken) -> Self {
        Self::new().step(token_step(token))
    }

    /// The full post-onboarding plan: local token auth on loopback behind the
    /// wrapper's proxy.
    pub fn gateway(token: &GatewayToken, internal_port: u16) -> Self {
        Self::new()
            .step(SyncStep::text("gateway.mode", "local"))
            .step(SyncStep::text("gateway.auth.mode", "token"))
            .step(token_step(token))
            .step(SyncStep::text("gateway.bind", "loopback"))
            .step(SyncStep::text("gateway.port", internal_port.to_string()))
            .step(SyncStep::json(
                "gateway.controlUi.allowInsecureAuth",
                &json!(true),
            ))
            .step(SyncStep::json(
                "gateway.trustedProxies",
                &json!(["127.0.0.1", "::1"]),
            ))
    }

    pub fn step(mut self, step: SyncStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: SyncStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[SyncStep] {
        &self.steps
    }
}

fn token_step(token: &GatewayToken) -> SyncStep {
    SyncStep::text(TOKEN_KEY, token.expose())
        .critical()
        .secret()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Failed,
    /// Critical step written and read back unchanged.
    Verified,
}

/// What happened to one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub key: String,
    pub exit_code: i32,
    pub output: String,
    pub status: StepStatus,
}

/// Aggregated result of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub outcomes: Vec<StepOutcome>,
}

impl SyncReport {
    pub fn failed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Human-readable per-step lines for the setup log.
    pub fn summary(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| {
                let mut line = format!("[config] {} exit={} ({:?})", o.key, o.exit_code, o.status);
                let out = o.output.trim();
                if !out.is_empty() {
                    line.push('\n');
                    line.push_str(out);
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Executes [`SyncPlan`]s through the gateway CLI.
#[derive(Clone)]
pub struct ConfigSync {
    cli: OpenclawCli,
    document: ConfigDocument,
}

impl ConfigSync {
    pub fn new(cli: OpenclawCli, document: ConfigDocument) -> Self {
        Self { cli, document }
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn cli(&self) -> &OpenclawCli {
        &self.cli
    }

    /// Single `config set` write, not verified.
    pub async fn apply_patch(&self, key: &str, value: &str, as_json: bool) -> CommandOutput {
        let step = if as_json {
            SyncStep {
                json: true,
                ..SyncStep::text(key, value)
            }
        } else {
            SyncStep::text(key, value)
        };
        self.cli.run(step.args()).await
    }

    /// Run every step of `plan` in order.
    ///
    /// Best-effort failures are recorded in the report and the run goes on.
    /// A critical step whose value does not read back byte-for-byte from the
    /// document aborts with [`SyncError::TokenSyncMismatch`]; no later step
    /// runs.
    pub async fn run(&self, plan: &SyncPlan) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        for step in plan.steps() {
            let out = self.cli.run(step.args()).await;
            let mut status = if out.success() {
                StepStatus::Applied
            } else {
                StepStatus::Failed
            };

            if step.criticality == Criticality::Critical {
                let read = self.read_back(&step.key);
                if !step.is_reflected_by(read.as_ref().ok().and_then(Option::as_ref)) {
                    let actual_prefix = match &read {
                        Err(placeholder) => (*placeholder).to_string(),
                        Ok(Some(Value::String(s))) if step.secret => secret_prefix(s),
                        Ok(Some(v)) if !step.secret => v.to_string(),
                        Ok(Some(_)) => "(non-string)".into(),
                        Ok(None) => "(missing)".into(),
                    };
                    error!(
                        key = %step.key,
                        exit_code = out.code,
                        expected = %step.display_value(),
                        actual = %actual_prefix,
                        "critical config value did not persist"
                    );
                    return Err(SyncError::TokenSyncMismatch {
                        key: step.key.clone(),
                        expected_prefix: step.display_value(),
                        actual_prefix,
                    });
                }
                status = StepStatus::Verified;
                info!(key = %step.key, value = %step.display_value(), "verified critical config value");
            } else if out.success() {
                debug!(key = %step.key, value = %step.display_value(), "config set");
            } else {
                warn!(key = %step.key, exit_code = out.code, output = %out.output.trim(), "config set failed, continuing");
            }

            report.outcomes.push(StepOutcome {
                key: step.key.clone(),
                exit_code: out.code,
                output: out.output,
                status,
            });
        }

        Ok(report)
    }

    /// Value at `key` after a write. An unreadable document is reported as
    /// a mismatch, with a placeholder standing in for the value.
    fn read_back(&self, key: &str) -> Result<Option<Value>, &'static str> {
        match self.document.load() {
            Ok(doc) => Ok(doc.as_ref().and_then(|d| lookup(d, key)).cloned()),
            Err(e) => {
                warn!(key, error = %e, "configuration document unreadable on read-back");
                Err("(unreadable)")
            },
        }
    }

    /// Verify that the document's token equals `token`, without writing.
    pub fn verify_token(&self, token: &GatewayToken) -> Result<(), SyncError> {
        let step = token_step(token);
        let read = self.read_back(TOKEN_KEY);
        if step.is_reflected_by(read.as_ref().ok().and_then(Option::as_ref)) {
            Ok(())
        } else {
            Err(SyncError::TokenSyncMismatch {
                key: TOKEN_KEY.into(),
                expected_prefix: token.prefix(),
                actual_prefix: match read {
                    Err(placeholder) => placeholder.to_string(),
                    Ok(Some(Value::String(s))) => secret_prefix(&s),
                    Ok(Some(_)) => "(non-string)".into(),
                    Ok(None) => "(missing)".into(),
                },
            })
        }
    }
}
