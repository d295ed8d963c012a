use std::sync::Arc;

use {
    clawgate_auth::GatewayToken,
    clawgate_config::Settings,
    clawgate_onboarding::OnboardingPipeline,
    clawgate_supervisor::Supervisor,
    reqwest::redirect,
};

use crate::{
    error::Result,
    inject::{ResponseTransformer, TokenInjector},
};

/// Everything the handlers share. Built once at startup.
pub struct GatewayState {
    pub settings: Settings,
    pub supervisor: Supervisor,
    pub pipeline: OnboardingPipeline,
    /// Upstream base URL, `http://<internal_host>:<internal_port>`.
    pub target: String,
    /// Pass-through client. Redirects go back to the browser untouched.
    pub client: reqwest::Client,
    /// Server-side fetches of pages we rewrite. Follows redirects.
    pub page_client: reqwest::Client,
    /// `None` disables control UI rewriting.
    pub transformer: Option<Arc<dyn ResponseTransformer>>,
}

impl GatewayState {
    pub fn new(settings: Settings, pipeline: OnboardingPipeline) -> Result<Arc<Self>> {
        let supervisor = pipeline.supervisor().clone();
        let target = supervisor.config().target();
        let transformer: Option<Arc<dyn ResponseTransformer>> = if settings.inject_control_ui {
            Some(Arc::new(TokenInjector::new(supervisor.token())))
        } else {
            None
        };
        Ok(Arc::new(Self {
            client: reqwest::Client::builder()
                .redirect(redirect::Policy::none())
                .build()?,
            page_client: reqwest::Client::builder().build()?,
            settings,
            supervisor,
            pipeline,
            target,
            transformer,
        }))
    }

    pub fn token(&self) -> &GatewayToken {
        self.supervisor.token()
    }

    pub fn is_configured(&self) -> bool {
        self.supervisor.is_configured()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}
