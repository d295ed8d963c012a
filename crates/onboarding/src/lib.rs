//! First-run onboarding of the wrapped gateway.
//!
//! Runs unattended from environment variables on startup, or on demand from
//! the setup API. Either way the same [`OnboardingPipeline`] drives the
//! gateway's `onboard` command, syncs its configuration, wires up messaging
//! channels and restarts it.

pub mod args;
pub mod channels;
pub mod contact;
pub mod env;
pub mod error;
pub mod pipeline;
pub mod providers;

pub use {
    args::{OnboardRequest, OnboardTarget, build_onboard_args},
    channels::ChannelMode,
    contact::{CONTACT_FILE, render_contact, write_contact},
    env::{Eligibility, validate_env, validate_env_with},
    error::{Context, Error, Result},
    pipeline::{IntegrationSecret, OnboardOutcome, OnboardReport, OnboardingPipeline, PipelineConfig},
    providers::{AuthGroup, auth_choice_for, auth_groups},
};
