//! Defines the read-only application state and the orchestration of one
//! notification: identify the producer, archive the raw payload, then
//! route to the repository-event or build-event pipeline.

use anyhow::{anyhow, bail, Result};
use envy::from_env;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{info, instrument};

use crate::archive;
use crate::build_event::BuildEvent;
use crate::client::Clients;
use crate::conf::Settings;
use crate::dispatch;
use crate::event::RepositoryEvent;
use crate::policy::{self, Decision};

/// Which service produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    CodeCommit,
    CodeBuild,
}

/// Identify the notification's producer from its `source` field. Payloads
/// from any other producer are a subscription mistake and an error.
pub fn identify_event_source(payload: &Value) -> Result<EventSource> {
    match payload.get("source").and_then(Value::as_str) {
        Some("aws.codecommit") => Ok(EventSource::CodeCommit),
        Some("aws.codebuild") => Ok(EventSource::CodeBuild),
        other => bail!("Unsupported notification source {:?}", other),
    }
}

/// An App is an initialized application state, derived from settings.
pub struct App {
    /// The original settings.
    pub settings: Settings,
}

impl App {
    /// Initialize an App instance given a settings struct. Consumes the
    /// settings struct.
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(App { settings })
    }

    /// Handle one notification payload.
    #[instrument(skip(self, payload, clients))]
    pub async fn handle(&self, payload: &Value, clients: &Clients) -> Result<()> {
        match identify_event_source(payload)? {
            EventSource::CodeCommit => self.handle_repository_event(payload, clients).await,
            EventSource::CodeBuild => self.handle_build_event(payload, clients).await,
        }
    }

    async fn handle_repository_event(&self, payload: &Value, clients: &Clients) -> Result<()> {
        let event = RepositoryEvent::from_notification(payload)?;
        archive::store(
            &self.settings,
            &clients.s3,
            "codecommit",
            event.repo_name(),
            event.repo_name(),
            payload,
        )
        .await?;
        info!(
            "Received {} event for repository {:?}",
            event.kind(),
            event.repo_name()
        );

        // Only the PR rules look at the commit message; don't fetch it
        // for events that are decided on kind alone.
        let commit_message = if event.is_pr_created_or_updated() {
            event.commit_message(&clients.codecommit).await?.to_string()
        } else {
            String::new()
        };
        match policy::decide(&event, &commit_message) {
            Decision::Trigger => {
                info!("Dispatching build jobs for repository {:?}", event.repo_name());
                dispatch::dispatch(&event, clients, &self.settings).await
            }
            Decision::Skip(reason) => {
                info!("Not dispatching a build: {}", reason);
                Ok(())
            }
        }
    }

    async fn handle_build_event(&self, payload: &Value, clients: &Clients) -> Result<()> {
        let event = BuildEvent::from_notification(payload)?;
        archive::store(
            &self.settings,
            &clients.s3,
            "codebuild",
            &event.project_name,
            event.build_uuid(),
            payload,
        )
        .await?;
        info!(
            "Received {:?} status for build {:?}",
            event.build_status,
            event.build_uuid()
        );
        dispatch::handle_build_completion(&event, clients).await
    }
}

/// Global App instance.
static CURRENT: OnceCell<App> = OnceCell::new();

/// Initialize the global App instance.
pub fn init() -> Result<()> {
    let settings = from_env()?;
    let app = App::new(settings)?;
    CURRENT
        .set(app)
        .map_err(|_| anyhow!("app::CURRENT was already initialized"))
}

/// Get the current App instance, or panic if it hasn't been
/// initialized.
pub fn current() -> &'static App {
    CURRENT.get().expect("app is not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifies_both_sources() {
        assert_eq!(
            identify_event_source(&json!({"source": "aws.codecommit"})).unwrap(),
            EventSource::CodeCommit
        );
        assert_eq!(
            identify_event_source(&json!({"source": "aws.codebuild"})).unwrap(),
            EventSource::CodeBuild
        );
    }

    #[test]
    fn rejects_other_sources() {
        assert!(identify_event_source(&json!({"source": "aws.s3"})).is_err());
        assert!(identify_event_source(&json!({})).is_err());
    }
}
