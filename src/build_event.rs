//! Defines the build-state notification record. CodeBuild reports state
//! changes through the same notification topic as the repository events,
//! but with a much simpler shape: a status, a project, and the build run's
//! ARN.

use anyhow::{Context, Result};
use serde_json::Value;

/// One CodeBuild state-change notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEvent {
    pub build_status: String,
    pub project_name: String,
    pub build_arn: String,
    pub aws_account_id: String,
    pub aws_region: String,
}

impl BuildEvent {
    /// Build an event from a raw notification payload. Account and region
    /// come from the payload envelope; everything else from the detail
    /// block. Absent fields default to empty.
    pub fn from_notification(payload: &Value) -> Result<Self> {
        let detail = payload
            .get("detail")
            .context("notification payload has no detail block")?;
        let text = |value: &Value, key: &str| -> String {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(BuildEvent {
            build_status: text(detail, "build-status"),
            project_name: text(detail, "project-name"),
            build_arn: text(detail, "build-id"),
            aws_account_id: text(payload, "account"),
            aws_region: text(payload, "region"),
        })
    }

    /// The `project:uuid` tail of the build ARN, which is what the build
    /// APIs take as a run id.
    pub fn build_uuid(&self) -> &str {
        self.build_arn
            .rsplit_once("build/")
            .map(|(_, uuid)| uuid)
            .unwrap_or(&self.build_arn)
    }

    pub fn is_in_progress(&self) -> bool {
        self.build_status == "IN_PROGRESS"
    }

    pub fn is_succeeded(&self) -> bool {
        self.build_status == "SUCCEEDED"
    }

    pub fn is_failed(&self) -> bool {
        self.build_status == "FAILED"
    }

    pub fn is_stopped(&self) -> bool {
        self.build_status == "STOPPED"
    }

    /// True for any of the build lifecycle statuses the bridge reacts to.
    pub fn is_state_change(&self) -> bool {
        self.is_in_progress() || self.is_succeeded() || self.is_failed() || self.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(status: &str) -> Value {
        json!({
            "source": "aws.codebuild",
            "account": "111122223333",
            "region": "us-east-1",
            "detail": {
                "build-status": status,
                "project-name": "my-project",
                "build-id": "arn:aws:codebuild:us-east-1:111122223333:build/my-project:7b7416ae"
            }
        })
    }

    #[test]
    fn extracts_fields() {
        let event = BuildEvent::from_notification(&notification("SUCCEEDED")).unwrap();
        assert_eq!(event.build_status, "SUCCEEDED");
        assert_eq!(event.project_name, "my-project");
        assert_eq!(event.aws_account_id, "111122223333");
        assert_eq!(event.aws_region, "us-east-1");
        assert_eq!(event.build_uuid(), "my-project:7b7416ae");
    }

    #[test]
    fn build_uuid_falls_back_to_raw_value() {
        let event = BuildEvent {
            build_arn: "my-project:7b7416ae".to_string(),
            ..Default::default()
        };
        assert_eq!(event.build_uuid(), "my-project:7b7416ae");
    }

    #[test]
    fn state_helpers() {
        assert!(BuildEvent::from_notification(&notification("IN_PROGRESS"))
            .unwrap()
            .is_in_progress());
        assert!(BuildEvent::from_notification(&notification("FAILED"))
            .unwrap()
            .is_failed());
        assert!(BuildEvent::from_notification(&notification("STOPPED"))
            .unwrap()
            .is_stopped());
        let succeeded = BuildEvent::from_notification(&notification("SUCCEEDED")).unwrap();
        assert!(succeeded.is_succeeded());
        assert!(succeeded.is_state_change());
        let phase = BuildEvent::from_notification(&notification("")).unwrap();
        assert!(!phase.is_state_change());
    }

    #[test]
    fn missing_detail_is_an_error() {
        assert!(BuildEvent::from_notification(&json!({"source": "aws.codebuild"})).is_err());
    }
}
