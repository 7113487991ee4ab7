//! Turns a positive trigger decision into concrete build runs. One
//! manifest entry becomes one build-start request carrying the whole
//! event flattened into environment variables; pull-request triggers also
//! get a correlation comment on the PR thread, which later build-state
//! notifications reply to.

use std::collections::BTreeMap;

use anyhow::Result;
use itertools::Itertools;
use tracing::{info, instrument, warn};

use crate::build_event::BuildEvent;
use crate::client::{self, Clients, Commit};
use crate::conf::Settings;
use crate::event::RepositoryEvent;
use crate::manifest::{self, BuildJobSpec};

/// Environment prefix for the flattened repository event.
pub const EVENT_ENV_PREFIX: &str = "CC_EVENT_";

/// Environment prefix for build correlation data.
pub const CI_DATA_ENV_PREFIX: &str = "CI_DATA_";

/// Correlation data injected into a build's environment so a later
/// build-state notification can find its way back to the PR thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiData {
    pub commit_message: String,
    pub comment_id: String,
}

impl CiData {
    pub fn to_env(&self, prefix: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                format!("{prefix}COMMIT_MESSAGE"),
                self.commit_message.clone(),
            ),
            (format!("{prefix}COMMENT_ID"), self.comment_id.clone()),
        ])
    }

    /// Read correlation data back out of a build's environment. Absent
    /// keys leave the fields at their empty default.
    pub fn from_env(env: &BTreeMap<String, String>, prefix: &str) -> Self {
        let field = |name: &str| {
            env.get(&format!("{prefix}{name}"))
                .cloned()
                .unwrap_or_default()
        };
        CiData {
            commit_message: field("COMMIT_MESSAGE"),
            comment_id: field("COMMENT_ID"),
        }
    }
}

/// One build run in flight: the chosen spec plus everything needed to
/// start it and to correlate it with the PR thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJobRun {
    pub spec: BuildJobSpec,
    pub source_version: String,
    pub env: BTreeMap<String, String>,
    pub aws_account_id: String,
    pub aws_region: String,
    pub repo_name: String,
    pub is_pr: bool,
    pub pr_id: String,
    pub source_commit: String,
    pub target_commit: String,
    /// Set once the build has been started.
    pub run_id: String,
}

impl BuildJobRun {
    /// Console link for the build run.
    pub fn console_url(&self) -> String {
        format!(
            "https://{region}.console.aws.amazon.com/codesuite/codebuild/{account}/projects/{project}/build/{run}/?region={region}",
            region = self.aws_region,
            account = self.aws_account_id,
            project = self.spec.project_name,
            run = self.run_id,
        )
    }

    /// Console link for the triggering commit in the PR view.
    pub fn commit_console_url(&self) -> String {
        format!(
            "https://{region}.console.aws.amazon.com/codesuite/codecommit/repositories/{repo}/pull-requests/{pr}/commit/{commit}?region={region}",
            region = self.aws_region,
            repo = self.repo_name,
            pr = self.pr_id,
            commit = self.source_commit,
        )
    }
}

/// Assemble one run per manifest entry. Pure; no calls are made here.
pub fn prepare_jobs(event: &RepositoryEvent, specs: &[BuildJobSpec]) -> Vec<BuildJobRun> {
    specs
        .iter()
        .map(|spec| BuildJobRun {
            spec: spec.clone(),
            source_version: event.source_commit().to_string(),
            env: event.to_env(EVENT_ENV_PREFIX),
            aws_account_id: event.aws_account_id.clone(),
            aws_region: event.aws_region.clone(),
            repo_name: event.repo_name().to_string(),
            is_pr: event.is_pr(),
            pr_id: event.pr_id().to_string(),
            source_commit: event.source_commit().to_string(),
            target_commit: event.target_commit().to_string(),
            run_id: String::new(),
        })
        .collect()
}

/// The correlation comment body. Before the build starts it describes the
/// commit; once `run_id` is set it gains the build run link.
fn triggered_comment(job: &BuildJobRun, commit: &Commit) -> String {
    let short_commit = &job.source_commit[..job.source_commit.len().min(7)];
    let mut lines = vec![
        "## 🌴 A build run is triggered, let's relax.".to_string(),
        String::new(),
    ];
    if !job.run_id.is_empty() {
        lines.push(format!(
            "- build run id: [{}]({})",
            job.run_id,
            job.console_url()
        ));
    }
    lines.push(format!(
        "- commit id: [{}]({})",
        short_commit,
        job.commit_console_url()
    ));
    lines.push(format!("- commit message: {:?}", commit.message.trim()));
    lines.push(format!("- committer name: {:?}", commit.committer_name.trim()));
    lines.join("\n")
}

/// The terminal reply for a finished build, if this status warrants one.
fn status_reply(build_status: &str) -> Option<&'static str> {
    match build_status {
        "SUCCEEDED" => Some("🟢 Build Run SUCCEEDED"),
        "FAILED" => Some("🔴 Build Run FAILED"),
        "STOPPED" => Some("⚫ Build Run STOPPED"),
        _ => None,
    }
}

async fn start(job: &BuildJobRun, clients: &Clients) -> Result<String> {
    if job.spec.is_batch_job {
        client::start_build_batch(
            &clients.codebuild,
            &job.spec.project_name,
            &job.source_version,
            job.spec.buildspec.as_deref(),
            &job.env,
        )
        .await
    } else {
        client::start_build(
            &clients.codebuild,
            &job.spec.project_name,
            &job.source_version,
            job.spec.buildspec.as_deref(),
            &job.env,
        )
        .await
    }
}

async fn dispatch_one(
    event: &RepositoryEvent,
    mut job: BuildJobRun,
    clients: &Clients,
) -> Result<()> {
    info!(
        "Starting {} of project {:?} at commit {:?}",
        if job.spec.is_batch_job {
            "batch build"
        } else {
            "build"
        },
        job.spec.project_name,
        job.source_version,
    );
    if job.is_pr {
        let commit = event.commit(&clients.codecommit).await?;
        let comment_id = client::post_pr_comment(
            &clients.codecommit,
            &job.repo_name,
            &job.pr_id,
            &job.target_commit,
            &job.source_commit,
            &triggered_comment(&job, commit),
        )
        .await?;
        let ci_data = CiData {
            commit_message: commit.message.clone(),
            comment_id: comment_id.clone(),
        };
        job.env.extend(ci_data.to_env(CI_DATA_ENV_PREFIX));
        job.run_id = start(&job, clients).await?;
        client::update_comment(
            &clients.codecommit,
            &comment_id,
            &triggered_comment(&job, commit),
        )
        .await?;
    } else {
        job.run_id = start(&job, clients).await?;
    }
    info!("Build run at: {}", job.console_url());
    Ok(())
}

/// Load the manifest and dispatch every declared job. Jobs are
/// independent: one failed dispatch is reported but does not stop the
/// remaining jobs from being attempted.
#[instrument(skip(event, clients, settings), fields(repo = %event.repo_name()))]
pub async fn dispatch(
    event: &RepositoryEvent,
    clients: &Clients,
    settings: &Settings,
) -> Result<()> {
    let specs = manifest::load(
        &clients.codecommit,
        event.repo_name(),
        event.source_commit(),
        &settings.manifest_path,
    )
    .await?;
    if specs.is_empty() {
        info!(
            "Manifest of repository {:?} declares no build jobs",
            event.repo_name()
        );
        return Ok(());
    }
    info!(
        "Manifest declares {} build job(s): {}",
        specs.len(),
        specs.iter().map(|s| s.project_name.as_str()).join(", ")
    );
    let mut first_error = None;
    for job in prepare_jobs(event, &specs) {
        let project_name = job.spec.project_name.clone();
        if let Err(error) = dispatch_one(event, job, clients).await {
            warn!(
                "Failed to dispatch build job of project {:?}: {:?}",
                project_name, error
            );
            first_error.get_or_insert(error);
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// React to a build-state notification: find the correlation comment the
/// dispatching invocation left in the build's environment and post the
/// terminal status as a reply. Non-terminal statuses post nothing.
#[instrument(skip(event, clients), fields(project = %event.project_name, status = %event.build_status))]
pub async fn handle_build_completion(event: &BuildEvent, clients: &Clients) -> Result<()> {
    let Some(reply) = status_reply(&event.build_status) else {
        info!(
            "No reply for build status {:?} of project {:?}",
            event.build_status, event.project_name
        );
        return Ok(());
    };
    let env = client::get_build_env(&clients.codebuild, event.build_uuid()).await?;
    let ci_data = CiData::from_env(&env, CI_DATA_ENV_PREFIX);
    if ci_data.comment_id.is_empty() {
        info!(
            "Build {:?} has no correlation comment; nothing to reply to",
            event.build_uuid()
        );
        return Ok(());
    }
    client::reply_comment(&clients.codecommit, &ci_data.comment_id, reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pr_event() -> RepositoryEvent {
        RepositoryEvent::from_notification(&json!({
            "resources": ["arn:aws:codecommit:us-east-1:111122223333:my-repo"],
            "detail": {
                "event": "pullRequestCreated",
                "isMerged": "False",
                "pullRequestStatus": "Open",
                "pullRequestId": "12",
                "repositoryName": "my-repo",
                "sourceReference": "refs/heads/feat/x",
                "destinationReference": "refs/heads/main",
                "sourceCommit": "abcdef0123456789",
                "destinationCommit": "1111111111111111"
            }
        }))
        .unwrap()
    }

    fn spec(name: &str) -> BuildJobSpec {
        BuildJobSpec {
            project_name: name.to_string(),
            is_batch_job: false,
            buildspec: None,
        }
    }

    #[test]
    fn ci_data_round_trips_through_env() {
        let ci_data = CiData {
            commit_message: "feat: x".to_string(),
            comment_id: "comment-1".to_string(),
        };
        let env = ci_data.to_env(CI_DATA_ENV_PREFIX);
        assert_eq!(
            env.get("CI_DATA_COMMIT_MESSAGE"),
            Some(&"feat: x".to_string())
        );
        assert_eq!(env.get("CI_DATA_COMMENT_ID"), Some(&"comment-1".to_string()));
        assert_eq!(CiData::from_env(&env, CI_DATA_ENV_PREFIX), ci_data);
        assert_eq!(CiData::from_env(&BTreeMap::new(), CI_DATA_ENV_PREFIX), CiData::default());
    }

    #[test]
    fn prepare_jobs_flattens_the_event() {
        let event = pr_event();
        let jobs = prepare_jobs(&event, &[spec("web-app"), spec("web-app-docs")]);
        assert_eq!(jobs.len(), 2);
        let job = &jobs[0];
        assert_eq!(job.source_version, "abcdef0123456789");
        assert_eq!(job.repo_name, "my-repo");
        assert!(job.is_pr);
        assert_eq!(job.pr_id, "12");
        assert_eq!(
            job.env.get("CC_EVENT_REPOSITORY_NAME"),
            Some(&"my-repo".to_string())
        );
        assert_eq!(
            job.env.get("CC_EVENT_SOURCE_REFERENCE"),
            Some(&"refs/heads/feat/x".to_string())
        );
        assert_eq!(job.run_id, "");
    }

    #[test]
    fn console_urls() {
        let event = pr_event();
        let mut job = prepare_jobs(&event, &[spec("web-app")]).remove(0);
        job.run_id = "web-app:7b7416ae".to_string();
        assert_eq!(
            job.console_url(),
            "https://us-east-1.console.aws.amazon.com/codesuite/codebuild/111122223333/\
             projects/web-app/build/web-app:7b7416ae/?region=us-east-1"
        );
        assert_eq!(
            job.commit_console_url(),
            "https://us-east-1.console.aws.amazon.com/codesuite/codecommit/repositories/my-repo/\
             pull-requests/12/commit/abcdef0123456789?region=us-east-1"
        );
    }

    #[test]
    fn comment_gains_run_link_after_start() {
        let event = pr_event();
        let mut job = prepare_jobs(&event, &[spec("web-app")]).remove(0);
        let commit = Commit {
            message: "feat: add validator".to_string(),
            committer_name: "alice".to_string(),
            ..Default::default()
        };
        let before = triggered_comment(&job, &commit);
        assert!(before.contains("- commit id: [abcdef0]"));
        assert!(before.contains("- commit message: \"feat: add validator\""));
        assert!(before.contains("- committer name: \"alice\""));
        assert!(!before.contains("build run id"));

        job.run_id = "web-app:7b7416ae".to_string();
        let after = triggered_comment(&job, &commit);
        assert!(after.contains("- build run id: [web-app:7b7416ae]"));
    }

    #[test]
    fn short_commit_handles_short_ids() {
        let event = RepositoryEvent::from_notification(&json!({
            "detail": {
                "event": "pullRequestSourceBranchUpdated",
                "sourceCommit": "abc"
            }
        }))
        .unwrap();
        let job = prepare_jobs(&event, &[spec("web-app")]).remove(0);
        let comment = triggered_comment(&job, &Commit::default());
        assert!(comment.contains("- commit id: [abc]"));
    }

    #[test]
    fn status_replies() {
        assert_eq!(status_reply("SUCCEEDED"), Some("🟢 Build Run SUCCEEDED"));
        assert_eq!(status_reply("FAILED"), Some("🔴 Build Run FAILED"));
        assert_eq!(status_reply("STOPPED"), Some("⚫ Build Run STOPPED"));
        assert_eq!(status_reply("IN_PROGRESS"), None);
        assert_eq!(status_reply(""), None);
    }
}
