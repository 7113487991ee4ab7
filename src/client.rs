//! Defines the global AWS clients and thin wrappers around the service
//! calls the bridge makes. Everything here is I/O glue; the decision
//! logic lives in the other modules.

use std::collections::BTreeMap;
use std::env;

use anyhow::{anyhow, Context, Result};
use aws_config::from_env;
use aws_sdk_codebuild::types::{EnvironmentVariable, EnvironmentVariableType};
use aws_sdk_codecommit::primitives::Blob;
use aws_sdk_codecommit::types::FileModeTypeEnum;
use aws_sdk_s3::primitives::ByteStream;
use once_cell::sync::OnceCell;
use tracing::info;

/// Details of one commit, as returned by the source-control collaborator.
/// Absent fields default to empty, matching the event record's invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub commit_id: String,
    pub tree_id: String,
    pub parent_commit_ids: Vec<String>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_date: String,
    pub committer_name: String,
    pub committer_email: String,
    pub committer_date: String,
}

/// Fetch a commit's details from a repository.
pub async fn get_commit(
    client: &aws_sdk_codecommit::Client,
    repo_name: &str,
    commit_id: &str,
) -> Result<Commit> {
    let response = client
        .get_commit()
        .repository_name(repo_name)
        .commit_id(commit_id)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to get commit {:?} from repository {:?}",
                commit_id, repo_name
            )
        })?;
    let commit = response.commit();
    let author = commit.and_then(|c| c.author());
    let committer = commit.and_then(|c| c.committer());
    Ok(Commit {
        commit_id: commit.and_then(|c| c.commit_id()).unwrap_or_default().to_string(),
        tree_id: commit.and_then(|c| c.tree_id()).unwrap_or_default().to_string(),
        parent_commit_ids: commit.and_then(|c| c.parents()).unwrap_or_default().to_vec(),
        message: commit
            .and_then(|c| c.message())
            .unwrap_or_default()
            .trim()
            .to_string(),
        author_name: author.and_then(|a| a.name()).unwrap_or_default().to_string(),
        author_email: author.and_then(|a| a.email()).unwrap_or_default().to_string(),
        author_date: author.and_then(|a| a.date()).unwrap_or_default().to_string(),
        committer_name: committer.and_then(|c| c.name()).unwrap_or_default().to_string(),
        committer_email: committer.and_then(|c| c.email()).unwrap_or_default().to_string(),
        committer_date: committer.and_then(|c| c.date()).unwrap_or_default().to_string(),
    })
}

/// The id of the last commit on a branch.
pub async fn get_last_commit_id(
    client: &aws_sdk_codecommit::Client,
    repo_name: &str,
    branch_name: &str,
) -> Result<String> {
    let response = client
        .get_branch()
        .repository_name(repo_name)
        .branch_name(branch_name)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to get branch {:?} of repository {:?}",
                branch_name, repo_name
            )
        })?;
    Ok(response
        .branch()
        .and_then(|b| b.commit_id())
        .unwrap_or_default()
        .to_string())
}

/// Read a text file from a repository at a specific commit.
pub async fn get_text_file(
    client: &aws_sdk_codecommit::Client,
    repo_name: &str,
    commit_id: &str,
    file_path: &str,
) -> Result<String> {
    let response = client
        .get_file()
        .repository_name(repo_name)
        .commit_specifier(commit_id)
        .file_path(file_path)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to read file {:?} at commit {:?} of repository {:?}",
                file_path, commit_id, repo_name
            )
        })?;
    let content = response
        .file_content()
        .map(|blob| blob.as_ref().to_vec())
        .unwrap_or_default();
    String::from_utf8(content).with_context(|| {
        format!(
            "File {:?} at commit {:?} of repository {:?} is not valid UTF-8",
            file_path, commit_id, repo_name
        )
    })
}

/// Commit a single file on top of a branch's head. With
/// `skip_if_no_change`, the service's same-content rejection is treated as
/// a benign "nothing to commit" and yields `None`; every other error
/// propagates.
#[allow(clippy::too_many_arguments)]
pub async fn commit_file(
    client: &aws_sdk_codecommit::Client,
    repo_name: &str,
    branch_name: &str,
    file_path: &str,
    file_content: &[u8],
    commit_message: &str,
    author_name: &str,
    author_email: &str,
    skip_if_no_change: bool,
) -> Result<Option<String>> {
    let parent_commit_id = get_last_commit_id(client, repo_name, branch_name).await?;
    let result = client
        .put_file()
        .repository_name(repo_name)
        .branch_name(branch_name)
        .file_content(Blob::new(file_content))
        .file_path(file_path)
        .file_mode(FileModeTypeEnum::Normal)
        .parent_commit_id(parent_commit_id)
        .commit_message(commit_message)
        .name(author_name)
        .email(author_email)
        .send()
        .await;
    match result {
        Ok(response) => Ok(Some(response.commit_id().unwrap_or_default().to_string())),
        Err(error) => {
            let service_error = error.into_service_error();
            if skip_if_no_change && service_error.is_same_file_content_exception() {
                info!(
                    "File {:?} on branch {:?} is unchanged; nothing to commit",
                    file_path, branch_name
                );
                Ok(None)
            } else {
                Err(anyhow!(service_error)).with_context(|| {
                    format!(
                        "Failed to commit file {:?} to branch {:?} of repository {:?}",
                        file_path, branch_name, repo_name
                    )
                })
            }
        }
    }
}

/// Post a comment to a pull request thread. Returns the new comment's id.
pub async fn post_pr_comment(
    client: &aws_sdk_codecommit::Client,
    repo_name: &str,
    pr_id: &str,
    before_commit_id: &str,
    after_commit_id: &str,
    content: &str,
) -> Result<String> {
    let response = client
        .post_comment_for_pull_request()
        .pull_request_id(pr_id)
        .repository_name(repo_name)
        .before_commit_id(before_commit_id)
        .after_commit_id(after_commit_id)
        .content(content)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to post a comment to pull request {:?} of repository {:?}",
                pr_id, repo_name
            )
        })?;
    Ok(response
        .comment()
        .and_then(|c| c.comment_id())
        .unwrap_or_default()
        .to_string())
}

/// Replace an existing comment's content.
pub async fn update_comment(
    client: &aws_sdk_codecommit::Client,
    comment_id: &str,
    content: &str,
) -> Result<()> {
    client
        .update_comment()
        .comment_id(comment_id)
        .content(content)
        .send()
        .await
        .with_context(|| format!("Failed to update comment {:?}", comment_id))?;
    Ok(())
}

/// Reply to an existing comment thread. Returns the reply's id.
pub async fn reply_comment(
    client: &aws_sdk_codecommit::Client,
    comment_id: &str,
    content: &str,
) -> Result<String> {
    let response = client
        .post_comment_reply()
        .in_reply_to(comment_id)
        .content(content)
        .send()
        .await
        .with_context(|| format!("Failed to reply to comment {:?}", comment_id))?;
    Ok(response
        .comment()
        .and_then(|c| c.comment_id())
        .unwrap_or_default()
        .to_string())
}

fn to_env_overrides(env: &BTreeMap<String, String>) -> Vec<EnvironmentVariable> {
    env.iter()
        .map(|(name, value)| {
            EnvironmentVariable::builder()
                .name(name)
                .value(value)
                .r#type(EnvironmentVariableType::Plaintext)
                .build()
        })
        .collect()
}

/// Start a single build. Returns the build run id.
pub async fn start_build(
    client: &aws_sdk_codebuild::Client,
    project_name: &str,
    source_version: &str,
    buildspec_override: Option<&str>,
    env: &BTreeMap<String, String>,
) -> Result<String> {
    let mut operation = client
        .start_build()
        .project_name(project_name)
        .source_version(source_version)
        .set_environment_variables_override(Some(to_env_overrides(env)));
    if let Some(buildspec) = buildspec_override {
        operation = operation.buildspec_override(buildspec);
    }
    let response = operation
        .send()
        .await
        .with_context(|| format!("Failed to start a build of project {:?}", project_name))?;
    Ok(response
        .build_value()
        .and_then(|b| b.id())
        .unwrap_or_default()
        .to_string())
}

/// Start a batch build. Returns the batch run id.
pub async fn start_build_batch(
    client: &aws_sdk_codebuild::Client,
    project_name: &str,
    source_version: &str,
    buildspec_override: Option<&str>,
    env: &BTreeMap<String, String>,
) -> Result<String> {
    let mut operation = client
        .start_build_batch()
        .project_name(project_name)
        .source_version(source_version)
        .set_environment_variables_override(Some(to_env_overrides(env)));
    if let Some(buildspec) = buildspec_override {
        operation = operation.buildspec_override(buildspec);
    }
    let response = operation
        .send()
        .await
        .with_context(|| format!("Failed to start a batch build of project {:?}", project_name))?;
    Ok(response
        .build_batch()
        .and_then(|b| b.id())
        .unwrap_or_default()
        .to_string())
}

/// The environment variables a build run was started with.
pub async fn get_build_env(
    client: &aws_sdk_codebuild::Client,
    build_id: &str,
) -> Result<BTreeMap<String, String>> {
    let response = client
        .batch_get_builds()
        .ids(build_id)
        .send()
        .await
        .with_context(|| format!("Failed to look up build {:?}", build_id))?;
    let builds = response.builds().unwrap_or_default();
    let build = builds
        .first()
        .with_context(|| format!("Build {:?} not found", build_id))?;
    Ok(build
        .environment()
        .and_then(|e| e.environment_variables())
        .unwrap_or_default()
        .iter()
        .filter_map(|var| match (var.name(), var.value()) {
            (Some(name), Some(value)) => Some((name.to_string(), value.to_string())),
            _ => None,
        })
        .collect())
}

/// Store an object in durable storage.
pub async fn put_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    body: String,
) -> Result<()> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body.into_bytes()))
        .send()
        .await
        .with_context(|| format!("Failed to upload object {:?} to bucket {:?}", key, bucket))?;
    Ok(())
}

/// The AWS service clients used by the bridge.
pub struct Clients {
    pub codecommit: aws_sdk_codecommit::Client,
    pub codebuild: aws_sdk_codebuild::Client,
    pub s3: aws_sdk_s3::Client,
}

/// Global client set.
static CURRENT: OnceCell<Clients> = OnceCell::new();

/// Initialize the global client set.
pub async fn init() -> Result<()> {
    let endpoint_url_var = env::var("AWS_ENDPOINT_URL");
    let config = if let Ok(endpoint_url) = endpoint_url_var {
        from_env()
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region("us-east-1") // should be OK since the endpoint was overridden
            .load()
    } else {
        from_env().load()
    }
    .await;
    let clients = Clients {
        codecommit: aws_sdk_codecommit::Client::new(&config),
        codebuild: aws_sdk_codebuild::Client::new(&config),
        s3: aws_sdk_s3::Client::new(&config),
    };
    CURRENT
        .set(clients)
        .map_err(|_| anyhow!("client::CURRENT was already initialized"))
}

/// Get the current client set, or panic if it hasn't been initialized.
pub fn current() -> &'static Clients {
    CURRENT.get().expect("clients are not initialized")
}
