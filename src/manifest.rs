//! The per-repository build manifest. Each repository that wants builds
//! carries a JSON file declaring which CodeBuild projects to run and how;
//! the manifest is read from the repository itself at the triggering
//! commit, so a pull request can change its own build definition.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::client;

/// One build-job declaration from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildJobSpec {
    /// The CodeBuild project to invoke.
    pub project_name: String,
    /// Whether to start a batch build instead of a single build.
    #[serde(default)]
    pub is_batch_job: bool,
    /// Optional buildspec path overriding the project's default.
    #[serde(default)]
    pub buildspec: Option<String>,
}

/// Parse manifest text into job specs. A malformed manifest is a fatal
/// configuration error for the repository, not something to recover from.
pub fn parse(text: &str) -> Result<Vec<BuildJobSpec>> {
    serde_json::from_str(text).context("Malformed build manifest")
}

/// Load and parse the manifest from a repository at a specific commit.
pub async fn load(
    client: &aws_sdk_codecommit::Client,
    repo_name: &str,
    commit_id: &str,
    path: &str,
) -> Result<Vec<BuildJobSpec>> {
    let text = client::get_text_file(client, repo_name, commit_id, path)
        .await
        .with_context(|| {
            format!(
                "Failed to load build manifest {:?} from repository {:?}",
                path, repo_name
            )
        })?;
    parse(&text).with_context(|| format!("Build manifest {:?} of repository {:?}", path, repo_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_manifest() {
        let specs = parse(
            r#"[
                {"project_name": "web-app", "is_batch_job": true, "buildspec": "ci/buildspec.yml"},
                {"project_name": "web-app-docs"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            specs,
            vec![
                BuildJobSpec {
                    project_name: "web-app".to_string(),
                    is_batch_job: true,
                    buildspec: Some("ci/buildspec.yml".to_string()),
                },
                BuildJobSpec {
                    project_name: "web-app-docs".to_string(),
                    is_batch_job: false,
                    buildspec: None,
                },
            ]
        );
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse("[]").unwrap().is_empty());
    }

    #[test]
    fn missing_project_name_is_fatal() {
        assert!(parse(r#"[{"is_batch_job": true}]"#).is_err());
    }

    #[test]
    fn malformed_json_is_fatal() {
        assert!(parse("not json at all").is_err());
        assert!(parse(r#"{"project_name": "not-a-list"}"#).is_err());
    }
}
