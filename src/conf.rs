//! Defines configuration as read from the environment.

use serde::Deserialize;

/// Default `archive_prefix` value.
fn default_archive_prefix() -> String {
    String::from("cicd-events")
}

/// Default `manifest_path` value.
fn default_manifest_path() -> String {
    String::from("codebuild-projects.json")
}

/// The bridge is configured to receive repository and build
/// notifications, archive them, and start build jobs for the ones that
/// qualify. The configuration must be given as environment variables.
#[derive(Deserialize)]
pub struct Settings {
    /// The bucket receiving raw notification payloads for audit and
    /// replay. Omitting this disables archival.
    #[serde(default)]
    pub archive_bucket: Option<String>,

    /// The key prefix under which archived notifications are stored.
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Where each repository declares its build jobs. The file is read
    /// from the repository itself at the triggering commit.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
}
