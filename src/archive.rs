//! Archives raw notification payloads to durable storage, keyed by a
//! date-partitioned path so downstream tooling can query them by day.

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use tracing::info;

use crate::client;
use crate::conf::Settings;

/// The Hive-style date partition for a point in time:
/// `year=YYYY/month=MM/day=DD`.
pub fn partition_key(at: &DateTime<Utc>) -> String {
    format!(
        "year={}/month={:02}/day={:02}",
        at.year(),
        at.month(),
        at.day()
    )
}

/// The full object key for one archived notification. `channel` separates
/// repository events from build events, `folder` groups them by
/// repository or project, and `tag` identifies the payload in the file
/// name.
pub fn object_key(prefix: &str, channel: &str, folder: &str, tag: &str, at: &DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}/{}/{}_{}.json",
        prefix,
        channel,
        folder,
        partition_key(at),
        at.format("%Y-%m-%dT%H-%M-%S%.6f"),
        tag
    )
}

/// Store the raw payload, pretty-printed. Without a configured bucket the
/// write is skipped; archival is optional plumbing, not part of the
/// trigger decision.
pub async fn store(
    settings: &Settings,
    s3: &aws_sdk_s3::Client,
    channel: &str,
    folder: &str,
    tag: &str,
    payload: &Value,
) -> Result<()> {
    let Some(bucket) = &settings.archive_bucket else {
        info!("No archive bucket configured; skipping event archival");
        return Ok(());
    };
    let key = object_key(&settings.archive_prefix, channel, folder, tag, &Utc::now());
    let body = serde_json::to_string_pretty(payload)?;
    client::put_object(s3, bucket, &key, body).await?;
    info!("Archived notification to s3://{}/{}", bucket, key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn partition_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2023, 1, 5, 3, 4, 5).unwrap();
        assert_eq!(partition_key(&at), "year=2023/month=01/day=05");
    }

    #[test]
    fn object_key_layout() {
        let at = Utc.with_ymd_and_hms(2023, 11, 30, 23, 59, 58).unwrap();
        let key = object_key("cicd-events", "codecommit", "my-repo", "my-repo", &at);
        assert_eq!(
            key,
            "cicd-events/codecommit/my-repo/year=2023/month=11/day=30/\
             2023-11-30T23-59-58.000000_my-repo.json"
        );
    }

    #[test]
    fn build_events_key_by_project_and_run() {
        let at = Utc.with_ymd_and_hms(2023, 11, 30, 23, 59, 58).unwrap();
        let key = object_key("cicd-events", "codebuild", "web-app", "web-app:7b7416ae", &at);
        assert_eq!(
            key,
            "cicd-events/codebuild/web-app/year=2023/month=11/day=30/\
             2023-11-30T23-59-58.000000_web-app:7b7416ae.json"
        );
    }
}
