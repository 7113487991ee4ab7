use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::sns::SnsEvent;
use codebuild_event_bridge::{app, client};
use lambda_runtime::{run, service_fn, LambdaEvent};
use serde_json::Value;

/// Handle each notification carried by the SNS event.
async fn function_handler(event: LambdaEvent<SnsEvent>) -> Result<()> {
    for record in event.payload.records {
        let payload: Value = serde_json::from_str(&record.sns.message).with_context(|| {
            format!("Failed to parse SNS message {:?}", record.sns.message_id)
        })?;
        app::current()
            .handle(&payload, client::current())
            .await
            .with_context(|| {
                format!("Failed to handle notification {:?}", record.sns.message_id)
            })?;
    }
    Ok(())
}

/// Run an AWS Lambda function that listens to CodeCommit and CodeBuild
/// notifications relayed over SNS, triggers the build jobs each
/// repository declares, and keeps the originating pull request informed
/// with status comments.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init().await?;

    run(service_fn(function_handler))
        .await
        .map_err(|e| anyhow!("{:?}", e))
}
