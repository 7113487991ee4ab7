//! Defines the repository notification record and its classification.
//!
//! A `RepositoryEvent` is an immutable snapshot of one CodeCommit
//! notification: every payload field is copied verbatim as a string, with
//! absent fields defaulting to the empty string so that downstream logic
//! never needs null checks. The semantic kind of the event and the
//! branch/commit identifiers appropriate to that kind are derived lazily
//! and cached per instance.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::client::{self, Commit};

/// Semantic kind of a repository notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CommitToBranch,
    CommitToBranchViaMerge,
    BranchCreated,
    BranchDeleted,
    PrCreated,
    PrClosed,
    PrUpdated,
    PrMerged,
    CommentCreated,
    CommentUpdated,
    ReplyToComment,
    PrApproved,
    ApprovalRuleOverridden,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CommitToBranch => "commit-to-branch",
            EventKind::CommitToBranchViaMerge => "commit-to-branch-via-merge",
            EventKind::BranchCreated => "branch-created",
            EventKind::BranchDeleted => "branch-deleted",
            EventKind::PrCreated => "pr-created",
            EventKind::PrClosed => "pr-closed",
            EventKind::PrUpdated => "pr-updated",
            EventKind::PrMerged => "pr-merged",
            EventKind::CommentCreated => "comment-created",
            EventKind::CommentUpdated => "comment-updated",
            EventKind::ReplyToComment => "reply-to-comment",
            EventKind::PrApproved => "pr-approved",
            EventKind::ApprovalRuleOverridden => "approval-rule-overridden",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One CodeCommit notification, flattened. Raw fields keep the payload's
/// vocabulary; `aws_account_id` and `aws_region` are parsed out of the
/// first ARN-shaped resource string at construction time.
#[derive(Debug, Clone, Default)]
pub struct RepositoryEvent {
    pub after_commit_id: String,
    pub approval_status: String,
    pub author: String,
    pub before_commit_id: String,
    pub caller_user_arn: String,
    pub comment_id: String,
    pub commit_id: String,
    pub creation_date: String,
    pub destination_commit: String,
    pub destination_commit_id: String,
    pub destination_reference: String,
    pub event: String,
    pub in_reply_to: String,
    pub is_merged: String,
    pub last_modified_date: String,
    pub merge_option: String,
    pub notification_body: String,
    pub old_commit_id: String,
    pub override_status: String,
    pub pull_request_id: String,
    pub pull_request_status: String,
    pub reference_full_name: String,
    pub reference_name: String,
    pub reference_type: String,
    pub repository_id: String,
    pub repository_name: String,
    pub revision_id: String,
    pub source_commit: String,
    pub source_commit_id: String,
    pub source_reference: String,
    pub title: String,
    pub aws_account_id: String,
    pub aws_region: String,

    kind_cache: OnceCell<EventKind>,
    commit_cache: OnceCell<Commit>,
}

/// Read a string field out of a JSON object, defaulting to empty.
fn text(detail: &Value, key: &str) -> String {
    detail
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Drop the `refs/heads/` prefix that full git references carry.
fn strip_ref(reference: &str) -> &str {
    reference.strip_prefix("refs/heads/").unwrap_or(reference)
}

impl RepositoryEvent {
    /// Build an event from a raw notification payload. The `detail` block
    /// holds the event fields; a singleton `repositoryNames` list is
    /// flattened into `repository_name` when the scalar field is absent.
    pub fn from_notification(payload: &Value) -> Result<Self> {
        let detail = payload
            .get("detail")
            .context("notification payload has no detail block")?;
        let mut repository_name = text(detail, "repositoryName");
        if repository_name.is_empty() {
            if let Some(names) = detail.get("repositoryNames").and_then(Value::as_array) {
                if let Some(first) = names.first().and_then(Value::as_str) {
                    repository_name = first.to_string();
                }
            }
        }
        let resource = payload
            .get("resources")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .and_then(Value::as_str)
            .unwrap_or_default();
        let arn_parts: Vec<&str> = resource.split(':').collect();
        Ok(RepositoryEvent {
            after_commit_id: text(detail, "afterCommitId"),
            approval_status: text(detail, "approvalStatus"),
            author: text(detail, "author"),
            before_commit_id: text(detail, "beforeCommitId"),
            caller_user_arn: text(detail, "callerUserArn"),
            comment_id: text(detail, "commentId"),
            commit_id: text(detail, "commitId"),
            creation_date: text(detail, "creationDate"),
            destination_commit: text(detail, "destinationCommit"),
            destination_commit_id: text(detail, "destinationCommitId"),
            destination_reference: text(detail, "destinationReference"),
            event: text(detail, "event"),
            in_reply_to: text(detail, "inReplyTo"),
            is_merged: text(detail, "isMerged"),
            last_modified_date: text(detail, "lastModifiedDate"),
            merge_option: text(detail, "mergeOption"),
            notification_body: text(detail, "notificationBody"),
            old_commit_id: text(detail, "oldCommitId"),
            override_status: text(detail, "overrideStatus"),
            pull_request_id: text(detail, "pullRequestId"),
            pull_request_status: text(detail, "pullRequestStatus"),
            reference_full_name: text(detail, "referenceFullName"),
            reference_name: text(detail, "referenceName"),
            reference_type: text(detail, "referenceType"),
            repository_id: text(detail, "repositoryId"),
            repository_name,
            revision_id: text(detail, "revisionId"),
            source_commit: text(detail, "sourceCommit"),
            source_commit_id: text(detail, "sourceCommitId"),
            source_reference: text(detail, "sourceReference"),
            title: text(detail, "title"),
            aws_region: arn_parts.get(3).unwrap_or(&"").to_string(),
            aws_account_id: arn_parts.get(4).unwrap_or(&"").to_string(),
            ..Default::default()
        })
    }

    /// The canonical field table: env-variable name and value for every
    /// field. `fields_mut` below must list the same names in the same
    /// order.
    fn fields(&self) -> [(&'static str, &String); 33] {
        [
            ("AFTER_COMMIT_ID", &self.after_commit_id),
            ("APPROVAL_STATUS", &self.approval_status),
            ("AUTHOR", &self.author),
            ("BEFORE_COMMIT_ID", &self.before_commit_id),
            ("CALLER_USER_ARN", &self.caller_user_arn),
            ("COMMENT_ID", &self.comment_id),
            ("COMMIT_ID", &self.commit_id),
            ("CREATION_DATE", &self.creation_date),
            ("DESTINATION_COMMIT", &self.destination_commit),
            ("DESTINATION_COMMIT_ID", &self.destination_commit_id),
            ("DESTINATION_REFERENCE", &self.destination_reference),
            ("EVENT", &self.event),
            ("IN_REPLY_TO", &self.in_reply_to),
            ("IS_MERGED", &self.is_merged),
            ("LAST_MODIFIED_DATE", &self.last_modified_date),
            ("MERGE_OPTION", &self.merge_option),
            ("NOTIFICATION_BODY", &self.notification_body),
            ("OLD_COMMIT_ID", &self.old_commit_id),
            ("OVERRIDE_STATUS", &self.override_status),
            ("PULL_REQUEST_ID", &self.pull_request_id),
            ("PULL_REQUEST_STATUS", &self.pull_request_status),
            ("REFERENCE_FULL_NAME", &self.reference_full_name),
            ("REFERENCE_NAME", &self.reference_name),
            ("REFERENCE_TYPE", &self.reference_type),
            ("REPOSITORY_ID", &self.repository_id),
            ("REPOSITORY_NAME", &self.repository_name),
            ("REVISION_ID", &self.revision_id),
            ("SOURCE_COMMIT", &self.source_commit),
            ("SOURCE_COMMIT_ID", &self.source_commit_id),
            ("SOURCE_REFERENCE", &self.source_reference),
            ("TITLE", &self.title),
            ("AWS_ACCOUNT_ID", &self.aws_account_id),
            ("AWS_REGION", &self.aws_region),
        ]
    }

    fn fields_mut(&mut self) -> [(&'static str, &mut String); 33] {
        [
            ("AFTER_COMMIT_ID", &mut self.after_commit_id),
            ("APPROVAL_STATUS", &mut self.approval_status),
            ("AUTHOR", &mut self.author),
            ("BEFORE_COMMIT_ID", &mut self.before_commit_id),
            ("CALLER_USER_ARN", &mut self.caller_user_arn),
            ("COMMENT_ID", &mut self.comment_id),
            ("COMMIT_ID", &mut self.commit_id),
            ("CREATION_DATE", &mut self.creation_date),
            ("DESTINATION_COMMIT", &mut self.destination_commit),
            ("DESTINATION_COMMIT_ID", &mut self.destination_commit_id),
            ("DESTINATION_REFERENCE", &mut self.destination_reference),
            ("EVENT", &mut self.event),
            ("IN_REPLY_TO", &mut self.in_reply_to),
            ("IS_MERGED", &mut self.is_merged),
            ("LAST_MODIFIED_DATE", &mut self.last_modified_date),
            ("MERGE_OPTION", &mut self.merge_option),
            ("NOTIFICATION_BODY", &mut self.notification_body),
            ("OLD_COMMIT_ID", &mut self.old_commit_id),
            ("OVERRIDE_STATUS", &mut self.override_status),
            ("PULL_REQUEST_ID", &mut self.pull_request_id),
            ("PULL_REQUEST_STATUS", &mut self.pull_request_status),
            ("REFERENCE_FULL_NAME", &mut self.reference_full_name),
            ("REFERENCE_NAME", &mut self.reference_name),
            ("REFERENCE_TYPE", &mut self.reference_type),
            ("REPOSITORY_ID", &mut self.repository_id),
            ("REPOSITORY_NAME", &mut self.repository_name),
            ("REVISION_ID", &mut self.revision_id),
            ("SOURCE_COMMIT", &mut self.source_commit),
            ("SOURCE_COMMIT_ID", &mut self.source_commit_id),
            ("SOURCE_REFERENCE", &mut self.source_reference),
            ("TITLE", &mut self.title),
            ("AWS_ACCOUNT_ID", &mut self.aws_account_id),
            ("AWS_REGION", &mut self.aws_region),
        ]
    }

    /// Flatten every field into `{prefix}{FIELD_NAME}` pairs, suitable for
    /// injecting into a build job's environment.
    pub fn to_env(&self, prefix: &str) -> BTreeMap<String, String> {
        self.fields()
            .into_iter()
            .map(|(name, value)| (format!("{prefix}{name}"), value.clone()))
            .collect()
    }

    /// Rebuild an event from an environment mapping written by [`to_env`].
    /// Only keys present in the map are read; everything else stays at its
    /// empty default.
    pub fn from_env(env: &BTreeMap<String, String>, prefix: &str) -> Self {
        let mut event = RepositoryEvent::default();
        for (name, field) in event.fields_mut() {
            if let Some(value) = env.get(&format!("{prefix}{name}")) {
                *field = value.clone();
            }
        }
        event
    }

    /// The classified kind of this event. Computed on first access and
    /// cached for the lifetime of the instance.
    pub fn kind(&self) -> EventKind {
        *self.kind_cache.get_or_init(|| self.classify())
    }

    /// Discriminant checks in priority order, first match wins. Shapes
    /// that match no rule classify as `Unknown` rather than failing.
    fn classify(&self) -> EventKind {
        match self.event.as_str() {
            "referenceUpdated" => {
                if self.merge_option.is_empty() {
                    EventKind::CommitToBranch
                } else {
                    EventKind::CommitToBranchViaMerge
                }
            }
            "referenceCreated" => EventKind::BranchCreated,
            "referenceDeleted" => EventKind::BranchDeleted,
            "pullRequestCreated" if self.is_merged == "False" && self.pull_request_status == "Open" => {
                EventKind::PrCreated
            }
            "pullRequestStatusChanged" if self.pull_request_status == "Closed" => EventKind::PrClosed,
            "pullRequestSourceBranchUpdated" => EventKind::PrUpdated,
            "pullRequestMergeStatusUpdated"
                if self.is_merged == "True" && self.pull_request_status == "Closed" =>
            {
                EventKind::PrMerged
            }
            "commentOnPullRequestCreated" => {
                if self.in_reply_to.is_empty() {
                    EventKind::CommentCreated
                } else {
                    EventKind::ReplyToComment
                }
            }
            "commentOnPullRequestUpdated" => {
                if self.in_reply_to.is_empty() {
                    EventKind::CommentUpdated
                } else {
                    EventKind::ReplyToComment
                }
            }
            "pullRequestApprovalStateChanged" if self.approval_status == "APPROVE" => {
                EventKind::PrApproved
            }
            "pullRequestApprovalRuleOverridden" => EventKind::ApprovalRuleOverridden,
            _ => EventKind::Unknown,
        }
    }

    /// Pull request lifecycle events.
    pub fn is_pr(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::PrCreated | EventKind::PrClosed | EventKind::PrUpdated | EventKind::PrMerged
        )
    }

    pub fn is_pr_created_or_updated(&self) -> bool {
        matches!(self.kind(), EventKind::PrCreated | EventKind::PrUpdated)
    }

    /// Direct pushes, merge-produced or not.
    pub fn is_commit(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::CommitToBranch | EventKind::CommitToBranchViaMerge
        )
    }

    pub fn is_comment(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::CommentCreated | EventKind::CommentUpdated | EventKind::ReplyToComment
        )
    }

    fn is_pr_or_approval(&self) -> bool {
        self.is_pr()
            || matches!(
                self.kind(),
                EventKind::PrApproved | EventKind::ApprovalRuleOverridden
            )
    }

    /// The branch the change comes from. PR and approval events carry a
    /// full git reference which is stripped down to the bare branch name;
    /// push events carry the branch name directly; everything else has no
    /// source branch.
    pub fn source_branch(&self) -> &str {
        if self.is_pr_or_approval() {
            strip_ref(&self.source_reference)
        } else if self.is_commit() {
            &self.reference_name
        } else {
            ""
        }
    }

    /// The branch the change lands on. Only PR and approval events have
    /// one; a plain push has no target branch and yields the empty string.
    pub fn target_branch(&self) -> &str {
        if self.is_pr_or_approval() {
            strip_ref(&self.destination_reference)
        } else {
            ""
        }
    }

    /// The commit the event is about, per kind.
    pub fn source_commit(&self) -> &str {
        if self.is_pr_or_approval() {
            &self.source_commit
        } else if self.is_commit() {
            &self.commit_id
        } else if self.is_comment() {
            &self.after_commit_id
        } else {
            ""
        }
    }

    /// The commit on the receiving side, per kind.
    pub fn target_commit(&self) -> &str {
        if self.is_pr_or_approval() {
            &self.destination_commit
        } else if self.is_commit() {
            &self.old_commit_id
        } else if self.is_comment() {
            &self.before_commit_id
        } else {
            ""
        }
    }

    pub fn repo_name(&self) -> &str {
        &self.repository_name
    }

    /// The pull request id, for kinds that relate to one.
    pub fn pr_id(&self) -> &str {
        if self.is_pr() || self.is_comment() {
            &self.pull_request_id
        } else {
            ""
        }
    }

    pub fn pr_is_open(&self) -> bool {
        self.pull_request_status == "Open"
    }

    pub fn pr_is_merged(&self) -> bool {
        self.is_merged == "True"
    }

    /// Details of the triggering commit, fetched through the source-control
    /// collaborator on first access and cached on the instance.
    pub async fn commit(&self, codecommit: &aws_sdk_codecommit::Client) -> Result<&Commit> {
        if let Some(commit) = self.commit_cache.get() {
            return Ok(commit);
        }
        let fetched = client::get_commit(codecommit, self.repo_name(), self.source_commit()).await?;
        Ok(self.commit_cache.get_or_init(|| fetched))
    }

    /// The triggering commit's message, via [`RepositoryEvent::commit`].
    pub async fn commit_message(&self, codecommit: &aws_sdk_codecommit::Client) -> Result<&str> {
        Ok(self.commit(codecommit).await?.message.as_str())
    }
}

/// Equality over the raw fields only; the lazily-derived caches don't
/// participate.
impl PartialEq for RepositoryEvent {
    fn eq(&self, other: &Self) -> bool {
        self.fields()
            .into_iter()
            .zip(other.fields())
            .all(|((_, a), (_, b))| a == b)
    }
}

impl Eq for RepositoryEvent {}
