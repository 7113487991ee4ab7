//! Decides whether a classified repository event should launch a build.
//!
//! The rules are evaluated top-down and short-circuit on the first one
//! that applies. A denial is not an error: it carries a human-readable
//! reason which the caller logs and then drops the event.

use crate::branch::{self, BranchCategory};
use crate::commit;
use crate::event::{EventKind, RepositoryEvent};

/// Commit-message marker that suppresses the build outright.
const NO_CI_MARKER: &str = "no ci";

/// Outcome of the trigger evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Trigger,
    Skip(String),
}

impl Decision {
    pub fn is_trigger(&self) -> bool {
        matches!(self, Decision::Trigger)
    }

    fn skip(reason: impl Into<String>) -> Decision {
        Decision::Skip(reason.into())
    }
}

/// Layer branches are an extra source category recognized only by the
/// trigger rule; they hold shared infrastructure code.
pub fn is_layer_branch(name: &str) -> bool {
    name.to_lowercase().starts_with("layer")
}

/// Does the commit message qualify the source branch category for a
/// build? Each category accepts a different set of commit semantics.
fn commit_matches_category(category: BranchCategory, layer: bool, message: &str) -> bool {
    if layer {
        return commit::is_feat_commit(message)
            || commit::is_build_commit(message)
            || commit::is_publish_commit(message)
            || commit::is_utest_commit(message);
    }
    match category {
        BranchCategory::Feature => {
            commit::is_feat_commit(message)
                || commit::is_build_commit(message)
                || commit::is_publish_commit(message)
                || commit::is_utest_commit(message)
                || commit::is_itest_commit(message)
                || commit::is_ltest_commit(message)
        }
        BranchCategory::Release => {
            commit::is_test_commit(message)
                || commit::is_fix_commit(message)
                || commit::is_release_commit(message)
        }
        BranchCategory::Hotfix => commit::is_fix_commit(message),
        _ => false,
    }
}

/// Decide whether to launch build jobs for this event. `commit_message`
/// is the triggering commit's message; it only matters for the
/// pull-request rules.
pub fn decide(event: &RepositoryEvent, commit_message: &str) -> Decision {
    match event.kind() {
        // direct pushes are owned by commit-level hooks, not this bridge
        EventKind::CommitToBranch | EventKind::CommitToBranchViaMerge => Decision::skip(format!(
            "no build for {} events on {:?}",
            event.kind(),
            event.source_branch()
        )),
        EventKind::PrCreated | EventKind::PrUpdated => {
            if commit_message.starts_with(NO_CI_MARKER) {
                return Decision::skip(format!(
                    "commit message {:?} opts out of CI",
                    commit_message
                ));
            }
            let source = event.source_branch();
            let category = branch::classify(source);
            let layer = is_layer_branch(source);
            let recognized = layer
                || matches!(
                    category,
                    BranchCategory::Feature | BranchCategory::Release | BranchCategory::Hotfix
                );
            if !recognized {
                return Decision::skip(format!(
                    "source branch {:?} ({}) is not a buildable category",
                    source,
                    category.as_str()
                ));
            }
            if branch::classify(event.target_branch()) != BranchCategory::Main {
                return Decision::skip(format!(
                    "target branch {:?} is not main",
                    event.target_branch()
                ));
            }
            if !commit_matches_category(category, layer, commit_message) {
                return Decision::skip(format!(
                    "commit message {:?} does not qualify for a build from {:?}",
                    commit_message, source
                ));
            }
            Decision::Trigger
        }
        EventKind::PrMerged => Decision::Trigger,
        EventKind::PrClosed
        | EventKind::BranchCreated
        | EventKind::BranchDeleted
        | EventKind::CommentCreated
        | EventKind::CommentUpdated
        | EventKind::ReplyToComment
        | EventKind::PrApproved
        | EventKind::ApprovalRuleOverridden => {
            Decision::skip(format!("no build for {} events", event.kind()))
        }
        // fail safe: anything unrecognized is denied
        EventKind::Unknown => Decision::skip("unrecognized event shape".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pr_event(source_ref: &str, target_ref: &str) -> RepositoryEvent {
        RepositoryEvent::from_notification(&json!({
            "resources": ["arn:aws:codecommit:us-east-1:111122223333:my-repo"],
            "detail": {
                "event": "pullRequestCreated",
                "isMerged": "False",
                "pullRequestStatus": "Open",
                "pullRequestId": "12",
                "repositoryName": "my-repo",
                "sourceReference": source_ref,
                "destinationReference": target_ref,
                "sourceCommit": "c2",
                "destinationCommit": "c1"
            }
        }))
        .unwrap()
    }

    fn simple_event(detail: serde_json::Value) -> RepositoryEvent {
        RepositoryEvent::from_notification(&json!({"detail": detail})).unwrap()
    }

    #[test]
    fn direct_commits_never_trigger() {
        let event = simple_event(json!({
            "event": "referenceUpdated",
            "referenceName": "main"
        }));
        assert!(!decide(&event, "feat: x").is_trigger());
    }

    #[test]
    fn no_ci_marker_denies_regardless_of_branch() {
        let event = pr_event("refs/heads/feat/x", "refs/heads/main");
        let decision = decide(&event, "no ci: skip");
        assert!(!decision.is_trigger());
        match decision {
            Decision::Skip(reason) => assert!(reason.contains("opts out")),
            Decision::Trigger => unreachable!(),
        }
    }

    #[test]
    fn feature_to_main_with_feat_commit_triggers() {
        let event = pr_event("refs/heads/feat/x", "refs/heads/main");
        assert!(decide(&event, "feat: add validator").is_trigger());
        assert!(decide(&event, "build: package artifacts").is_trigger());
        assert!(decide(&event, "pub: release artifacts").is_trigger());
        assert!(decide(&event, "utest, itest: cover edge cases").is_trigger());
    }

    #[test]
    fn feature_branch_rejects_unrelated_commits() {
        let event = pr_event("refs/heads/feat/x", "refs/heads/main");
        assert!(!decide(&event, "chore: tidy").is_trigger());
        assert!(!decide(&event, "fix: wrong category").is_trigger());
        assert!(!decide(&event, "not a conventional message").is_trigger());
    }

    #[test]
    fn layer_branch_has_its_own_table() {
        let event = pr_event("refs/heads/layer/runtime", "refs/heads/main");
        assert!(decide(&event, "feat: x").is_trigger());
        assert!(decide(&event, "utest: x").is_trigger());
        // itest qualifies feature branches but not layer branches
        assert!(!decide(&event, "itest: x").is_trigger());
    }

    #[test]
    fn release_branch_accepts_test_fix_release() {
        let event = pr_event("refs/heads/rls/1.2.0", "refs/heads/main");
        assert!(decide(&event, "test: full sweep").is_trigger());
        assert!(decide(&event, "fix: patch").is_trigger());
        assert!(decide(&event, "rls: cut 1.2.0").is_trigger());
        assert!(!decide(&event, "feat: too late for that").is_trigger());
    }

    #[test]
    fn hotfix_branch_requires_fix_commit() {
        let event = pr_event("refs/heads/fix/login", "refs/heads/main");
        assert!(!decide(&event, "feat: x").is_trigger());
        assert!(decide(&event, "fix: x").is_trigger());
    }

    #[test]
    fn unrecognized_source_category_is_denied() {
        let event = pr_event("refs/heads/experiment", "refs/heads/main");
        assert!(!decide(&event, "feat: x").is_trigger());
        // develop is recognized by the classifier but not buildable
        let event = pr_event("refs/heads/dev/x", "refs/heads/main");
        assert!(!decide(&event, "feat: x").is_trigger());
    }

    #[test]
    fn target_must_be_main() {
        let event = pr_event("refs/heads/feat/x", "refs/heads/dev");
        let decision = decide(&event, "feat: x");
        match decision {
            Decision::Skip(reason) => assert!(reason.contains("not main")),
            Decision::Trigger => unreachable!(),
        }
    }

    #[test]
    fn merged_prs_always_trigger() {
        let event = simple_event(json!({
            "event": "pullRequestMergeStatusUpdated",
            "isMerged": "True",
            "pullRequestStatus": "Closed"
        }));
        assert!(decide(&event, "").is_trigger());
        assert!(decide(&event, "no ci: even this").is_trigger());
    }

    #[test]
    fn lifecycle_and_comment_events_never_trigger() {
        for detail in [
            json!({"event": "referenceCreated"}),
            json!({"event": "referenceDeleted"}),
            json!({"event": "commentOnPullRequestCreated"}),
            json!({"event": "commentOnPullRequestUpdated", "inReplyTo": "c-1"}),
            json!({"event": "pullRequestApprovalStateChanged", "approvalStatus": "APPROVE"}),
            json!({"event": "pullRequestApprovalRuleOverridden"}),
            json!({"event": "somethingElseEntirely"}),
        ] {
            let event = simple_event(detail);
            assert!(!decide(&event, "feat: x").is_trigger(), "{}", event.kind());
        }
    }

    #[test]
    fn layer_detection_is_case_insensitive() {
        assert!(is_layer_branch("layer/base"));
        assert!(is_layer_branch("Layer"));
        assert!(!is_layer_branch("relayer"));
    }
}
