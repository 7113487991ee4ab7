//! Classifies git branch names into semantic categories. The category
//! drives the trigger policy: a pull request from a feature branch is
//! treated differently than one from a hotfix branch.

/// Semantic category of a branch name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCategory {
    Main,
    Develop,
    Feature,
    Release,
    Hotfix,
    Build,
    Doc,
    None,
}

impl BranchCategory {
    /// Human-readable name, for log messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchCategory::Main => "main",
            BranchCategory::Develop => "develop",
            BranchCategory::Feature => "feature",
            BranchCategory::Release => "release",
            BranchCategory::Hotfix => "hotfix",
            BranchCategory::Build => "build",
            BranchCategory::Doc => "doc",
            BranchCategory::None => "none",
        }
    }
}

/// Classify a branch name. Matching is case-insensitive and the rules are
/// checked in a fixed order, first match wins. Unmatched names classify as
/// `BranchCategory::None`; there are no error cases.
pub fn classify(name: &str) -> BranchCategory {
    let name = name.to_lowercase();
    if name == "main" || name == "master" {
        BranchCategory::Main
    } else if name.starts_with("dev") {
        BranchCategory::Develop
    } else if name.starts_with("feat") {
        BranchCategory::Feature
    } else if name.starts_with("rls") || name.starts_with("release") {
        BranchCategory::Release
    } else if name.starts_with("fix") {
        BranchCategory::Hotfix
    } else if name.starts_with("build") {
        BranchCategory::Build
    } else if name.starts_with("doc") {
        BranchCategory::Doc
    } else {
        BranchCategory::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_prefixes() {
        let cases = [
            ("main", BranchCategory::Main),
            ("master", BranchCategory::Main),
            ("dev", BranchCategory::Develop),
            ("Develop", BranchCategory::Develop),
            ("dev/my-change", BranchCategory::Develop),
            ("feat", BranchCategory::Feature),
            ("Feature/STORY-001", BranchCategory::Feature),
            ("rls", BranchCategory::Release),
            ("release/1.2.3", BranchCategory::Release),
            ("fix", BranchCategory::Hotfix),
            ("Fix/login", BranchCategory::Hotfix),
            ("build", BranchCategory::Build),
            ("build/nightly", BranchCategory::Build),
            ("doc", BranchCategory::Doc),
            ("docs/readme", BranchCategory::Doc),
        ];
        for (name, expected) in cases {
            assert_eq!(classify(name), expected, "branch {:?}", name);
        }
    }

    #[test]
    fn main_requires_exact_match() {
        assert_eq!(classify("mainline"), BranchCategory::None);
        assert_eq!(classify("master-2"), BranchCategory::None);
        assert_eq!(classify("MAIN"), BranchCategory::Main);
    }

    #[test]
    fn unmatched_names_classify_as_none() {
        assert_eq!(classify(""), BranchCategory::None);
        assert_eq!(classify("my-experiment"), BranchCategory::None);
        assert_eq!(classify("refs/heads/feat/x"), BranchCategory::None);
    }
}
