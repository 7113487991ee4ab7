//! A small conventional-commit parser. Commit subjects look like
//! `type1, type2(scope)!: description`; the declared types let developers
//! steer the CI behavior from the commit message itself.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters treated as word separators by [`tokenize`].
const DELIMITERS: &str = "!@#$%^&*()_+-=~`[{]}\\|;:'\",<.>/? \t\n";

/// Commit-type keywords recognized by the default parser. Tokens outside
/// this vocabulary are dropped silently during parsing.
pub const DEFAULT_TYPES: &[&str] = &[
    "chore", "feat", "feature", "fix", "doc", "test", "utest", "itest", "ltest", "build", "pub",
    "publish", "rls", "release",
];

/// Anchored pattern for the subject line:
/// `<types>[ (<scope>)][!]: <description>`. The space after the colon is
/// optional.
static SUBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<types>[\w ,]+)(?:\((?P<scope>[\w-]+)\))?(?P<breaking>!)?:[ \t]?(?P<description>.+)$")
        .expect("subject pattern is valid")
});

/// Split arbitrary text into a flat word list, treating all punctuation and
/// whitespace in [`DELIMITERS`] as separators. Independent of the grammar
/// parser; handy for lightweight keyword search in free text.
pub fn tokenize(text: &str) -> Vec<String> {
    text.chars()
        .map(|c| if DELIMITERS.contains(c) { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Structured form of a commit subject line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommit {
    /// Declared types, in declaration order, restricted to the parser's
    /// vocabulary and deduplicated.
    pub types: Vec<String>,
    /// Everything after the first colon.
    pub description: String,
    /// The parenthesized scope token, if any.
    pub scope: Option<String>,
    /// The literal `!` breaking marker, if present.
    pub breaking: Option<String>,
}

/// Parser with a configurable type vocabulary.
pub struct CommitParser {
    vocabulary: Vec<String>,
}

impl CommitParser {
    /// Build a parser for the given vocabulary. Keywords are lower-cased;
    /// matching against them is case-sensitive afterwards, so only
    /// lower-case tokens in a subject line count as declared types.
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CommitParser {
            vocabulary: vocabulary
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    /// Parse the subject (first) line of a commit message. Returns `None`
    /// when the line does not match the grammar at all; there is no partial
    /// record. Text after the first line break is ignored.
    pub fn parse(&self, message: &str) -> Option<ParsedCommit> {
        let subject = message.lines().next().unwrap_or("").trim();
        let caps = SUBJECT_RE.captures(subject)?;
        let mut types = Vec::new();
        for token in caps["types"].split(',') {
            let token = token.trim();
            if self.vocabulary.iter().any(|t| t == token) && !types.iter().any(|t| t == token) {
                types.push(token.to_string());
            }
        }
        Some(ParsedCommit {
            types,
            description: caps["description"].to_string(),
            scope: caps.name("scope").map(|m| m.as_str().to_string()),
            breaking: caps.name("breaking").map(|m| m.as_str().to_string()),
        })
    }

    /// True iff the message parses and declares at least one of the given
    /// types. A message that fails to parse yields `false`, not an error.
    pub fn has_type(&self, message: &str, one_of: &[&str]) -> bool {
        match self.parse(message) {
            Some(commit) => commit.types.iter().any(|t| one_of.contains(&t.as_str())),
            None => false,
        }
    }
}

/// Shared parser over [`DEFAULT_TYPES`].
static DEFAULT_PARSER: Lazy<CommitParser> = Lazy::new(|| CommitParser::new(DEFAULT_TYPES));

/// The process-wide default parser.
pub fn default_parser() -> &'static CommitParser {
    &DEFAULT_PARSER
}

pub fn is_feat_commit(message: &str) -> bool {
    default_parser().has_type(message, &["feat", "feature"])
}

pub fn is_fix_commit(message: &str) -> bool {
    default_parser().has_type(message, &["fix"])
}

/// Any of the test flavors, including the catch-all `test`.
pub fn is_test_commit(message: &str) -> bool {
    default_parser().has_type(message, &["test", "utest", "itest", "ltest"])
}

pub fn is_utest_commit(message: &str) -> bool {
    default_parser().has_type(message, &["utest"])
}

pub fn is_itest_commit(message: &str) -> bool {
    default_parser().has_type(message, &["itest"])
}

pub fn is_ltest_commit(message: &str) -> bool {
    default_parser().has_type(message, &["ltest"])
}

pub fn is_build_commit(message: &str) -> bool {
    default_parser().has_type(message, &["build"])
}

pub fn is_publish_commit(message: &str) -> bool {
    default_parser().has_type(message, &["pub", "publish"])
}

pub fn is_release_commit(message: &str) -> bool {
    default_parser().has_type(message, &["rls", "release"])
}

pub fn is_doc_commit(message: &str) -> bool {
    default_parser().has_type(message, &["doc"])
}
