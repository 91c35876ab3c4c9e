#![forbid(unsafe_code)]

//! Deterministic names for issue branches and worktree folders.
//!
//! Everything here is pure: the same issue number and title always map to the
//! same branch and folder, which is what lets the rest of the crate find
//! worktrees again without keeping an index.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

pub const MAX_SLUG_LEN: usize = 30;

static LEADING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").expect("valid regex"));
static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
static ISSUE_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^issue-(\d+)-").expect("valid regex"));

/// Turns an issue title into a short, hyphenated token.
///
/// `[Bug] Fix login issue` becomes `fix-login-issue`; `[FAQ] FAQ question`
/// becomes `faq-question` because a word equal to its predecessor is dropped.
#[must_use]
pub fn slugify(title: &str) -> String {
    let untagged = LEADING_TAG.replace(title, "");
    let lower = untagged.to_lowercase();
    let hyphenated = NON_ALNUM.replace_all(&lower, "-");

    let joined = dedupe_words(&hyphenated);
    let truncated: String = joined.chars().take(MAX_SLUG_LEN).collect();
    // A cut can turn `ab-abc` into `ab-ab`; collapse again so the result is a fixed point.
    dedupe_words(&truncated)
}

fn dedupe_words(hyphenated: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    for word in hyphenated.split('-') {
        if word.is_empty() || words.last() == Some(&word) {
            continue;
        }
        words.push(word);
    }
    words.join("-")
}

#[must_use]
pub fn branch_name(issue_number: u64, title: &str) -> String {
    format!("issue-{issue_number}-{}", slugify(title))
}

#[must_use]
pub fn worktree_dir_name(project_name: &str, issue_number: u64, title: &str) -> String {
    format!("{project_name}-issue-{issue_number}-{}", slugify(title))
}

#[must_use]
pub fn worktree_path(
    parent_dir: &Path,
    project_name: &str,
    issue_number: u64,
    title: &str,
) -> PathBuf {
    parent_dir.join(worktree_dir_name(project_name, issue_number, title))
}

/// Folder for an existing issue branch, so an attached worktree keeps the
/// branch's slug even after the issue title changed.
#[must_use]
pub fn worktree_path_for_branch(parent_dir: &Path, project_name: &str, branch: &str) -> PathBuf {
    parent_dir.join(format!("{project_name}-{branch}"))
}

/// Marker every issue worktree path contains: `{project}-issue-`.
#[must_use]
pub fn worktree_path_marker(project_name: &str) -> String {
    format!("{project_name}-issue-")
}

/// Issue number embedded in an `issue-{n}-...` branch name.
#[must_use]
pub fn parse_issue_branch(branch: &str) -> Option<u64> {
    ISSUE_BRANCH
        .captures(branch)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Issue number embedded in a `{project}-issue-{n}-...` folder name.
#[must_use]
pub fn parse_issue_dir(project_name: &str, dir_name: &str) -> Option<u64> {
    let rest = dir_name.strip_prefix(&worktree_path_marker(project_name))?;
    let (digits, _) = rest.split_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Prefix shared by every branch of one issue, regardless of title edits.
#[must_use]
pub fn issue_branch_prefix(issue_number: u64) -> String {
    format!("issue-{issue_number}-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_strips_tags_and_punctuation() {
        assert_eq!(slugify("[Bug] Fix login issue"), "fix-login-issue");
        assert_eq!(slugify("Fix: issue #123!"), "fix-issue-123");
        assert_eq!(slugify("  --Hello,   World--  "), "hello-world");
    }

    #[test]
    fn slugify_collapses_repeated_words() {
        assert_eq!(slugify("[FAQ] FAQ question"), "faq-question");
        assert_eq!(slugify("faq faq faq answer"), "faq-answer");
        // Only adjacent repeats collapse.
        assert_eq!(slugify("a b a"), "a-b-a");
    }

    #[test]
    fn slugify_truncates_without_trailing_hyphen() {
        let slug = slugify("Implement the extremely long feature name that goes on");
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("implement-the-extremely"));

        // The 30th char would otherwise be a hyphen.
        let slug = slugify(&format!("{} bbb", "a".repeat(29)));
        assert_eq!(slug, "a".repeat(29));

        // Truncation must not leave a repeated word behind.
        let slug = slugify(&format!("{} ab abc", "x".repeat(24)));
        assert_eq!(slug, format!("{}-ab", "x".repeat(24)));
    }

    #[test]
    fn slugify_output_is_stable_and_well_formed() {
        let titles = [
            "[Bug] Fix login issue",
            "[FAQ] FAQ question",
            "Fix: issue #123!",
            "Ünïcödé — titles & symbols",
            "Support the 2FA/OTP flow for really really long descriptions",
            "!!!",
            "",
        ];
        for title in titles {
            let slug = slugify(title);
            assert_eq!(slugify(&slug), slug, "not idempotent for {title:?}");
            assert!(slug.len() <= MAX_SLUG_LEN);
            assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            assert!(
                slug.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
                "bad chars in {slug:?}"
            );
        }
    }

    #[test]
    fn names_for_same_title_differ_only_in_issue_number() {
        let title = "[Bug] Add dark mode support";
        let a = branch_name(41, title);
        let b = branch_name(42, title);
        assert_ne!(a, b);
        assert_eq!(a.replacen("41", "42", 1), b);

        let parent = Path::new("/work");
        let pa = worktree_path(parent, "app", 41, title);
        let pb = worktree_path(parent, "app", 42, title);
        assert_ne!(pa, pb);
        assert_eq!(
            pa.to_string_lossy().replacen("-41-", "-42-", 1),
            pb.to_string_lossy()
        );
    }

    #[test]
    fn dark_mode_example_names() {
        let title = "[Bug] Add dark mode support";
        assert_eq!(branch_name(42, title), "issue-42-add-dark-mode-support");
        assert_eq!(
            worktree_path(Path::new("/src"), "proj", 42, title),
            PathBuf::from("/src/proj-issue-42-add-dark-mode-support")
        );
    }

    #[test]
    fn parses_issue_numbers_back_out() {
        assert_eq!(parse_issue_branch("issue-42-add-dark-mode"), Some(42));
        assert_eq!(parse_issue_branch("issue-7-"), Some(7));
        assert_eq!(parse_issue_branch("feature/issue-42-x"), None);
        assert_eq!(parse_issue_branch("issue-abc-x"), None);

        assert_eq!(parse_issue_dir("proj", "proj-issue-42-dark"), Some(42));
        assert_eq!(parse_issue_dir("proj", "proj-issue-42-"), Some(42));
        assert_eq!(parse_issue_dir("proj", "other-issue-42-dark"), None);
        assert_eq!(parse_issue_dir("proj", "proj-issue-x-dark"), None);
        assert_eq!(parse_issue_dir("proj", "proj-issue-42"), None);
    }
}
