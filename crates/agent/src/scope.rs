//! Detects GitHub requests that reach outside a user's bound repository or
//! branch, before the GitHub worker is ever invoked.

use regex::Regex;

use awxchat_core::RepositoryBinding;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeViolation {
    Repository,
    Branch,
}

impl ScopeViolation {
    pub fn refusal(&self, binding: &RepositoryBinding) -> String {
        match self {
            Self::Repository => format!(
                "Access denied. I can only work with the {} repository.",
                binding.repository
            ),
            Self::Branch => {
                format!("Access denied. I can only work with the {} branch.", binding.branch)
            }
        }
    }
}

/// Words that can sit where a branch name would, without naming one.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "it", "its", "my", "your", "our", "their", "current",
    "same", "default", "bound", "configured", "allowed", "which", "what", "each", "every", "all",
    "any", "branch", "branches", "repo", "repository", "to", "on", "off", "over", "back", "in",
    "of", "for", "from", "is", "are", "and", "or", "with", "please", "me", "you",
];

/// Words that ask for a branch or repository other than the bound one.
const OTHER_MARKERS: &[&str] = &["new", "another", "different", "other", "separate"];

pub struct ScopeGuard {
    repository_markers: Vec<Regex>,
    repository_refs: Vec<Regex>,
    repository_names: Vec<Regex>,
    branch_markers: Vec<Regex>,
    branch_refs: Vec<Regex>,
}

impl ScopeGuard {
    pub fn new() -> Result<Self, regex::Error> {
        let compile = |patterns: &[&str]| -> Result<Vec<Regex>, regex::Error> {
            patterns.iter().map(|pattern| Regex::new(pattern)).collect()
        };

        Ok(Self {
            repository_markers: compile(&[
                r"(?i)\b(?:create|fork|make|init|initialize)\s+(?:a\s+|the\s+|this\s+|my\s+)?(?:new\s+)?(?:github\s+)?(?:repo|repository)\b",
                r"(?i)\b(?:new|another|different|other|separate)\s+(?:github\s+)?(?:repo|repos|repository|repositories)\b",
            ])?,
            repository_refs: compile(&[
                r"(?i)\b(?:repo|repository)\s+(?:named\s+|called\s+)?[`'\x22]?([\w.-]+/[\w.-]+)",
                r"(?i)github\.com[:/]([\w.-]+/[\w.-]+)",
                r"(?i)\b([\w.-]+/[\w.-]+)[`'\x22]?\s+(?:repo|repository)\b",
            ])?,
            repository_names: compile(&[
                r"(?i)\b(?:repo|repository)\s+(?:named|called)\s+[`'\x22]?([\w.-]+)",
                r"(?i)\b(?:switch|move|change)\s+(?:over\s+)?to\s+(?:the\s+)?[`'\x22]?([\w.-]+)[`'\x22]?\s+(?:repo|repository)\b",
            ])?,
            branch_markers: compile(&[
                r"(?i)\b(?:create|make|open|add|cut)\s+(?:a\s+)?(?:new\s+)?branch\b",
                r"(?i)\b(?:new|another|different|other|separate)\s+branch(?:es)?\b",
            ])?,
            branch_refs: compile(&[
                r"(?i)\b(?:on|to|from|into|in|use|using|of|against|for)\s+(?:the\s+)?branch\s+[`'\x22]?([\w./-]+)",
                r"(?i)\bbranch\s+(?:named|called)\s+[`'\x22]?([\w./-]+)",
                r"(?i)\b(?:on|to|from|into|in|use|using|of|against|for|the)\s+[`'\x22]?([\w./-]+)[`'\x22]?\s+branch\b",
                r"(?i)\bswitch\s+(?:over\s+)?to\s+(?:the\s+)?[`'\x22]?([\w./-]+)",
                r"(?i)\bcheckout\s+(?:to\s+)?(?:the\s+)?[`'\x22]?([\w./-]+)",
                r"(?i)\bcheck\s+out\s+(?:the\s+)?[`'\x22]?([\w./-]+)[`'\x22]?\s+branch\b",
            ])?,
        })
    }

    /// The first way `message` reaches outside `binding`, if any.
    pub fn check(&self, message: &str, binding: &RepositoryBinding) -> Option<ScopeViolation> {
        if self.names_other_repository(message, binding) {
            return Some(ScopeViolation::Repository);
        }
        if self.names_other_branch(message, binding) {
            return Some(ScopeViolation::Branch);
        }
        None
    }

    fn names_other_repository(&self, message: &str, binding: &RepositoryBinding) -> bool {
        if self.repository_markers.iter().any(|pattern| pattern.is_match(message)) {
            return true;
        }

        let full_mismatch = captures(&self.repository_refs, message).any(|candidate| {
            let candidate = candidate.trim_end_matches(".git");
            !candidate.eq_ignore_ascii_case(&binding.repository)
        });
        if full_mismatch {
            return true;
        }

        captures(&self.repository_names, message).any(|candidate| {
            let lowered = candidate.to_ascii_lowercase();
            if STOPWORDS.contains(&lowered.as_str()) {
                return false;
            }
            if OTHER_MARKERS.contains(&lowered.as_str()) {
                return true;
            }
            !candidate.eq_ignore_ascii_case(binding.name())
                && !candidate.eq_ignore_ascii_case(&binding.repository)
        })
    }

    fn names_other_branch(&self, message: &str, binding: &RepositoryBinding) -> bool {
        if self.branch_markers.iter().any(|pattern| pattern.is_match(message)) {
            return true;
        }

        captures(&self.branch_refs, message).any(|candidate| {
            let lowered = candidate.to_ascii_lowercase();
            if OTHER_MARKERS.contains(&lowered.as_str()) {
                return true;
            }
            if STOPWORDS.contains(&lowered.as_str()) || looks_like_file(candidate) {
                return false;
            }
            !candidate.eq_ignore_ascii_case(&binding.branch)
        })
    }
}

/// `README.md`, `roles/web/tasks/main.yml`: a final segment with an
/// alphabetic extension. Branch names like `release/2024.06` do not qualify.
fn looks_like_file(candidate: &str) -> bool {
    let last = candidate.rsplit('/').next().unwrap_or(candidate);
    match last.rsplit_once('.') {
        Some((stem, extension)) => {
            !stem.is_empty()
                && (1..=5).contains(&extension.len())
                && extension.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

fn captures<'a>(patterns: &'a [Regex], message: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    patterns.iter().flat_map(move |pattern| {
        pattern
            .captures_iter(message)
            .filter_map(|captures| captures.get(1))
            .map(|found| found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '/']))
            .filter(|candidate| !candidate.is_empty())
    })
}
