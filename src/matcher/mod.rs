//! NGO mention matching.
//!
//! Given a block of free text and the NGO registry, decide which NGOs are
//! referenced. Matching runs in two phases:
//!
//! 1. **Exact**: every keyword of every NGO is checked. Acronym keywords
//!    (no lowercase letters, at least one uppercase letter) must appear as a
//!    whole word; other keywords match as case-insensitive substrings. The
//!    first keyword hit for an NGO adds it and moves on to the next NGO.
//! 2. **Fuzzy**: controlled by [`FuzzyPolicy`].
//!    - `Global` runs only when the exact phase found nothing: the text is
//!      scored against every NGO whose *name* is not an acronym and the single
//!      best candidate is accepted if it reaches the threshold.
//!    - `PerKeyword` scores each non-acronym keyword whose exact check failed
//!      against the text and accepts its NGO independently of other matches.
//!
//! # Call sites
//!
//! | Caller | Preset | Fuzzy | Acronym case |
//! |--------|--------|-------|--------------|
//! | Subreddit posts | [`MatchOptions::subreddit_posts`] | global | sensitive |
//! | YouTube videos | [`MatchOptions::videos`] | per keyword | insensitive |
//! | Bluesky posts | [`MatchOptions::exact_only`] | disabled | sensitive |

pub mod similarity;

use crate::models::NgoId;
use crate::registry::NgoRegistry;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use tracing::warn;

pub use similarity::{normalize_for_fuzzy, partial_ratio};

/// When and how the fuzzy phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FuzzyPolicy {
    /// Exact matching only.
    Disabled,
    /// Best non-acronym NGO name, only when nothing matched exactly.
    Global,
    /// Each non-acronym keyword that missed exactly gets a fuzzy check.
    PerKeyword,
}

/// Case handling for whole-word acronym matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AcronymCase {
    Sensitive,
    Insensitive,
}

/// Knobs for one matcher call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Minimum partial-ratio score (0..=100) for a fuzzy match.
    pub fuzzy_threshold: u8,
    pub fuzzy_policy: FuzzyPolicy,
    pub acronym_case: AcronymCase,
}

impl MatchOptions {
    pub fn subreddit_posts(fuzzy_threshold: u8) -> Self {
        Self {
            fuzzy_threshold,
            fuzzy_policy: FuzzyPolicy::Global,
            acronym_case: AcronymCase::Sensitive,
        }
    }

    pub fn videos(fuzzy_threshold: u8) -> Self {
        Self {
            fuzzy_threshold,
            fuzzy_policy: FuzzyPolicy::PerKeyword,
            acronym_case: AcronymCase::Insensitive,
        }
    }

    pub fn exact_only() -> Self {
        Self {
            fuzzy_threshold: 100,
            fuzzy_policy: FuzzyPolicy::Disabled,
            acronym_case: AcronymCase::Sensitive,
        }
    }

    /// Replace the policy and/or case handling when the caller asked for it.
    pub fn with_overrides(
        mut self,
        fuzzy_policy: Option<FuzzyPolicy>,
        acronym_case: Option<AcronymCase>,
    ) -> Self {
        if let Some(policy) = fuzzy_policy {
            self.fuzzy_policy = policy;
        }
        if let Some(case) = acronym_case {
            self.acronym_case = case;
        }
        self
    }
}

/// A keyword is an acronym when it has uppercase letters and no lowercase ones.
///
/// Strings without any cased letter (digits, punctuation) are not acronyms.
pub fn is_acronym(keyword: &str) -> bool {
    keyword.chars().any(char::is_uppercase) && !keyword.chars().any(char::is_lowercase)
}

#[derive(Debug)]
enum KeywordPattern {
    /// Whole-word regex.
    Acronym(Regex),
    /// Lowercased keyword for substring and fuzzy checks.
    Phrase(String),
}

#[derive(Debug)]
struct NgoPatterns {
    id: NgoId,
    /// `None` when the name is an acronym and therefore not a global fuzzy candidate.
    fuzzy_name: Option<String>,
    keywords: Vec<KeywordPattern>,
}

/// Matcher with the registry's patterns compiled once.
///
/// Holds no mutable state; [`NgoMatcher::find`] can be called any number of
/// times, from any number of threads, with identical results for identical
/// input.
#[derive(Debug)]
pub struct NgoMatcher {
    ngos: Vec<NgoPatterns>,
    options: MatchOptions,
}

impl NgoMatcher {
    pub fn new(registry: &NgoRegistry, options: MatchOptions) -> Self {
        let ngos = registry
            .iter()
            .map(|ngo| {
                let keywords = ngo
                    .keywords
                    .iter()
                    .filter_map(|keyword| compile_keyword(ngo.id, keyword, options.acronym_case))
                    .collect();
                let fuzzy_name = if is_acronym(&ngo.name) {
                    None
                } else {
                    Some(normalize_for_fuzzy(&ngo.name))
                };
                NgoPatterns { id: ngo.id, fuzzy_name, keywords }
            })
            .collect();
        Self { ngos, options }
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Ids of every NGO referenced by `text`.
    pub fn find(&self, text: &str) -> BTreeSet<NgoId> {
        let mut found = BTreeSet::new();
        if text.trim().is_empty() {
            return found;
        }
        let lowered = text.to_lowercase();
        let per_keyword = self.options.fuzzy_policy == FuzzyPolicy::PerKeyword;

        for ngo in &self.ngos {
            let hit = ngo.keywords.iter().any(|pattern| match pattern {
                KeywordPattern::Acronym(re) => re.is_match(text),
                KeywordPattern::Phrase(keyword) => {
                    lowered.contains(keyword.as_str())
                        || (per_keyword
                            && partial_ratio(keyword, &lowered) >= self.options.fuzzy_threshold)
                }
            });
            if hit {
                found.insert(ngo.id);
            }
        }

        if found.is_empty() && self.options.fuzzy_policy == FuzzyPolicy::Global {
            if let Some(id) = self.best_fuzzy_name(text) {
                found.insert(id);
            }
        }
        found
    }

    /// Highest-scoring non-acronym NGO name, if it reaches the threshold.
    /// Ties go to the NGO listed first.
    fn best_fuzzy_name(&self, text: &str) -> Option<NgoId> {
        let query = normalize_for_fuzzy(text);
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(NgoId, u8)> = None;
        for ngo in &self.ngos {
            let Some(name) = &ngo.fuzzy_name else { continue };
            let score = partial_ratio(&query, name);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((ngo.id, score));
            }
        }
        best.filter(|&(_, score)| score >= self.options.fuzzy_threshold)
            .map(|(id, _)| id)
    }
}

fn compile_keyword(ngo_id: NgoId, keyword: &str, case: AcronymCase) -> Option<KeywordPattern> {
    if keyword.trim().is_empty() {
        warn!(ngo_id, "Skipping blank keyword");
        return None;
    }
    if !is_acronym(keyword) {
        return Some(KeywordPattern::Phrase(keyword.to_lowercase()));
    }
    let pattern = format!(r"\b{}\b", regex::escape(keyword));
    match RegexBuilder::new(&pattern)
        .case_insensitive(case == AcronymCase::Insensitive)
        .build()
    {
        Ok(re) => Some(KeywordPattern::Acronym(re)),
        Err(e) => {
            warn!(ngo_id, keyword, error = %e, "Skipping keyword with invalid pattern");
            None
        }
    }
}

/// One-shot form of [`NgoMatcher::find`].
pub fn find_ngos(text: &str, registry: &NgoRegistry, options: MatchOptions) -> BTreeSet<NgoId> {
    NgoMatcher::new(registry, options).find(text)
}
