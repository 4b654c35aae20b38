//! Fuzzy match scoring of mount entries against a requested media item
//!
//! Candidates are names of files or folders that appeared on the remote
//! mount. The scorer decides how confident we are that a candidate is the
//! item the upstream resolver pointed us to. Hard rejects (wrong season, wrong
//! year, numbered sequel) always win over positive signals; positive signals
//! are summed and capped before penalties are subtracted.

use crate::normalize::{keywords, normalize, tokenize};
use crate::scanner::strip_video_extension;
use crate::season_episode::{extract_season_episode, extract_season_range, extract_years};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Points for a strong title (or original title) keyword overlap
const TITLE_WEIGHT: f64 = 50.0;
/// Points per unit of overlap ratio when the overlap is weak
const PARTIAL_TITLE_WEIGHT: f64 = 20.0;
/// Points when the requested year appears in the candidate
const YEAR_WEIGHT: f64 = 30.0;
/// Points when season and episode both match
const EPISODE_WEIGHT: f64 = 40.0;
/// Points when only the season matches
const SEASON_WEIGHT: f64 = 20.0;
/// Points when the candidate is related to the expected filename
const EXPECTED_FILENAME_WEIGHT: f64 = 40.0;
/// Penalty when a specific episode was expected but the candidate names none
const MISSING_EPISODE_PENALTY: f64 = 30.0;
/// Penalty for samples, trailers and extras
const EXTRA_CONTENT_PENALTY: f64 = 60.0;

/// Shortest normalized string allowed to take part in substring relations
const MIN_RELATION_LEN: usize = 4;

const EXTRA_CONTENT_TOKENS: &[&str] = &[
    "sample", "samples", "trailer", "trailers", "extra", "extras",
];

/// Empirical tuning parameters of the scorer
///
/// The defaults come from observation of real release names and have not
/// been validated beyond that; every value can be overridden from the
/// `[matching]` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// Minimum score for a candidate to be accepted
    pub accept: u8,
    /// Minimum score for a video file found inside an accepted folder
    pub sub_file: u8,
    /// Titles up to this many normalized characters get the sequel guard
    pub short_title_len: usize,
    /// Keyword overlap ratio counted as a strong title match
    pub strong_overlap: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            accept: 35,
            sub_file: 30,
            short_title_len: 4,
            strong_overlap: 0.7,
        }
    }
}

/// The metadata a candidate is compared against
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchQuery<'a> {
    /// Filename announced by the upstream resolver (may be a label, not a file)
    pub expected_filename: &'a str,
    /// Display title, possibly localized
    pub title: &'a str,
    /// Title in the original language
    pub original_title: Option<&'a str>,
    /// Release year as a string, e.g. "2011"
    pub year: Option<&'a str>,
    /// Requested season; `None` means a movie
    pub season: Option<u32>,
    /// Requested episode
    pub episode: Option<u32>,
}

/// Why a candidate received its score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchReason {
    /// Identical to the expected filename
    ExpectedFilename,
    /// Identical to the title or original title
    ExactTitle,
    /// Sum of the weighted signals
    Weighted,
    /// Candidate names a season that is neither requested nor covered by a pack
    SeasonMismatch,
    /// Candidate names a different episode
    EpisodeMismatch,
    /// Candidate is a series file but a movie was requested
    SeriesForMovie,
    /// Candidate is dated with a different year
    YearMismatch,
    /// Candidate is a numbered sequel of a short title
    SequelGuard,
    /// Nothing in the candidate relates to any of the titles
    NoTitleHint,
    /// A multi-word title is only partially covered
    WeakTitleCoverage,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MatchReason::ExpectedFilename => "identical to the expected filename",
            MatchReason::ExactTitle => "identical to the title",
            MatchReason::Weighted => "weighted signals",
            MatchReason::SeasonMismatch => "different season",
            MatchReason::EpisodeMismatch => "different episode",
            MatchReason::SeriesForMovie => "series file offered for a movie",
            MatchReason::YearMismatch => "different year",
            MatchReason::SequelGuard => "numbered sequel of a short title",
            MatchReason::NoTitleHint => "no title hint",
            MatchReason::WeakTitleCoverage => "title only partially covered",
        };
        f.write_str(text)
    }
}

/// Score of a candidate together with the deciding reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// 0-100, 0 meaning rejected
    pub score: u8,
    pub reason: MatchReason,
}

impl Evaluation {
    fn rejected(reason: MatchReason) -> Self {
        Self { score: 0, reason }
    }
}

/// Scorer for one query, with every query-side string precomputed
#[derive(Debug, Clone)]
pub struct Matcher<'a> {
    query: MatchQuery<'a>,
    thresholds: MatchThresholds,
    expected_norm: String,
    expected_head: String,
    title_norm: String,
    original_norm: String,
    title_keywords: HashSet<String>,
    original_keywords: HashSet<String>,
    year: Option<u32>,
    expects_specific_file: bool,
}

impl<'a> Matcher<'a> {
    pub fn new(query: MatchQuery<'a>, thresholds: MatchThresholds) -> Self {
        let expected_stem = strip_video_extension(query.expected_filename);
        let original = query.original_title.unwrap_or_default();

        Self {
            expected_norm: normalize(expected_stem),
            expected_head: title_head(expected_stem),
            title_norm: normalize(query.title),
            original_norm: normalize(original),
            title_keywords: keywords(tokenize(query.title)),
            original_keywords: keywords(tokenize(original)),
            year: query
                .year
                .and_then(|y| y.trim().parse().ok()),
            expects_specific_file: expected_stem.len() < query.expected_filename.len(),
            query,
            thresholds,
        }
    }

    pub fn query(&self) -> &MatchQuery<'a> {
        &self.query
    }

    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    /// Whether the expected filename looks like a real file name
    ///
    /// Resolvers sometimes hand back a label such as `[RD+] TorBox` instead of
    /// a filename; only names with a playable extension are trusted.
    pub fn trusts_expected_filename(&self) -> bool {
        self.expects_specific_file
    }

    /// Keywords of the title, original title and expected title head
    pub fn search_keywords(&self) -> HashSet<String> {
        let mut words = self.title_keywords.clone();
        words.extend(self.original_keywords.iter().cloned());
        words.extend(keywords(tokenize(strip_video_extension(
            self.query.expected_filename,
        ))));
        words
    }

    /// Confidence (0-100) that `candidate` is the requested item
    pub fn score(&self, candidate: &str) -> u8 {
        self.evaluate(candidate).score
    }

    /// `score(candidate) >= accept threshold`
    pub fn is_valid_match(&self, candidate: &str) -> bool {
        self.score(candidate) >= self.thresholds.accept
    }

    /// Scores a candidate and reports which rule decided the outcome
    pub fn evaluate(&self, candidate: &str) -> Evaluation {
        let stem = strip_video_extension(candidate);
        let candidate_norm = normalize(stem);

        if !self.expected_norm.is_empty() && candidate_norm == self.expected_norm {
            return Evaluation {
                score: 100,
                reason: MatchReason::ExpectedFilename,
            };
        }

        let parsed = extract_season_episode(candidate);
        let range = extract_season_range(candidate);

        match self.query.season {
            Some(season) => {
                let covered = range.is_some_and(|r| r.covers(season));
                match parsed.season {
                    None if range.is_some() && !covered => {
                        return Evaluation::rejected(MatchReason::SeasonMismatch);
                    }
                    Some(found) if found != season && !covered => {
                        return Evaluation::rejected(MatchReason::SeasonMismatch);
                    }
                    _ => {}
                }
                if let (Some(wanted), Some(found)) = (self.query.episode, parsed.episode) {
                    if wanted != found {
                        return Evaluation::rejected(MatchReason::EpisodeMismatch);
                    }
                }
            }
            None => {
                if parsed.season.is_some() {
                    return Evaluation::rejected(MatchReason::SeriesForMovie);
                }
            }
        }

        let years = extract_years(candidate);
        if let Some(year) = self.year {
            if !years.is_empty() && !years.contains(&year) {
                let is_movie = self.query.season.is_none();
                let has_season_marker = parsed.season.is_some() || range.is_some();
                if is_movie || !has_season_marker {
                    return Evaluation::rejected(MatchReason::YearMismatch);
                }
            }
        }

        if !candidate_norm.is_empty()
            && (candidate_norm == self.title_norm || candidate_norm == self.original_norm)
        {
            return Evaluation {
                score: 95,
                reason: MatchReason::ExactTitle,
            };
        }

        if self.query.season.is_none() && self.is_sequel_of_short_title(&candidate_norm, &years) {
            return Evaluation::rejected(MatchReason::SequelGuard);
        }

        let candidate_tokens: HashSet<String> = tokenize(stem).collect();
        let title_ratio = overlap_ratio(&candidate_tokens, &self.title_keywords);
        let original_ratio = overlap_ratio(&candidate_tokens, &self.original_keywords);
        let expected_related = self.is_related_to_expected(stem, &candidate_norm);

        let mut positive = self.title_weight(title_ratio) + self.title_weight(original_ratio);
        let mut penalty = 0.0;

        if let Some(year) = self.query.year.map(str::trim).filter(|y| !y.is_empty()) {
            if candidate.contains(year) {
                positive += YEAR_WEIGHT;
            }
        }

        if let Some(season) = self.query.season {
            if parsed.season == Some(season) {
                if self.query.episode.is_some() && parsed.episode == self.query.episode {
                    positive += EPISODE_WEIGHT;
                } else {
                    positive += SEASON_WEIGHT;
                    if self.query.episode.is_some()
                        && parsed.episode.is_none()
                        && self.expects_specific_file
                    {
                        penalty += MISSING_EPISODE_PENALTY;
                    }
                }
            }
        }

        if expected_related {
            positive += EXPECTED_FILENAME_WEIGHT;
        }

        if candidate_tokens
            .iter()
            .any(|token| EXTRA_CONTENT_TOKENS.contains(&token.as_str()))
        {
            penalty += EXTRA_CONTENT_PENALTY;
        }

        if title_ratio <= 0.0 && original_ratio <= 0.0 && !expected_related {
            return Evaluation::rejected(MatchReason::NoTitleHint);
        }

        if self.title_keywords.len() >= 2
            && title_ratio < 1.0
            && original_ratio < self.thresholds.strong_overlap
            && !expected_related
        {
            return Evaluation::rejected(MatchReason::WeakTitleCoverage);
        }

        let score = (positive.min(100.0) - penalty).clamp(0.0, 100.0);
        Evaluation {
            score: score as u8,
            reason: MatchReason::Weighted,
        }
    }

    fn title_weight(&self, ratio: f64) -> f64 {
        if ratio >= self.thresholds.strong_overlap {
            TITLE_WEIGHT
        } else {
            PARTIAL_TITLE_WEIGHT * ratio
        }
    }

    /// `Ted 2` offered for `Ted`: the title is followed by a digit that is
    /// not part of the title and does not start a year
    fn is_sequel_of_short_title(&self, candidate_norm: &str, years: &[u32]) -> bool {
        let title_len = self.title_norm.chars().count();
        if title_len == 0 || title_len > self.thresholds.short_title_len {
            return false;
        }
        let Some(rest) = candidate_norm.strip_prefix(self.title_norm.as_str()) else {
            return false;
        };
        let Some(next) = rest.chars().next() else {
            return false;
        };
        if !next.is_ascii_digit() || self.title_norm.contains(next) {
            return false;
        }
        !years.iter().any(|year| rest.starts_with(&year.to_string()))
    }

    fn is_related_to_expected(&self, candidate_stem: &str, candidate_norm: &str) -> bool {
        let long_enough = |s: &str| s.chars().count() >= MIN_RELATION_LEN;

        if long_enough(&self.expected_norm) && long_enough(candidate_norm) {
            if candidate_norm.contains(self.expected_norm.as_str()) {
                return true;
            }
            // A bare `S01E02.mkv` must not count as contained in every expected name
            if self.expected_norm.contains(candidate_norm)
                && long_enough(&title_head(candidate_stem))
            {
                return true;
            }
        }

        long_enough(&self.expected_head) && candidate_norm.contains(self.expected_head.as_str())
    }
}

/// Share of `wanted` keywords present in `tokens`; 0 when nothing is wanted
fn overlap_ratio(tokens: &HashSet<String>, wanted: &HashSet<String>) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let matched = wanted.iter().filter(|word| tokens.contains(*word)).count();
    matched as f64 / wanted.len() as f64
}

/// Normalized title portion of a release name
///
/// Everything up to the first season/episode marker, year, resolution or
/// season keyword: `Game of Thrones S01E02` becomes `gameofthrones`.
fn title_head(name: &str) -> String {
    tokenize(name)
        .take_while(|token| !is_release_marker(token))
        .collect()
}

fn is_release_marker(token: &str) -> bool {
    let digits_only = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if token.len() == 4 && digits_only(token) {
        if let Ok(year) = token.parse::<u32>() {
            if (1900..=2099).contains(&year) {
                return true;
            }
        }
    }

    if let Some(rest) = token.strip_prefix('s') {
        let (season, episode) = rest.split_once('e').unwrap_or((rest, ""));
        if digits_only(season) && (episode.is_empty() || digits_only(episode)) {
            return true;
        }
    }

    if let Some((season, episode)) = token.split_once('x') {
        if digits_only(season) && season.len() <= 2 && digits_only(episode) && episode.len() <= 3 {
            return true;
        }
    }

    if let Some(resolution) = token.strip_suffix('p') {
        if digits_only(resolution) && (3..=4).contains(&resolution.len()) {
            return true;
        }
    }

    matches!(token, "season" | "temporada" | "saison")
}

/// Scores `candidate` with the default thresholds
///
/// Convenience wrapper around [`Matcher`] for one-off comparisons.
pub fn score(
    candidate: &str,
    expected_filename: &str,
    title: &str,
    year: Option<&str>,
    season: Option<u32>,
    episode: Option<u32>,
    original_title: Option<&str>,
) -> u8 {
    let query = MatchQuery {
        expected_filename,
        title,
        original_title,
        year,
        season,
        episode,
    };
    Matcher::new(query, MatchThresholds::default()).score(candidate)
}

/// `score(...) >= 35`
pub fn is_valid_match(
    candidate: &str,
    expected_filename: &str,
    title: &str,
    year: Option<&str>,
    season: Option<u32>,
    episode: Option<u32>,
    original_title: Option<&str>,
) -> bool {
    score(
        candidate,
        expected_filename,
        title,
        year,
        season,
        episode,
        original_title,
    ) >= MatchThresholds::default().accept
}
