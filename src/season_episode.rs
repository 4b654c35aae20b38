//! Season, episode, range and year extraction from release names
//!
//! Patterns are tried in a fixed priority order and the first one that
//! matches wins. The `regex` crate has no lookaround support, so the digit
//! boundary rules (`1920x1080` is a resolution, not season 1920 episode 1080)
//! are enforced by inspecting the characters around each candidate match.

use crate::normalize::{normalize, tokenize};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;

/// `S01.E02`, `S01 - E02`, `s1_e2`
static SEPARATED_SE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)s([0-9]{1,3})[\s._\-]+e([0-9]{1,4})").expect("valid regex"));

/// `S01E02`
static COMPACT_SE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)s([0-9]{1,3})e([0-9]{1,4})").expect("valid regex"));

/// `1x02`; the leading group consumes the non-digit in front of the season
static CROSS_SE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9])([0-9]{1,2})x([0-9]{1,3})").expect("valid regex")
});

/// `Temporada 2`, `Season 2`, `Saison 2`
static SEASON_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:temporada|season|saison)[\s._\-]*([0-9]{1,3})").expect("valid regex")
});

/// `Capitulo 4`, `Capítulo 4`, `Episodio 4`, `Episode 4`, `Épisode 4`
static EPISODE_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:cap[ií]tulo|episodio|[eé]pisode)[\s._\-]*([0-9]{1,4})")
        .expect("valid regex")
});

/// Bare `S01` at the start of a word
static BARE_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[^\p{L}\p{N}])s([0-9]{1,2})").expect("valid regex"));

/// `S01-S03`, `S1 - S5`
static SEASON_SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)s([0-9]{1,2})\s*-\s*s([0-9]{1,2})(?:[^0-9]|$)").expect("valid regex")
});

/// `Seasons 1-3`, `Temporadas 1 a 4`, `Saisons 1 à 2`
static SEASON_WORD_SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(?:seasons?|temporadas?|saisons?)[\s._]*([0-9]{1,2})",
        r"\s*(?:-|to|a|al|à)\s*([0-9]{1,2})(?:[^0-9]|$)",
    ))
    .expect("valid regex")
});

/// Four-digit years between 1900 and 2099; boundaries are checked by hand
/// because `\b` treats `_` as part of a word
static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(19[0-9]{2}|20[0-9]{2})").expect("valid regex"));

/// Tokens announcing that a release covers every season of a show
const COMPLETE_PACK_KEYWORDS: &[&str] = &[
    "complete",
    "completa",
    "completo",
    "integral",
    "integrale",
    "intégrale",
    "collection",
    "coleccion",
    "colección",
    "boxset",
];

/// Multi-word variants, compared on the normalized name
const COMPLETE_PACK_PHRASES: &[&str] = &["allseasons", "todaslastemporadas", "touteslessaisons"];

/// Season and episode parsed from a name
///
/// `episode` may be `None` while `season` is set: that is a season pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeasonEpisode {
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl SeasonEpisode {
    fn new(season: Option<u32>, episode: Option<u32>) -> Self {
        Self { season, episode }
    }

    /// True when neither a season nor an episode was recognized
    pub fn is_empty(&self) -> bool {
        self.season.is_none() && self.episode.is_none()
    }
}

impl fmt::Display for SeasonEpisode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => write!(f, "S{:02}E{:02}", s, e),
            (Some(s), None) => write!(f, "S{:02}", s),
            (None, Some(e)) => write!(f, "E{:02}", e),
            (None, None) => write!(f, "-"),
        }
    }
}

/// Seasons covered by a multi-season pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeasonRange {
    pub min: u32,
    pub max: u32,
}

impl SeasonRange {
    /// Sentinel used for "complete" packs whose coverage is unknown but total
    pub const COMPLETE: SeasonRange = SeasonRange { min: 0, max: 99 };

    fn spanning(a: u32, b: u32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Whether the pack contains the given season
    pub fn covers(&self, season: u32) -> bool {
        *self == Self::COMPLETE || (self.min..=self.max).contains(&season)
    }

    pub fn is_complete_pack(&self) -> bool {
        *self == Self::COMPLETE
    }
}

fn capture_u32(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

/// Character immediately after byte offset `end`
fn char_after(text: &str, end: usize) -> Option<char> {
    text[end..].chars().next()
}

/// Character immediately before byte offset `start`
fn char_before(text: &str, start: usize) -> Option<char> {
    text[..start].chars().next_back()
}

/// True when `c` is missing or is a separator (`_` included)
fn is_separator(c: Option<char>) -> bool {
    c.is_none_or(|c| !c.is_alphanumeric())
}

/// `<n>x<m>` where nothing alphanumeric touches the episode digits
fn find_cross_notation(text: &str) -> Option<(u32, u32)> {
    CROSS_SE_RE.captures_iter(text).find_map(|caps| {
        let episode = caps.get(2)?;
        let boundary_ok = char_after(text, episode.end())
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        if boundary_ok {
            Some((capture_u32(&caps, 1)?, capture_u32(&caps, 2)?))
        } else {
            None
        }
    })
}

/// Every bare `S<n>` token not followed by another digit
fn bare_season_tokens(text: &str) -> Vec<u32> {
    BARE_SEASON_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let digits = caps.get(1)?;
            let boundary_ok = char_after(text, digits.end()).is_none_or(|c| !c.is_ascii_digit());
            if boundary_ok {
                digits.as_str().parse().ok()
            } else {
                None
            }
        })
        .collect()
}

/// Extracts season and episode numbers from a release name
///
/// Patterns, first match wins:
/// 1. `S01.E02` with a separator between the markers
/// 2. `S01E02`
/// 3. `1x02` (never inside a longer digit run such as `1920x1080`)
/// 4. `Temporada 1 ... Capitulo 2` style keyword pairs
/// 5. `Season 1` alone (season pack)
/// 6. bare `S01` (season pack)
///
/// # Examples
///
/// ```ignore
/// let se = extract_season_episode("Game of Thrones S01E02.mkv");
/// assert_eq!((se.season, se.episode), (Some(1), Some(2)));
/// ```
pub fn extract_season_episode(text: &str) -> SeasonEpisode {
    if text.is_empty() {
        return SeasonEpisode::default();
    }

    if let Some(caps) = SEPARATED_SE_RE.captures(text) {
        return SeasonEpisode::new(capture_u32(&caps, 1), capture_u32(&caps, 2));
    }

    if let Some(caps) = COMPACT_SE_RE.captures(text) {
        return SeasonEpisode::new(capture_u32(&caps, 1), capture_u32(&caps, 2));
    }

    if let Some((season, episode)) = find_cross_notation(text) {
        return SeasonEpisode::new(Some(season), Some(episode));
    }

    let season_word = SEASON_WORD_RE.captures(text);
    if let Some(season_caps) = &season_word {
        if let Some(episode_caps) = EPISODE_WORD_RE.captures(text) {
            return SeasonEpisode::new(capture_u32(season_caps, 1), capture_u32(&episode_caps, 1));
        }
        return SeasonEpisode::new(capture_u32(season_caps, 1), None);
    }

    if let Some(season) = bare_season_tokens(text).into_iter().next() {
        return SeasonEpisode::new(Some(season), None);
    }

    SeasonEpisode::default()
}

/// Detects names that cover several seasons at once
///
/// Recognizes explicit spans (`S01-S03`, `Seasons 1-3`), two or more bare
/// season tokens without any episode marker (`Show S01 S02 S03`), and
/// "complete" keywords, which yield [`SeasonRange::COMPLETE`].
pub fn extract_season_range(text: &str) -> Option<SeasonRange> {
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = SEASON_SPAN_RE
        .captures(text)
        .or_else(|| SEASON_WORD_SPAN_RE.captures(text))
    {
        if let (Some(a), Some(b)) = (capture_u32(&caps, 1), capture_u32(&caps, 2)) {
            return Some(SeasonRange::spanning(a, b));
        }
    }

    let seasons = bare_season_tokens(text);
    if seasons.len() >= 2 && extract_season_episode(text).episode.is_none() {
        let min = seasons.iter().copied().min()?;
        let max = seasons.iter().copied().max()?;
        return Some(SeasonRange { min, max });
    }

    let has_keyword = tokenize(text).any(|token| COMPLETE_PACK_KEYWORDS.contains(&token.as_str()));
    let normalized = normalize(text);
    let has_phrase = COMPLETE_PACK_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase));
    if has_keyword || has_phrase {
        return Some(SeasonRange::COMPLETE);
    }

    None
}

/// All year-looking numbers (1900-2099) in a name, in order of appearance
pub fn extract_years(text: &str) -> Vec<u32> {
    YEAR_RE
        .find_iter(text)
        .filter(|m| {
            is_separator(char_before(text, m.start())) && is_separator(char_after(text, m.end()))
        })
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn se(text: &str) -> (Option<u32>, Option<u32>) {
        let parsed = extract_season_episode(text);
        (parsed.season, parsed.episode)
    }

    #[test]
    fn test_standard_notation() {
        assert_eq!(se("Game of Thrones S01E02.mkv"), (Some(1), Some(2)));
        assert_eq!(se("dexter.s1e7.mkv"), (Some(1), Some(7)));
        assert_eq!(se("Show.S12E104.mkv"), (Some(12), Some(104)));
    }

    #[test]
    fn test_separated_notation() {
        assert_eq!(se("Show.S01.E02.mkv"), (Some(1), Some(2)));
        assert_eq!(se("Show S01 - E02"), (Some(1), Some(2)));
        assert_eq!(se("Show_S03_E10"), (Some(3), Some(10)));
    }

    #[test]
    fn test_every_sxxexx_round_trips() {
        for season in [0u32, 1, 9, 10, 42, 99] {
            for episode in [0u32, 1, 12, 100, 999] {
                let name = format!("Some.Show.S{:02}E{:02}.1080p.mkv", season, episode);
                assert_eq!(se(&name), (Some(season), Some(episode)), "{}", name);
            }
        }
    }

    #[test]
    fn test_cross_notation() {
        assert_eq!(se("Show.1x02.mkv"), (Some(1), Some(2)));
        assert_eq!(se("X-Men.2x02.mkv"), (Some(2), Some(2)));
        assert_eq!(se("x264.1x03.mkv"), (Some(1), Some(3)));
        assert_eq!(se("Show 10x125"), (Some(10), Some(125)));
    }

    #[test]
    fn test_resolutions_are_not_episodes() {
        assert_eq!(se("Ted.1920x1080.mkv"), (None, None));
        assert_eq!(se("Movie.1080x720.mkv"), (None, None));
        assert_eq!(se("Movie.720x480.mkv"), (None, None));
        assert_eq!(se("Clip 3840x2160 HDR"), (None, None));
        assert_eq!(se("Show.1x1234.mkv"), (None, None));
    }

    #[test]
    fn test_keyword_pairs() {
        assert_eq!(se("Serie Temporada 2 Capitulo 5"), (Some(2), Some(5)));
        assert_eq!(se("Serie Temporada 2 Capítulo 5"), (Some(2), Some(5)));
        assert_eq!(se("Show Season 3 Episode 11"), (Some(3), Some(11)));
        assert_eq!(se("Serie.Temporada.1.Episodio.4"), (Some(1), Some(4)));
    }

    #[test]
    fn test_season_packs() {
        assert_eq!(se("Breaking Bad Season 4 1080p"), (Some(4), None));
        assert_eq!(se("La Casa de Papel Temporada 2"), (Some(2), None));
        assert_eq!(se("The.Office.S05.1080p.WEB"), (Some(5), None));
    }

    #[test]
    fn test_bare_season_needs_boundaries() {
        assert_eq!(se("The.Office.S123.WEB"), (None, None));
        assert_eq!(se("Glass5 2019"), (None, None));
    }

    #[test]
    fn test_nothing_to_extract() {
        assert_eq!(se(""), (None, None));
        assert_eq!(se("Avatar.2009.1080p.BluRay.x264.mkv"), (None, None));
        assert_eq!(
            se("Game of Thrones iNTEGRALE MULTi 2160p HDR BluRay x265-QTZ"),
            (None, None)
        );
    }

    #[test]
    fn test_season_range_explicit() {
        assert_eq!(
            extract_season_range("Friends S01-S10 1080p"),
            Some(SeasonRange { min: 1, max: 10 })
        );
        assert_eq!(
            extract_season_range("Lost Seasons 1-3 720p"),
            Some(SeasonRange { min: 1, max: 3 })
        );
        assert_eq!(
            extract_season_range("Serie Temporadas 1 a 4"),
            Some(SeasonRange { min: 1, max: 4 })
        );
    }

    #[test]
    fn test_season_range_from_bare_tokens() {
        assert_eq!(
            extract_season_range("Show S03 S01 S02 MULTi"),
            Some(SeasonRange { min: 1, max: 3 })
        );
        // A single season token is a season pack, not a range
        assert_eq!(extract_season_range("Show S02 1080p"), None);
    }

    #[test]
    fn test_season_range_complete_keywords() {
        let range =
            extract_season_range("Game of Thrones iNTEGRALE MULTi 2160p HDR BluRay x265-QTZ");
        assert_eq!(range, Some(SeasonRange::COMPLETE));
        assert!(range.is_some_and(|r| r.covers(1) && r.covers(8)));

        assert_eq!(
            extract_season_range("The Wire Complete Series"),
            Some(SeasonRange::COMPLETE)
        );
        assert_eq!(
            extract_season_range("Friends All Seasons"),
            Some(SeasonRange::COMPLETE)
        );
        assert_eq!(extract_season_range("Friends S01E01"), None);
    }

    #[test]
    fn test_range_coverage() {
        let range = SeasonRange { min: 2, max: 4 };
        assert!(range.covers(2));
        assert!(range.covers(4));
        assert!(!range.covers(1));
        assert!(!range.covers(5));
        assert!(!range.is_complete_pack());
    }

    #[test]
    fn test_extract_years() {
        assert_eq!(extract_years("Avatar.Fire.and.Ash.2025.1080p.CAMRip.mkv"), vec![2025]);
        assert_eq!(extract_years("Movie.2000.2008.mkv"), vec![2000, 2008]);
        assert!(extract_years("Clip.2160p.1920x1080").is_empty());
        assert_eq!(extract_years("Blade Runner 2049"), vec![2049]);
        assert_eq!(extract_years("Avatar_Fire_and_Ash_2025_1080p_CAMRip.mkv"), vec![2025]);
        assert_eq!(extract_years("Movie_2000_2008_x264"), vec![2000, 2008]);
        assert!(extract_years("Track12019").is_empty());
        assert!(extract_years("Show.20191.mkv").is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(extract_season_episode("Show S01E02").to_string(), "S01E02");
        assert_eq!(extract_season_episode("Show S03").to_string(), "S03");
        assert_eq!(SeasonEpisode::default().to_string(), "-");
    }
}
