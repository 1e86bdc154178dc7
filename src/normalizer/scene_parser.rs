//! Scene/filename title parsing.
//!
//! Extracts a clean title plus year, season/episode and a few technical hints
//! from release-style names such as `Breaking.Bad.S01E01.Pilot.720p.HDTV.x264`.
//! Parsing is total: garbage input comes back as the trimmed original string.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static VIDEO_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(mkv|mp4|avi|mov|wmv|flv|webm|m4v|mpg|mpeg|ts|m2ts)$").unwrap()
});

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]|\{[^}]*\}").unwrap());

static EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // S01E02, S01 E02, S1E2-E3, S01E01E02
        Regex::new(r"(?i)\bS(\d{1,3})\s?E(\d{1,4})(?:-?E(\d{1,4}))?").unwrap(),
        // 1x02
        Regex::new(r"(?i)\b(\d{1,2})x(\d{2,3})\b").unwrap(),
        // Season 1 Episode 2 / Staffel 1 Folge 2
        Regex::new(r"(?i)\b(?:season|staffel)\s*(\d{1,2})\s*(?:episode|folge|ep)\s*(\d{1,3})\b")
            .unwrap(),
    ]
});

/// Trailing all-caps release group glued to the title, as in `Heat-GROUP`.
static RELEASE_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S)-([A-Z0-9]*[A-Z][A-Z0-9]*)$").unwrap());

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());

static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(2160p|4k|uhd|1080[pi]|720p|576p|480p)\b").unwrap());

static TECHNICAL_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(2160p|4k|uhd|1080[pi]|720p|576p|480p|hdr10|hdr|web[\s-]?dl|webrip|blu[\s-]?ray|bdrip|brrip|hdtv|pdtv|dvdrip|hdrip|remux|x264|x265|h\s?264|h\s?265|hevc|avc|xvid|divx|aac|e?ac3|dts|dd5\s?1|atmos|german|english|french|spanish|italian|multi|dual|dl|subbed|dubbed|proper|repack|extended|unrated|internal)\b",
    )
    .unwrap()
});

static LANGUAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(german|deutsch|english|french|spanish|italian|turkish)\b").unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const TRIM_CHARS: &[char] = &[' ', '-', '_', '.', ':', '(', '[', '{', ',', '|', '–'];

/// Result of parsing one release-style title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTitle {
    pub cleaned_title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Last episode of a multi-episode release (`S01E01-E02`).
    pub episode_end: Option<u32>,
    pub quality_height: Option<u32>,
    pub language_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SceneNameParser;

impl SceneNameParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, input: &str) -> ParsedTitle {
        let original = input.trim();
        if original.is_empty() {
            return ParsedTitle {
                cleaned_title: input.to_string(),
                ..ParsedTitle::default()
            };
        }

        let text = Self::prepare(original);

        let episode_match = EPISODE_PATTERNS
            .iter()
            .filter_map(|pattern| pattern.captures(&text))
            .min_by_key(|caps| caps.get(0).map(|m| m.start()).unwrap_or(usize::MAX));

        let (season, episode, episode_end, episode_start) = match episode_match {
            Some(caps) => {
                let episode: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
                let end = caps
                    .get(3)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .filter(|end| episode.is_some_and(|first| *end > first));
                (
                    caps.get(1).and_then(|m| m.as_str().parse().ok()),
                    episode,
                    end,
                    caps.get(0).map(|m| m.start()),
                )
            }
            None => (None, None, None, None),
        };

        // A leading number ("2001 A Space Odyssey") is part of the title, not its year.
        let year_match = YEAR
            .captures_iter(&text)
            .filter_map(|caps| caps.get(1))
            .find(|m| Self::has_title_before(&text, m.start()));
        let year = year_match.and_then(|m| m.as_str().parse().ok());

        let tag_start = TECHNICAL_TAG
            .find_iter(&text)
            .find(|m| Self::has_title_before(&text, m.start()))
            .map(|m| m.start());

        let cut = [episode_start, year_match.map(|m| m.start()), tag_start]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(text.len());

        let tail = &text[cut..];
        let quality_height = RESOLUTION
            .captures(tail)
            .and_then(|caps| caps.get(1))
            .and_then(|m| Self::height_for(m.as_str()));
        let language_tag = LANGUAGE
            .captures(tail)
            .and_then(|caps| caps.get(1))
            .map(|m| Self::language_code(m.as_str()).to_string());

        let cleaned = Self::tidy(&text[..cut]);
        let cleaned_title = if cleaned.is_empty() {
            original.to_string()
        } else {
            cleaned
        };

        trace!(
            "Parsed '{}' -> '{}' (year={:?}, S{:?}E{:?})",
            input, cleaned_title, year, season, episode
        );

        ParsedTitle {
            cleaned_title,
            year,
            season,
            episode,
            episode_end,
            quality_height,
            language_tag,
        }
    }

    fn prepare(original: &str) -> String {
        let without_ext = VIDEO_EXTENSION.replace(original, "");
        let without_brackets = BRACKETED.replace_all(&without_ext, " ");
        let trimmed = without_brackets.trim_end();
        let without_groups = if Self::ends_with_release_group(trimmed) {
            RELEASE_GROUP.replace(trimmed, "$1").into_owned()
        } else {
            trimmed.to_string()
        };
        let separated = if without_groups.trim().contains(' ') {
            without_groups.replace('_', " ")
        } else {
            without_groups.replace(['.', '_'], " ")
        };
        WHITESPACE.replace_all(separated.trim(), " ").into_owned()
    }

    /// `Heat-GROUP` yes; `X-MEN` and an episode range end (`S01E01-E02`) no.
    fn ends_with_release_group(text: &str) -> bool {
        let Some(group) = RELEASE_GROUP.captures(text).and_then(|caps| caps.get(2)) else {
            return false;
        };
        let tag = group.as_str();
        let is_episode = tag.len() > 1
            && tag.starts_with('E')
            && tag[1..].chars().all(|c| c.is_ascii_digit());
        !is_episode && Self::tidy(&text[..group.start()]).chars().count() > 1
    }

    fn has_title_before(text: &str, position: usize) -> bool {
        !Self::tidy(&text[..position]).is_empty()
    }

    fn tidy(fragment: &str) -> String {
        WHITESPACE
            .replace_all(fragment, " ")
            .trim_matches(TRIM_CHARS)
            .to_string()
    }

    fn height_for(tag: &str) -> Option<u32> {
        match tag.to_ascii_lowercase().as_str() {
            "2160p" | "4k" | "uhd" => Some(2160),
            "1080p" | "1080i" => Some(1080),
            "720p" => Some(720),
            "576p" => Some(576),
            "480p" => Some(480),
            _ => None,
        }
    }

    fn language_code(word: &str) -> &'static str {
        match word.to_ascii_lowercase().as_str() {
            "german" | "deutsch" => "de",
            "english" => "en",
            "french" => "fr",
            "spanish" => "es",
            "italian" => "it",
            "turkish" => "tr",
            _ => "und",
        }
    }
}
