use anyhow::Result;
use tracing::debug;

use crate::db::CatalogStore;
use crate::models::media::sort_variants;
use crate::models::{GlobalId, MediaVariant, NormalizedMedia};
use crate::utils::errors::CatalogError;

/// Pure playback-time variant choice. Never mutates the work.
pub struct VariantSelector;

impl VariantSelector {
    /// Best available variant under the given preferences.
    ///
    /// The height floor is dropped when nothing clears it, and the language
    /// preference is dropped when nothing matches; variants of unknown height
    /// clear any floor. `None` only when no variant is available.
    pub fn select_best_variant<'a>(
        media: &'a NormalizedMedia,
        preferred_audio_lang: Option<&str>,
        min_height: Option<u32>,
    ) -> Option<&'a MediaVariant> {
        let available: Vec<&MediaVariant> = media.available_variants().collect();
        if available.is_empty() {
            return None;
        }

        let floored = match min_height {
            Some(min) => {
                let above: Vec<&MediaVariant> = available
                    .iter()
                    .copied()
                    .filter(|v| v.height.is_none_or(|h| h >= min))
                    .collect();
                if above.is_empty() { available } else { above }
            }
            None => available,
        };

        let candidates = match preferred_audio_lang {
            Some(lang) => {
                let matching: Vec<&MediaVariant> = floored
                    .iter()
                    .copied()
                    .filter(|v| v.matches_language(lang))
                    .collect();
                if matching.is_empty() { floored } else { matching }
            }
            None => floored,
        };

        // Strictly-greater keeps the earliest variant on ties.
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.rank() > best.rank() {
                best = candidate;
            }
        }
        Some(best)
    }

    /// Default storage order: available first, then by rank.
    pub fn rank_variants(variants: &mut [MediaVariant]) {
        sort_variants(variants);
    }
}

/// Store-backed lookup by canonical id.
pub struct VariantService;

impl VariantService {
    /// `Err(WorkNotFound)` for an unknown work, `Ok(None)` when nothing is playable right now.
    pub async fn select_best_variant(
        store: &dyn CatalogStore,
        work_key: &GlobalId,
        preferred_audio_lang: Option<&str>,
        min_height: Option<u32>,
    ) -> Result<Option<MediaVariant>> {
        let media = store
            .load_media(work_key)
            .await?
            .ok_or_else(|| CatalogError::WorkNotFound(work_key.to_string()))?;

        let chosen =
            VariantSelector::select_best_variant(&media, preferred_audio_lang, min_height).cloned();
        debug!(
            "Selected {:?} for {} (lang={:?}, min_height={:?})",
            chosen.as_ref().map(|v| &v.source_key),
            work_key,
            preferred_audio_lang,
            min_height
        );
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::HINT_DIRECT_URL;
    use crate::models::{MediaType, PipelineIdTag, SourceKey};

    fn variant(pipeline: PipelineIdTag, id: &str) -> MediaVariant {
        MediaVariant::new(SourceKey::new(pipeline, id).unwrap())
    }

    fn media(variants: Vec<MediaVariant>) -> NormalizedMedia {
        NormalizedMedia::new(
            GlobalId::from_canonical_key("movie:tmdb:603"),
            "The Matrix",
            MediaType::Movie,
            variants,
        )
        .unwrap()
    }

    fn chosen_id<'a>(chosen: Option<&'a MediaVariant>) -> Option<&'a str> {
        chosen.map(|v| v.source_key.source_id())
    }

    #[test]
    fn test_source_priority_beats_quality() {
        let work = media(vec![
            variant(PipelineIdTag::Telegram, "tg-4k").with_height(2160),
            variant(PipelineIdTag::Io, "local-sd").with_height(480),
            variant(PipelineIdTag::Xtream, "xc-1080").with_height(1080),
        ]);
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, None, None)),
            Some("local-sd")
        );
    }

    #[test]
    fn test_quality_then_direct_url_then_explicit() {
        let work = media(vec![
            variant(PipelineIdTag::Xtream, "a").with_height(720),
            variant(PipelineIdTag::Xtream, "b").with_height(1080),
            variant(PipelineIdTag::Xtream, "c")
                .with_height(1080)
                .with_hint(HINT_DIRECT_URL, "http://cdn/c.mkv"),
        ]);
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, None, None)),
            Some("c")
        );

        let work = media(vec![
            MediaVariant::synthetic(SourceKey::new(PipelineIdTag::Plex, "syn").unwrap()),
            variant(PipelineIdTag::Plex, "explicit"),
        ]);
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, None, None)),
            Some("explicit")
        );
    }

    #[test]
    fn test_language_preference() {
        let work = media(vec![
            variant(PipelineIdTag::Io, "en").with_language("en"),
            variant(PipelineIdTag::Telegram, "de").with_language("de-DE"),
        ]);
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, Some("DE"), None)),
            Some("de")
        );
        // No match: fall back to plain ranking.
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, Some("fr"), None)),
            Some("en")
        );
    }

    #[test]
    fn test_height_floor() {
        let work = media(vec![
            variant(PipelineIdTag::Io, "local-480").with_height(480),
            variant(PipelineIdTag::Telegram, "tg-1080").with_height(1080),
        ]);
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, None, Some(720))),
            Some("tg-1080")
        );
        // Floor above every variant is ignored rather than failing playback.
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, None, Some(4320))),
            Some("local-480")
        );
    }

    #[test]
    fn test_unavailable_variants_are_skipped() {
        let work = media(vec![
            variant(PipelineIdTag::Io, "gone").with_availability(false),
            variant(PipelineIdTag::Telegram, "tg"),
        ]);
        assert_eq!(
            chosen_id(VariantSelector::select_best_variant(&work, None, None)),
            Some("tg")
        );

        let offline = media(vec![variant(PipelineIdTag::Io, "gone").with_availability(false)]);
        assert!(VariantSelector::select_best_variant(&offline, None, None).is_none());
    }

    #[test]
    fn test_rank_variants_matches_storage_order() {
        let mut variants = vec![
            variant(PipelineIdTag::Telegram, "tg"),
            variant(PipelineIdTag::Io, "off").with_availability(false),
            variant(PipelineIdTag::Plex, "plex"),
        ];
        VariantSelector::rank_variants(&mut variants);
        let order: Vec<&str> = variants.iter().map(|v| v.source_key.source_id()).collect();
        assert_eq!(order, vec!["plex", "tg", "off"]);
    }
}
