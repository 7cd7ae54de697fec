//! Turns a trending topic into an upbeat scene hint and a few hook keywords.

use crate::filter::ContentFilter;
use crate::types::TrendTopic;
use crate::utils::{is_stop_word, text};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

const MODIFIERS: &[&str] = &[
    "vibrant", "colorful", "joyful", "exciting", "magical", "whimsical",
    "fantastic", "amazing", "spectacular", "delightful", "cheerful", "bright",
];

const TEMPLATES: &[&str] = &[
    "A {modifier} scene featuring {topic} with sparkling effects and rainbow colors",
    "An enchanting {topic} adventure in a {modifier} wonderland setting",
    "A festive celebration of {topic} with {modifier} decorations everywhere",
    "A {modifier} carnival atmosphere celebrating {topic} with confetti and lights",
    "An uplifting {topic} scene in a {modifier} fairy tale environment",
];

const ACCENTS: &[&str] = &[
    "with golden hour lighting",
    "surrounded by floating balloons",
    "with gentle sparkles in the air",
    "in a dreamy pastel color palette",
    "with soft bokeh effects",
    "featuring happy people laughing",
    "with beautiful flowers blooming",
    "under a clear blue sky",
    "with warm sunset colors",
    "featuring vibrant energy",
    "with magical atmosphere",
    "in a picture-perfect setting",
];

pub const DEFAULT_HOOK_KEYWORDS: &[&str] = &["trending", "popular", "viral"];
const MAX_HOOK_KEYWORDS: usize = 3;
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpicedStory {
    pub original_trend: String,
    pub clean_trend: String,
    pub scene: String,
    pub modifier: String,
    pub hook_keywords: Vec<String>,
}

impl SpicedStory {
    pub fn fallback() -> Self {
        Self {
            original_trend: "Summer celebration".to_string(),
            clean_trend: "summer celebration".to_string(),
            scene: "A vibrant summer celebration with colorful decorations and joyful people dancing under golden hour lighting".to_string(),
            modifier: "vibrant".to_string(),
            hook_keywords: default_keywords(),
        }
    }
}

/// Builds a story from the first usable topic, trying at most three.
pub fn compose<R: Rng + ?Sized>(topics: &[TrendTopic], filter: &ContentFilter, rng: &mut R) -> SpicedStory {
    for topic in topics.iter().take(MAX_ATTEMPTS) {
        let clean = text::clean_title(&topic.label);
        if clean.is_empty() || filter.is_sensitive(&topic.label) || filter.is_sensitive(&clean) {
            warn!("Skipping trend unsuitable for a story: {}", topic.label);
            continue;
        }

        // Spice it up
        let modifier = MODIFIERS.choose(rng).copied().unwrap_or("vibrant");
        let template = TEMPLATES.choose(rng).copied().unwrap_or(TEMPLATES[0]);
        let accent = ACCENTS.choose(rng).copied().unwrap_or(ACCENTS[0]);

        let scene = format!(
            "{} {}",
            template.replace("{modifier}", modifier).replace("{topic}", &clean),
            accent
        );

        info!("Composed story from trend '{}'", topic.label);
        return SpicedStory {
            original_trend: topic.label.clone(),
            hook_keywords: hook_keywords(&clean, filter),
            clean_trend: clean,
            scene,
            modifier: modifier.to_string(),
        };
    }

    warn!("No usable trend for a story, using fallback");
    SpicedStory::fallback()
}

/// Up to three meaningful words from a cleaned trend title.
pub fn hook_keywords(clean_trend: &str, filter: &ContentFilter) -> Vec<String> {
    let keywords: Vec<String> = clean_trend
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() > 2)
        .filter(|word| !is_stop_word(word))
        .filter(|word| !filter.is_sensitive(word))
        .take(MAX_HOOK_KEYWORDS)
        .map(String::from)
        .collect();

    if keywords.is_empty() {
        default_keywords()
    } else {
        keywords
    }
}

fn default_keywords() -> Vec<String> {
    DEFAULT_HOOK_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterConfig;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn topic(label: &str) -> TrendTopic {
        TrendTopic {
            label: label.to_string(),
            source: "test".to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn story_mentions_the_cleaned_trend() {
        let filter = ContentFilter::new(&FilterConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let story = compose(&[topic("Pumpkin Spice Lattes!")], &filter, &mut rng);
        assert_eq!(story.clean_trend, "pumpkin spice lattes");
        assert!(story.scene.contains("pumpkin spice lattes"));
        assert!(MODIFIERS.contains(&story.modifier.as_str()));
        assert_eq!(story.hook_keywords, vec!["pumpkin", "spice", "lattes"]);
    }

    #[test]
    fn stop_words_and_short_words_are_not_hooks() {
        let filter = ContentFilter::new(&FilterConfig::default()).unwrap();
        assert_eq!(hook_keywords("the art of tea", &filter), vec!["art", "tea"]);
        assert_eq!(hook_keywords("to be or", &filter), default_keywords());
    }

    #[test]
    fn no_topics_means_fallback_story() {
        let filter = ContentFilter::new(&FilterConfig::default()).unwrap();
        let story = compose(&[], &filter, &mut StdRng::seed_from_u64(1));
        assert_eq!(story, SpicedStory::fallback());
    }
}
