//! Activity categories
//!
//! Free-text activities and hangout descriptions are bucketed with keyword
//! patterns so history can be summarised ("the group mostly does food").

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Activity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Movies,
    Sports,
    Outdoors,
    Games,
    Nightlife,
    Chill,
    Shopping,
    Creative,
    Other,
}

impl Category {
    /// Every real category, in match priority order (excludes `Other`)
    pub const ALL: [Category; 9] = [
        Category::Food,
        Category::Movies,
        Category::Sports,
        Category::Outdoors,
        Category::Games,
        Category::Nightlife,
        Category::Chill,
        Category::Shopping,
        Category::Creative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Movies => "movies",
            Self::Sports => "sports",
            Self::Outdoors => "outdoors",
            Self::Games => "games",
            Self::Nightlife => "nightlife",
            Self::Chill => "chill",
            Self::Shopping => "shopping",
            Self::Creative => "creative",
            Self::Other => "other",
        }
    }

    /// Parse a stored category name; unknown names map to `Other`
    pub fn parse(s: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static PATTERNS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    [
        (
            Category::Food,
            r"\b(eat|food|restaurant|dinner|lunch|brunch|tacos?|sushi|bbq|pizza|burgers?|ramen|pho|korean|thai|italian|mexican|chinese|indian|steak|wings|noodles?|cafe|bakery|dessert|ice cream|boba|coffee)\b",
        ),
        (
            Category::Movies,
            r"\b(movie|film|cinema|theater|theatre|watch|netflix|screening|imax)\b",
        ),
        (
            Category::Sports,
            r"\b(sport|basketball|soccer|football|tennis|volleyball|gym|workout|run|swim|hockey|baseball|golf|ski|snowboard|skating|skate)\b",
        ),
        (
            Category::Outdoors,
            r"\b(hike|hiking|trail|park|beach|camp|camping|nature|lake|mountain|kayak|bike|biking|picnic|walk|garden)\b",
        ),
        (
            Category::Games,
            r"\b(game|gaming|board game|video game|arcade|bowling|pool|billiard|laser tag|paintball|mini golf|go-kart|escape room|trivia|poker|chess)\b",
        ),
        (
            Category::Nightlife,
            r"\b(bar|club|drink|party|karaoke|pub|lounge|nightclub|cocktail|brewery|wine|happy hour|dancing)\b",
        ),
        (
            Category::Chill,
            r"\b(chill|hangout|hang out|vibe|relax|sleepover|movie night|game night|netflix|couch|house|home|potluck)\b",
        ),
        (
            Category::Shopping,
            r"\b(shop|shopping|mall|thrift|vintage|market|flea market|outlet|store)\b",
        ),
        (
            Category::Creative,
            r"\b(art|paint|pottery|museum|gallery|craft|diy|cooking class|workshop|music|concert|show|comedy|improv|open mic|exhibit)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(category, pattern)| Regex::new(pattern).ok().map(|re| (category, re)))
    .collect()
});

/// Classify free text; first matching category wins
pub fn categorize(text: &str) -> Category {
    let lower = text.to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}
