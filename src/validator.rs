use serde::{Deserialize, Serialize};

/// Sites a job can be started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    X,
    TikTok,
    Facebook,
    Instagram,
}

/// Accepted URL prefixes. Matching is exact and case-sensitive.
const SUPPORTED_PREFIXES: &[(&str, Platform)] = &[
    ("https://www.youtube.com/watch?v=", Platform::YouTube),
    ("https://www.youtube.com/shorts/", Platform::YouTube),
    ("https://x.com/", Platform::X),
    ("https://www.tiktok.com/", Platform::TikTok),
    ("https://www.facebook.com/", Platform::Facebook),
    ("https://www.instagram.com/", Platform::Instagram),
];

/// Maps a URL to its platform by prefix, or `None` when it is not supported.
pub fn classify(url: &str) -> Option<Platform> {
    SUPPORTED_PREFIXES
        .iter()
        .find(|(prefix, _)| url.starts_with(prefix))
        .map(|(_, platform)| *platform)
}

pub fn is_supported(url: &str) -> bool {
    classify(url).is_some()
}
