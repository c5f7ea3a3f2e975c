use super::session::Category;

const PRODUCTIVE_SITES: [&str; 7] = [
    "github.com",
    "stackoverflow.com",
    "docs.google.com",
    "notion.so",
    "trello.com",
    "slack.com",
    "teams.microsoft.com",
];

const DISTRACTING_SITES: [&str; 7] = [
    "youtube.com",
    "netflix.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "reddit.com",
    "tiktok.com",
];

/// Maps a hostname to its category. Productive sites are checked first, so a hostname matching
/// both lists is productive.
pub fn classify(domain: &str) -> Category {
    if PRODUCTIVE_SITES.iter().any(|site| domain.contains(site)) {
        Category::Productive
    } else if DISTRACTING_SITES.iter().any(|site| domain.contains(site)) {
        Category::Distracting
    } else {
        Category::Neutral
    }
}
