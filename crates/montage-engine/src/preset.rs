use std::fmt;
use serde::{Deserialize, Serialize};
use crate::normalize::Canvas;

/// Named output ratios for common social platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputPreset {
    InstagramFeed,
    InstagramStory,
    InstagramReel,
    YoutubeVideo,
    YoutubeShorts,
    FacebookFeed,
    FacebookStory,
    FacebookReels,
    Tiktok,
    Portrait,
    Landscape,
    Cover,
}

impl OutputPreset {
    pub const ALL: [OutputPreset; 12] = [
        OutputPreset::InstagramFeed,
        OutputPreset::InstagramStory,
        OutputPreset::InstagramReel,
        OutputPreset::YoutubeVideo,
        OutputPreset::YoutubeShorts,
        OutputPreset::FacebookFeed,
        OutputPreset::FacebookStory,
        OutputPreset::FacebookReels,
        OutputPreset::Tiktok,
        OutputPreset::Portrait,
        OutputPreset::Landscape,
        OutputPreset::Cover,
    ];

    /// Canvas used when no preset (or an unknown one) is given
    pub const FALLBACK: Canvas = Canvas { width: 1920, height: 1080 };

    pub fn name(&self) -> &'static str {
        match self {
            OutputPreset::InstagramFeed => "Instagram Feed",
            OutputPreset::InstagramStory => "Instagram Story",
            OutputPreset::InstagramReel => "Instagram Reel",
            OutputPreset::YoutubeVideo => "YouTube Video",
            OutputPreset::YoutubeShorts => "YouTube Shorts",
            OutputPreset::FacebookFeed => "Facebook Feed",
            OutputPreset::FacebookStory => "Facebook Story",
            OutputPreset::FacebookReels => "Facebook Reels",
            OutputPreset::Tiktok => "TikTok",
            OutputPreset::Portrait => "Portrait",
            OutputPreset::Landscape => "Landscape",
            OutputPreset::Cover => "Cover",
        }
    }

    pub fn ratio(&self) -> &'static str {
        match self {
            OutputPreset::InstagramFeed => "1:1",
            OutputPreset::YoutubeVideo | OutputPreset::Landscape => "16:9",
            OutputPreset::FacebookFeed => "1.91:1",
            OutputPreset::Cover => "1:2.39",
            _ => "9:16",
        }
    }

    pub fn canvas(&self) -> Canvas {
        match self {
            OutputPreset::InstagramFeed => Canvas::new(1080, 1080),
            OutputPreset::YoutubeVideo | OutputPreset::Landscape => Canvas::new(1920, 1080),
            OutputPreset::FacebookFeed => Canvas::new(1200, 628),
            OutputPreset::Cover => Canvas::new(800, 320),
            _ => Canvas::new(1080, 1920),
        }
    }

    /// Look up a preset by display name or slug, ignoring case, spaces, dashes and underscores
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_name(name);
        Self::ALL
            .into_iter()
            .find(|p| normalize_name(p.name()) == wanted)
    }

    /// Canvas for `name`, or the 1920x1080 fallback
    pub fn resolve(name: Option<&str>) -> Canvas {
        name.and_then(Self::from_name)
            .map(|p| p.canvas())
            .unwrap_or(Self::FALLBACK)
    }
}

impl fmt::Display for OutputPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name(), self.ratio(), self.canvas())
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_resolution() {
        let expected = [
            ("Instagram Feed", 1080, 1080),
            ("Instagram Story", 1080, 1920),
            ("Instagram Reel", 1080, 1920),
            ("YouTube Video", 1920, 1080),
            ("YouTube Shorts", 1080, 1920),
            ("Facebook Feed", 1200, 628),
            ("Facebook Story", 1080, 1920),
            ("Facebook Reels", 1080, 1920),
            ("TikTok", 1080, 1920),
            ("Portrait", 1080, 1920),
            ("Landscape", 1920, 1080),
            ("Cover", 800, 320),
        ];
        for (name, w, h) in expected {
            let preset = OutputPreset::from_name(name).unwrap();
            assert_eq!(preset.name(), name);
            assert_eq!(preset.canvas(), Canvas::new(w, h), "{}", name);
        }
    }

    #[test]
    fn test_name_matching_is_lenient() {
        assert_eq!(OutputPreset::from_name("instagram-reel"), Some(OutputPreset::InstagramReel));
        assert_eq!(OutputPreset::from_name("YOUTUBE_SHORTS"), Some(OutputPreset::YoutubeShorts));
        assert_eq!(OutputPreset::from_name("tik tok"), Some(OutputPreset::Tiktok));
        assert_eq!(OutputPreset::from_name("vimeo"), None);
    }

    #[test]
    fn test_unknown_falls_back() {
        assert_eq!(OutputPreset::resolve(Some("vimeo")), Canvas::new(1920, 1080));
        assert_eq!(OutputPreset::resolve(None), Canvas::new(1920, 1080));
        assert_eq!(OutputPreset::resolve(Some("cover")), Canvas::new(800, 320));
    }

    #[test]
    fn test_display() {
        assert_eq!(OutputPreset::FacebookFeed.to_string(), "Facebook Feed (1.91:1, 1200x628)");
    }
}
