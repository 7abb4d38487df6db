//! Rendition ladder planning.
//!
//! The ladder is a pure function of the source dimensions and the quality
//! profile. It is recomputed on every run, so resume logic can compare the
//! planned set against what is on disk.

use serde::{Deserialize, Serialize};

/// One rung of the fixed bitrate ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub height: u32,
    pub bitrate_kbps: u32,
}

/// Fixed ladder, ascending by height.
pub const LADDER: &[Tier] = &[
    Tier { height: 480, bitrate_kbps: 1000 },
    Tier { height: 720, bitrate_kbps: 2500 },
    Tier { height: 1080, bitrate_kbps: 5000 },
    Tier { height: 1440, bitrate_kbps: 8000 },
    Tier { height: 2160, bitrate_kbps: 16000 },
];

/// Encoder speed/quality trade-off applied to every rendition of a package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityProfile {
    /// Resolve a configured profile name. Unknown names mean `Medium`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => QualityProfile::Low,
            "high" => QualityProfile::High,
            _ => QualityProfile::Medium,
        }
    }

    /// `(preset, crf)` for this profile.
    pub fn knobs(self) -> (&'static str, u32) {
        match self {
            QualityProfile::Low => ("veryfast", 28),
            QualityProfile::Medium => ("medium", 23),
            QualityProfile::High => ("slow", 20),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityProfile::Low => "low",
            QualityProfile::Medium => "medium",
            QualityProfile::High => "high",
        }
    }
}

/// A planned rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionSpec {
    /// Directory and display name, e.g. `720p`.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub preset: String,
    pub quality: u32,
}

impl RenditionSpec {
    /// Advertised bandwidth in bits per second.
    pub fn bandwidth(&self) -> u64 {
        u64::from(self.bitrate_kbps) * 1000
    }
}

/// Plan the renditions for a source.
///
/// Every tier at or below the source height is included, plus the single
/// next tier above it so small sources still get a rendition. A source
/// taller than the top tier gets the whole ladder.
pub fn plan(source_height: u32, source_width: u32, profile: QualityProfile) -> Vec<RenditionSpec> {
    if source_height == 0 {
        return Vec::new();
    }

    let (preset, quality) = profile.knobs();
    let next_above = LADDER.iter().find(|t| t.height > source_height);

    LADDER
        .iter()
        .filter(|t| t.height <= source_height)
        .chain(next_above)
        .map(|tier| RenditionSpec {
            name: format!("{}p", tier.height),
            width: scaled_width(tier.height, source_width, source_height),
            height: tier.height,
            bitrate_kbps: tier.bitrate_kbps,
            preset: preset.to_string(),
            quality,
        })
        .collect()
}

/// Width that keeps the source aspect ratio at `target_height`, rounded to
/// the nearest integer. This is the advertised resolution; the engine pads
/// odd values for the encoder. A source without a width is treated as 16:9.
fn scaled_width(target_height: u32, source_width: u32, source_height: u32) -> u32 {
    let (sw, sh) = if source_width == 0 {
        (16, 9)
    } else {
        (u64::from(source_width), u64::from(source_height))
    };
    let rounded = (u64::from(target_height) * sw * 2 + sh) / (sh * 2);
    u32::try_from(rounded.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ladder: &[RenditionSpec]) -> Vec<&str> {
        ladder.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn height_1000_gets_one_tier_above() {
        let ladder = plan(1000, 1778, QualityProfile::Medium);
        assert_eq!(names(&ladder), vec!["480p", "720p", "1080p"]);
    }

    #[test]
    fn exact_tier_height_adds_next_tier() {
        let ladder = plan(1080, 1920, QualityProfile::Medium);
        assert_eq!(names(&ladder), vec!["480p", "720p", "1080p", "1440p"]);
    }

    #[test]
    fn small_source_gets_single_upscaled_rendition() {
        let ladder = plan(360, 640, QualityProfile::Medium);
        assert_eq!(names(&ladder), vec!["480p"]);
    }

    #[test]
    fn source_above_top_tier_gets_full_ladder() {
        let ladder = plan(4320, 7680, QualityProfile::High);
        assert_eq!(
            names(&ladder),
            vec!["480p", "720p", "1080p", "1440p", "2160p"]
        );
    }

    #[test]
    fn zero_height_plans_nothing() {
        assert!(plan(0, 1920, QualityProfile::Medium).is_empty());
    }

    #[test]
    fn widths_preserve_aspect_ratio() {
        let ladder = plan(1080, 1920, QualityProfile::Medium);
        let widths: Vec<u32> = ladder.iter().map(|r| r.width).collect();
        // 480 * 16/9 = 853.3
        assert_eq!(widths, vec![853, 1280, 1920, 2560]);
    }

    #[test]
    fn portrait_source() {
        let ladder = plan(1920, 1080, QualityProfile::Medium);
        assert_eq!(ladder[0].width, 270);
        // Exact, not padded: 720 * 1080 / 1920 = 405.
        assert_eq!(ladder[1].width, 405);
    }

    #[test]
    fn bitrates_and_bandwidth() {
        let ladder = plan(2160, 3840, QualityProfile::Medium);
        let kbps: Vec<u32> = ladder.iter().map(|r| r.bitrate_kbps).collect();
        assert_eq!(kbps, vec![1000, 2500, 5000, 8000, 16000]);
        assert_eq!(ladder[1].bandwidth(), 2_500_000);
    }

    #[test]
    fn profiles_resolve_knobs() {
        assert_eq!(QualityProfile::from_name("low").knobs(), ("veryfast", 28));
        assert_eq!(QualityProfile::from_name("HIGH").knobs(), ("slow", 20));
        assert_eq!(QualityProfile::from_name("medium").knobs(), ("medium", 23));
        assert_eq!(QualityProfile::from_name("ultra"), QualityProfile::Medium);
        assert_eq!(QualityProfile::from_name(""), QualityProfile::Medium);
    }

    #[test]
    fn profile_applies_to_every_rendition() {
        let ladder = plan(720, 1280, QualityProfile::Low);
        assert!(ladder.iter().all(|r| r.preset == "veryfast" && r.quality == 28));
    }

    #[test]
    fn planning_is_deterministic() {
        assert_eq!(
            plan(1000, 1778, QualityProfile::Medium),
            plan(1000, 1778, QualityProfile::Medium)
        );
    }
}
