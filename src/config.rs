use eframe::egui::{self, Vec2};

use crate::chrome::PanelLimits;
use crate::playback::FrameRate;
use crate::prefetch::DEFAULT_PRELOAD_RADIUS;

pub const DEFAULT_DECODER_CACHE: usize = 512;
pub const MAX_PRELOAD_RADIUS: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub preload_radius: usize,
    pub frame_rate: FrameRate,
    pub cache_limit: Option<usize>,
    pub decoder_cache: usize,
    pub panel: PanelLimits,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preload_radius: DEFAULT_PRELOAD_RADIUS,
            frame_rate: FrameRate::default(),
            cache_limit: None,
            decoder_cache: DEFAULT_DECODER_CACHE,
            panel: PanelLimits::default(),
        }
    }
}

impl PlayerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(radius) = read(&lookup, "STACKCINE_PRELOAD_RADIUS", parse_usize) {
            config.preload_radius = radius.min(MAX_PRELOAD_RADIUS);
        }
        if let Some(rate) = read(&lookup, "STACKCINE_FPS", |raw| {
            raw.trim().parse::<u8>().ok().and_then(FrameRate::new)
        }) {
            config.frame_rate = rate;
        }
        if let Some(limit) = read(&lookup, "STACKCINE_CACHE_LIMIT", |raw| {
            parse_usize(raw).filter(|limit| *limit > 0)
        }) {
            config.cache_limit = Some(limit);
        }
        if let Some(capacity) = read(&lookup, "STACKCINE_DECODER_CACHE", |raw| {
            parse_usize(raw).filter(|capacity| *capacity > 0)
        }) {
            config.decoder_cache = capacity;
        }
        if let Some(min) = read(&lookup, "STACKCINE_PANEL_MIN", parse_size) {
            config.panel.min = min;
        }
        if let Some(max) = read(&lookup, "STACKCINE_PANEL_MAX", parse_size) {
            config.panel.max = max;
        }
        if config.panel.min.x > config.panel.max.x || config.panel.min.y > config.panel.max.y {
            log::warn!(
                "Panel minimum {:?} exceeds maximum {:?}; using default panel limits",
                config.panel.min,
                config.panel.max
            );
            config.panel = PanelLimits::default();
        }

        config
    }
}

fn read<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        log::warn!("Ignoring {name}={raw:?}: not a valid value");
    }
    parsed
}

fn parse_usize(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok()
}

pub fn parse_size(raw: &str) -> Option<Vec2> {
    let (width, height) = raw.trim().split_once(['x', 'X'])?;
    let width = width.trim().parse::<f32>().ok()?;
    let height = height.trim().parse::<f32>().ok()?;
    (width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0)
        .then(|| egui::vec2(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> PlayerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PlayerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.preload_radius, 5);
        assert_eq!(config.frame_rate.get(), 10);
        assert_eq!(config.cache_limit, None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("STACKCINE_PRELOAD_RADIUS", "8"),
            ("STACKCINE_FPS", "24"),
            ("STACKCINE_CACHE_LIMIT", "64"),
            ("STACKCINE_DECODER_CACHE", "100"),
            ("STACKCINE_PANEL_MAX", "1200x800"),
        ]);
        assert_eq!(config.preload_radius, 8);
        assert_eq!(config.frame_rate.get(), 24);
        assert_eq!(config.cache_limit, Some(64));
        assert_eq!(config.decoder_cache, 100);
        assert_eq!(config.panel.max, egui::vec2(1200.0, 800.0));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = config_from(&[
            ("STACKCINE_FPS", "90"),
            ("STACKCINE_PRELOAD_RADIUS", "-1"),
            ("STACKCINE_CACHE_LIMIT", "0"),
            ("STACKCINE_PANEL_MIN", "wide"),
        ]);
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn preload_radius_is_capped() {
        let config = config_from(&[("STACKCINE_PRELOAD_RADIUS", "18446744073709551615")]);
        assert_eq!(config.preload_radius, MAX_PRELOAD_RADIUS);
        let config = config_from(&[("STACKCINE_PRELOAD_RADIUS", "0")]);
        assert_eq!(config.preload_radius, 0);
    }

    #[test]
    fn inverted_panel_bounds_fall_back() {
        let config = config_from(&[("STACKCINE_PANEL_MAX", "200x100")]);
        assert_eq!(config.panel, PanelLimits::default());
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("1630.5x930.5"), Some(egui::vec2(1630.5, 930.5)));
        assert_eq!(parse_size(" 800 X 600 "), Some(egui::vec2(800.0, 600.0)));
        assert_eq!(parse_size("800"), None);
        assert_eq!(parse_size("0x600"), None);
    }
}
