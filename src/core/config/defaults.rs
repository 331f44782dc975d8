use std::time::Duration;

use crate::core::config::data::Config;
use crate::core::session::UsageLimits;
use crate::ui::renderer::RenderCadence;

impl Config {
    pub fn get_default_model(&self, provider: &str) -> Option<&String> {
        let normalized = provider.to_lowercase();
        self.default_models
            .get(&normalized)
            .or_else(|| self.default_models.get(provider))
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        let normalized = provider.to_lowercase();
        self.default_models.insert(normalized.clone(), model);
        if normalized != provider {
            self.default_models.remove(&provider);
        }
    }

    pub fn unset_default_model(&mut self, provider: &str) {
        let normalized = provider.to_lowercase();
        self.default_models.remove(&normalized);
        if normalized != provider {
            self.default_models.remove(provider);
        }
    }

    pub fn usage_limits(&self) -> UsageLimits {
        let defaults = UsageLimits::default();
        UsageLimits {
            standard: self.limits.standard.unwrap_or(defaults.standard),
            premium: self.limits.premium.unwrap_or(defaults.premium),
        }
    }

    pub fn render_cadence(&self) -> RenderCadence {
        let defaults = RenderCadence::default();
        RenderCadence {
            debounce: self
                .renderer
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            frame: self
                .renderer
                .frame_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame),
            graphemes_per_frame: self
                .renderer
                .graphemes_per_frame
                .filter(|n| *n > 0)
                .unwrap_or(defaults.graphemes_per_frame),
        }
    }
}
