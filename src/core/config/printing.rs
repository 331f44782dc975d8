use crate::core::config::data::Config;

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.default_provider {
            Some(provider) => println!("  default-provider: {provider}"),
            None => println!("  default-provider: (unset)"),
        }
        match &self.theme {
            Some(theme) => println!("  theme: {theme}"),
            None => println!("  theme: (unset)"),
        }
        if self.default_models.is_empty() {
            println!("  default-models: (none set)");
        } else {
            println!("  default-models:");
            let mut models: Vec<_> = self.default_models.iter().collect();
            models.sort();
            for (provider, model) in models {
                println!("    {provider}: {model}");
            }
        }
        let limits = self.usage_limits();
        println!(
            "  limits: {} standard / {} premium per week",
            limits.standard, limits.premium
        );
        for provider in &self.custom_providers {
            println!(
                "  custom provider {} ({}): {} [{} models]",
                provider.id,
                provider.display_name,
                provider.base_url,
                provider.models.len()
            );
        }
    }
}
