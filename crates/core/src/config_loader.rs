use anyhow::Result;
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};

use crate::config::AppConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads engine configuration by merging TOML, environment variables,
    /// and JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads engine configuration from an explicit TOML path, still merging
    /// `QUORUM_`-prefixed environment variables and the optional JSON
    /// overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .join(figment::providers::Serialized::defaults(
                AppConfig::default(),
            ))
            .merge(Toml::file(path))
            .merge(Env::prefixed("QUORUM_"))
            .join(Json::file("config/Config.json"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn load_from_merges_toml_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                    pair = "ETHUSDT"

                    [risk]
                    min_confidence_to_open = 0.6
                "#,
            )?;
            let cfg = ConfigLoader::load_from("Config.toml").expect("load");
            assert_eq!(cfg.pair, "ETHUSDT");
            assert!((cfg.risk.min_confidence_to_open - 0.6).abs() < f64::EPSILON);
            // Untouched sections keep their defaults.
            assert_eq!(cfg.schedule.emergency_interval_secs, 300);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", r#"pair = "ETHUSDT""#)?;
            jail.set_env("QUORUM_PAIR", "SOLUSDT");
            let cfg = ConfigLoader::load_from("Config.toml").expect("load");
            assert_eq!(cfg.pair, "SOLUSDT");
            Ok(())
        });
    }
}
