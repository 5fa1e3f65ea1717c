use serde::Deserialize;

use floe_common::ClusterTopology;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,
    #[serde(default)]
    pub delegated_backend: bool,
}

fn default_partition_count() -> usize {
    1
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let config_file_path = std::env::var("FLOE_COORDINATOR_CONFIG_PATH")
            .unwrap_or_else(|_| "crates/coordinator/config/default.toml".to_string());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&config_file_path).required(false))
            .add_source(config::Environment::with_prefix("FLOE_COORDINATOR").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn topology(&self) -> floe_common::Result<ClusterTopology> {
        ClusterTopology::new(self.partition_count)
    }
}
