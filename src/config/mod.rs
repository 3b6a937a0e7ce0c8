mod settings;

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};

use crate::broker::BrokerKind;
use crate::config::settings::PartialSettings;
use crate::consumer::PoolOptions;
use crate::utils::retry::RetryPolicy;

pub use settings::{
    BrokerSettings, GatewaySettings, RetrySettings, ServerSettings, Settings, StoreBackend,
    StoreSettings,
};

/// Prefix of the environment variables read by [`load_config`], e.g.
/// `CLIMATE_GATEWAY__DEADLINE_MS=2000`.
pub const ENV_PREFIX: &str = "CLIMATE";

/// Loads `config/default.*` (optional) and the environment, merged over the
/// defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit base file name (extension is
/// resolved by the `config` crate).
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

impl Settings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.gateway.deadline_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Consumer pool options for one broker path.
    pub fn pool_options(&self, kind: BrokerKind) -> PoolOptions {
        let broker = self.broker(kind);
        PoolOptions {
            topic: self.gateway.topic.clone(),
            group: broker.group_id.clone(),
            workers: broker.workers,
            codec: broker.codec,
            ack_mode: broker.ack_mode,
            ..PoolOptions::for_broker(kind)
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        let delay = Duration::from_millis(settings.retry_delay_ms);
        if settings.exponential {
            RetryPolicy::exponential(settings.max_retries, delay)
        } else {
            RetryPolicy::fixed(settings.max_retries, delay)
        }
    }
}
