//! Base configuration shared by the engine binaries.
//!
//! Settings come from an optional `configuration` file overlaid with
//! `APP__`-prefixed environment variables (`APP__PORT` for the probe
//! server). Engine-specific settings such as the database, collaborator
//! URLs, and the tick cadence layer on top in `billing-engine`'s
//! `EngineConfig`.

use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Port for the health/readiness/metrics probe server.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
