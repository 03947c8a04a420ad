//! Server configuration.

use std::env;

use hookrelay_delivery::error::DeliveryError;
use hookrelay_delivery::PipelineConfig;

/// Full server configuration: listen address, backing stores, and the
/// delivery pipeline tunables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port (`HOOKRELAY_PORT`, default 8080).
    pub port: u16,
    /// `PostgreSQL` connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Redis connection string (`REDIS_URL`, required).
    pub redis_url: String,
    /// Connection-pool ceiling (`HOOKRELAY_DB_MAX_CONNECTIONS`, default 10).
    pub db_max_connections: u32,
    /// Pipeline tunables (see [`PipelineConfig::from_env`]).
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, DeliveryError> {
        let port = match env::var("HOOKRELAY_PORT") {
            Ok(v) => v.parse::<u16>().map_err(|_| DeliveryError::ConfigInvalid {
                var: "HOOKRELAY_PORT".to_string(),
                reason: format!("expected a port number, got {v:?}"),
            })?,
            Err(_) => 8080,
        };

        let database_url = env::var("DATABASE_URL").map_err(|_| DeliveryError::ConfigMissing {
            var: "DATABASE_URL".to_string(),
        })?;

        let redis_url = env::var("REDIS_URL").map_err(|_| DeliveryError::ConfigMissing {
            var: "REDIS_URL".to_string(),
        })?;

        let db_max_connections = match env::var("HOOKRELAY_DB_MAX_CONNECTIONS") {
            Ok(v) => match v.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(DeliveryError::ConfigInvalid {
                        var: "HOOKRELAY_DB_MAX_CONNECTIONS".to_string(),
                        reason: format!("expected a positive integer, got {v:?}"),
                    })
                }
            },
            Err(_) => 10,
        };

        Ok(Self {
            port,
            database_url,
            redis_url,
            db_max_connections,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}
