//! Configuration module

pub mod settings;

pub use settings::{
    BackendSettings, BudgetConfig, GatewayConfig, LoggingConfig, RetryConfig, ServerConfig,
    Settings, CONFIG_PATH_ENV,
};
