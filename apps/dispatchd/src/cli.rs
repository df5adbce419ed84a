use clap::Parser;

/// CLI/env surface for the `dispatchd` host: a pair of JSON files for the
/// profile store and the inspector config, plus the inspection proxy's bind
/// address.
#[derive(Debug, Clone, Parser)]
#[command(name = "dispatchd", version, about = "LLM dispatch core host")]
pub struct CliArgs {
    /// Path to the persisted profile store (created on first save if absent).
    #[arg(long, env = "DISPATCHD_PROFILES_PATH", default_value = "dispatchd-profiles.json")]
    pub profiles_path: String,

    /// Path to the persisted inspection proxy config.
    #[arg(long, env = "DISPATCHD_INSPECTOR_CONFIG_PATH", default_value = "dispatchd-inspector.json")]
    pub inspector_config_path: String,

    /// Bind host for the inspection proxy.
    #[arg(long, env = "DISPATCHD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Overrides the inspection proxy's configured port when set.
    #[arg(long, env = "DISPATCHD_PORT")]
    pub port: Option<u16>,
}
