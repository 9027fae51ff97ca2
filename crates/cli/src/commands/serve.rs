//! `avacyn serve` — Start the HTTP API server.

use avacyn_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🌙 Avacyn Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Auth required: {}", config.gateway.require_auth);

    avacyn_gateway::serve(config).await?;

    Ok(())
}
