//! `avacyn config` — Configuration management commands.

use avacyn_config::AppConfig;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Parse the config and report problems
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
}

pub async fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Validate => validate().await,
        ConfigAction::Show => show().await,
        ConfigAction::Path => path().await,
    }
}

async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set AVACYN_API_KEY or OPENAI_API_KEY env var)");
            }

            if config.default_temperature < 0.0 || config.default_temperature > 2.0 {
                warnings.push("Temperature out of range (0.0–2.0)");
            }

            if config.search.api_key.is_none() {
                warnings.push("No Tavily API key (set TAVILY_API_KEY env var)");
            }

            if config.turn.max_steps == 0 {
                warnings.push("turn.max_steps must be at least 1");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Endpoint:  {}", config.api_url);
            println!("   Chat:      {}", config.models.chat);
            println!("   Title:     {}", config.models.title);
            println!("   Artifact:  {}", config.models.artifact);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   Database:  {}", config.storage.resolved_db_path());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
