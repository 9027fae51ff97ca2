//! `avacyn doctor` — Diagnose system health.

use avacyn_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Avacyn Doctor — System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    println!("  ✅ Rust binary running");

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ✅ Config file valid");

                if config.has_api_key() {
                    println!("  ✅ API key configured");
                } else {
                    println!("  ⚠️  No API key configured — add api_key to config.toml");
                    issues += 1;
                }

                if config.search.api_key.is_some() {
                    println!("  ✅ Search API key configured");
                } else {
                    println!("  ⚠️  No search API key — search tools will report errors");
                    issues += 1;
                }

                let db_path = config.storage.resolved_db_path();
                if std::path::Path::new(&db_path).exists() {
                    println!("  ✅ Database file exists");
                } else {
                    println!("  ℹ️  Database will be created on first run: {db_path}");
                }
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ❌ No config file — run `avacyn init`");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
