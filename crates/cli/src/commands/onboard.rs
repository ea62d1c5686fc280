//! `patchloop onboard` — First-time setup.

use anyhow::Context;
use patchloop_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Patchloop — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("creating {}", config_dir.display()))?;
        println!("  Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config file already exists: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("  Created config file: {}", config_path.display());
    }

    println!();
    println!("  Next steps:");
    println!("    1. Set PATCHLOOP_API_KEY (or GEMINI_API_KEY), or add api_key to the config file");
    println!("    2. Run `patchloop doctor` to check the setup");
    println!("    3. Run `patchloop` inside your project");
    Ok(())
}
