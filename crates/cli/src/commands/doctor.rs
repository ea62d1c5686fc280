//! `patchloop doctor` — Diagnose configuration and environment.

use patchloop_config::AppConfig;
use tokio::process::Command;

pub async fn run() -> anyhow::Result<()> {
    println!("Patchloop Doctor");
    println!("================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  -  No config file, using defaults (run `patchloop onboard` to create one)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ok Configuration valid");
            config
        }
        Err(e) => {
            println!("  !! Configuration invalid: {e}");
            println!("\n  1 issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ok API key configured");
    } else {
        println!("  !! No API key: set PATCHLOOP_API_KEY or GEMINI_API_KEY");
        issues += 1;
    }

    println!("  -  Model: {} (editor: {})", config.model, config.editor_model);

    let interpreter = &config.execution.interpreter;
    match Command::new(interpreter).arg("--version").output().await {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            let version = version.trim();
            let version = if version.is_empty() {
                String::from_utf8_lossy(&output.stderr).trim().to_string()
            } else {
                version.to_string()
            };
            println!("  ok Interpreter `{interpreter}`: {version}");
        }
        _ => {
            println!("  !! Interpreter `{interpreter}` not found");
            issues += 1;
        }
    }

    println!("  -  Execution environment: {}", config.env_dir().display());

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
