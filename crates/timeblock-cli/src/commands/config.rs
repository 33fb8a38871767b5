use clap::Subcommand;
use timeblock_core::PlannerConfig;

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the whole config
    Show,
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "window.start", "repair.max_passes")
        key: String,
    },
    /// Set a config value and save
    Set {
        /// Dot-separated key
        key: String,
        /// New value
        value: String,
    },
    /// Print the config file location
    Path,
    /// Reset config to defaults
    Reset,
}

pub fn run(action: ConfigAction, json: bool) -> CmdResult {
    match action {
        ConfigAction::Show => {
            let config = PlannerConfig::load()?;
            if json {
                print_json(&config)?;
            } else {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        ConfigAction::Get { key } => {
            let config = PlannerConfig::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = PlannerConfig::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::Path => {
            println!("{}", PlannerConfig::path()?.display());
        }
        ConfigAction::Reset => {
            PlannerConfig::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
