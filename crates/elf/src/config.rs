//! Configuration loading for elf.
//!
//! Configuration is resolved from multiple sources with precedence:
//! 1. `--base-path` flag, then `ELF_BASE_PATH`
//! 2. Config file (`ELF_CONFIG`, else `<base path>/config.toml`)
//! 3. Default values

use std::path::{Path, PathBuf};

use elf_core::{EngineConfig, Error};

pub const BASE_PATH_ENV: &str = "ELF_BASE_PATH";
pub const CONFIG_ENV: &str = "ELF_CONFIG";
pub const CONFIG_FILE: &str = "config.toml";

/// Load the engine configuration for this invocation.
pub fn load(base_path_flag: Option<&Path>) -> elf_core::Result<EngineConfig> {
    let env_base = std::env::var_os(BASE_PATH_ENV).map(PathBuf::from);
    let env_config = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    resolve(
        base_path_flag.map(Path::to_path_buf).or(env_base),
        env_config,
    )
}

fn resolve(base_path: Option<PathBuf>, config_file: Option<PathBuf>) -> elf_core::Result<EngineConfig> {
    let search_base = base_path
        .clone()
        .unwrap_or_else(|| EngineConfig::default().base_path);
    let path = config_file.unwrap_or_else(|| search_base.join(CONFIG_FILE));

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        toml::from_str::<EngineConfig>(&content).map_err(|e| {
            Error::configuration(format!("Failed to parse config {}: {}", path.display(), e))
        })?
    } else {
        EngineConfig::default()
    };

    // An explicit base path always beats the file.
    if let Some(base) = base_path {
        config.base_path = base;
    }

    config.validate()?;
    Ok(config)
}
