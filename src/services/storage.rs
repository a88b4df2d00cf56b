// 本地数据持久化服务

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::APP_DIR_NAME;
use crate::models::settings::AppSettings;

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/openterm
/// Linux: ~/.config/openterm
/// Windows: C:\Users\<用户名>\AppData\Roaming\openterm
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine the system config directory")?
        .join(APP_DIR_NAME);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("Could not create the config directory")?;
    }
    Ok(config_dir)
}

/// 获取设置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("settings.json"))
}

/// 加载应用设置，文件不存在时返回默认值
pub fn load_settings() -> Result<AppSettings> {
    load_settings_from(&get_settings_file()?)
}

/// 保存应用设置
pub fn save_settings(settings: &AppSettings) -> Result<()> {
    save_settings_to(&get_settings_file()?, settings)
}

pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read settings file {}", path.display()))?;
    let settings: AppSettings = serde_json::from_str(&content)
        .with_context(|| format!("Could not parse settings file {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    let content =
        serde_json::to_string_pretty(settings).context("Could not serialize settings")?;
    fs::write(path, content)
        .with_context(|| format!("Could not write settings file {}", path.display()))?;
    Ok(())
}
