//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ROLLCALL__*` 覆盖（双下划线表示嵌套，如 `ROLLCALL__BOT__START_KEYWORD=!hadir`）。
//! 最后兼容旧部署的环境变量：`PORT`、`ONESENDER_URL`、`ONESENDER_API_KEY`。

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub bot: BotSection,
    pub database: DatabaseSection,
    pub onesender: OneSenderSection,
}

/// [app] 段：服务名与监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl AppSection {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }
}

/// [bot] 段：指令关键字与会话过期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    pub start_keyword: String,
    pub cancel_keyword: String,
    /// 会话空闲过期秒数；未设置时会话永不过期
    pub session_timeout_secs: Option<u64>,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            start_keyword: "!absen".to_string(),
            cancel_keyword: "!batal".to_string(),
            session_timeout_secs: None,
        }
    }
}

impl BotSection {
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// [database] 段：SQLite 文件、连接池大小、是否写入示例数据
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
    pub max_connections: u32,
    pub seed_sample_data: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("absensi_sekolah.db"),
            max_connections: 5,
            seed_sample_data: true,
        }
    }
}

/// [onesender] 段：出站消息网关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OneSenderSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OneSenderSection {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// 应用旧部署遗留的环境变量（`lookup` 便于测试注入）
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.app.port = port;
        }
        if let Some(url) = lookup("ONESENDER_URL").filter(|v| !v.is_empty()) {
            self.onesender.url = Some(url);
        }
        if let Some(key) = lookup("ONESENDER_API_KEY").filter(|v| !v.is_empty()) {
            self.onesender.api_key = Some(key);
        }
    }
}

/// 从 config 目录加载配置，环境变量 ROLLCALL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 ROLLCALL__*（双下划线表示嵌套键）
/// 4. 最后应用 PORT / ONESENDER_* 旧变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ROLLCALL")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.apply_legacy_env(|key| std::env::var(key).ok());
    Ok(cfg)
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
