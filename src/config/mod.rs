// 配置管理模块

use crate::uploader::{
    Header, DEFAULT_MAX_CONCURRENCY, DEFAULT_METHOD, DEFAULT_MULTIPART_THRESHOLD,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 上传基础地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 直传与分片上传使用的 HTTP 方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 批量上传开关
    #[serde(default)]
    pub batch: bool,
    /// 分片上传阈值（字节，默认 500MiB）
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
    /// 最大并发分片数
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// 进度发布间隔（毫秒）
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// 连接超时（秒），不设置时使用 HTTP 客户端默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// 附加请求头
    #[serde(default)]
    pub headers: Vec<Header>,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_progress_interval_ms() -> u64 {
    crate::events::DEFAULT_THROTTLE_INTERVAL_MS
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: None,
            method: default_method(),
            batch: false,
            multipart_threshold: default_multipart_threshold(),
            max_concurrency: default_max_concurrency(),
            progress_interval_ms: default_progress_interval_ms(),
            connect_timeout_secs: None,
            headers: Vec::new(),
        }
    }
}

impl UploadConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.upload.max_concurrency == 0 {
            anyhow::bail!("upload.max_concurrency 必须大于 0");
        }

        reqwest::Method::from_bytes(self.upload.method.trim().to_ascii_uppercase().as_bytes())
            .with_context(|| format!("upload.method 不是合法的 HTTP 方法: {}", self.upload.method))?;

        if let Some(url) = &self.upload.url {
            if !url.trim().is_empty() && !url.starts_with("http://") && !url.starts_with("https://")
            {
                anyhow::bail!("upload.url 必须以 http:// 或 https:// 开头: {}", url);
            }
        }

        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config: AppConfig = toml::from_str(&content).context("解析配置文件失败")?;
        config.validate().context("配置文件校验失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        // 确保父目录存在
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("创建配置目录失败")?;
            }
        }

        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;

        tracing::info!("✓ 配置已保存: {:?}", path);
        Ok(())
    }

    /// 加载配置，失败时使用默认配置并尝试写出默认配置文件
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if !path.exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {:#}", e);
                    }
                }

                default_config
            }
        }
    }
}
