// 上传参数解析
//
// 每个参数既可以是常量，也可以是按文件计算的闭包。
// 解析顺序：factory 覆盖值（只看是否存在，不看真假）-> 全局配置

use crate::config::UploadConfig;
use crate::uploader::UploadableFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 默认 HTTP 方法
pub const DEFAULT_METHOD: &str = "PUT";

/// 默认分片上传阈值: 500MiB（大于等于该大小的文件走分片上传）
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 500 * 1024 * 1024;

/// 默认最大并发分片数
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// 按文件计算参数值的闭包
pub type ComputeFn<T> = Arc<dyn Fn(&UploadableFile) -> T + Send + Sync>;

/// 常量或按文件计算的参数值
pub enum ConfigValue<T> {
    Constant(T),
    Computed(ComputeFn<T>),
}

impl<T: Clone> ConfigValue<T> {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&UploadableFile) -> T + Send + Sync + 'static,
    {
        ConfigValue::Computed(Arc::new(f))
    }

    /// 针对指定文件求值
    pub fn resolve(&self, file: &UploadableFile) -> T {
        match self {
            ConfigValue::Constant(value) => value.clone(),
            ConfigValue::Computed(f) => f(file),
        }
    }
}

impl<T: Clone> Clone for ConfigValue<T> {
    fn clone(&self) -> Self {
        match self {
            ConfigValue::Constant(value) => ConfigValue::Constant(value.clone()),
            ConfigValue::Computed(f) => ConfigValue::Computed(f.clone()),
        }
    }
}

impl<T> From<T> for ConfigValue<T> {
    fn from(value: T) -> Self {
        ConfigValue::Constant(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfigValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            ConfigValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// 请求头
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// 全局上传参数
#[derive(Debug, Clone)]
pub struct UploaderOptions {
    /// 上传基础地址
    pub url: ConfigValue<Option<String>>,
    /// 直传与分片上传使用的 HTTP 方法
    pub method: ConfigValue<String>,
    /// 附加请求头
    pub headers: ConfigValue<Vec<Header>>,
    /// 批量上传开关（仅参与解析，每次 upload() 仍只处理一个文件）
    pub batch: ConfigValue<bool>,
    /// 最大并发分片数
    pub max_concurrency: ConfigValue<usize>,
    /// 分片上传阈值
    pub multipart_threshold: ConfigValue<u64>,
}

impl Default for UploaderOptions {
    fn default() -> Self {
        Self {
            url: ConfigValue::Constant(None),
            method: ConfigValue::Constant(DEFAULT_METHOD.to_string()),
            headers: ConfigValue::Constant(Vec::new()),
            batch: ConfigValue::Constant(false),
            max_concurrency: ConfigValue::Constant(DEFAULT_MAX_CONCURRENCY),
            multipart_threshold: ConfigValue::Constant(DEFAULT_MULTIPART_THRESHOLD),
        }
    }
}

impl UploaderOptions {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = ConfigValue::Constant(Some(url.into()));
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = ConfigValue::Constant(method.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = ConfigValue::Constant(headers);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = ConfigValue::Constant(max_concurrency);
        self
    }

    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = ConfigValue::Constant(threshold);
        self
    }
}

impl From<&UploadConfig> for UploaderOptions {
    fn from(config: &UploadConfig) -> Self {
        Self {
            url: ConfigValue::Constant(config.url.clone()),
            method: ConfigValue::Constant(config.method.clone()),
            headers: ConfigValue::Constant(config.headers.clone()),
            batch: ConfigValue::Constant(config.batch),
            max_concurrency: ConfigValue::Constant(config.max_concurrency),
            multipart_threshold: ConfigValue::Constant(config.multipart_threshold),
        }
    }
}

/// factory 返回的单文件覆盖参数
///
/// 字段为 Some 即视为"已定义"，哪怕值本身为空或 false
#[derive(Debug, Clone, Default)]
pub struct UploadOverrides {
    pub url: Option<ConfigValue<Option<String>>>,
    pub method: Option<ConfigValue<String>>,
    pub headers: Option<ConfigValue<Vec<Header>>>,
    pub batch: Option<ConfigValue<bool>>,
    pub max_concurrency: Option<ConfigValue<usize>>,
}

impl UploadOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<ConfigValue<Option<String>>>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: impl Into<ConfigValue<String>>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn headers(mut self, headers: impl Into<ConfigValue<Vec<Header>>>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn batch(mut self, batch: impl Into<ConfigValue<bool>>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: impl Into<ConfigValue<usize>>) -> Self {
        self.max_concurrency = Some(max_concurrency.into());
        self
    }
}

/// 单个文件的参数解析器
pub struct OptionResolver<'a> {
    global: &'a UploaderOptions,
    overrides: &'a UploadOverrides,
}

fn pick<T: Clone>(
    overridden: Option<&ConfigValue<T>>,
    global: &ConfigValue<T>,
    file: &UploadableFile,
) -> T {
    match overridden {
        Some(value) => value.resolve(file),
        None => global.resolve(file),
    }
}

impl<'a> OptionResolver<'a> {
    pub fn new(global: &'a UploaderOptions, overrides: &'a UploadOverrides) -> Self {
        Self { global, overrides }
    }

    /// 上传地址，空字符串视为未配置
    pub fn url(&self, file: &UploadableFile) -> Option<String> {
        pick(self.overrides.url.as_ref(), &self.global.url, file)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
    }

    pub fn method(&self, file: &UploadableFile) -> String {
        pick(self.overrides.method.as_ref(), &self.global.method, file)
    }

    pub fn headers(&self, file: &UploadableFile) -> Vec<Header> {
        pick(self.overrides.headers.as_ref(), &self.global.headers, file)
    }

    pub fn batch(&self, file: &UploadableFile) -> bool {
        pick(self.overrides.batch.as_ref(), &self.global.batch, file)
    }

    pub fn max_concurrency(&self, file: &UploadableFile) -> usize {
        pick(
            self.overrides.max_concurrency.as_ref(),
            &self.global.max_concurrency,
            file,
        )
    }

    /// 分片阈值不接受 factory 覆盖
    pub fn multipart_threshold(&self, file: &UploadableFile) -> u64 {
        self.global.multipart_threshold.resolve(file)
    }
}
