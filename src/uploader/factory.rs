// 上传参数工厂
//
// 宿主为每个文件提供覆盖参数，可以立即给出，也可以异步给出

use crate::uploader::{UploadOverrides, UploadableFile};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// factory 的返回值
pub enum FactoryOutcome {
    /// 立即可用的覆盖参数
    Immediate(UploadOverrides),
    /// 需要等待的覆盖参数，失败时文件进入失败状态
    Deferred(BoxFuture<'static, anyhow::Result<UploadOverrides>>),
}

impl FactoryOutcome {
    pub fn immediate(overrides: UploadOverrides) -> Self {
        FactoryOutcome::Immediate(overrides)
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<UploadOverrides>> + Send + 'static,
    {
        FactoryOutcome::Deferred(Box::pin(future))
    }
}

impl fmt::Debug for FactoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryOutcome::Immediate(overrides) => {
                f.debug_tuple("Immediate").field(overrides).finish()
            }
            FactoryOutcome::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// 按文件提供上传参数
///
/// 返回 None 视为配置错误，该文件不会上传
pub trait UploadFactory: Send + Sync {
    fn create(&self, file: &UploadableFile) -> Option<FactoryOutcome>;
}

impl<F> UploadFactory for F
where
    F: Fn(&UploadableFile) -> Option<FactoryOutcome> + Send + Sync,
{
    fn create(&self, file: &UploadableFile) -> Option<FactoryOutcome> {
        self(file)
    }
}
