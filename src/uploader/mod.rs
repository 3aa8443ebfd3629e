// 分片上传模块
//
// - 小文件整文件直传，大文件按服务端下发的分片会话并发上传
// - 分片上传失败时尽力中止会话，文件重新排队，不自动重试
// - 传输、factory、文件列表界面均通过 trait 注入

pub mod engine;
pub mod error;
pub mod factory;
pub mod file;
pub mod naming;
pub mod options;
pub mod part;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{UploadReport, Uploader};
pub use error::{ErrorKind, UploadError, UploadStep};
pub use factory::{FactoryOutcome, UploadFactory};
pub use file::{FileSnapshot, FileSource, FileStatus, UploadableFile, DEFAULT_CONTENT_TYPE};
pub use naming::{url_safe_filename, FilenameSanitizer};
pub use options::{
    ComputeFn, ConfigValue, Header, OptionResolver, UploadOverrides, UploaderOptions,
    DEFAULT_MAX_CONCURRENCY, DEFAULT_METHOD, DEFAULT_MULTIPART_THRESHOLD,
};
pub use part::{
    CompleteMultipartRequest, CompletedPart, CreateMultipartRequest, CreateMultipartResponse,
    MultipartUploadSession, PartTask,
};
pub use pool::{run_bounded, PoolOutput};
pub use progress::ProgressAggregator;
pub use queue::{FileListSurface, HeadlessSurface, UploadQueue};
pub use registry::{
    ActivityCounter, ActivityGuard, TransferGuard, TransferHandle, TransferKind, TransferRegistry,
};
pub use transport::{
    ProgressFn, ReqwestTransport, TransferBody, TransferRequest, TransferResponse, Transport,
    JSON_CONTENT_TYPE,
};
