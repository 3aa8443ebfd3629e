// 分片规划
//
// 根据文件大小与服务端下发的分片会话生成有序分片列表：
// - 分片号从 1 开始
// - 分片数 = ceil(文件大小 / 分片大小)
// - 最后一个分片的范围截断到文件大小

use crate::uploader::{UploadError, UploadStep};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 服务端下发的分片上传会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartUploadSession {
    /// 分片大小
    pub chunk_size: u64,
    /// 分片数量
    pub num_chunks: usize,
    /// 中止地址
    pub abort_url: String,
    /// 合并地址
    pub complete_url: String,
    /// 各分片上传地址（按分片号顺序）
    pub parts_url: Vec<String>,
}

/// 创建分片上传会话的响应
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMultipartResponse {
    pub multipart_upload: MultipartUploadSession,
}

/// 创建分片上传会话的请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreateMultipartRequest {
    pub key: String,
    pub size: u64,
    pub multipart_content_type: String,
}

/// 单个分片上传任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTask {
    /// 分片号（从 1 开始）
    pub part_id: u32,
    /// 分片上传地址
    pub part_url: String,
    /// 字节范围 `[begin, end)`
    pub range: Range<u64>,
}

impl PartTask {
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 在进度数组中的下标
    pub fn index(&self) -> usize {
        (self.part_id - 1) as usize
    }
}

/// 已上传分片（合并请求使用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
}

/// 合并请求体
#[derive(Debug, Clone, Serialize)]
pub struct CompleteMultipartRequest {
    pub parts: Vec<CompletedPart>,
}

impl CompleteMultipartRequest {
    /// 分片完成顺序不等于拼装顺序，这里按分片号升序排列
    pub fn new(mut parts: Vec<CompletedPart>) -> Self {
        parts.sort_by_key(|part| part.part_number);
        Self { parts }
    }
}

impl MultipartUploadSession {
    /// 生成分片任务列表
    ///
    /// 会话描述与文件大小不一致时返回 `InvalidResponse`
    pub fn plan_parts(&self, file_size: u64) -> Result<Vec<PartTask>, UploadError> {
        let invalid = |reason: String| UploadError::InvalidResponse {
            step: UploadStep::CreateMultipart,
            reason,
        };

        if self.chunk_size == 0 && file_size > 0 {
            return Err(invalid("分片大小为 0".to_string()));
        }

        let expected = if file_size == 0 {
            0
        } else {
            file_size.div_ceil(self.chunk_size) as usize
        };

        if self.num_chunks != expected {
            return Err(invalid(format!(
                "分片数量不一致: 服务端={}, 按大小计算={}",
                self.num_chunks, expected
            )));
        }

        if self.parts_url.len() < self.num_chunks {
            return Err(invalid(format!(
                "分片地址不足: 需要 {}, 实际 {}",
                self.num_chunks,
                self.parts_url.len()
            )));
        }

        let tasks = self
            .parts_url
            .iter()
            .take(self.num_chunks)
            .enumerate()
            .map(|(index, url)| {
                let begin = index as u64 * self.chunk_size;
                let end = (begin + self.chunk_size).min(file_size);
                PartTask {
                    part_id: index as u32 + 1,
                    part_url: url.clone(),
                    range: begin..end,
                }
            })
            .collect();

        Ok(tasks)
    }
}
