// 上传路径与文件名处理

use std::sync::Arc;

/// URL 中不允许出现在文件名里的字符
const URL_UNSAFE_CHARS: &[char] = &[
    '"', '<', '>', '#', '%', '{', '}', '|', '\\', '^', '~', '[', ']', '`', ';', '?', ':', '@',
    '=', '&',
];

/// 文件名清洗函数
pub type FilenameSanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// 默认文件名清洗：去掉 URL 不安全字符，空白折叠为 `-`
pub fn url_safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !URL_UNSAFE_CHARS.contains(c))
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}

pub fn default_sanitizer() -> FilenameSanitizer {
    Arc::new(url_safe_filename)
}

/// 拼接直传地址 `{base}/{filename}`
///
/// 折叠重复的 `/`，协议部分的 `://` 保持不变
pub fn direct_upload_url(base: &str, filename: &str) -> String {
    collapse_slashes(&format!("{}/{}", base, filename))
}

/// 创建分片上传会话的地址
pub fn multipart_create_url(base: &str) -> String {
    if base.contains('?') {
        format!("{}&multipart=true", base)
    } else {
        format!("{}?multipart=true", base)
    }
}

fn collapse_slashes(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut prev: Option<char> = None;
    let mut prev_prev: Option<char> = None;

    for c in url.chars() {
        // 连续的 `/` 只保留一个，除非紧跟在 `:` 后面（协议分隔符）
        let duplicate = c == '/' && prev == Some('/') && prev_prev.is_some_and(|p| p != ':');
        if duplicate {
            continue;
        }
        prev_prev = prev;
        prev = Some(c);
        out.push(c);
    }

    out
}
