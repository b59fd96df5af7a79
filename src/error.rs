//! 錯誤型別
//!
//! 單支影片的錯誤（`InvalidVideo`、`InvalidSchedule`、`Extraction`、`Assembly`）
//! 只會讓該影片失敗，批次繼續；`Startup` 與 `Cancelled` 會中止整個批次。

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MontageError {
    /// ffprobe 無法啟動，或輸出不符合已知格式
    #[error("無效的影片 {path}: {reason}")]
    InvalidVideo { path: PathBuf, reason: String },

    /// 取樣參數無法產生有效的取樣計畫
    #[error("無效的取樣設定: {0}")]
    InvalidSchedule(String),

    /// 擷取程序失敗，或回報的影格不存在
    #[error("影格擷取失敗: {0}")]
    Extraction(String),

    /// 合併、縮放或標籤步驟失敗
    #[error("預覽圖合成失敗 ({step}): {reason}")]
    Assembly { step: &'static str, reason: String },

    /// 找不到必要的外部工具
    #[error("找不到必要的外部工具: {0}")]
    Startup(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("I/O 錯誤: {0}")]
    Io(#[from] std::io::Error),
}

impl MontageError {
    /// 是否應中止整個批次
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Startup(_) | Self::Cancelled)
    }
}

/// 設定驗證錯誤
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("thumbnail_count 與 tile 不可同時設定")]
    ConflictingSampleCount,

    #[error("縮圖數量必須大於 0")]
    ZeroThumbnails,

    #[error("無效的網格格式 '{0}'，應為 欄x列（例如 5x5）")]
    InvalidTile(String),

    #[error("不支援的輸出格式 '{0}'（可用: jpg, png, gif）")]
    UnsupportedFormat(String),

    #[error("stall_timeout_secs 必須大於 0")]
    ZeroStallTimeout,
}

pub type Result<T> = std::result::Result<T, MontageError>;
