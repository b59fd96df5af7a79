use crate::tools::ensure_directory_exists;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 整個批次共用的暫存目錄
///
/// 批次開始時建立，離開作用域時（包含錯誤與中斷）一律刪除
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    /// 在 `base`（預設為系統暫存目錄）下建立 `video-montage-<uuid>`
    pub fn create(base: Option<&Path>) -> std::io::Result<Self> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        ensure_directory_exists(&base)?;

        let path = base.join(format!("video-montage-{}", Uuid::new_v4()));
        fs::create_dir(&path)?;
        info!("建立暫存目錄: {}", path.display());

        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => info!("已刪除暫存目錄: {}", self.path.display()),
            Err(e) => warn!("無法清理暫存目錄 {}: {}", self.path.display(), e),
        }
    }
}
