use crate::config::FileTypeTable;
use anyhow::{Result, bail};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 展開輸入的檔案與資料夾為影片清單
///
/// - 資料夾：依檔名排序列出影片，`recursive` 時包含子資料夾
/// - 檔案：必須是非空的影片檔，否則視為無效的輸入
pub fn scan_video_files(
    inputs: &[PathBuf],
    file_type_table: &FileTypeTable,
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    let mut video_files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let found = scan_directory(input, file_type_table, recursive);
            debug!("{} 找到 {} 個影片", input.display(), found.len());
            video_files.extend(found);
        } else if is_video(input, file_type_table) {
            video_files.push(input.clone());
        } else {
            warn!("無效的影片檔案: {}", input.display());
            bail!("無效的影片檔案: {}", input.display());
        }
    }

    Ok(video_files)
}

fn scan_directory(directory: &Path, file_type_table: &FileTypeTable, recursive: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name();
    let walker = if recursive { walker } else { walker.max_depth(1) };

    walker
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_video(entry.path(), file_type_table))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn is_video(path: &Path, file_type_table: &FileTypeTable) -> bool {
    path.is_file()
        && std::fs::metadata(path).is_ok_and(|meta| meta.len() > 0)
        && file_type_table.is_video_file(path)
}
