//! 預覽圖合成
//!
//! 三個步驟，各自是一次獨立的外部呼叫：
//! 1. `montage` 拼成網格（略過第一張影格）
//! 2. `convert -resize` 調整整張圖的尺寸（可略過）
//! 3. `convert -splice -annotate` 在上方加上影片資訊
//!
//! 最後一步寫到輸出資料夾內的暫存檔，成功後才改名為正式檔名，
//! 失敗時不會留下不完整的預覽圖。

use super::frame_extractor::ExtractedFrames;
use crate::config::OutputFormat;
use crate::error::{MontageError, Result};
use crate::tools::{ExternalTools, RunError, VideoMetadata, run_to_completion};
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;

/// 標頭列高度（像素）
pub const HEADER_HEIGHT: u32 = 28;
const HEADER_POINTSIZE: u32 = 12;
const HEADER_OFFSET: &str = "+0+6";
/// 每張縮圖四周 1 像素的間距
const TILE_SPACING: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct MontageStyle<'a> {
    pub background_color: &'a str,
    pub label_color: &'a str,
    pub format: OutputFormat,
    pub tiles: Option<(u32, u32)>,
    pub thumbnail_width: Option<u32>,
    pub target_resolution: Option<&'a str>,
    pub extra_args: &'a [String],
}

impl MontageStyle<'_> {
    /// 整張預覽圖的縮放尺寸
    ///
    /// 優先使用 `target_resolution`；否則在網格與縮圖寬度都已知時，
    /// 以欄數乘上縮圖寬度（含間距）為寬度
    #[must_use]
    pub fn resize_geometry(&self) -> Option<String> {
        if let Some(resolution) = self.target_resolution {
            return Some(resolution.to_string());
        }
        match (self.tiles, self.thumbnail_width) {
            (Some((columns, _)), Some(width)) => Some(
                (u64::from(columns) * (u64::from(width) + u64::from(TILE_SPACING))).to_string(),
            ),
            _ => None,
        }
    }
}

/// 合成時的暫存檔，離開作用域時刪除
struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if path.exists()
                && let Err(e) = fs::remove_file(path)
            {
                warn!("無法刪除暫存檔 {}: {}", path.display(), e);
            }
        }
    }
}

/// 合成預覽圖並寫入 `output_path`
pub fn assemble_montage(
    tools: &ExternalTools,
    frames: &ExtractedFrames,
    metadata: &VideoMetadata,
    output_path: &Path,
    style: &MontageStyle<'_>,
    working_prefix: &Path,
    cancel: &AtomicBool,
) -> Result<PathBuf> {
    let visible: Vec<&Path> = frames
        .frames()
        .iter()
        .skip(1)
        .map(|frame| frame.path.as_path())
        .collect();
    if visible.is_empty() {
        return Err(MontageError::Assembly {
            step: "montage",
            reason: format!("沒有可用的縮圖（共 {} 張）", frames.len()),
        });
    }

    let intermediate = with_suffix(
        working_prefix,
        &format!(".montage.{}", style.format.extension()),
    );
    let partial = partial_path(output_path, style.format)?;
    let _scratch = ScratchFiles {
        paths: vec![intermediate.clone(), partial.clone()],
    };

    let mut montage = tools.montage();
    montage
        .args(["-background", style.background_color])
        .args(["-borderwidth", "0", "-geometry", "+1+1"]);
    if let Some((columns, rows)) = style.tiles {
        montage.args(["-tile".to_string(), format!("{columns}x{rows}")]);
    }
    montage
        .args(&visible)
        .args(style.extra_args)
        .arg(&intermediate);
    run_step("montage", montage, &intermediate, cancel)?;

    if let Some(geometry) = style.resize_geometry() {
        let mut resize = tools.convert();
        resize
            .arg(&intermediate)
            .args(["-resize", geometry.as_str()])
            .arg(&intermediate);
        run_step("resize", resize, &intermediate, cancel)?;
    } else {
        debug!("未設定輸出尺寸，略過縮放");
    }

    let mut label = tools.convert();
    label
        .arg(&intermediate)
        .args(["-gravity", "North", "-background", style.background_color])
        .args(["-splice".to_string(), format!("0x{HEADER_HEIGHT}")])
        .args(["-fill", style.label_color])
        .args(["-pointsize".to_string(), HEADER_POINTSIZE.to_string()])
        .args([
            "-annotate".to_string(),
            HEADER_OFFSET.to_string(),
            escape_annotation(&metadata.header_label()),
        ])
        .arg(&partial);
    run_step("label", label, &partial, cancel)?;

    fs::rename(&partial, output_path).map_err(|e| MontageError::Assembly {
        step: "label",
        reason: format!("無法寫入 {}: {e}", output_path.display()),
    })?;

    info!("預覽圖已建立: {}", output_path.display());
    Ok(output_path.to_path_buf())
}

fn run_step(
    step: &'static str,
    command: Command,
    expected_output: &Path,
    cancel: &AtomicBool,
) -> Result<()> {
    let completed = match run_to_completion(command, cancel) {
        Ok(completed) => completed,
        Err(RunError::Cancelled) => return Err(MontageError::Cancelled),
        Err(e) => {
            return Err(MontageError::Assembly {
                step,
                reason: e.to_string(),
            });
        }
    };

    if !completed.success() {
        return Err(MontageError::Assembly {
            step,
            reason: completed.describe_failure(),
        });
    }

    if !expected_output.is_file() {
        return Err(MontageError::Assembly {
            step,
            reason: format!("未產生 {}", expected_output.display()),
        });
    }

    debug!("{step} 完成");
    Ok(())
}

/// `-annotate` 會展開 `%` 跳脫序列，檔名中的 `%` 需寫成 `%%`
fn escape_annotation(text: &str) -> String {
    text.replace('%', "%%")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// 與輸出檔同資料夾的暫存檔：`.<name>.partial.<ext>`
fn partial_path(output_path: &Path, format: OutputFormat) -> Result<PathBuf> {
    let Some(file_name) = output_path.file_name() else {
        return Err(MontageError::Assembly {
            step: "label",
            reason: format!("無效的輸出路徑: {}", output_path.display()),
        });
    };

    let mut name = OsString::from(".");
    name.push(file_name);
    name.push(format!(".partial.{}", format.extension()));
    Ok(output_path.with_file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(
        tiles: Option<(u32, u32)>,
        width: Option<u32>,
        target: Option<&str>,
    ) -> MontageStyle<'_> {
        MontageStyle {
            background_color: "black",
            label_color: "white",
            format: OutputFormat::Jpg,
            tiles,
            thumbnail_width: width,
            target_resolution: target,
            extra_args: &[],
        }
    }

    #[test]
    fn test_resize_geometry() {
        assert_eq!(
            style(Some((4, 3)), Some(435), None).resize_geometry(),
            Some("1748".to_string())
        );
        assert_eq!(
            style(Some((4, 3)), Some(435), Some("1920x1080")).resize_geometry(),
            Some("1920x1080".to_string())
        );
        assert_eq!(style(None, Some(435), None).resize_geometry(), None);
        assert_eq!(style(Some((4, 3)), None, None).resize_geometry(), None);
    }

    #[test]
    fn test_resize_geometry_large_values() {
        assert_eq!(
            style(Some((u32::MAX, 1)), Some(u32::MAX), None).resize_geometry(),
            Some(u64::MAX.to_string())
        );
    }

    #[test]
    fn test_partial_path_stays_in_output_dir() {
        let partial = partial_path(Path::new("/out/movie.mp4.jpg"), OutputFormat::Jpg).unwrap();
        assert_eq!(partial, PathBuf::from("/out/.movie.mp4.jpg.partial.jpg"));
    }

    #[test]
    fn test_intermediate_name() {
        assert_eq!(
            with_suffix(Path::new("/tmp/ws/0001_movie.mp4"), ".montage.png"),
            PathBuf::from("/tmp/ws/0001_movie.mp4.montage.png")
        );
    }

    #[test]
    fn test_annotation_percent_escaped() {
        assert_eq!(
            escape_annotation("File: 100%_final.mp4 | FPS: 25"),
            "File: 100%%_final.mp4 | FPS: 25"
        );
        assert_eq!(escape_annotation("File: movie.mp4"), "File: movie.mp4");
    }

    #[test]
    fn test_scratch_files_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.jpg");
        fs::write(&a, "x").unwrap();
        {
            let _scratch = ScratchFiles {
                paths: vec![a.clone(), dir.path().join("missing.jpg")],
            };
        }
        assert!(!a.exists());
    }
}
