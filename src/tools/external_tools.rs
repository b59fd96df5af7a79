use crate::error::{MontageError, Result};
use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// 啟動時必須能在 PATH 找到的外部工具
pub const REQUIRED_TOOLS: [&str; 4] = ["ffmpeg", "ffprobe", "montage", "convert"];

/// 已解析的外部工具路徑
///
/// 在啟動時解析一次，之後以參數注入各元件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    montage: PathBuf,
    convert: PathBuf,
}

impl ExternalTools {
    #[must_use]
    pub fn new(
        ffmpeg: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        montage: impl Into<PathBuf>,
        convert: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            montage: montage.into(),
            convert: convert.into(),
        }
    }

    /// 從 `PATH` 環境變數解析所有工具
    pub fn locate() -> Result<Self> {
        Self::locate_in(std::env::var_os("PATH"))
    }

    pub fn locate_in(path_var: Option<OsString>) -> Result<Self> {
        let dirs: Vec<PathBuf> = path_var
            .map(|value| std::env::split_paths(&value).collect())
            .unwrap_or_default();

        let mut found = Vec::with_capacity(REQUIRED_TOOLS.len());
        let mut missing = Vec::new();
        for name in REQUIRED_TOOLS {
            match find_executable(name, &dirs) {
                Some(path) => {
                    debug!("找到 {name}: {}", path.display());
                    found.push(path);
                }
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            return Err(MontageError::Startup(missing.join(", ")));
        }

        let mut found = found.into_iter();
        match (found.next(), found.next(), found.next(), found.next()) {
            (Some(ffmpeg), Some(ffprobe), Some(montage), Some(convert)) => {
                Ok(Self::new(ffmpeg, ffprobe, montage, convert))
            }
            _ => Err(MontageError::Startup(REQUIRED_TOOLS.join(", "))),
        }
    }

    #[must_use]
    pub fn ffmpeg(&self) -> Command {
        Command::new(&self.ffmpeg)
    }

    #[must_use]
    pub fn ffprobe(&self) -> Command {
        Command::new(&self.ffprobe)
    }

    #[must_use]
    pub fn montage(&self) -> Command {
        Command::new(&self.montage)
    }

    #[must_use]
    pub fn convert(&self) -> Command {
        Command::new(&self.convert)
    }
}

fn find_executable(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| candidate_names(name).map(move |file| dir.join(file)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidate_names(name: &str) -> impl Iterator<Item = String> {
    [format!("{name}.exe"), name.to_string()].into_iter()
}

#[cfg(not(windows))]
fn candidate_names(name: &str) -> impl Iterator<Item = String> {
    std::iter::once(name.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn touch_executable(dir: &Path, name: &str, mode: u32) {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_locate_all_tools() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch_executable(first.path(), "ffmpeg", 0o755);
        touch_executable(first.path(), "ffprobe", 0o755);
        touch_executable(second.path(), "montage", 0o755);
        touch_executable(second.path(), "convert", 0o755);

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        let tools = ExternalTools::locate_in(Some(path_var)).unwrap();

        assert_eq!(
            tools,
            ExternalTools::new(
                first.path().join("ffmpeg"),
                first.path().join("ffprobe"),
                second.path().join("montage"),
                second.path().join("convert"),
            )
        );
    }

    #[test]
    fn test_missing_tool_is_startup_error() {
        let dir = TempDir::new().unwrap();
        touch_executable(dir.path(), "ffmpeg", 0o755);
        touch_executable(dir.path(), "ffprobe", 0o755);
        touch_executable(dir.path(), "montage", 0o755);
        // 沒有執行權限的 convert 不算
        touch_executable(dir.path(), "convert", 0o644);

        let path_var = std::env::join_paths([dir.path()]).unwrap();
        match ExternalTools::locate_in(Some(path_var)) {
            Err(MontageError::Startup(missing)) => assert_eq!(missing, "convert"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_path_reports_everything() {
        match ExternalTools::locate_in(None) {
            Err(MontageError::Startup(missing)) => {
                assert_eq!(missing, "ffmpeg, ffprobe, montage, convert");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
