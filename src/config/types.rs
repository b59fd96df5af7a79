use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// 預覽圖會隱藏第一張保留的影格（通常是黑畫面或近似重複），
/// 以網格指定數量時需多擷取這一張
pub const HIDDEN_LEADING_FRAMES: u32 = 1;

pub const DEFAULT_THUMBNAIL_COUNT: u32 = 25;
pub const DEFAULT_START_SECONDS: u64 = 120;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 435;
pub const DEFAULT_STALL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypeTable {
    #[serde(rename = "VIDEO_FILE")]
    pub video_file: Vec<String>,
}

impl FileTypeTable {
    #[must_use]
    pub fn video_extensions_set(&self) -> HashSet<String> {
        self.video_file
            .iter()
            .map(|ext| ext.to_lowercase())
            .collect()
    }

    #[must_use]
    pub fn is_video_file(&self, path: &Path) -> bool {
        let video_extensions = self.video_extensions_set();
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| video_extensions.contains(&format!(".{}", ext.to_lowercase())))
    }
}

/// 輸出圖片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpg,
    Png,
    Gif,
}

impl OutputFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// 縮圖數量：直接指定，或由網格（欄 x 列）推算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCount {
    Thumbnails(u32),
    Tiles { columns: u32, rows: u32 },
}

impl SampleCount {
    /// 需要擷取的縮圖數量 N
    ///
    /// 網格模式會加上 [`HIDDEN_LEADING_FRAMES`]，讓可見網格剛好填滿。
    /// 經 [`parse_tile`](Self::parse_tile) 建立的網格不會溢位
    #[must_use]
    pub const fn thumbnail_count(self) -> u32 {
        match self {
            Self::Thumbnails(count) => count,
            Self::Tiles { columns, rows } => columns
                .saturating_mul(rows)
                .saturating_add(HIDDEN_LEADING_FRAMES),
        }
    }

    #[must_use]
    pub const fn tiles(self) -> Option<(u32, u32)> {
        match self {
            Self::Thumbnails(_) => None,
            Self::Tiles { columns, rows } => Some((columns, rows)),
        }
    }

    /// 解析 `欄x列` 格式，例如 `5x4`
    pub fn parse_tile(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidTile(raw.to_string());
        let (columns, rows) = raw
            .trim()
            .to_lowercase()
            .split_once('x')
            .map(|(c, r)| (c.trim().parse::<u32>(), r.trim().parse::<u32>()))
            .ok_or_else(invalid)?;
        match (columns, rows) {
            (Ok(columns), Ok(rows))
                if columns > 0
                    && rows > 0
                    && columns
                        .checked_mul(rows)
                        .and_then(|tiles| tiles.checked_add(HIDDEN_LEADING_FRAMES))
                        .is_some() =>
            {
                Ok(Self::Tiles { columns, rows })
            }
            _ => Err(invalid()),
        }
    }
}

/// 使用者設定（可存於 settings.json）
///
/// 所有欄位皆可省略；驗證在轉換成 [`MontageConfig`] 時進行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MontageSettings {
    pub background_color: String,
    pub label_color: String,
    pub output_format: String,
    pub output_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub recursive: bool,
    pub start_seconds: u64,
    pub thumbnail_count: Option<u32>,
    pub tile: Option<String>,
    pub thumbnail_width: Option<u32>,
    pub target_resolution: Option<String>,
    pub include_timestamps: bool,
    pub extra_extraction_args: Vec<String>,
    pub extra_composite_args: Vec<String>,
    pub temp_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub stall_timeout_secs: u64,
}

impl Default for MontageSettings {
    fn default() -> Self {
        Self {
            background_color: "black".to_string(),
            label_color: "white".to_string(),
            output_format: "jpg".to_string(),
            output_dir: None,
            overwrite: false,
            recursive: false,
            start_seconds: DEFAULT_START_SECONDS,
            thumbnail_count: None,
            tile: None,
            thumbnail_width: Some(DEFAULT_THUMBNAIL_WIDTH),
            target_resolution: None,
            include_timestamps: false,
            extra_extraction_args: Vec::new(),
            extra_composite_args: Vec::new(),
            temp_dir: None,
            workers: None,
            stall_timeout_secs: DEFAULT_STALL_TIMEOUT_SECS,
        }
    }
}

/// 驗證過的預覽圖設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MontageConfig {
    pub background_color: String,
    pub label_color: String,
    pub output_format: OutputFormat,
    pub output_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub recursive: bool,
    pub start_seconds: u64,
    pub sample_count: SampleCount,
    pub thumbnail_width: Option<u32>,
    pub target_resolution: Option<String>,
    pub include_timestamps: bool,
    pub extra_extraction_args: Vec<String>,
    pub extra_composite_args: Vec<String>,
    pub temp_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub stall_timeout_secs: u64,
}

impl Default for MontageConfig {
    fn default() -> Self {
        Self {
            background_color: "black".to_string(),
            label_color: "white".to_string(),
            output_format: OutputFormat::Jpg,
            output_dir: None,
            overwrite: false,
            recursive: false,
            start_seconds: DEFAULT_START_SECONDS,
            sample_count: SampleCount::Thumbnails(DEFAULT_THUMBNAIL_COUNT),
            thumbnail_width: Some(DEFAULT_THUMBNAIL_WIDTH),
            target_resolution: None,
            include_timestamps: false,
            extra_extraction_args: Vec::new(),
            extra_composite_args: Vec::new(),
            temp_dir: None,
            workers: None,
            stall_timeout_secs: DEFAULT_STALL_TIMEOUT_SECS,
        }
    }
}

impl TryFrom<MontageSettings> for MontageConfig {
    type Error = ConfigError;

    fn try_from(settings: MontageSettings) -> Result<Self, Self::Error> {
        let sample_count = match (settings.thumbnail_count, settings.tile.as_deref()) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSampleCount),
            (Some(0), None) => return Err(ConfigError::ZeroThumbnails),
            (Some(count), None) => SampleCount::Thumbnails(count),
            (None, Some(tile)) => SampleCount::parse_tile(tile)?,
            (None, None) => SampleCount::Thumbnails(DEFAULT_THUMBNAIL_COUNT),
        };

        if settings.stall_timeout_secs == 0 {
            return Err(ConfigError::ZeroStallTimeout);
        }

        Ok(Self {
            output_format: settings.output_format.parse()?,
            background_color: settings.background_color,
            label_color: settings.label_color,
            output_dir: settings.output_dir,
            overwrite: settings.overwrite,
            recursive: settings.recursive,
            start_seconds: settings.start_seconds,
            sample_count,
            thumbnail_width: settings.thumbnail_width.filter(|w| *w > 0),
            target_resolution: settings
                .target_resolution
                .filter(|r| !r.trim().is_empty()),
            include_timestamps: settings.include_timestamps,
            extra_extraction_args: settings.extra_extraction_args,
            extra_composite_args: settings.extra_composite_args,
            temp_dir: settings.temp_dir,
            workers: settings.workers.filter(|w| *w > 0),
            stall_timeout_secs: settings.stall_timeout_secs,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub file_type_table: FileTypeTable,
    pub settings: MontageSettings,
}
