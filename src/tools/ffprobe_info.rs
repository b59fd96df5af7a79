use crate::error::{MontageError, Result};
use crate::tools::{ExternalTools, format_hms};
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// ffprobe 診斷輸出的格式：
/// `Duration: HH:MM:SS.cc, ... Video: <codec>, ..., <W>x<H> ... <fps> tbr,`
static PROBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)Duration:\s+(?P<hours>\d{2,}):(?P<minutes>\d{2}):(?P<seconds>\d{2})\.(?P<centis>\d{2}),.*?Video:\s+(?P<codec>[^,]+),.*?\b(?P<width>\d{2,5})x(?P<height>\d{2,5})\b.*?(?P<fps>\d+(?:\.\d+)?)\s+tbr,",
    )
    .expect("Invalid ffprobe pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub path: PathBuf,
    /// 檔案名稱（含副檔名）
    pub display_name: String,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub duration: Duration,
    pub frame_rate: f64,
}

impl VideoMetadata {
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    #[must_use]
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// 預覽圖標頭文字
    #[must_use]
    pub fn header_label(&self) -> String {
        format!(
            "File: {} | Codec: {} | Resolution: {} | Length: {} | FPS: {}",
            self.display_name,
            self.codec,
            self.resolution(),
            format_hms(self.duration),
            self.frame_rate
        )
    }
}

/// 使用 ffprobe 取得影片資訊
///
/// ffprobe 的 stdout 與 stderr 會合併後解析；程序一律在回傳前回收
pub fn probe_video(tools: &ExternalTools, path: &Path) -> Result<VideoMetadata> {
    let output = tools
        .ffprobe()
        .arg("-hide_banner")
        .arg(path)
        .output()
        .map_err(|e| MontageError::InvalidVideo {
            path: path.to_path_buf(),
            reason: format!("無法執行 ffprobe: {e}"),
        })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        debug!("ffprobe 結束狀態 {} ({})", output.status, path.display());
    }

    parse_probe_output(path, &text)
}

/// 解析 ffprobe 診斷輸出，只採用第一個符合的區段
pub fn parse_probe_output(path: &Path, text: &str) -> Result<VideoMetadata> {
    let invalid = |reason: &str| MontageError::InvalidVideo {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let caps = PROBE_RE
        .captures(text)
        .ok_or_else(|| invalid("ffprobe 輸出中找不到 Duration/Video 資訊"))?;

    let number = |name: &str| -> Result<u64> {
        caps[name]
            .parse::<u64>()
            .map_err(|_| invalid(&format!("無法解析欄位 {name}")))
    };

    let hours = number("hours")?;
    let minutes = number("minutes")?;
    let seconds = number("seconds")?;
    let centis = number("centis")?;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid("影片長度格式錯誤"));
    }

    let width = u32::try_from(number("width")?).map_err(|_| invalid("寬度超出範圍"))?;
    let height = u32::try_from(number("height")?).map_err(|_| invalid("高度超出範圍"))?;
    let frame_rate: f64 = caps["fps"]
        .parse()
        .map_err(|_| invalid("無法解析幀率"))?;

    let duration = Duration::from_secs(hours * 3600 + minutes * 60 + seconds)
        + Duration::from_millis(centis * 10);

    let display_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string());

    let metadata = VideoMetadata {
        path: path.to_path_buf(),
        display_name,
        width,
        height,
        codec: caps["codec"].trim().to_string(),
        duration,
        frame_rate,
    };

    debug!(
        "影片資訊 {}: {}, {}, {:.2}s, {} fps",
        metadata.display_name,
        metadata.codec,
        metadata.resolution(),
        metadata.duration_seconds(),
        metadata.frame_rate
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN_OUTPUT: &str = r"Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'movie.mp4':
  Metadata:
    major_brand     : isom
  Duration: 00:10:00.04, start: 0.000000, bitrate: 3173 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p(tv, bt709, progressive), 1920x1080 [SAR 1:1 DAR 16:9], 3024 kb/s, 29.97 fps, 29.97 tbr, 30k tbn (default)
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s (default)
";

    const LEGACY_OUTPUT: &str = r"Input #0, avi, from 'old.avi':
  Duration: 01:02:03.50, start: 0.000000, bitrate: 1200 kb/s
    Stream #0:0: Video: mpeg4 (Simple Profile) (XVID / 0x44495658), yuv420p, 640x480 [SAR 1:1 DAR 4:3], 25 tbr, 25 tbn, 25 tbc
";

    #[test]
    fn test_parse_modern_output() {
        let metadata = parse_probe_output(Path::new("/videos/movie.mp4"), MODERN_OUTPUT).unwrap();

        assert_eq!(metadata.display_name, "movie.mp4");
        assert_eq!(metadata.codec, "h264 (High) (avc1 / 0x31637661)");
        assert_eq!((metadata.width, metadata.height), (1920, 1080));
        assert_eq!(metadata.duration, Duration::from_millis(600_040));
        assert!((metadata.frame_rate - 29.97).abs() < 1e-9);
    }

    #[test]
    fn test_parse_legacy_output() {
        let metadata = parse_probe_output(Path::new("old.avi"), LEGACY_OUTPUT).unwrap();

        assert_eq!(metadata.codec, "mpeg4 (Simple Profile) (XVID / 0x44495658)");
        assert_eq!(metadata.resolution(), "640x480");
        assert_eq!(metadata.duration.as_secs(), 3723);
        assert!((metadata.frame_rate - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_video_stream_wins() {
        let text = format!(
            "{MODERN_OUTPUT}  Stream #0:2: Video: mjpeg, yuvj420p, 320x240, 90k tbr, 90k tbn\n"
        );
        let metadata = parse_probe_output(Path::new("movie.mp4"), &text).unwrap();
        assert_eq!(metadata.width, 1920);
    }

    #[test]
    fn test_unrecognised_output_is_invalid_video() {
        let samples = [
            "",
            "movie.mp4: Invalid data found when processing input",
            "  Duration: N/A, bitrate: N/A\n  Stream #0:0: Audio: mp3, 44100 Hz, stereo, 128 kb/s",
            "  Duration: 00:03:00.00, start: 0.0\n  Stream #0:0: Audio: aac, 48000 Hz, stereo",
        ];
        for text in samples {
            match parse_probe_output(Path::new("movie.mp4"), text) {
                Err(MontageError::InvalidVideo { path, .. }) => {
                    assert_eq!(path, PathBuf::from("movie.mp4"));
                }
                other => panic!("unexpected result for {text:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_header_label() {
        let metadata = parse_probe_output(Path::new("/videos/movie.mp4"), MODERN_OUTPUT).unwrap();
        assert_eq!(
            metadata.header_label(),
            "File: movie.mp4 | Codec: h264 (High) (avc1 / 0x31637661) | Resolution: 1920x1080 | Length: 00:10:00 | FPS: 29.97"
        );
    }
}
