//! 測試用的外部工具替身
//!
//! 以 shell script 模擬 ffprobe、ffmpeg、montage 與 convert，
//! 每次呼叫都會記錄到同一個 log 檔

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use video_montage::tools::ExternalTools;

pub const TEN_MINUTE_PROBE: &str = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'movie.mp4':\n  Duration: 00:10:00.00, start: 0.000000, bitrate: 1205 kb/s\n    Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 640x360 [SAR 1:1 DAR 16:9], 1072 kb/s, 25 fps, 25 tbr, 12800 tbn (default)\n";

const FFPROBE: &str = r#"#!/bin/sh
echo "ffprobe $*" >> "@LOG@"
name=$(basename "$2")
if [ -f "@DIR@/probe_$name.txt" ]; then
  cat "@DIR@/probe_$name.txt" >&2
else
  cat "@DIR@/probe.txt" >&2
fi
"#;

/// 依 -vframes 寫出影格並回報 frame=N
///
/// `fail_after`：寫出幾張後以非零狀態結束；`skip_file`：回報但不寫出的編號
const FFMPEG: &str = r#"#!/bin/sh
echo "ffmpeg $*" >> "@LOG@"
if [ @STALL@ -eq 1 ]; then
  exec sleep 30
fi
n=0
prev=""
pattern=""
for a in "$@"; do
  if [ "$prev" = "-vframes" ]; then n=$a; fi
  prev=$a
  pattern=$a
done
fail_after=@FAIL_AFTER@
skip_file=@SKIP_FILE@
i=1
while [ "$i" -le "$n" ]; do
  if [ "$fail_after" -gt 0 ] && [ "$i" -gt "$fail_after" ]; then
    echo "Error while decoding stream" >&2
    exit 1
  fi
  if [ "$i" -ne "$skip_file" ]; then
    f=$(printf "$pattern" "$i")
    echo "frame $i" > "$f"
  fi
  printf 'frame=%5d fps=0.0 q=2.0 size=N/A time=00:00:00.00\r' "$i" >&2
  i=$((i + 1))
done
echo "" >&2
exit 0
"#;

const MONTAGE: &str = r#"#!/bin/sh
echo "montage $*" >> "@LOG@"
for a in "$@"; do out=$a; done
echo "montage" > "$out"
"#;

/// 參數含有 `convert_fail.txt` 內的字串時，寫出輸出後以非零狀態結束
const CONVERT: &str = r#"#!/bin/sh
echo "convert $*" >> "@LOG@"
for a in "$@"; do out=$a; done
if [ "$1" != "$out" ]; then
  cp "$1" "$out"
fi
if [ -f "@DIR@/convert_fail.txt" ]; then
  needle=$(cat "@DIR@/convert_fail.txt")
  case "$*" in
    *"$needle"*)
      echo "convert: unable to process image" >&2
      exit 1
      ;;
  esac
fi
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBehavior {
    pub fail_after: u32,
    pub skip_file: u32,
    /// 啟動後不輸出任何東西
    pub stall: bool,
}

pub struct FakeTools {
    pub dir: PathBuf,
    pub log: PathBuf,
}

impl FakeTools {
    pub fn install(dir: &Path, behavior: FfmpegBehavior) -> Self {
        let dir = dir.to_path_buf();
        let log = dir.join("invocations.log");
        fs::write(&log, "").unwrap();
        fs::write(dir.join("probe.txt"), TEN_MINUTE_PROBE).unwrap();

        let fill = |template: &str| {
            template
                .replace("@LOG@", &log.to_string_lossy())
                .replace("@DIR@", &dir.to_string_lossy())
                .replace("@FAIL_AFTER@", &behavior.fail_after.to_string())
                .replace("@SKIP_FILE@", &behavior.skip_file.to_string())
                .replace("@STALL@", if behavior.stall { "1" } else { "0" })
        };

        for (name, template) in [
            ("ffprobe", FFPROBE),
            ("ffmpeg", FFMPEG),
            ("montage", MONTAGE),
            ("convert", CONVERT),
        ] {
            let path = dir.join(name);
            fs::write(&path, fill(template)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        Self { dir, log }
    }

    /// 指定某支影片的 ffprobe 輸出
    pub fn set_probe_output(&self, video_name: &str, text: &str) {
        fs::write(self.dir.join(format!("probe_{video_name}.txt")), text).unwrap();
    }

    /// 讓參數含有 `needle` 的 convert 呼叫失敗
    pub fn fail_convert_when(&self, needle: &str) {
        fs::write(self.dir.join("convert_fail.txt"), needle).unwrap();
    }

    pub fn tools(&self) -> ExternalTools {
        ExternalTools::new(
            self.dir.join("ffmpeg"),
            self.dir.join("ffprobe"),
            self.dir.join("montage"),
            self.dir.join("convert"),
        )
    }

    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn invocations_of(&self, tool: &str) -> Vec<String> {
        let prefix = format!("{tool} ");
        self.invocations()
            .into_iter()
            .filter(|line| line.starts_with(&prefix))
            .collect()
    }
}

/// 一行呼叫紀錄中 `<prefix>_NNN.<ext>` 形式的影格參數數量
pub fn count_frame_args(line: &str) -> usize {
    line.split_whitespace()
        .filter(|arg| {
            arg.rsplit_once('_').is_some_and(|(_, tail)| {
                tail.len() == 7
                    && tail.as_bytes()[..3].iter().all(u8::is_ascii_digit)
                    && tail.ends_with(".jpg")
            })
        })
        .count()
}

pub fn write_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "not really a video").unwrap();
    path
}
