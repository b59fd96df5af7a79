use super::frame_index_scanner::FrameIndexScanner;
use super::observer::PipelineObserver;
use super::sampling_scheduler::SamplingPlan;
use crate::config::OutputFormat;
use crate::error::{MontageError, Result};
use crate::tools::{ExternalTools, OutputTail, VideoMetadata, terminate};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// stderr 每次讀取的區塊大小
const READ_CHUNK_SIZE: usize = 256;

/// 等待輸出時的輪詢週期，用於檢查中斷信號與程序狀態
const POLL_INTERVAL: Duration = Duration::from_millis(200);

const DIAGNOSTIC_TAIL_CAPACITY: usize = 2 * 1024;

/// 已寫入磁碟的影格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFrame {
    pub path: PathBuf,
    pub timestamp: Duration,
    /// 擷取工具的影格編號（從 1 開始）
    pub index: u64,
}

/// 一支影片擷取出的影格
///
/// 離開作用域時刪除所有影格檔案（含被丟棄的重複影格）
#[derive(Debug)]
pub struct ExtractedFrames {
    frames: Vec<ExtractedFrame>,
    discarded: Vec<PathBuf>,
}

impl ExtractedFrames {
    #[must_use]
    pub fn frames(&self) -> &[ExtractedFrame] {
        &self.frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Drop for ExtractedFrames {
    fn drop(&mut self) {
        let paths = self
            .frames
            .iter()
            .map(|frame| &frame.path)
            .chain(self.discarded.iter());
        for path in paths {
            if path.exists()
                && let Err(e) = fs::remove_file(path)
            {
                warn!("無法刪除影格 {}: {}", path.display(), e);
            }
        }
    }
}

pub struct ExtractionOptions<'a> {
    pub format: OutputFormat,
    pub extra_args: &'a [String],
    /// 擷取程序無任何輸出超過此時間即視為卡住
    pub stall_timeout: Duration,
}

/// 第 `index` 張影格的檔案路徑：`<prefix>_NNN.<ext>`
#[must_use]
pub fn frame_path(prefix: &Path, index: u64, format: OutputFormat) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{index:03}.{}", format.extension()));
    PathBuf::from(name)
}

fn output_pattern(prefix: &Path, format: OutputFormat) -> OsString {
    let mut pattern = prefix.as_os_str().to_os_string();
    pattern.push(format!("_%03d.{}", format.extension()));
    pattern
}

/// 依進度回報追蹤影格，去除重複與倒退的編號
struct FrameTracker<'a> {
    plan: &'a SamplingPlan,
    prefix: &'a Path,
    format: OutputFormat,
    last_seen: u64,
    retained: Vec<ExtractedFrame>,
    discarded: Vec<PathBuf>,
}

impl<'a> FrameTracker<'a> {
    fn new(plan: &'a SamplingPlan, prefix: &'a Path, format: OutputFormat) -> Self {
        Self {
            plan,
            prefix,
            format,
            last_seen: 0,
            retained: Vec::with_capacity(plan.thumbnail_count() as usize),
            discarded: Vec::new(),
        }
    }

    /// 處理一個回報的編號，回傳新保留的影格數
    ///
    /// 只有大於目前最大值的編號有效；跳號時中間的影格一併確認
    fn observe(&mut self, index: u64) -> Result<usize> {
        if index <= self.last_seen {
            return Ok(0);
        }

        let upper = index.min(self.plan.frames_to_request());
        let before = self.retained.len();

        for i in (self.last_seen + 1)..=upper {
            let path = frame_path(self.prefix, i, self.format);

            let Some(timestamp) = self.plan.timestamp_for_index(i) else {
                debug!("丟棄開頭的重複影格 #{i}");
                self.discarded.push(path);
                continue;
            };

            if !path.is_file() {
                return Err(MontageError::Extraction(format!(
                    "回報的影格 #{i} 不存在: {}",
                    path.display()
                )));
            }

            self.retained.push(ExtractedFrame {
                path,
                timestamp,
                index: i,
            });
        }

        self.last_seen = index;
        Ok(self.retained.len() - before)
    }
}

/// 依取樣計畫擷取影格
///
/// 失敗時刪除此影片所有已寫入的影格，不回傳任何部分結果
pub fn extract_frames(
    tools: &ExternalTools,
    metadata: &VideoMetadata,
    plan: &SamplingPlan,
    working_prefix: &Path,
    options: &ExtractionOptions<'_>,
    cancel: &AtomicBool,
    observer: &dyn PipelineObserver,
) -> Result<ExtractedFrames> {
    let result = run_extraction(tools, metadata, plan, working_prefix, options, cancel, observer);

    if result.is_err() {
        discard_partial_frames(working_prefix, options.format, plan.frames_to_request());
    }

    result
}

fn run_extraction(
    tools: &ExternalTools,
    metadata: &VideoMetadata,
    plan: &SamplingPlan,
    working_prefix: &Path,
    options: &ExtractionOptions<'_>,
    cancel: &AtomicBool,
    observer: &dyn PipelineObserver,
) -> Result<ExtractedFrames> {
    let mut command = tools.ffmpeg();
    command
        .args(["-nostdin", "-hide_banner", "-y", "-i"])
        .arg(&metadata.path)
        .args([
            "-ss".to_string(),
            plan.start_offset_secs().to_string(),
            "-r".to_string(),
            format!("1/{}", plan.interval_secs()),
            "-vframes".to_string(),
            plan.frames_to_request().to_string(),
            "-bt".to_string(),
            "100000000".to_string(),
        ])
        .args(options.extra_args)
        .arg(output_pattern(working_prefix, options.format))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!("執行擷取: {command:?}");

    if cancel.load(Ordering::SeqCst) {
        return Err(MontageError::Cancelled);
    }

    let mut child = command
        .spawn()
        .map_err(|e| MontageError::Extraction(format!("無法執行 ffmpeg: {e}")))?;

    let Some(stderr) = child.stderr.take() else {
        terminate(&mut child);
        return Err(MontageError::Extraction("無法讀取 ffmpeg 輸出".to_string()));
    };
    let chunks = spawn_chunk_reader(stderr);

    let mut session = ExtractionSession {
        child,
        chunks,
        scanner: FrameIndexScanner::new(),
        tracker: FrameTracker::new(plan, working_prefix, options.format),
        tail: OutputTail::new(DIAGNOSTIC_TAIL_CAPACITY),
        stall_timeout: options.stall_timeout,
        cancel,
        observer,
    };

    let outcome = session.consume_output().and_then(|()| session.wait_for_exit());
    let status = match outcome {
        Ok(status) => status,
        Err(e) => {
            terminate(&mut session.child);
            return Err(e);
        }
    };

    if !status.success() {
        return Err(MontageError::Extraction(format!(
            "ffmpeg {status}: {}",
            session.tail.to_string_lossy()
        )));
    }

    let expected = plan.thumbnail_count() as usize;
    let retained = session.tracker.retained.len();
    if retained != expected {
        return Err(MontageError::Extraction(format!(
            "預期 {expected} 張影格，實際取得 {retained} 張"
        )));
    }

    info!("擷取完成: {} 張影格 ({})", retained, metadata.display_name);

    Ok(ExtractedFrames {
        frames: std::mem::take(&mut session.tracker.retained),
        discarded: std::mem::take(&mut session.tracker.discarded),
    })
}

struct ExtractionSession<'a> {
    child: Child,
    chunks: Receiver<Vec<u8>>,
    scanner: FrameIndexScanner,
    tracker: FrameTracker<'a>,
    tail: OutputTail,
    stall_timeout: Duration,
    cancel: &'a AtomicBool,
    observer: &'a dyn PipelineObserver,
}

impl ExtractionSession<'_> {
    /// 逐區塊讀取 stderr 直到串流關閉
    fn consume_output(&mut self) -> Result<()> {
        let mut last_output = Instant::now();

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(MontageError::Cancelled);
            }

            match self.chunks.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    last_output = Instant::now();
                    self.tail.push(&chunk);
                    for index in self.scanner.feed(&chunk) {
                        self.record(index)?;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if last_output.elapsed() > self.stall_timeout {
                        return Err(MontageError::Extraction(format!(
                            "ffmpeg 超過 {} 秒沒有任何輸出",
                            self.stall_timeout.as_secs()
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(index) = self.scanner.finish() {
            self.record(index)?;
        }

        Ok(())
    }

    fn record(&mut self, index: u64) -> Result<()> {
        if self.tracker.observe(index)? > 0 {
            self.observer.on_frame_progress(
                self.tracker.retained.len() as u64,
                u64::from(self.tracker.plan.thumbnail_count()),
            );
        }
        Ok(())
    }

    /// 輸出關閉後等待程序結束，仍會檢查中斷與逾時
    fn wait_for_exit(&mut self) -> Result<ExitStatus> {
        let started = Instant::now();
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(MontageError::Cancelled);
            }

            match self.child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() > self.stall_timeout => {
                    return Err(MontageError::Extraction(
                        "ffmpeg 關閉輸出後未結束".to_string(),
                    ));
                }
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(e) => {
                    return Err(MontageError::Extraction(format!(
                        "無法取得 ffmpeg 狀態: {e}"
                    )));
                }
            }
        }
    }
}

fn spawn_chunk_reader<R>(mut stream: R) -> Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (sender, receiver) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if sender.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    receiver
}

/// 刪除此影片所有可能已寫入的影格
pub fn discard_partial_frames(prefix: &Path, format: OutputFormat, frames_requested: u64) {
    let mut removed = 0;
    for index in 1..=frames_requested {
        let path = frame_path(prefix, index, format);
        if path.exists() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("無法刪除影格 {}: {}", path.display(), e),
            }
        }
    }
    if removed > 0 {
        debug!("已刪除 {removed} 張未完成的影格");
    }
}
