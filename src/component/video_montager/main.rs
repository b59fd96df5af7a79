use super::frame_extractor::{ExtractionOptions, extract_frames};
use super::montage_assembler::{MontageStyle, assemble_montage};
use super::observer::{NoopObserver, PipelineObserver, PipelineState, VideoOutcome};
use super::sampling_scheduler::plan_sampling;
use super::thumbnail_annotator::{PostProcessOptions, post_process_frames};
use crate::config::{FileTypeTable, MontageConfig};
use crate::error::{MontageError, Result as MontageResult};
use crate::tools::{
    ExternalTools, TempWorkspace, ensure_directory_exists, probe_video, scan_video_files,
};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 中斷時的結束代碼（128 + SIGINT）
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// 批次處理結果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    fn record(&mut self, outcome: &VideoOutcome) {
        match outcome {
            VideoOutcome::Done(_) => self.successful += 1,
            VideoOutcome::Skipped(_) => self.skipped += 1,
            VideoOutcome::Failed(MontageError::Cancelled) => self.cancelled = true,
            VideoOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// 0：全部成功或跳過，1：有影片失敗，130：被中斷
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_CODE_CANCELLED
        } else if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

/// 影片預覽圖產生器
///
/// 影片逐一處理：
/// 1. 檢查輸出是否已存在（跳過或刪除舊檔）
/// 2. ffprobe 取得影片資訊
/// 3. 計算取樣間隔
/// 4. ffmpeg 擷取影格
/// 5. 縮放影格並加上時間戳
/// 6. 合成預覽圖
///
/// 單支影片失敗不影響其他影片；中斷時停止整個批次
pub struct VideoMontager {
    config: MontageConfig,
    file_type_table: FileTypeTable,
    tools: ExternalTools,
    shutdown_signal: Arc<AtomicBool>,
    observer: Box<dyn PipelineObserver>,
}

impl VideoMontager {
    pub fn new(
        config: MontageConfig,
        file_type_table: FileTypeTable,
        tools: ExternalTools,
        shutdown_signal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            file_type_table,
            tools,
            shutdown_signal,
            observer: Box::new(NoopObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// 處理所有輸入（檔案或資料夾）
    pub fn run(&self, inputs: &[PathBuf]) -> Result<BatchSummary> {
        let videos = scan_video_files(inputs, &self.file_type_table, self.config.recursive)?;

        let mut summary = BatchSummary {
            total: videos.len(),
            ..BatchSummary::default()
        };

        if videos.is_empty() {
            warn!("找不到任何影片檔案");
            return Ok(summary);
        }

        if let Some(output_dir) = &self.config.output_dir {
            ensure_directory_exists(output_dir)
                .with_context(|| format!("無法建立輸出資料夾: {}", output_dir.display()))?;
        }

        let workspace = TempWorkspace::create(self.config.temp_dir.as_deref())
            .context("無法建立暫存目錄")?;

        info!("開始處理 {} 個影片", videos.len());

        for (index, video) in videos.iter().enumerate() {
            if self.shutdown_signal.load(Ordering::SeqCst) {
                warn!("收到中斷訊號，停止處理");
                summary.cancelled = true;
                break;
            }

            self.observer.on_video_start(index, videos.len(), video);
            let outcome = self.process_video(index, video, &workspace);
            summary.record(&outcome);
            let stop = matches!(&outcome, VideoOutcome::Failed(e) if e.is_fatal());

            match &outcome {
                VideoOutcome::Done(path) => info!("完成: {}", path.display()),
                VideoOutcome::Skipped(path) => info!("已存在，跳過: {}", path.display()),
                VideoOutcome::Failed(e) => error!("處理失敗 {}: {e}", video.display()),
            }
            self.observer.on_video_finish(video, &outcome);

            if stop {
                warn!("已中斷，剩餘 {} 個影片未處理", videos.len() - index - 1);
                break;
            }
        }

        info!(
            "批次完成 - 成功: {}, 跳過: {}, 失敗: {}",
            summary.successful, summary.skipped, summary.failed
        );

        Ok(summary)
    }

    /// 處理單一影片
    ///
    /// `index` 用於暫存檔名，避免不同資料夾的同名影片互相覆寫
    pub fn process_video(
        &self,
        index: usize,
        video_path: &Path,
        workspace: &TempWorkspace,
    ) -> VideoOutcome {
        self.set_state(video_path, PipelineState::Pending);

        let output_path = self.output_path_for(video_path);
        if output_path.exists() {
            if !self.config.overwrite {
                self.set_state(video_path, PipelineState::Skipped);
                return VideoOutcome::Skipped(output_path);
            }
            if let Err(e) = fs::remove_file(&output_path) {
                self.set_state(video_path, PipelineState::Error);
                return VideoOutcome::Failed(MontageError::Io(e));
            }
            debug!("已刪除舊的預覽圖: {}", output_path.display());
        }

        let working_prefix = workspace.path().join(working_name(index, video_path));

        match self.render(video_path, &output_path, &working_prefix) {
            Ok(artifact) => {
                self.set_state(video_path, PipelineState::Done);
                VideoOutcome::Done(artifact)
            }
            Err(e) => {
                self.set_state(video_path, PipelineState::Error);
                VideoOutcome::Failed(e)
            }
        }
    }

    /// 預覽圖路徑：`<輸出資料夾或影片所在資料夾>/<影片檔名>.<格式>`
    #[must_use]
    pub fn output_path_for(&self, video_path: &Path) -> PathBuf {
        let directory = self.config.output_dir.as_deref().map_or_else(
            || video_path.parent().unwrap_or(Path::new("")).to_path_buf(),
            Path::to_path_buf,
        );

        let mut name = video_path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".");
        name.push(self.config.output_format.extension());

        directory.join(name)
    }

    fn render(
        &self,
        video_path: &Path,
        output_path: &Path,
        working_prefix: &Path,
    ) -> MontageResult<PathBuf> {
        let cancel = self.shutdown_signal.as_ref();
        let config = &self.config;

        let metadata = probe_video(&self.tools, video_path)?;
        self.set_state(video_path, PipelineState::Probed);

        let plan = plan_sampling(
            &metadata,
            config.start_seconds,
            config.sample_count.thumbnail_count(),
        )?;
        self.set_state(video_path, PipelineState::Scheduled);

        self.set_state(video_path, PipelineState::Extracting);
        let extraction = ExtractionOptions {
            format: config.output_format,
            extra_args: &config.extra_extraction_args,
            stall_timeout: Duration::from_secs(config.stall_timeout_secs),
        };
        let frames = extract_frames(
            &self.tools,
            &metadata,
            &plan,
            working_prefix,
            &extraction,
            cancel,
            self.observer.as_ref(),
        )?;

        self.set_state(video_path, PipelineState::Annotating);
        let post_process = PostProcessOptions {
            include_timestamps: config.include_timestamps,
            thumbnail_width: config.thumbnail_width,
            workers: config.workers,
        };
        post_process_frames(&self.tools, &frames, &post_process, cancel)?;

        self.set_state(video_path, PipelineState::Assembling);
        let style = MontageStyle {
            background_color: &config.background_color,
            label_color: &config.label_color,
            format: config.output_format,
            tiles: config.sample_count.tiles(),
            thumbnail_width: config.thumbnail_width,
            target_resolution: config.target_resolution.as_deref(),
            extra_args: &config.extra_composite_args,
        };
        assemble_montage(
            &self.tools,
            &frames,
            &metadata,
            output_path,
            &style,
            working_prefix,
            cancel,
        )
    }

    fn set_state(&self, video_path: &Path, state: PipelineState) {
        debug!("{} -> {state}", video_path.display());
        self.observer.on_state(video_path, state);
    }
}

/// 暫存檔名前綴；`%` 會被 ffmpeg 的輸出樣板當成格式字元，先換掉
fn working_name(index: usize, video_path: &Path) -> String {
    let file_name = video_path
        .file_name()
        .map_or_else(|| "video".to_string(), |s| s.to_string_lossy().replace('%', "_"));
    format!("{:04}_{file_name}", index + 1)
}
