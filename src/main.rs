use anyhow::{Context, Result, bail};
use clap::Parser;
use console::{Term, style};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use video_montage::component::VideoMontager;
use video_montage::component::video_montager::{
    BatchSummary, PipelineObserver, PipelineState, VideoOutcome,
};
use video_montage::config::load::SETTINGS_FILE;
use video_montage::config::save::save_settings;
use video_montage::config::{Config, MontageConfig, MontageSettings};
use video_montage::init;
use video_montage::signal::setup_shutdown_signal;
use video_montage::tools::{ExternalTools, validate_directory_exists};

const CLI_AFTER_HELP: &str = "範例:\n  video_montage movie.mp4\n  video_montage ~/Videos --recursive --tile 4x4 --timestamps\n  video_montage a.mkv b.mp4 --output-dir previews --format png --overwrite";

#[derive(Debug, Parser)]
#[command(
    name = "video_montage",
    version,
    about = "為影片產生等間隔縮圖的預覽圖",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// 影片檔案或資料夾
    inputs: Vec<PathBuf>,

    /// 設定檔位置
    #[arg(long, default_value = SETTINGS_FILE)]
    settings: PathBuf,

    /// 將這次的有效設定寫回設定檔
    #[arg(long)]
    save_settings: bool,

    /// 顯示除錯訊息
    #[arg(short, long)]
    verbose: bool,

    /// 預覽圖輸出資料夾（預設為影片所在資料夾）
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// 輸出格式：jpg | png | gif
    #[arg(short, long)]
    format: Option<String>,

    /// 覆寫已存在的預覽圖
    #[arg(long)]
    overwrite: bool,

    /// 包含子資料夾
    #[arg(short, long)]
    recursive: bool,

    /// 跳過片頭的秒數
    #[arg(short, long)]
    start: Option<u64>,

    /// 縮圖數量
    #[arg(short = 'n', long, conflicts_with = "tile")]
    thumbnails: Option<u32>,

    /// 網格大小，例如 5x5
    #[arg(short, long)]
    tile: Option<String>,

    /// 每張縮圖的寬度（0 表示不縮放）
    #[arg(short = 'w', long)]
    thumbnail_width: Option<u32>,

    /// 整張預覽圖的尺寸，例如 1920x1080
    #[arg(long)]
    resolution: Option<String>,

    /// 在縮圖右下角加上時間戳
    #[arg(long)]
    timestamps: bool,

    /// 背景顏色
    #[arg(long)]
    background: Option<String>,

    /// 標頭文字顏色
    #[arg(long)]
    label_color: Option<String>,

    /// 額外傳給 ffmpeg 的參數（可重複）
    #[arg(long = "extract-arg", allow_hyphen_values = true)]
    extract_args: Vec<String>,

    /// 額外傳給 montage 的參數（可重複）
    #[arg(long = "composite-arg", allow_hyphen_values = true)]
    composite_args: Vec<String>,

    /// 暫存目錄的上層資料夾
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// 縮圖處理的執行緒數
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// ffmpeg 沒有輸出多少秒後視為卡住
    #[arg(long)]
    stall_timeout: Option<u64>,
}

impl Cli {
    /// 以命令列參數覆寫設定檔的值
    fn apply_to(&self, settings: &mut MontageSettings) {
        if let Some(dir) = &self.output_dir {
            settings.output_dir = Some(dir.clone());
        }
        if let Some(format) = &self.format {
            settings.output_format.clone_from(format);
        }
        if self.overwrite {
            settings.overwrite = true;
        }
        if self.recursive {
            settings.recursive = true;
        }
        if let Some(start) = self.start {
            settings.start_seconds = start;
        }
        if let Some(count) = self.thumbnails {
            settings.thumbnail_count = Some(count);
            settings.tile = None;
        }
        if let Some(tile) = &self.tile {
            settings.tile = Some(tile.clone());
            settings.thumbnail_count = None;
        }
        if let Some(width) = self.thumbnail_width {
            settings.thumbnail_width = Some(width);
        }
        if let Some(resolution) = &self.resolution {
            settings.target_resolution = Some(resolution.clone());
        }
        if self.timestamps {
            settings.include_timestamps = true;
        }
        if let Some(color) = &self.background {
            settings.background_color.clone_from(color);
        }
        if let Some(color) = &self.label_color {
            settings.label_color.clone_from(color);
        }
        if !self.extract_args.is_empty() {
            settings.extra_extraction_args.clone_from(&self.extract_args);
        }
        if !self.composite_args.is_empty() {
            settings.extra_composite_args.clone_from(&self.composite_args);
        }
        if let Some(dir) = &self.temp_dir {
            settings.temp_dir = Some(dir.clone());
        }
        if let Some(workers) = self.workers {
            settings.workers = Some(workers);
        }
        if let Some(secs) = self.stall_timeout {
            settings.stall_timeout_secs = secs;
        }
    }
}

/// 終端機進度顯示
struct ConsoleObserver {
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleObserver {
    const fn new() -> Self {
        Self {
            progress_bar: Mutex::new(None),
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut slot) = self.progress_bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }
}

impl PipelineObserver for ConsoleObserver {
    fn on_video_start(&self, index: usize, total: usize, path: &Path) {
        println!(
            "\n{} [{}/{}] {}",
            style("處理中").cyan(),
            index + 1,
            total,
            style(display_name(path)).bold()
        );
    }

    fn on_state(&self, _path: &Path, state: PipelineState) {
        let message = match state {
            PipelineState::Probed => "讀取影片資訊",
            PipelineState::Annotating => "處理縮圖",
            PipelineState::Assembling => "合成預覽圖",
            _ => return,
        };
        self.finish_bar();
        println!("  {} {}", style("·").dim(), style(message).dim());
    }

    fn on_frame_progress(&self, current: u64, total: u64) {
        let Ok(mut slot) = self.progress_bar.lock() else {
            return;
        };
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .expect("Invalid progress bar template")
                    .progress_chars("#>-"),
            );
            bar.set_message("擷取影格");
            bar
        });
        bar.set_position(current);
    }

    fn on_video_finish(&self, _path: &Path, outcome: &VideoOutcome) {
        self.finish_bar();
        match outcome {
            VideoOutcome::Done(path) => {
                println!("  {} 預覽圖已建立: {}", style("✓").green(), path.display());
            }
            VideoOutcome::Skipped(path) => {
                println!("  {} 預覽圖已存在，跳過: {}", style("⤳").dim(), path.display());
            }
            VideoOutcome::Failed(e) => {
                println!("  {} 處理失敗: {}", style("✗").red(), e);
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().to_string())
}

fn prompt_inputs() -> Result<Vec<PathBuf>> {
    if !Term::stdout().is_term() {
        bail!("未指定任何影片檔案或資料夾");
    }

    let input: String = Input::new()
        .with_prompt("請輸入影片檔案或資料夾路徑")
        .interact_text()?;
    let path = PathBuf::from(input.trim());

    if !path.is_file() {
        validate_directory_exists(&path)?;
    }

    Ok(vec![path])
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("{}", style("=== 預覽圖生成摘要 ===").cyan().bold());
    println!("  總計: {} 個影片", summary.total);
    println!("  成功: {} 個", style(summary.successful).green());

    if summary.skipped > 0 {
        println!("  跳過: {} 個", style(summary.skipped).yellow());
    }

    if summary.failed > 0 {
        println!("  失敗: {} 個", style(summary.failed).red());
    }

    if summary.cancelled {
        println!("  {}", style("已中斷").yellow().bold());
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let mut config = Config::from_settings_path(&cli.settings)?;
    cli.apply_to(&mut config.settings);

    let montage_config =
        MontageConfig::try_from(config.settings.clone()).context("設定值無效")?;

    if cli.save_settings {
        save_settings(&config.settings, &cli.settings)?;
        info!("設定已儲存至 {}", cli.settings.display());
    }

    let tools = ExternalTools::locate()?;
    let shutdown_signal = setup_shutdown_signal()?;

    let inputs = if cli.inputs.is_empty() {
        prompt_inputs()?
    } else {
        cli.inputs.clone()
    };

    println!("{}", style("=== 影片預覽圖生成 ===").cyan().bold());

    let montager = VideoMontager::new(
        montage_config,
        config.file_type_table,
        tools,
        shutdown_signal,
    )
    .with_observer(Box::new(ConsoleObserver::new()));

    let summary = montager.run(&inputs)?;
    print_summary(&summary);

    Ok(summary.exit_code())
}

fn main() {
    let cli = Cli::parse();
    init::init(cli.verbose);

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{} {:#}", style("錯誤:").red().bold(), e);
            1
        }
    };

    std::process::exit(code);
}
