//! 影片預覽圖元件
//!
//! 每支影片依序經過：
//! A. 取得影片資訊（ffprobe）
//! B. 計算等間隔的取樣時間點
//! C. 單一 ffmpeg 程序擷取影格，逐段解析進度輸出
//! D. 平行縮放影格並加上時間戳
//! E. 合成網格並加上影片資訊標頭

mod frame_extractor;
mod frame_index_scanner;
mod main;
mod montage_assembler;
mod observer;
mod sampling_scheduler;
mod thumbnail_annotator;

pub use frame_extractor::{
    ExtractedFrame, ExtractedFrames, ExtractionOptions, discard_partial_frames, extract_frames,
    frame_path,
};
pub use frame_index_scanner::FrameIndexScanner;
pub use main::{BatchSummary, EXIT_CODE_CANCELLED, VideoMontager};
pub use montage_assembler::{HEADER_HEIGHT, MontageStyle, assemble_montage};
pub use observer::{NoopObserver, PipelineObserver, PipelineState, VideoOutcome};
pub use sampling_scheduler::{
    FIRST_RETAINED_FRAME_INDEX, SamplingPlan, is_known_duplicate, plan_sampling,
};
pub use thumbnail_annotator::{PostProcessOptions, post_process_frames};
