pub mod load;
pub mod save;
pub mod types;

pub use types::{
    Config, DEFAULT_START_SECONDS, DEFAULT_STALL_TIMEOUT_SECS, DEFAULT_THUMBNAIL_COUNT,
    DEFAULT_THUMBNAIL_WIDTH, FileTypeTable, HIDDEN_LEADING_FRAMES, MontageConfig,
    MontageSettings, OutputFormat, SampleCount,
};
