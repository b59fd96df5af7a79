mod external_tools;
mod ffprobe_info;
mod path_validator;
mod process_runner;
mod temp_workspace;
mod time_format;
mod video_scanner;

pub use external_tools::{ExternalTools, REQUIRED_TOOLS};
pub use ffprobe_info::{VideoMetadata, parse_probe_output, probe_video};
pub use path_validator::{ensure_directory_exists, validate_directory_exists};
pub use process_runner::{
    CompletedCommand, OUTPUT_TAIL_CAPACITY, OutputTail, RunError, run_to_completion, terminate,
};
pub use temp_workspace::TempWorkspace;
pub use time_format::format_hms;
pub use video_scanner::scan_video_files;
