use env_logger::{Builder, Env};

/// 初始化日誌
///
/// 預設等級為 `info`，`verbose` 時為 `debug`；有設定 `RUST_LOG` 時以它為準
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format_timestamp_secs();

    if builder.try_init().is_err() {
        log::debug!("日誌已初始化");
    }
}
