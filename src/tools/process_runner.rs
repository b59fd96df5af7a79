//! 外部程序執行
//!
//! 所有外部工具呼叫都經過這裡：輪詢結束狀態、收到中斷信號時終止子程序，
//! 並保留輸出的最後一段供錯誤訊息使用。

use log::{debug, warn};
use std::collections::VecDeque;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// 錯誤訊息保留的輸出長度
pub const OUTPUT_TAIL_CAPACITY: usize = 4 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("無法啟動程序: {0}")]
    Spawn(std::io::Error),

    #[error("無法取得程序狀態: {0}")]
    Wait(std::io::Error),

    #[error("操作已取消")]
    Cancelled,
}

/// 固定容量的輸出尾端緩衝，超過容量時丟棄最舊的位元組
#[derive(Debug)]
pub struct OutputTail {
    buffer: VecDeque<u8>,
    capacity: usize,
}

impl OutputTail {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        let bytes = &bytes[bytes.len().saturating_sub(self.capacity)..];
        let overflow = (self.buffer.len() + bytes.len()).saturating_sub(self.capacity);
        self.buffer.drain(..overflow);
        self.buffer.extend(bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        let (front, back) = self.buffer.as_slices();
        let mut bytes = Vec::with_capacity(self.buffer.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// 已結束的程序
#[derive(Debug)]
pub struct CompletedCommand {
    pub status: ExitStatus,
    pub output_tail: String,
}

impl CompletedCommand {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// 失敗描述：結束狀態加上最後的輸出
    #[must_use]
    pub fn describe_failure(&self) -> String {
        if self.output_tail.is_empty() {
            format!("{}", self.status)
        } else {
            format!("{}: {}", self.status, self.output_tail)
        }
    }
}

/// 執行外部命令直到結束
///
/// stdout 與 stderr 皆由背景執行緒讀取，避免管線塞滿造成子程序卡住。
/// `cancel` 被設定時立即終止並回收子程序。
pub fn run_to_completion(
    mut command: Command,
    cancel: &AtomicBool,
) -> Result<CompletedCommand, RunError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("執行命令: {command:?}");

    if cancel.load(Ordering::SeqCst) {
        return Err(RunError::Cancelled);
    }

    let mut child = command.spawn().map_err(RunError::Spawn)?;
    let tail = Arc::new(Mutex::new(OutputTail::new(OUTPUT_TAIL_CAPACITY)));

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_tail_reader(stdout, Arc::clone(&tail)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_tail_reader(stderr, Arc::clone(&tail)));
    }

    let status = loop {
        if cancel.load(Ordering::SeqCst) {
            terminate(&mut child);
            return Err(RunError::Cancelled);
        }

        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                terminate(&mut child);
                return Err(RunError::Wait(e));
            }
        }
    };

    for reader in readers {
        if reader.join().is_err() {
            warn!("輸出讀取執行緒異常結束");
        }
    }

    let output_tail = tail
        .lock()
        .map(|tail| tail.to_string_lossy())
        .unwrap_or_default();

    Ok(CompletedCommand {
        status,
        output_tail,
    })
}

/// 終止並回收子程序
pub fn terminate(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        debug!("終止程序 [{pid}] 失敗（可能已結束）: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("無法回收程序 [{pid}]: {e}");
    }
}

fn spawn_tail_reader<R>(mut stream: R, tail: Arc<Mutex<OutputTail>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut tail) = tail.lock() {
                        tail.push(&buffer[..n]);
                    }
                }
            }
        }
    })
}
