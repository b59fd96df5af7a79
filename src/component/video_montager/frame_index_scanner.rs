//! 擷取進度的串流解析
//!
//! ffmpeg 在 stderr 以 `frame=   12 fps=...` 回報進度。輸出以固定大小的區塊讀入，
//! 掃描器逐位元組推進狀態，跨區塊的片段只保留目前的比對狀態，
//! 已處理過的位元組不會再掃描。
//!
//! 只在串流開頭或 `\r`、`\n` 之後比對 `frame=`，
//! 避免 `Input #0 ... from '<路徑>'` 中的檔名被誤認為進度。

const PATTERN: &[u8] = b"frame=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// 行中間，等待下一個行首
    MidLine,
    /// 行首起已比對 `PATTERN` 的前 n 個位元組
    Prefix(usize),
    /// `frame=` 之後的空白
    Spaces,
    /// 讀取中的數字
    Digits(u64),
}

#[derive(Debug)]
pub struct FrameIndexScanner {
    state: ScanState,
}

impl Default for FrameIndexScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameIndexScanner {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ScanState::Prefix(0),
        }
    }

    /// 輸入一個區塊，回傳區塊內完成的影格編號
    ///
    /// 區塊結尾仍在讀取的數字會保留到下一個區塊或 [`finish`](Self::finish)
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u64> {
        let mut indices = Vec::new();
        for &byte in chunk {
            if let Some(index) = self.step(byte) {
                indices.push(index);
            }
        }
        indices
    }

    /// 串流結束時取出尚未結束的數字
    pub fn finish(&mut self) -> Option<u64> {
        let state = std::mem::replace(&mut self.state, ScanState::Prefix(0));
        match state {
            ScanState::Digits(value) => Some(value),
            _ => None,
        }
    }

    fn step(&mut self, byte: u8) -> Option<u64> {
        match self.state {
            ScanState::Prefix(matched) => {
                self.state = if byte == PATTERN[matched] {
                    if matched + 1 == PATTERN.len() {
                        ScanState::Spaces
                    } else {
                        ScanState::Prefix(matched + 1)
                    }
                } else {
                    Self::restart(byte)
                };
                None
            }
            ScanState::MidLine => {
                self.state = Self::restart(byte);
                None
            }
            ScanState::Spaces => {
                self.state = if byte == b' ' || byte == b'\t' {
                    ScanState::Spaces
                } else if byte.is_ascii_digit() {
                    ScanState::Digits(u64::from(byte - b'0'))
                } else {
                    Self::restart(byte)
                };
                None
            }
            ScanState::Digits(value) => {
                if byte.is_ascii_digit() {
                    self.state = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(u64::from(byte - b'0')))
                        .map_or(ScanState::MidLine, ScanState::Digits);
                    None
                } else {
                    self.state = Self::restart(byte);
                    Some(value)
                }
            }
        }
    }

    const fn restart(byte: u8) -> ScanState {
        if byte == b'\r' || byte == b'\n' {
            ScanState::Prefix(0)
        } else {
            ScanState::MidLine
        }
    }
}
