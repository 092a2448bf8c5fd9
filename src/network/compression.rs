//! 网络帧压缩模块
//!
//! 每个远程调用消息在交给传输层前封装成一帧：
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────┐
//! │ flags: 1 字节 │ body: 消息（或 deflate 压缩后的消息）   │
//! └──────────────┴──────────────────────────────────────┘
//!   bit 0 = body 已压缩
//! ```
//!
//! 只有消息超过阈值并且压缩后确实更小时才压缩，body 内部始终是
//! `codec` 定义的消息格式。

use crate::core::error::{CodecError, NetworkError};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// 帧标志：body 使用 deflate 压缩
pub const FRAME_FLAG_DEFLATE: u8 = 0x01;

const KNOWN_FRAME_FLAGS: u8 = FRAME_FLAG_DEFLATE;

/// 压缩级别
///
/// 平衡压缩率和速度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// 最快速度，最低压缩率
    Fast,
    /// 平衡速度和压缩率（推荐）
    #[default]
    Balanced,
    /// 最高压缩率，较慢速度
    Best,
}

impl CompressionLevel {
    fn to_flate2(self) -> Compression {
        match self {
            CompressionLevel::Fast => Compression::fast(),
            CompressionLevel::Balanced => Compression::default(),
            CompressionLevel::Best => Compression::best(),
        }
    }
}

/// 网络帧压缩器
pub struct NetworkCompressor {
    /// 压缩级别
    level: CompressionLevel,
    /// 最小压缩阈值（小于此大小的消息不压缩）
    threshold: usize,
    /// 是否启用压缩（关闭时仍能解开压缩帧）
    enabled: bool,
}

impl NetworkCompressor {
    /// 创建带阈值的压缩器
    pub fn new(level: CompressionLevel, threshold: usize) -> Self {
        Self {
            level,
            threshold,
            enabled: true,
        }
    }

    /// 只解压、从不压缩的压缩器
    pub fn disabled() -> Self {
        Self {
            level: CompressionLevel::default(),
            threshold: usize::MAX,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 压缩数据，压缩后不更小时返回 `None`
    fn compress(&self, data: &[u8]) -> Result<Option<Vec<u8>>, NetworkError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.level.to_flate2());
        encoder
            .write_all(data)
            .map_err(|e| NetworkError::Compression(format!("compression write failed: {}", e)))?;
        let compressed = encoder
            .finish()
            .map_err(|e| NetworkError::Compression(format!("compression finish failed: {}", e)))?;

        if compressed.len() >= data.len() {
            return Ok(None);
        }
        Ok(Some(compressed))
    }

    /// 解压数据，输出超过 `limit` 字节视为错误
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, NetworkError> {
        let mut decoder = DeflateDecoder::new(data).take(limit as u64 + 1);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| NetworkError::Compression(format!("decompression failed: {}", e)))?;
        if decompressed.len() > limit {
            return Err(NetworkError::MessageTooLarge {
                size: decompressed.len(),
                limit,
            });
        }
        Ok(decompressed)
    }

    /// 把编码后的消息封装成帧
    pub fn seal_frame(&self, message: &[u8]) -> Result<Vec<u8>, NetworkError> {
        if self.enabled && message.len() >= self.threshold {
            if let Some(compressed) = self.compress(message)? {
                let mut frame = Vec::with_capacity(compressed.len() + 1);
                frame.push(FRAME_FLAG_DEFLATE);
                frame.extend_from_slice(&compressed);
                return Ok(frame);
            }
        }

        let mut frame = Vec::with_capacity(message.len() + 1);
        frame.push(0);
        frame.extend_from_slice(message);
        Ok(frame)
    }

    /// 拆开一帧，返回其中的消息字节
    pub fn open_frame(&self, frame: &[u8], limit: usize) -> Result<Vec<u8>, NetworkError> {
        let (&flags, body) = frame.split_first().ok_or(CodecError::Truncated {
            needed: 1,
            remaining: 0,
        })?;
        if flags & !KNOWN_FRAME_FLAGS != 0 {
            return Err(CodecError::UnknownFrameFlags(flags).into());
        }

        if flags & FRAME_FLAG_DEFLATE != 0 {
            self.decompress(body, limit)
        } else {
            Ok(body.to_vec())
        }
    }
}

impl Default for NetworkCompressor {
    fn default() -> Self {
        Self::new(CompressionLevel::Balanced, 512)
    }
}
