//! 直通型双工锚点。
//!
//! # 教案式说明
//! - **意图（Why）**：组合器始终写入 `input`、始终从 `output` 读取；无论链路怎样重新拼接，
//!   这两个锚点都不变，外部读写因此与拼接过程解耦。
//! - **逻辑（How）**：Bridge 是直通的，写入的数据立即进入可读缓冲；写侧描述只用于校验数据形态，
//!   读侧描述决定缓冲水位。
//! - **契约（What）**：两侧描述由 [`ModeAdapter`](crate::mode::ModeAdapter) 一并设置，
//!   Bridge 生命周期完全归组合器所有。

use std::borrow::Cow;

use crate::{
    error::{Result, RoundaboutError},
    half_stream::{HalfStream, Pull, Rejected},
    mode::ModeDescriptor,
    payload::Payload,
};

#[derive(Debug)]
pub(crate) struct Bridge {
    name: &'static str,
    writable: ModeDescriptor,
    buffer: HalfStream,
}

impl Bridge {
    pub(crate) fn new(name: &'static str, mode: ModeDescriptor) -> Self {
        Self {
            name,
            writable: mode,
            buffer: HalfStream::new(mode),
        }
    }

    pub(crate) fn writable_mode(&self) -> ModeDescriptor {
        self.writable
    }

    pub(crate) fn readable_mode(&self) -> ModeDescriptor {
        self.buffer.mode()
    }

    pub(crate) fn set_modes(&mut self, mode: ModeDescriptor) {
        self.writable = mode;
        self.buffer.set_mode(mode);
    }

    /// 校验 `payload` 能否被接收，不改变任何状态。
    pub(crate) fn check(&self, payload: &Payload) -> Result<()> {
        if !self.writable.object_mode() && payload.is_object() {
            return Err(rejected(self.name, Rejected::Mode {
                expected: "bytes",
                received: payload.kind(),
            }));
        }
        self.buffer
            .check(payload)
            .map_err(|reason| rejected(self.name, reason))
    }

    pub(crate) fn offer(&mut self, payload: Payload) -> Result<bool> {
        self.check(&payload)?;
        self.buffer
            .push(payload)
            .map_err(|reason| rejected(self.name, reason))
    }

    pub(crate) fn requeue(&mut self, payload: Payload) {
        self.buffer.requeue(payload);
    }

    pub(crate) fn pull(&mut self) -> Pull {
        self.buffer.pull()
    }

    pub(crate) fn pull_coalesced(&mut self) -> Pull {
        self.buffer.pull_coalesced()
    }

    pub(crate) fn end(&mut self) -> bool {
        self.buffer.end()
    }

    pub(crate) fn can_accept(&self) -> bool {
        self.buffer.can_accept()
    }

    pub(crate) fn has_data(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.buffer.is_exhausted()
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// 将缓冲层的拒绝原因映射为带端点名称的错误。
pub(crate) fn rejected(endpoint: impl Into<Cow<'static, str>>, reason: Rejected) -> RoundaboutError {
    match reason {
        Rejected::Ended => RoundaboutError::WriteAfterEnd,
        Rejected::Mode { expected, received } => RoundaboutError::InvalidChunk {
            endpoint: endpoint.into(),
            expected,
            received,
        },
    }
}
