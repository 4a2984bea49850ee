//! 单向缓冲通道原语。
//!
//! # 设计背景（Why）
//! - Bridge 与 Stage 的两侧都需要一段“带水位的 FIFO + 结束标记”，这里抽出公共实现；
//! - 水位只是背压提示：`push` 总会接收数据，是否继续推送由上游依据 [`HalfStream::can_accept`] 决定。
//!
//! # 契约说明（What）
//! - 结束后不可再推送；结束标记在缓冲排空之后才对拉取方可见（[`Pull::Ended`]）；
//! - 修改模式描述时保留已缓冲数据，仅按新模式重新计算水位占用。

use std::collections::VecDeque;

use bytes::Bytes;

use crate::{mode::ModeDescriptor, payload::Payload};

/// 一次拉取的结果。
#[derive(Debug, PartialEq)]
pub(crate) enum Pull {
    /// 取到一个数据单元。
    Data(Payload),
    /// 暂无数据，但尚未结束。
    Empty,
    /// 已结束且缓冲已排空。
    Ended,
}

/// 推送被拒绝的原因，由调用方映射为带端点名称的错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejected {
    Ended,
    Mode {
        expected: &'static str,
        received: &'static str,
    },
}

#[derive(Debug)]
pub(crate) struct HalfStream {
    mode: ModeDescriptor,
    queue: VecDeque<Payload>,
    buffered: usize,
    ended: bool,
}

impl HalfStream {
    pub(crate) fn new(mode: ModeDescriptor) -> Self {
        Self {
            mode,
            queue: VecDeque::new(),
            buffered: 0,
            ended: false,
        }
    }

    pub(crate) fn mode(&self) -> ModeDescriptor {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: ModeDescriptor) {
        self.mode = mode;
        self.buffered = self.queue.iter().map(|item| item.weight(mode)).sum();
    }

    /// 推送一个数据单元，返回值表示推送后是否仍低于水位。
    pub(crate) fn push(&mut self, payload: Payload) -> Result<bool, Rejected> {
        self.check(&payload)?;
        self.buffered += payload.weight(self.mode);
        self.queue.push_back(payload);
        Ok(self.buffered < self.mode.high_water_mark())
    }

    /// 校验推送能否成功：未结束，且数据单元与当前模式匹配。
    pub(crate) fn check(&self, payload: &Payload) -> Result<(), Rejected> {
        if self.ended {
            return Err(Rejected::Ended);
        }
        if !self.mode.object_mode() && payload.is_object() {
            return Err(Rejected::Mode {
                expected: "bytes",
                received: payload.kind(),
            });
        }
        Ok(())
    }

    pub(crate) fn pull(&mut self) -> Pull {
        match self.queue.pop_front() {
            Some(payload) => {
                self.buffered = self.buffered.saturating_sub(payload.weight(self.mode));
                Pull::Data(payload)
            }
            None if self.ended => Pull::Ended,
            None => Pull::Empty,
        }
    }

    /// 把刚拉取却未能交付的单元放回队首，恢复其水位占用。
    pub(crate) fn requeue(&mut self, payload: Payload) {
        self.buffered += payload.weight(self.mode);
        self.queue.push_front(payload);
    }

    /// 字节模式下一次取走全部连续的字节块并合并；遇到对象或对象模式时退化为单个拉取。
    pub(crate) fn pull_coalesced(&mut self) -> Pull {
        if self.mode.object_mode() {
            return self.pull();
        }
        let mut chunks: Vec<Bytes> = Vec::new();
        while let Some(Payload::Bytes(_)) = self.queue.front() {
            if let Some(Payload::Bytes(bytes)) = self.queue.pop_front() {
                self.buffered = self.buffered.saturating_sub(bytes.len());
                chunks.push(bytes);
            }
        }
        if chunks.is_empty() {
            return self.pull();
        }
        Pull::Data(Payload::Bytes(Payload::coalesce(chunks)))
    }

    /// 标记结束，重复调用无副作用；返回本次调用是否真正完成了状态切换。
    pub(crate) fn end(&mut self) -> bool {
        !std::mem::replace(&mut self.ended, true)
    }

    /// 低于水位或为空时可以继续接收；空缓冲总能接收一个单元，保证水位为 0 时仍能前进。
    pub(crate) fn can_accept(&self) -> bool {
        self.queue.is_empty() || self.buffered < self.mode.high_water_mark()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.ended && self.queue.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.buffered = 0;
    }
}
