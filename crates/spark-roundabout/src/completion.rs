//! 结束信号传播状态机。
//!
//! # 设计背景（Why）
//! - 写端结束与最后一个数据块被 `input` 吸收之间存在两种先后顺序，读端结束与最后一次读取之间也存在竞争；
//!   若交给零散的回调去判断，极易出现“结束信号发了两次”或“永远不发”；
//! - 这里把两个方向各自建模为小型状态机，“恰好一次”由状态迁移本身保证，而不是依赖调用点的防御判断。
//!
//! # 契约说明（What）
//! - 写方向：`Open → WriterEnded → InputDrained`，进入 `InputDrained` 的那一次迁移负责向 `input` 发送结束；
//! - 读方向：`Open → OutputEnded`，迁移时置位 `finished` 并唤醒等待中的读者；
//! - 两个状态机都只前进、不回退。

use tracing::debug;

/// 写方向的完成状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteCompletion {
    /// 写端仍在写入。
    #[default]
    Open,
    /// 写端已宣告结束，仍有数据未被 `input` 吸收。
    WriterEnded,
    /// 全部数据已被吸收，且 `input` 已收到结束信号。
    InputDrained,
}

impl WriteCompletion {
    pub fn is_open(self) -> bool {
        self == WriteCompletion::Open
    }

    pub fn is_drained(self) -> bool {
        self == WriteCompletion::InputDrained
    }

    /// 记录写端结束；重复调用保持原状态。
    pub(crate) fn on_writer_end(&mut self) {
        if *self == WriteCompletion::Open {
            debug!("writer ended");
            *self = WriteCompletion::WriterEnded;
        }
    }

    /// 排空检查：写端已结束且没有待吸收的数据时迁移到 `InputDrained`。
    ///
    /// 返回 `true` 表示调用方必须立即向 `input` 发送结束信号；该值在状态机生命周期内至多出现一次。
    /// 写端结束与每个数据块被吸收后都应调用本方法。
    pub(crate) fn try_drain(&mut self, pending_writes: usize) -> bool {
        if *self == WriteCompletion::WriterEnded && pending_writes == 0 {
            debug!("write queue drained, end input");
            *self = WriteCompletion::InputDrained;
            return true;
        }
        false
    }
}

/// 读方向的完成状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadCompletion {
    #[default]
    Open,
    /// `output` 已结束且缓冲已排空。
    OutputEnded,
}

impl ReadCompletion {
    /// 对应组合器的 `finished` 标志。
    pub fn is_finished(self) -> bool {
        self == ReadCompletion::OutputEnded
    }

    /// 观察 `output` 是否已耗尽；首次观察到时迁移并返回 `true`，调用方据此唤醒读者。
    pub(crate) fn observe(&mut self, output_exhausted: bool) -> bool {
        if *self == ReadCompletion::Open && output_exhausted {
            debug!("output ended, finished");
            *self = ReadCompletion::OutputEnded;
            return true;
        }
        false
    }
}
