//! 模式描述与模式适配。
//!
//! # 设计背景（Why）
//! - 组合器对外呈现的“写什么、读什么、缓冲多少”是链路端点的属性：第一个 Stage 是第一个消费者，
//!   决定调用方应写入的数据形态；最后一个 Stage 是最后一个生产者，决定调用方读到的数据形态；
//! - 描述符是值对象，只通过 [`ModeAdapter`] 在明确事件（构造、首次挂载、每次挂载）上复制，
//!   任何组件都不直接改写其他组件的描述符。
//!
//! # 契约说明（What）
//! - 写侧：构造时以配置为基线，首次挂载时以首个 Stage 的写侧描述覆盖，之后不再改变；
//! - 读侧：构造时以配置为基线，之后每次挂载都以新 Stage 的读侧描述覆盖；
//! - 中间 Stage 之间的模式兼容性不在此校验，交由 Stage 自身保证。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{bridge::Bridge, half_stream::HalfStream};

/// 字节模式的默认水位（字节数）。
pub const DEFAULT_BYTE_HIGH_WATER_MARK: usize = 16 * 1024;

/// 对象模式的默认水位（对象个数）。
pub const DEFAULT_OBJECT_HIGH_WATER_MARK: usize = 16;

/// 端点一侧的模式描述：是否为对象模式，以及背压水位。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModeDescriptor {
    object_mode: bool,
    high_water_mark: usize,
}

impl ModeDescriptor {
    /// 构造描述符。
    pub const fn new(object_mode: bool, high_water_mark: usize) -> Self {
        Self {
            object_mode,
            high_water_mark,
        }
    }

    /// 使用默认水位的字节模式。
    pub const fn bytes() -> Self {
        Self::new(false, DEFAULT_BYTE_HIGH_WATER_MARK)
    }

    /// 使用默认水位的对象模式。
    pub const fn objects() -> Self {
        Self::new(true, DEFAULT_OBJECT_HIGH_WATER_MARK)
    }

    pub const fn object_mode(&self) -> bool {
        self.object_mode
    }

    pub const fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// 返回替换水位后的副本。
    pub const fn with_high_water_mark(self, high_water_mark: usize) -> Self {
        Self::new(self.object_mode, high_water_mark)
    }
}

impl Default for ModeDescriptor {
    fn default() -> Self {
        Self::bytes()
    }
}

/// 模式适配器：复制描述符的唯一通道。
pub(crate) struct ModeAdapter;

impl ModeAdapter {
    /// 将 `source` 复制到组合器写侧（写入队列）以及 `input` Bridge 的两侧。
    pub(crate) fn adapt_writable_side(
        source: ModeDescriptor,
        writable: &mut HalfStream,
        input: &mut Bridge,
    ) {
        debug!(
            object_mode = source.object_mode(),
            high_water_mark = source.high_water_mark(),
            "adapt writable side"
        );
        writable.set_mode(source);
        input.set_modes(source);
    }

    /// 将 `source` 复制到组合器读侧描述以及 `output` Bridge 的两侧。
    pub(crate) fn adapt_readable_side(
        source: ModeDescriptor,
        readable: &mut ModeDescriptor,
        output: &mut Bridge,
    ) {
        debug!(
            object_mode = source.object_mode(),
            high_water_mark = source.high_water_mark(),
            "adapt readable side"
        );
        *readable = source;
        output.set_modes(source);
    }
}
