//! 组合器构造配置。
//!
//! # 契约说明（What）
//! - `object_mode`：默认 `false`，即字节模式；
//! - `high_water_mark`：缺省时按模式取默认水位（字节模式 16 KiB，对象模式 16 个对象）；
//! - 反序列化时忽略未知字段，调用方可以直接传入更大的流配置对象。

use serde::{Deserialize, Serialize};

use crate::mode::{DEFAULT_BYTE_HIGH_WATER_MARK, DEFAULT_OBJECT_HIGH_WATER_MARK, ModeDescriptor};

/// 组合器的初始模式配置，挂载任何 Stage 之前作为两侧基线。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundaboutConfig {
    pub object_mode: bool,
    pub high_water_mark: Option<usize>,
}

impl RoundaboutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置对象模式。
    pub fn object_mode(mut self, object_mode: bool) -> Self {
        self.object_mode = object_mode;
        self
    }

    /// 设置水位。
    pub fn high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = Some(high_water_mark);
        self
    }

    /// 解析为基线模式描述。
    pub fn descriptor(&self) -> ModeDescriptor {
        let default_mark = if self.object_mode {
            DEFAULT_OBJECT_HIGH_WATER_MARK
        } else {
            DEFAULT_BYTE_HIGH_WATER_MARK
        };
        ModeDescriptor::new(
            self.object_mode,
            self.high_water_mark.unwrap_or(default_mark),
        )
    }
}

impl From<ModeDescriptor> for RoundaboutConfig {
    fn from(value: ModeDescriptor) -> Self {
        Self {
            object_mode: value.object_mode(),
            high_water_mark: Some(value.high_water_mark()),
        }
    }
}
