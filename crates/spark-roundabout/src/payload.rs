//! 管道中流动的数据单元。

use bytes::{Bytes, BytesMut};
use serde_json::Value;

use crate::mode::ModeDescriptor;

/// 单个数据单元：字节块或结构化对象。
///
/// # 契约说明（What）
/// - 字节模式端点只接受 [`Payload::Bytes`]；
/// - 对象模式端点接受任意变体，字节块在对象模式下被视为一个不透明对象。
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// 字节块。
    Bytes(Bytes),
    /// 结构化对象。
    Object(Value),
}

impl Payload {
    /// 以 JSON 值构造对象载荷。
    pub fn object(value: Value) -> Self {
        Payload::Object(value)
    }

    /// 是否为对象载荷。
    pub fn is_object(&self) -> bool {
        matches!(self, Payload::Object(_))
    }

    /// 借用字节内容。
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Object(_) => None,
        }
    }

    /// 借用对象内容。
    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Payload::Object(value) => Some(value),
            Payload::Bytes(_) => None,
        }
    }

    /// 取出字节内容。
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Object(_) => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Object(_) => "object",
        }
    }

    /// 在给定模式下占用的水位：字节模式按长度计，对象模式每个单元计 1。
    pub(crate) fn weight(&self, mode: ModeDescriptor) -> usize {
        if mode.object_mode() {
            return 1;
        }
        match self {
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Object(_) => 1,
        }
    }

    /// 将一组字节块合并为一个连续块。
    ///
    /// 单块时直接返回原值，避免拷贝。
    pub(crate) fn coalesce(mut chunks: Vec<Bytes>) -> Bytes {
        if chunks.len() == 1 {
            return chunks.pop().unwrap_or_default();
        }
        let total = chunks.iter().map(Bytes::len).sum();
        let mut merged = BytesMut::with_capacity(total);
        for chunk in chunks {
            merged.extend_from_slice(&chunk);
        }
        merged.freeze()
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(value: &'static [u8]) -> Self {
        Payload::Bytes(Bytes::from_static(value))
    }
}

impl From<&'static str> for Payload {
    fn from(value: &'static str) -> Self {
        Payload::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Object(value)
    }
}
