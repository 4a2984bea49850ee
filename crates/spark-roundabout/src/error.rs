//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义 Roundabout 对外暴露的错误语义，区分“协议违规”与“Stage 处理失败”两类来源；
//! - 为每个变体提供稳定错误码（`roundabout.*`），便于日志聚合与告警规则按码匹配。
//!
//! ## 设计要求（What）
//! - 协议违规（写入已结束的流、向已销毁的组合器挂载 Stage）必须在调用点同步失败；
//! - Stage 自身的错误原样保存在 `source` 中，本层不做重解释也不重试；
//! - 重复发送结束信号属于结构性缺陷，由 `completion` 状态机杜绝，这里不设对应变体。

use std::borrow::Cow;

use thiserror::Error;

/// Stage 处理失败时返回的不透明错误。
pub type StageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 本 crate 统一使用的结果别名。
pub type Result<T, E = RoundaboutError> = core::result::Result<T, E>;

/// Roundabout 错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方需要区分“自己违反了契约”与“某个 Stage 运行失败”，前者通常是程序缺陷，
///   后者可能需要业务侧决定是否丢弃整条管道。
/// - **契约 (What)**：
///   - 所有变体满足 `Send + Sync + 'static`；
///   - [`RoundaboutError::code`] 返回的字符串在版本间保持稳定。
/// - **设计权衡 (Trade-offs)**：`Stage` 变体持有 `Box<dyn Error>`，因此整个枚举不实现 `Clone`；
///   需要复制时请转换为字符串或错误码。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RoundaboutError {
    /// 写端已经宣告结束后仍继续写入。
    #[error("write after end: the writer already signalled completion")]
    WriteAfterEnd,

    /// 组合器已被销毁，任何后续操作都会被拒绝。
    #[error("roundabout has been destroyed")]
    Destroyed,

    /// 输出端已经收到结束标记，新的 Stage 无法再接入链路。
    #[error("cannot attach stage `{label}`: the output side already received end-of-data")]
    Sealed { label: String },

    /// 数据块类型与端点的模式描述不符，例如向字节模式端点写入对象。
    #[error("invalid chunk for `{endpoint}`: expected {expected}, received {received}")]
    InvalidChunk {
        endpoint: Cow<'static, str>,
        expected: &'static str,
        received: &'static str,
    },

    /// Stage 在转换或冲刷阶段返回的错误。
    #[error("stage `{label}` failed: {source}")]
    Stage {
        label: String,
        #[source]
        source: StageError,
    },
}

impl RoundaboutError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            RoundaboutError::WriteAfterEnd => "roundabout.write_after_end",
            RoundaboutError::Destroyed => "roundabout.destroyed",
            RoundaboutError::Sealed { .. } => "roundabout.sealed",
            RoundaboutError::InvalidChunk { .. } => "roundabout.invalid_chunk",
            RoundaboutError::Stage { .. } => "roundabout.stage",
        }
    }

    /// 是否为调用方违反协议导致的错误。
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            RoundaboutError::WriteAfterEnd
                | RoundaboutError::Destroyed
                | RoundaboutError::Sealed { .. }
                | RoundaboutError::InvalidChunk { .. }
        )
    }

    pub(crate) fn stage(label: &str, source: StageError) -> Self {
        RoundaboutError::Stage {
            label: label.to_owned(),
            source,
        }
    }
}
