//! Stage 契约与内部槽位。
//!
//! # 设计背景（Why）
//! - Stage 是可挂载的转换单元：消费一个数据单元，产出零到多个数据单元，并在上游结束时冲刷残余输出；
//! - 组合器把 Stage 视为不透明对象，只读取其两侧模式描述，并把它嵌入链路的拼接点；
//! - 每个 Stage 在组合器内部拥有独立的入口缓冲与出口缓冲（[`StageSlot`]），拼接只改变链接，
//!   不搬动这些缓冲里已经排队的数据。
//!
//! # 契约说明（What）
//! - [`Stage::transform`] 每次只接收一个单元，按调用顺序产出；
//! - [`Stage::flush`] 在入口缓冲结束且排空后恰好调用一次，之后出口缓冲写入结束标记；
//! - Stage 返回的错误原样上抛，组合器不重试。

use std::{borrow::Cow, fmt};

use tracing::{debug, trace};

use crate::{
    bridge::rejected,
    error::{Result, RoundaboutError, StageError},
    half_stream::{HalfStream, Pull},
    mode::ModeDescriptor,
    payload::Payload,
};

/// 可挂载到组合器上的转换单元。
///
/// # 教案式说明
/// - **意图（Why）**：组合器只关心“它吃什么、吐什么、何时结束”，因此契约面保持最小；
/// - **契约（What）**：
///   - `writable_mode`：入口侧描述，作为首个 Stage 时决定组合器的写侧；
///   - `readable_mode`：出口侧描述，作为最新 Stage 时决定组合器的读侧；
///   - 一个 Stage 被挂载后即被组合器独占持有，无法再挂载到其他组合器。
pub trait Stage: Send {
    /// 用于日志与注册表快照的标签。
    fn label(&self) -> &str {
        "stage"
    }

    fn writable_mode(&self) -> ModeDescriptor {
        ModeDescriptor::default()
    }

    fn readable_mode(&self) -> ModeDescriptor {
        ModeDescriptor::default()
    }

    /// 处理一个数据单元，通过 `out` 产出结果。
    fn transform(&mut self, payload: Payload, out: &mut Emitter) -> Result<(), StageError>;

    /// 上游结束后冲刷残余输出。
    fn flush(&mut self, _out: &mut Emitter) -> Result<(), StageError> {
        Ok(())
    }
}

/// Stage 产出数据的收集器。
#[derive(Debug, Default)]
pub struct Emitter {
    produced: Vec<Payload>,
}

impl Emitter {
    /// 产出一个数据单元。
    pub fn push(&mut self, payload: impl Into<Payload>) {
        self.produced.push(payload.into());
    }

    /// 本轮已产出的单元数。
    pub fn len(&self) -> usize {
        self.produced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.produced.is_empty()
    }

    fn take(&mut self) -> Vec<Payload> {
        std::mem::take(&mut self.produced)
    }
}

type TransformFn = dyn FnMut(Payload, &mut Emitter) -> Result<(), StageError> + Send;
type FlushFn = dyn FnMut(&mut Emitter) -> Result<(), StageError> + Send;

/// 由闭包构造的 Stage，见 [`from_fn`]。
pub struct FnStage {
    label: Cow<'static, str>,
    writable: ModeDescriptor,
    readable: ModeDescriptor,
    transform: Box<TransformFn>,
    flush: Option<Box<FlushFn>>,
}

impl FnStage {
    /// 设置入口侧描述。
    pub fn with_writable_mode(mut self, mode: ModeDescriptor) -> Self {
        self.writable = mode;
        self
    }

    /// 设置出口侧描述。
    pub fn with_readable_mode(mut self, mode: ModeDescriptor) -> Self {
        self.readable = mode;
        self
    }

    /// 同时设置两侧描述。
    pub fn with_mode(self, mode: ModeDescriptor) -> Self {
        self.with_writable_mode(mode).with_readable_mode(mode)
    }

    /// 设置冲刷回调。
    pub fn with_flush<F>(mut self, flush: F) -> Self
    where
        F: FnMut(&mut Emitter) -> Result<(), StageError> + Send + 'static,
    {
        self.flush = Some(Box::new(flush));
        self
    }
}

impl fmt::Debug for FnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage")
            .field("label", &self.label)
            .field("writable", &self.writable)
            .field("readable", &self.readable)
            .field("has_flush", &self.flush.is_some())
            .finish()
    }
}

impl Stage for FnStage {
    fn label(&self) -> &str {
        &self.label
    }

    fn writable_mode(&self) -> ModeDescriptor {
        self.writable
    }

    fn readable_mode(&self) -> ModeDescriptor {
        self.readable
    }

    fn transform(&mut self, payload: Payload, out: &mut Emitter) -> Result<(), StageError> {
        (self.transform)(payload, out)
    }

    fn flush(&mut self, out: &mut Emitter) -> Result<(), StageError> {
        match self.flush.as_mut() {
            Some(flush) => flush(out),
            None => Ok(()),
        }
    }
}

/// 以闭包构造 Stage，两侧默认使用字节模式描述。
pub fn from_fn<F>(label: impl Into<Cow<'static, str>>, transform: F) -> FnStage
where
    F: FnMut(Payload, &mut Emitter) -> Result<(), StageError> + Send + 'static,
{
    FnStage {
        label: label.into(),
        writable: ModeDescriptor::default(),
        readable: ModeDescriptor::default(),
        transform: Box::new(transform),
        flush: None,
    }
}

/// 原样转发每个单元的 Stage。
pub fn identity(label: impl Into<Cow<'static, str>>) -> FnStage {
    from_fn(label, |payload, out| {
        out.push(payload);
        Ok(())
    })
}

/// Stage 在链路中的槽位：Stage 本体加上它自己的入口、出口缓冲。
pub(crate) struct StageSlot {
    label: String,
    stage: Box<dyn Stage>,
    inbox: HalfStream,
    outbox: HalfStream,
    flushed: bool,
}

impl StageSlot {
    pub(crate) fn new(stage: Box<dyn Stage>) -> Self {
        let label = stage.label().to_owned();
        let inbox = HalfStream::new(stage.writable_mode());
        let outbox = HalfStream::new(stage.readable_mode());
        Self {
            label,
            stage,
            inbox,
            outbox,
            flushed: false,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn writable_mode(&self) -> ModeDescriptor {
        self.inbox.mode()
    }

    pub(crate) fn readable_mode(&self) -> ModeDescriptor {
        self.outbox.mode()
    }

    pub(crate) fn can_accept(&self) -> bool {
        self.inbox.can_accept()
    }

    pub(crate) fn check(&self, payload: &Payload) -> Result<()> {
        self.inbox
            .check(payload)
            .map_err(|reason| rejected(self.label.clone(), reason))
    }

    pub(crate) fn offer(&mut self, payload: Payload) -> Result<bool> {
        let label = self.label.clone();
        self.inbox
            .push(payload)
            .map_err(|reason| rejected(label, reason))
    }

    /// 把未能交付给下游的出口单元放回出口队首。
    pub(crate) fn requeue(&mut self, payload: Payload) {
        self.outbox.requeue(payload);
    }

    pub(crate) fn end(&mut self) -> bool {
        self.inbox.end()
    }

    pub(crate) fn pull(&mut self) -> Pull {
        self.outbox.pull()
    }

    pub(crate) fn is_output_exhausted(&self) -> bool {
        self.outbox.is_exhausted()
    }

    /// 在出口缓冲低于水位时逐个转换入口数据；入口结束且排空后冲刷一次并结束出口。
    ///
    /// 返回本轮是否取得进展。
    pub(crate) fn process(&mut self) -> Result<bool> {
        let mut progressed = false;
        let mut out = Emitter::default();
        while self.outbox.can_accept() {
            let Pull::Data(payload) = self.inbox.pull() else {
                break;
            };
            trace!(stage = %self.label, "transform");
            self.stage
                .transform(payload, &mut out)
                .map_err(|source| RoundaboutError::stage(&self.label, source))?;
            self.emit(&mut out)?;
            progressed = true;
        }

        if self.inbox.is_exhausted() && !self.flushed {
            self.flushed = true;
            debug!(stage = %self.label, "upstream ended, flush");
            self.stage
                .flush(&mut out)
                .map_err(|source| RoundaboutError::stage(&self.label, source))?;
            self.emit(&mut out)?;
            self.outbox.end();
            progressed = true;
        }
        Ok(progressed)
    }

    /// 整批写入出口：任一单元与出口模式不符时整批拒绝，出口保持原样。
    fn emit(&mut self, out: &mut Emitter) -> Result<()> {
        let produced = out.take();
        for payload in &produced {
            self.outbox
                .check(payload)
                .map_err(|reason| rejected(self.label.clone(), reason))?;
        }
        for payload in produced {
            self.outbox
                .push(payload)
                .map_err(|reason| rejected(self.label.clone(), reason))?;
        }
        Ok(())
    }
}
