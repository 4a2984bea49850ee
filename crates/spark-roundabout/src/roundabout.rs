//! 对外可见的双工组合器。
//!
//! # 教案式说明
//! - **意图（Why）**：调用方只面对一个可读可写的端点，内部链路可以在数据流动过程中随时追加 Stage；
//! - **逻辑（How）**：
//!   1. 写入先进入组合器自己的写队列，再按 `input` 的水位被逐个“吸收”；每吸收一个单元、以及写端宣告结束时，
//!      都运行一次写方向的排空检查；
//!   2. 每次读写或挂载后驱动链路直至静止，随后观察 `output` 是否耗尽，并按条件唤醒挂起的读者或写者；
//!   3. 读取时先非阻塞地从 `output` 拉取；无数据且 `finished` 为真则交付结束标记，否则挂起等待下一次唤醒。
//! - **契约（What）**：
//!   - 写入顺序即进入管道的顺序，最后一个 Stage 的产出顺序即读取顺序；
//!   - 结束标记总是最后一个被观察到的读取结果，且读方向只交付一次；
//!   - 所有状态迁移都发生在 `&mut self` 调用内部，组合器自身无需加锁；
//!   - `attach`、`write`、`end` 要么在改变任何状态之前失败，要么提交成功并返回 `Ok`；
//!     提交之后驱动链路产生的错误被暂存，由下一次调用报告，且只报告一次。
//! - **风险与权衡（Trade-offs）**：链路驱动是同步的，单个 Stage 的耗时会直接计入触发它的那次读写调用。

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use futures::{Sink, Stream, stream::FusedStream};
use tracing::{debug, warn};

use crate::{
    bridge::rejected,
    completion::{ReadCompletion, WriteCompletion},
    config::RoundaboutConfig,
    error::{Result, RoundaboutError},
    half_stream::{HalfStream, Pull},
    mode::{ModeAdapter, ModeDescriptor},
    payload::Payload,
    pipeline::{PipelineCore, StageRegistration},
    stage::Stage,
};

/// 一次非阻塞读取的结果。
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    /// 读到数据。
    Data(Payload),
    /// 暂无数据，链路尚未结束。
    Pending,
    /// 结束标记：之后不会再有数据。
    End,
}

/// 动态拼接的双工流组合器。
///
/// 未挂载任何 Stage 时表现为直通流；挂载的第一个 Stage 决定写侧模式，最新挂载的 Stage 决定读侧模式。
pub struct Roundabout {
    core: PipelineCore,
    writes: HalfStream,
    readable: ModeDescriptor,
    write_state: WriteCompletion,
    read_state: ReadCompletion,
    end_delivered: bool,
    destroyed: bool,
    deferred: Option<RoundaboutError>,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

impl Roundabout {
    /// 以配置创建组合器，配置同时作为写侧与读侧的基线。
    pub fn new(config: RoundaboutConfig) -> Self {
        let baseline = config.descriptor();
        let mut roundabout = Self {
            core: PipelineCore::new(baseline, baseline),
            writes: HalfStream::new(baseline),
            readable: baseline,
            write_state: WriteCompletion::default(),
            read_state: ReadCompletion::default(),
            end_delivered: false,
            destroyed: false,
            deferred: None,
            read_waker: None,
            write_waker: None,
        };
        ModeAdapter::adapt_writable_side(
            baseline,
            &mut roundabout.writes,
            roundabout.core.input_mut(),
        );
        ModeAdapter::adapt_readable_side(
            baseline,
            &mut roundabout.readable,
            roundabout.core.output_mut(),
        );
        roundabout
    }

    /// 在链路末尾追加 Stage，返回自身以便链式调用。
    ///
    /// # 契约（What）
    /// - 首个 Stage 固定写侧模式；每个 Stage 都会覆盖读侧模式；
    /// - 可以在数据流动过程中调用，已排队的数据不会丢失；
    /// - 组合器已销毁时返回 [`RoundaboutError::Destroyed`]，`output` 已结束时返回 [`RoundaboutError::Sealed`]，
    ///   此前暂存的驱动错误也在拼接之前报告；
    /// - 拼接一旦完成即返回 `Ok`，随后驱动链路的错误留给下一次调用。
    pub fn attach<S>(&mut self, stage: S) -> Result<&mut Self>
    where
        S: Stage + 'static,
    {
        self.attach_boxed(Box::new(stage))
    }

    /// 与 [`Roundabout::attach`] 相同，接收已装箱的 Stage。
    pub fn attach_boxed(&mut self, stage: Box<dyn Stage>) -> Result<&mut Self> {
        self.ensure_alive()?;
        self.take_deferred()?;
        let writable = stage.writable_mode();
        let readable = stage.readable_mode();
        let first = self.core.is_empty();

        self.core.attach(stage)?;
        if first {
            ModeAdapter::adapt_writable_side(writable, &mut self.writes, self.core.input_mut());
        }
        ModeAdapter::adapt_readable_side(readable, &mut self.readable, self.core.output_mut());

        self.drive();
        Ok(self)
    }

    /// 写入一个数据单元。
    ///
    /// 返回值是背压提示：写队列达到水位后返回 `false`，调用方应等待后再继续写入。
    /// 返回 `Err` 时数据未被接收。
    pub fn write(&mut self, payload: impl Into<Payload>) -> Result<bool> {
        self.ensure_alive()?;
        if !self.write_state.is_open() {
            return Err(RoundaboutError::WriteAfterEnd);
        }
        self.take_deferred()?;
        self.writes
            .push(payload.into())
            .map_err(|reason| rejected("writable", reason))?;
        self.drive();
        Ok(self.writes.can_accept())
    }

    /// 宣告不再写入。重复调用无副作用。
    pub fn end(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.take_deferred()?;
        self.write_state.on_writer_end();
        self.drain_check();
        self.drive();
        Ok(())
    }

    /// 非阻塞读取。
    ///
    /// `output` 中已有的数据先于暂存的驱动错误交付；没有数据可读时才报告错误。
    pub fn try_read(&mut self) -> Result<ReadOutcome> {
        self.ensure_alive()?;
        if self.end_delivered {
            return Ok(ReadOutcome::End);
        }
        if self.deferred.is_none() {
            self.drive();
        }
        match self.core.output_mut().pull_coalesced() {
            Pull::Data(payload) => Ok(ReadOutcome::Data(payload)),
            Pull::Empty | Pull::Ended => {
                self.take_deferred()?;
                if !self.read_state.is_finished() {
                    return Ok(ReadOutcome::Pending);
                }
                debug!("deliver end-of-data");
                self.end_delivered = true;
                Ok(ReadOutcome::End)
            }
        }
    }

    /// 立即销毁：释放两个 Bridge 与全部 Stage，之后的读写与挂载都会失败。
    ///
    /// 挂起中的读者与写者会被唤醒一次，以便观察到销毁状态。
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        debug!(stages = self.core.registry().len(), "destroy roundabout");
        self.destroyed = true;
        self.deferred = None;
        self.core.teardown();
        self.writes.clear();
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }

    /// 当前写侧模式。
    pub fn writable_mode(&self) -> ModeDescriptor {
        self.writes.mode()
    }

    /// 当前读侧模式。
    pub fn readable_mode(&self) -> ModeDescriptor {
        self.readable
    }

    /// `output` 是否已交付其结束信号。
    pub fn is_finished(&self) -> bool {
        self.read_state.is_finished()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn write_state(&self) -> WriteCompletion {
        self.write_state
    }

    /// 已挂载 Stage 的快照，顺序与链路一致。
    pub fn stages(&self) -> Vec<StageRegistration> {
        self.core.registry()
    }

    /// 拼接次数构成的逻辑时钟。
    pub fn epoch(&self) -> u64 {
        self.core.epoch()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            return Err(RoundaboutError::Destroyed);
        }
        Ok(())
    }

    /// 报告并清除暂存的驱动错误。
    fn take_deferred(&mut self) -> Result<()> {
        match self.deferred.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn drain_check(&mut self) {
        if self.write_state.try_drain(self.writes.len()) {
            self.core.input_mut().end();
        }
    }

    /// 按 `input` 水位吸收写队列中的数据，每吸收一个单元运行一次排空检查。
    ///
    /// `input` 拒收的单元放回写队列队首。
    fn absorb(&mut self) -> Result<bool> {
        let mut absorbed = false;
        while self.core.input().can_accept() {
            let Pull::Data(payload) = self.writes.pull() else {
                break;
            };
            if let Err(error) = self.core.input().check(&payload) {
                self.writes.requeue(payload);
                return Err(error);
            }
            self.core.input_mut().offer(payload)?;
            absorbed = true;
            self.drain_check();
        }
        Ok(absorbed)
    }

    /// 驱动链路直至静止；失败时暂存错误，链路停在出错的位置。
    fn drive(&mut self) {
        if let Err(error) = self.drive_until_quiescent() {
            warn!(code = error.code(), %error, "pipeline stalled");
            self.deferred = Some(error);
        }
        if self.read_state.observe(self.core.output().is_exhausted()) {
            debug!("output finished");
        }
        self.notify();
    }

    fn drive_until_quiescent(&mut self) -> Result<()> {
        loop {
            let absorbed = self.absorb()?;
            let pumped = self.core.pump()?;
            if !absorbed && !pumped {
                return Ok(());
            }
        }
    }

    fn notify(&mut self) {
        let stalled = self.deferred.is_some();
        if stalled || self.core.output().has_data() || self.read_state.is_finished() {
            if let Some(waker) = self.read_waker.take() {
                waker.wake();
            }
        }
        if stalled || self.writes.can_accept() || self.write_state.is_drained() {
            if let Some(waker) = self.write_waker.take() {
                waker.wake();
            }
        }
    }
}

impl Default for Roundabout {
    fn default() -> Self {
        Self::new(RoundaboutConfig::default())
    }
}

impl fmt::Debug for Roundabout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Roundabout")
            .field("stages", &self.core.registry())
            .field("writable", &self.writes.mode())
            .field("readable", &self.readable)
            .field("input", &self.core.input().writable_mode())
            .field("output", &self.core.output().readable_mode())
            .field("write_state", &self.write_state)
            .field("read_state", &self.read_state)
            .field("stalled", &self.deferred.is_some())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Stream for Roundabout {
    type Item = Result<Payload>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.destroyed || this.end_delivered {
            return Poll::Ready(None);
        }
        match this.try_read() {
            Ok(ReadOutcome::Data(payload)) => Poll::Ready(Some(Ok(payload))),
            Ok(ReadOutcome::End) => Poll::Ready(None),
            Ok(ReadOutcome::Pending) => {
                this.read_waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Err(error) => Poll::Ready(Some(Err(error))),
        }
    }
}

impl FusedStream for Roundabout {
    fn is_terminated(&self) -> bool {
        self.destroyed || self.end_delivered
    }
}

impl Sink<Payload> for Roundabout {
    type Error = RoundaboutError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        this.ensure_alive()?;
        if !this.write_state.is_open() {
            return Poll::Ready(Err(RoundaboutError::WriteAfterEnd));
        }
        this.take_deferred()?;
        this.drive();
        this.take_deferred()?;
        if this.writes.can_accept() {
            return Poll::Ready(Ok(()));
        }
        this.write_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, item: Payload) -> Result<()> {
        self.get_mut().write(item).map(|_| ())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        this.ensure_alive()?;
        this.take_deferred()?;
        this.drive();
        this.take_deferred()?;
        if this.writes.is_empty() {
            return Poll::Ready(Ok(()));
        }
        this.write_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        this.end()?;
        this.take_deferred()?;
        if this.write_state.is_drained() {
            return Poll::Ready(Ok(()));
        }
        this.write_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
