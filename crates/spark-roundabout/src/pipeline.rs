//! 管道核心：Stage 序列、显式链接与拼接。
//!
//! # 教案式说明
//! - **意图（Why）**：运行期插入 Stage 时，调用方不能感知到数据丢失或乱序；
//!   因此链路结构被建模为“节点序列 + 显式链接列表”，拼接就是对链接列表的三步原子修改：
//!   断开 `link(tail, output)`，接上 `link(tail, new)` 与 `link(new, output)`。
//! - **逻辑（How）**：
//!   1. 节点为 `input` Bridge、按挂载顺序排列的 [`StageSlot`]、`output` Bridge；
//!   2. [`PipelineCore::pump`] 反复驱动所有链接与 Stage，直到没有任何进展；链接仅在下游可接收时搬运数据，
//!      上游耗尽时沿链接转发一次结束信号；
//!   3. 每次拼接递增 `epoch`，供观察者判断链路是否已更新。
//! - **契约（What）**：
//!   - 拼接只改变链接，已排队在 `tail` 出口或 `output` 中的数据保持原位；
//!   - 若 `tail → output` 已转发过结束信号，则拒绝拼接（`output` 无法“复活”）。
//! - **风险与权衡（Trade-offs）**：按节点编号线性查找链接，Stage 数量通常很小，换取结构简单直观。

use tracing::{debug, trace};

use crate::{
    bridge::Bridge,
    error::{Result, RoundaboutError},
    half_stream::Pull,
    mode::ModeDescriptor,
    payload::Payload,
    stage::{Stage, StageSlot},
};

/// 链路中的节点编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum NodeId {
    Input,
    Stage(usize),
    Output,
}

#[derive(Debug)]
struct Link {
    from: NodeId,
    to: NodeId,
    end_forwarded: bool,
}

impl Link {
    fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            end_forwarded: false,
        }
    }
}

/// 已挂载 Stage 的只读快照条目，顺序与链路顺序一致。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageRegistration {
    position: usize,
    label: String,
    writable_mode: ModeDescriptor,
    readable_mode: ModeDescriptor,
}

impl StageRegistration {
    /// 在链路中的位置，从 0 开始。
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn writable_mode(&self) -> ModeDescriptor {
        self.writable_mode
    }

    pub fn readable_mode(&self) -> ModeDescriptor {
        self.readable_mode
    }
}

pub(crate) struct PipelineCore {
    input: Bridge,
    output: Bridge,
    stages: Vec<StageSlot>,
    links: Vec<Link>,
    epoch: u64,
}

impl PipelineCore {
    /// 以基线描述创建空链路：`input → output`。
    pub(crate) fn new(writable: ModeDescriptor, readable: ModeDescriptor) -> Self {
        Self {
            input: Bridge::new("input", writable),
            output: Bridge::new("output", readable),
            stages: Vec::new(),
            links: vec![Link::new(NodeId::Input, NodeId::Output)],
            epoch: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub(crate) fn input(&self) -> &Bridge {
        &self.input
    }

    pub(crate) fn input_mut(&mut self) -> &mut Bridge {
        &mut self.input
    }

    pub(crate) fn output(&self) -> &Bridge {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut Bridge {
        &mut self.output
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    fn tail(&self) -> NodeId {
        match self.stages.len() {
            0 => NodeId::Input,
            len => NodeId::Stage(len - 1),
        }
    }

    /// 在链路末尾拼接新的 Stage，返回其位置。
    pub(crate) fn attach(&mut self, stage: Box<dyn Stage>) -> Result<usize> {
        let tail = self.tail();
        // 销毁后链接被清空，找不到 `tail → output` 只可能是已销毁。
        let Some(index) = self.link_index(tail, NodeId::Output) else {
            return Err(RoundaboutError::Destroyed);
        };
        if self.links[index].end_forwarded {
            return Err(RoundaboutError::Sealed {
                label: stage.label().to_owned(),
            });
        }

        let position = self.stages.len();
        let slot = StageSlot::new(stage);
        debug!(stage = %slot.label(), position, ?tail, "splice stage before output");

        self.links.remove(index);
        self.stages.push(slot);
        let node = NodeId::Stage(position);
        self.links.push(Link::new(tail, node));
        self.links.push(Link::new(node, NodeId::Output));
        self.epoch += 1;
        Ok(position)
    }

    /// 已挂载 Stage 的快照。
    pub(crate) fn registry(&self) -> Vec<StageRegistration> {
        self.stages
            .iter()
            .enumerate()
            .map(|(position, slot)| StageRegistration {
                position,
                label: slot.label().to_owned(),
                writable_mode: slot.writable_mode(),
                readable_mode: slot.readable_mode(),
            })
            .collect()
    }

    /// 驱动链路直至静止，返回本次是否有任何进展。
    pub(crate) fn pump(&mut self) -> Result<bool> {
        let mut progressed = false;
        loop {
            let mut round = false;
            for index in 0..self.links.len() {
                round |= self.drive_link(index)?;
            }
            for slot in &mut self.stages {
                round |= slot.process()?;
            }
            if !round {
                return Ok(progressed);
            }
            progressed = true;
        }
    }

    /// 销毁链路：释放全部 Stage 与缓冲并清空链接，之后不再转发任何数据。
    pub(crate) fn teardown(&mut self) {
        debug!(stages = self.stages.len(), "teardown pipeline");
        self.stages.clear();
        self.links.clear();
        self.input.clear();
        self.output.clear();
    }

    fn link_index(&self, from: NodeId, to: NodeId) -> Option<usize> {
        self.links
            .iter()
            .position(|link| link.from == from && link.to == to)
    }

    fn drive_link(&mut self, index: usize) -> Result<bool> {
        let (from, to) = {
            let link = &self.links[index];
            if link.end_forwarded {
                return Ok(false);
            }
            (link.from, link.to)
        };

        let mut progressed = false;
        while self.can_accept(to) {
            match self.pull(from) {
                Pull::Data(payload) => {
                    // 下游拒收的单元回到上游队首，链路停在原处等待调用方处理错误。
                    if let Err(error) = self.check(to, &payload) {
                        self.requeue(from, payload);
                        return Err(error);
                    }
                    trace!(?from, ?to, "move chunk");
                    self.offer(to, payload)?;
                    progressed = true;
                }
                Pull::Empty => break,
                Pull::Ended => {
                    debug!(?from, ?to, "forward end-of-data");
                    self.end(to);
                    self.links[index].end_forwarded = true;
                    return Ok(true);
                }
            }
        }

        // 下游已满时上游可能恰好已经耗尽，此时结束信号不受水位限制。
        if self.is_exhausted(from) {
            debug!(?from, ?to, "forward end-of-data");
            self.end(to);
            self.links[index].end_forwarded = true;
            progressed = true;
        }
        Ok(progressed)
    }

    fn can_accept(&self, node: NodeId) -> bool {
        match node {
            NodeId::Input => self.input.can_accept(),
            NodeId::Stage(position) => self.stages[position].can_accept(),
            NodeId::Output => self.output.can_accept(),
        }
    }

    fn pull(&mut self, node: NodeId) -> Pull {
        match node {
            NodeId::Input => self.input.pull(),
            NodeId::Stage(position) => self.stages[position].pull(),
            NodeId::Output => self.output.pull(),
        }
    }

    fn is_exhausted(&self, node: NodeId) -> bool {
        match node {
            NodeId::Input => self.input.is_exhausted(),
            NodeId::Stage(position) => self.stages[position].is_output_exhausted(),
            NodeId::Output => self.output.is_exhausted(),
        }
    }

    fn check(&self, node: NodeId, payload: &Payload) -> Result<()> {
        match node {
            NodeId::Input => self.input.check(payload),
            NodeId::Stage(position) => self.stages[position].check(payload),
            NodeId::Output => self.output.check(payload),
        }
    }

    fn requeue(&mut self, node: NodeId, payload: Payload) {
        match node {
            NodeId::Input => self.input.requeue(payload),
            NodeId::Stage(position) => self.stages[position].requeue(payload),
            NodeId::Output => self.output.requeue(payload),
        }
    }

    fn offer(&mut self, node: NodeId, payload: Payload) -> Result<bool> {
        match node {
            NodeId::Input => self.input.offer(payload),
            NodeId::Stage(position) => self.stages[position].offer(payload),
            NodeId::Output => self.output.offer(payload),
        }
    }

    fn end(&mut self, node: NodeId) {
        match node {
            NodeId::Input => self.input.end(),
            NodeId::Stage(position) => self.stages[position].end(),
            NodeId::Output => self.output.end(),
        };
    }
}
