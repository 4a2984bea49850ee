#![deny(unsafe_code)]
#![doc = r#"
# spark-roundabout

## 模块使命（Why）
- **单端点、多阶段**：调用方只看到一个可读可写的双工端点 [`Roundabout`]，内部数据经由零到多个转换 Stage 流转；
- **运行期拼接**：Stage 可以在数据已经开始流动之后追加到链路末尾，已排队的数据既不丢失也不乱序；
- **端点决定模式**：第一个 Stage 决定调用方写入的数据形态与水位，最新的 Stage 决定调用方读到的数据形态与水位。

## 核心契约（What）
- [`Roundabout::attach`]：在链路末尾拼接 Stage，支持链式调用；
- [`Roundabout::write`] / [`Roundabout::end`]：写入与宣告结束，结束后继续写入立即失败；
- [`Roundabout::try_read`]：非阻塞读取，最终恰好交付一次结束标记；
- 组合器同时实现 `futures::Stream` 与 `futures::Sink`，可以用 `StreamExt::split` 拆分为独立的读写两半；
- [`Roundabout::destroy`]：同步拆除两个 Bridge 并释放全部 Stage。

## 实现策略（How）
- `pipeline`：显式的节点序列与链接列表，拼接即“断开一条、接上两条”；
- `mode`：描述符为值对象，只通过 `ModeAdapter` 在构造、首次挂载、每次挂载时复制；
- `completion`：写方向与读方向各一个小型状态机，保证结束信号恰好发送一次且顺序正确。

```
use spark_roundabout::{ReadOutcome, Roundabout, stage};

let mut roundabout = Roundabout::default();
roundabout.attach(stage::identity("echo"))?;
roundabout.write("hello universe")?;
roundabout.end()?;

assert_eq!(
    roundabout.try_read()?,
    ReadOutcome::Data("hello universe".into())
);
assert_eq!(roundabout.try_read()?, ReadOutcome::End);
# Ok::<(), spark_roundabout::RoundaboutError>(())
```
"#]

mod bridge;
pub mod completion;
pub mod config;
pub mod error;
mod half_stream;
pub mod mode;
pub mod payload;
pub mod pipeline;
mod roundabout;
pub mod stage;

pub use completion::{ReadCompletion, WriteCompletion};
pub use config::RoundaboutConfig;
pub use error::{Result, RoundaboutError, StageError};
pub use mode::ModeDescriptor;
pub use payload::Payload;
pub use pipeline::StageRegistration;
pub use roundabout::{ReadOutcome, Roundabout};
pub use stage::{Emitter, FnStage, Stage};
