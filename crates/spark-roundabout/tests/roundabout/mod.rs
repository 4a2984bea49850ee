//! Roundabout 集成测试入口。
//!
//! - `passthrough`：零个、一个、多个 Stage 时的数据透传与调用次数；
//! - `modes`：写侧/读侧模式随首个与最新 Stage 的适配；
//! - `splice`：数据流动过程中的拼接与注册表快照；
//! - `completion`：结束信号的先后顺序与“恰好一次”；
//! - `async_io`：拆分为 `Stream`/`Sink` 两半后的挂起与唤醒；
//! - `errors`：协议违规与 Stage 错误的传播。

mod errors;
mod splice;
