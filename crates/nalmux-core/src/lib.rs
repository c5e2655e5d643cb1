//! # nalmux-core
//!
//! nalmux 核心库, 提供错误类型、有理数与采样时钟.
//!
//! 其余 crate (码流分割、MP4 封装、命令行) 都建立在这里的类型之上.

pub mod clock;
pub mod error;
pub mod rational;

// 重导出常用类型
pub use clock::{MP4_TIMESCALE, SampleClock, duration_ticks};
pub use error::{MuxError, MuxResult};
pub use rational::Rational;
