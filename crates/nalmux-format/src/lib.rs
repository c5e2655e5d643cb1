//! # nalmux-format
//!
//! 容器层: 定义输出接口 (`OutputSink`) 与封装会话契约 (`MuxSession`),
//! 并提供 MP4 封装会话实现 (普通、顺序写与分片三种布局).

pub mod io;
pub mod mp4;
pub mod session;

pub use io::{FileSink, MemorySink, OutputSink, PipeSink};
pub use mp4::Mp4Session;
pub use session::{MuxMode, MuxSession, MuxStats, SessionState};
