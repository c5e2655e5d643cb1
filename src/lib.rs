//! # nalmux
//!
//! 把 Annex B 格式的 H.264/H.265 裸码流封装为 MP4.
//!
//! 支持三种输出布局:
//! - **普通**: `ftyp`, `mdat`, `moov`, 关闭时回填 mdat 大小 (需要可定位输出)
//! - **顺序写**: 只向前写, 可以输出到管道
//! - **分片**: `moof` + `mdat` 分片, 适合直播
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use nalmux::format::MemorySink;
//! use nalmux::codec::CodecKind;
//! use nalmux::remux::{RemuxOptions, remux_annex_b};
//!
//! let stream = std::fs::read("input.264").unwrap();
//! let mut sink = MemorySink::new();
//! let report = remux_annex_b(&stream, &mut sink, CodecKind::Avc, &RemuxOptions::default()).unwrap();
//! println!("写出 {} 个样本", report.samples);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `nalmux-core` | 错误类型、有理数、采样时钟 |
//! | `nalmux-codec` | Annex B 分割, H.264/H.265 NAL 头 |
//! | `nalmux-format` | 输出接口, MP4 封装会话 |

pub mod remux;

/// 核心类型与工具
pub use nalmux_core as core;

/// 码流分割与 NAL 头解析
pub use nalmux_codec as codec;

/// 输出接口与 MP4 封装
pub use nalmux_format as format;

pub use remux::{
    CodecChoice, RemuxError, RemuxOptions, RemuxPhase, RemuxReport, remux_annex_b, remux_file,
};

/// 获取 nalmux 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
