//! # nalmux-codec
//!
//! 码流层: 在无分隔的 Annex B 字节流中定位 NAL 单元边界,
//! 并识别 H.264/H.265 NAL 头, 供 MP4 封装器组帧.
//!
//! 本 crate 只做边界检测与组帧所需的头部解读, 不校验参数集语义.

pub mod annexb;
pub mod codec_id;
pub mod h264;
pub mod h265;
pub mod nal_role;
pub mod params;

// 重导出常用类型
pub use annexb::{AnnexBSegmenter, MIN_NAL_UNIT_SIZE, NalSlice, nal_unit_len, start_code_len};
pub use codec_id::CodecKind;
pub use nal_role::{NalRole, ParamSetKind, classify_nal};
pub use params::ParameterSets;
