//! 参数集收集与解码器配置记录.

use nalmux_core::{MuxError, MuxResult};

use crate::codec_id::CodecKind;
use crate::h264::{MAX_AVCC_SPS, build_avcc_config};
use crate::h265::build_hvcc_config;
use crate::nal_role::ParamSetKind;

/// 每类参数集最多保留的个数
const MAX_PARAM_SETS: usize = 32;

/// 码流中出现过的参数集 (去重, 按首次出现顺序)
#[derive(Debug, Clone)]
pub struct ParameterSets {
    codec: CodecKind,
    vps: Vec<Vec<u8>>,
    sps: Vec<Vec<u8>>,
    pps: Vec<Vec<u8>>,
}

impl ParameterSets {
    /// 创建空集合
    pub fn new(codec: CodecKind) -> Self {
        Self {
            codec,
            vps: Vec::new(),
            sps: Vec::new(),
            pps: Vec::new(),
        }
    }

    /// 加入一个参数集, 返回是否为新内容
    pub fn insert(&mut self, kind: ParamSetKind, payload: &[u8]) -> MuxResult<bool> {
        if kind == ParamSetKind::Vps && self.codec == CodecKind::Avc {
            return Err(MuxError::MalformedSegment("H.264 码流中不应出现 VPS".into()));
        }
        let list = match kind {
            ParamSetKind::Vps => &mut self.vps,
            ParamSetKind::Sps => &mut self.sps,
            ParamSetKind::Pps => &mut self.pps,
        };
        if list.iter().any(|p| p.as_slice() == payload) {
            return Ok(false);
        }
        let limit = match (self.codec, kind) {
            (CodecKind::Avc, ParamSetKind::Sps) => MAX_AVCC_SPS,
            _ => MAX_PARAM_SETS,
        };
        if list.len() >= limit {
            log::warn!("{kind:?} 数量超过 {limit}, 忽略新参数集");
            return Ok(false);
        }
        list.push(payload.to_vec());
        Ok(true)
    }

    /// 是否已具备构建配置记录所需的全部参数集
    pub fn is_complete(&self) -> bool {
        let base = !self.sps.is_empty() && !self.pps.is_empty();
        match self.codec {
            CodecKind::Avc => base,
            CodecKind::Hevc => base && !self.vps.is_empty(),
        }
    }

    /// 构建 avcC / hvcC 内容
    pub fn decoder_config(&self) -> MuxResult<Vec<u8>> {
        match self.codec {
            CodecKind::Avc => build_avcc_config(&self.sps, &self.pps),
            CodecKind::Hevc => build_hvcc_config(&self.vps, &self.sps, &self.pps),
        }
    }
}
