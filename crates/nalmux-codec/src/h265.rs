//! H.265/HEVC NAL 头与 hvcC 配置记录.
//!
//! HEVC NAL 头部为 2 字节:
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)

use nalmux_core::{MuxError, MuxResult};

use crate::annexb::remove_emulation_prevention;
use crate::h264::NAL_LENGTH_SIZE;

/// general_profile_tier_level 的字节数
const GENERAL_PTL_SIZE: usize = 12;

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    /// VPS (Video Parameter Set)
    Vps,
    /// SPS (Sequence Parameter Set)
    Sps,
    /// PPS (Picture Parameter Set)
    Pps,
    /// AUD (Access Unit Delimiter)
    Aud,
    /// EOS (End of Sequence)
    Eos,
    /// EOB (End of Bitstream)
    Eob,
    /// FD (Filler Data)
    FillerData,
    /// PREFIX_SEI
    PrefixSei,
    /// SUFFIX_SEI
    SuffixSei,
    /// 其余 VCL 类型 (TSA/STSA/RADL/RASL 与保留值)
    OtherVcl(u8),
    /// 未知类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            2..=31 => Self::OtherVcl(id),
            _ => Self::Unknown(id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::FillerData => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::OtherVcl(id) | Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        self.type_id() < 32
    }

    /// 是否为 IRAP (Intra Random Access Point) NAL, 含保留的 22/23
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=23)
    }
}

/// HEVC NAL 头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcNalHeader {
    /// NAL 类型
    pub nal_type: HevcNalUnitType,
    /// nuh_layer_id
    pub layer_id: u8,
    /// nuh_temporal_id_plus1
    pub temporal_id_plus1: u8,
}

impl HevcNalHeader {
    /// 从 NAL 数据 (含 2 字节头, 不含起始码) 解析
    pub fn parse(payload: &[u8]) -> MuxResult<Self> {
        if payload.len() < 2 {
            return Err(MuxError::MalformedSegment(format!(
                "HEVC: NAL 数据太短, len={}",
                payload.len()
            )));
        }
        if payload[0] & 0x80 != 0 {
            return Err(MuxError::MalformedSegment(format!(
                "HEVC: forbidden_zero_bit 非法, header=0x{:02X}{:02X}",
                payload[0], payload[1]
            )));
        }
        Ok(Self {
            nal_type: HevcNalUnitType::from_type_id((payload[0] >> 1) & 0x3F),
            layer_id: ((payload[0] & 1) << 5) | (payload[1] >> 3),
            temporal_id_plus1: payload[1] & 0x07,
        })
    }
}

/// 切片段是否为图像的第一个切片段 (first_slice_segment_in_pic_flag)
pub fn is_first_slice(payload: &[u8]) -> bool {
    payload.get(2).is_some_and(|b| b & 0x80 != 0)
}

/// 构建 HEVCDecoderConfigurationRecord
///
/// profile/tier/level 与时域层信息取自第一个 SPS. 色度格式与位深按
/// 4:2:0 8bit 填写.
pub fn build_hvcc_config(
    vps_list: &[Vec<u8>],
    sps_list: &[Vec<u8>],
    pps_list: &[Vec<u8>],
) -> MuxResult<Vec<u8>> {
    let Some(sps0) = sps_list.first() else {
        return Err(MuxError::MalformedSegment(
            "HEVC: 构建 hvcC 需要至少一个 SPS".into(),
        ));
    };
    if vps_list.is_empty() || pps_list.is_empty() {
        return Err(MuxError::MalformedSegment(
            "HEVC: 构建 hvcC 需要 VPS 与 PPS".into(),
        ));
    }

    // SPS RBSP: vps_id(4) | max_sub_layers_minus1(3) | temporal_id_nesting(1) | profile_tier_level
    let rbsp = remove_emulation_prevention(sps0.get(2..).unwrap_or_default());
    if rbsp.len() < 1 + GENERAL_PTL_SIZE {
        return Err(MuxError::MalformedSegment(format!(
            "HEVC: SPS 数据太短, rbsp_len={}",
            rbsp.len()
        )));
    }
    let num_temporal_layers = ((rbsp[0] >> 1) & 0x07) + 1;
    let temporal_id_nested = rbsp[0] & 0x01;

    let mut buf = Vec::new();
    // configurationVersion = 1
    buf.push(1);
    // general_profile_space .. general_level_idc
    buf.extend_from_slice(&rbsp[1..1 + GENERAL_PTL_SIZE]);
    // min_spatial_segmentation_idc (reserved 4 bits + 12 bits)
    buf.extend_from_slice(&[0xF0, 0x00]);
    // parallelismType
    buf.push(0xFC);
    // chromaFormat = 1 (4:2:0)
    buf.push(0xFD);
    // bitDepthLumaMinus8 / bitDepthChromaMinus8
    buf.push(0xF8);
    buf.push(0xF8);
    // avgFrameRate
    buf.extend_from_slice(&[0, 0]);
    // constantFrameRate(2) | numTemporalLayers(3) | temporalIdNested(1) | lengthSizeMinusOne(2)
    buf.push((num_temporal_layers << 3) | (temporal_id_nested << 2) | (NAL_LENGTH_SIZE - 1));

    let arrays: [(u8, &[Vec<u8>]); 3] = [(32, vps_list), (33, sps_list), (34, pps_list)];
    buf.push(arrays.len() as u8);
    for (nal_type, list) in arrays {
        // array_completeness = 1
        buf.push(0x80 | nal_type);
        buf.extend_from_slice(&(list.len() as u16).to_be_bytes());
        for nal in list {
            buf.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            buf.extend_from_slice(nal);
        }
    }

    Ok(buf)
}
