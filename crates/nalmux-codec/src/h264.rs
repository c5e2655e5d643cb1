//! H.264 NAL 头与 avcC 配置记录.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! # avcC
//!
//! MP4 中样本以 4 字节长度前缀存储, SPS/PPS 集中放在
//! AVCDecoderConfigurationRecord 里.

use nalmux_core::{MuxError, MuxResult};

/// 样本中 NAL 长度前缀的字节数
pub const NAL_LENGTH_SIZE: u8 = 4;

/// avcC 中 numOfSPS 只有 5 比特
pub const MAX_AVCC_SPS: usize = 31;

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            _ => Self::Unknown(type_id),
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为关键帧 (IDR)
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解析后的 NAL 头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
}

impl NalHeader {
    /// 从 NAL 数据 (含头部字节, 不含起始码) 解析
    pub fn parse(payload: &[u8]) -> MuxResult<Self> {
        let Some(&header) = payload.first() else {
            return Err(MuxError::MalformedSegment("H.264: NAL 单元数据为空".into()));
        };
        let forbidden = (header >> 7) & 1;
        if forbidden != 0 {
            return Err(MuxError::MalformedSegment(format!(
                "H.264: forbidden_zero_bit 非法, header=0x{header:02X}"
            )));
        }
        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
        })
    }
}

/// 切片是否为图像的第一个切片
///
/// slice_header 以 ue(v) 编码的 first_mb_in_slice 开头, 值为 0 时编码为单个 `1` 比特.
pub fn is_first_slice(payload: &[u8]) -> bool {
    payload.get(1).is_some_and(|b| b & 0x80 != 0)
}

/// 构建 AVCDecoderConfigurationRecord
///
/// 参数集不含起始码, 含 NAL 头字节. 长度前缀固定为 [`NAL_LENGTH_SIZE`].
pub fn build_avcc_config(sps_list: &[Vec<u8>], pps_list: &[Vec<u8>]) -> MuxResult<Vec<u8>> {
    let Some(sps0) = sps_list.first() else {
        return Err(MuxError::MalformedSegment(
            "H.264: 构建 avcC 需要至少一个 SPS".into(),
        ));
    };
    if sps0.len() < 4 {
        return Err(MuxError::MalformedSegment(format!(
            "H.264: SPS 数据太短, len={}",
            sps0.len()
        )));
    }
    if pps_list.is_empty() {
        return Err(MuxError::MalformedSegment(
            "H.264: 构建 avcC 需要至少一个 PPS".into(),
        ));
    }
    if sps_list.len() > MAX_AVCC_SPS {
        return Err(MuxError::MalformedSegment(format!(
            "H.264: SPS 数量 {} 超过 avcC 上限 {MAX_AVCC_SPS}",
            sps_list.len()
        )));
    }

    let mut out = vec![
        1,                              // configurationVersion
        sps0[1],                        // profile_idc
        sps0[2],                        // profile_compatibility
        sps0[3],                        // level_idc
        0xFC | (NAL_LENGTH_SIZE - 1),   // lengthSizeMinusOne
        0xE0 | (sps_list.len() as u8),  // numOfSPS
    ];
    for sps in sps_list {
        out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        out.extend_from_slice(sps);
    }

    out.push(pps_list.len() as u8);
    for pps in pps_list {
        out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        out.extend_from_slice(pps);
    }

    // High profile 及以上需要 chroma/bit depth 扩展字段
    if matches!(sps0[1], 100 | 110 | 122 | 144) {
        out.extend_from_slice(&[0xFD, 0xF8, 0xF8, 0x00]);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let h = NalHeader::parse(&[0x67, 0x42]).unwrap();
        assert_eq!(h.nal_type, NalUnitType::Sps);
        assert_eq!(h.ref_idc, 3);

        let h = NalHeader::parse(&[0x65]).unwrap();
        assert!(h.nal_type.is_idr());
        assert!(h.nal_type.is_vcl());

        let h = NalHeader::parse(&[0x06, 0x05]).unwrap();
        assert_eq!(h.nal_type, NalUnitType::Sei);
        assert!(!h.nal_type.is_vcl());
    }

    #[test]
    fn test_parse_header_rejects_forbidden_bit() {
        let err = NalHeader::parse(&[0xE5]).unwrap_err();
        assert!(matches!(err, MuxError::MalformedSegment(_)));
        assert!(NalHeader::parse(&[]).is_err());
    }

    #[test]
    fn test_first_slice() {
        assert!(is_first_slice(&[0x65, 0x88, 0x84]));
        assert!(!is_first_slice(&[0x41, 0x5A, 0x01]));
        assert!(!is_first_slice(&[0x41]));
    }

    #[test]
    fn test_build_avcc_config() {
        let sps = vec![0x67, 0x42, 0xC0, 0x1E, 0xD9];
        let pps = vec![0x68, 0xCE, 0x3C, 0x80];
        let cfg = build_avcc_config(&[sps.clone()], &[pps.clone()]).unwrap();

        assert_eq!(&cfg[..6], &[1, 0x42, 0xC0, 0x1E, 0xFF, 0xE1]);
        assert_eq!(&cfg[6..8], &[0x00, 0x05]);
        assert_eq!(&cfg[8..13], sps.as_slice());
        assert_eq!(cfg[13], 1);
        assert_eq!(&cfg[14..16], &[0x00, 0x04]);
        assert_eq!(&cfg[16..], pps.as_slice());
    }

    #[test]
    fn test_build_avcc_config_high_profile_extension() {
        let sps = vec![0x67, 100, 0x00, 0x28];
        let pps = vec![0x68, 0xEB];
        let cfg = build_avcc_config(&[sps], &[pps]).unwrap();
        assert_eq!(&cfg[cfg.len() - 4..], &[0xFD, 0xF8, 0xF8, 0x00]);
    }

    #[test]
    fn test_build_avcc_config_requires_parameter_sets() {
        assert!(build_avcc_config(&[], &[vec![0x68, 0xCE]]).is_err());
        assert!(build_avcc_config(&[vec![0x67, 0x42, 0xC0, 0x1E]], &[]).is_err());
    }

    #[test]
    fn test_build_avcc_config_sps_count_limit() {
        let sps_list: Vec<Vec<u8>> = (0..=MAX_AVCC_SPS as u8)
            .map(|id| vec![0x67, 0x42, 0xC0, 0x1E, id])
            .collect();
        let pps = vec![vec![0x68, 0xCE]];

        let cfg = build_avcc_config(&sps_list[..MAX_AVCC_SPS], &pps).unwrap();
        assert_eq!(cfg[5], 0xE0 | 31);

        let err = build_avcc_config(&sps_list, &pps).unwrap_err();
        assert!(matches!(err, MuxError::MalformedSegment(_)));
    }
}
