//! NAL 单元在 MP4 样本组装中的角色.
//!
//! 封装器不关心具体 NAL 类型, 只需要知道一个单元是参数集、图像切片,
//! 还是附着在图像前后的辅助数据.

use nalmux_core::MuxResult;

use crate::codec_id::CodecKind;
use crate::h264::{self, NalHeader, NalUnitType};
use crate::h265::{self, HevcNalHeader, HevcNalUnitType};

/// 参数集种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSetKind {
    /// 视频参数集 (仅 HEVC)
    Vps,
    /// 序列参数集
    Sps,
    /// 图像参数集
    Pps,
}

/// NAL 单元角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalRole {
    /// 参数集, 进入解码器配置记录
    ParameterSet(ParamSetKind),
    /// 图像切片
    Picture {
        /// 是否为同步样本 (IDR/IRAP)
        sync: bool,
        /// 是否为图像的第一个切片
        first_slice: bool,
    },
    /// 附着到下一个图像 (SEI 等)
    Prefix,
    /// 附着到当前图像 (后缀 SEI, 序列结束等)
    Suffix,
    /// 丢弃 (AUD, 填充数据, 增强层)
    Discard,
}

/// 按编码类型识别 NAL 角色
///
/// `payload` 不含起始码, 从 NAL 头开始.
pub fn classify_nal(codec: CodecKind, payload: &[u8]) -> MuxResult<NalRole> {
    match codec {
        CodecKind::Avc => classify_avc(payload),
        CodecKind::Hevc => classify_hevc(payload),
    }
}

fn classify_avc(payload: &[u8]) -> MuxResult<NalRole> {
    let header = NalHeader::parse(payload)?;
    let role = match header.nal_type {
        NalUnitType::Sps => NalRole::ParameterSet(ParamSetKind::Sps),
        NalUnitType::Pps => NalRole::ParameterSet(ParamSetKind::Pps),
        NalUnitType::Slice | NalUnitType::SliceIdr | NalUnitType::SliceDpa => NalRole::Picture {
            sync: header.nal_type.is_idr(),
            first_slice: h264::is_first_slice(payload),
        },
        // B/C 分区没有 first_mb_in_slice
        NalUnitType::SliceDpb | NalUnitType::SliceDpc => NalRole::Picture {
            sync: false,
            first_slice: false,
        },
        NalUnitType::Aud | NalUnitType::FillerData => NalRole::Discard,
        NalUnitType::EndOfSequence | NalUnitType::EndOfStream => NalRole::Suffix,
        _ => NalRole::Prefix,
    };
    Ok(role)
}

fn classify_hevc(payload: &[u8]) -> MuxResult<NalRole> {
    let header = HevcNalHeader::parse(payload)?;
    if header.layer_id != 0 {
        return Ok(NalRole::Discard);
    }
    let role = match header.nal_type {
        HevcNalUnitType::Vps => NalRole::ParameterSet(ParamSetKind::Vps),
        HevcNalUnitType::Sps => NalRole::ParameterSet(ParamSetKind::Sps),
        HevcNalUnitType::Pps => NalRole::ParameterSet(ParamSetKind::Pps),
        t if t.is_vcl() => NalRole::Picture {
            sync: t.is_irap(),
            first_slice: h265::is_first_slice(payload),
        },
        HevcNalUnitType::Aud | HevcNalUnitType::FillerData => NalRole::Discard,
        HevcNalUnitType::SuffixSei | HevcNalUnitType::Eos | HevcNalUnitType::Eob => {
            NalRole::Suffix
        }
        _ => NalRole::Prefix,
    };
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_avc() {
        let avc = |p: &[u8]| classify_nal(CodecKind::Avc, p).unwrap();
        assert_eq!(avc(&[0x67, 0x42]), NalRole::ParameterSet(ParamSetKind::Sps));
        assert_eq!(avc(&[0x68, 0xCE]), NalRole::ParameterSet(ParamSetKind::Pps));
        assert_eq!(
            avc(&[0x65, 0x88]),
            NalRole::Picture {
                sync: true,
                first_slice: true
            }
        );
        assert_eq!(
            avc(&[0x41, 0x5A]),
            NalRole::Picture {
                sync: false,
                first_slice: false
            }
        );
        assert_eq!(avc(&[0x09, 0xF0]), NalRole::Discard);
        assert_eq!(avc(&[0x06, 0x05]), NalRole::Prefix);
        assert_eq!(avc(&[0x0A]), NalRole::Suffix);
    }

    #[test]
    fn test_classify_hevc() {
        let hevc = |p: &[u8]| classify_nal(CodecKind::Hevc, p).unwrap();
        assert_eq!(hevc(&[0x40, 0x01]), NalRole::ParameterSet(ParamSetKind::Vps));
        assert_eq!(hevc(&[0x42, 0x01]), NalRole::ParameterSet(ParamSetKind::Sps));
        assert_eq!(hevc(&[0x44, 0x01]), NalRole::ParameterSet(ParamSetKind::Pps));
        assert_eq!(
            hevc(&[0x26, 0x01, 0xAF]),
            NalRole::Picture {
                sync: true,
                first_slice: true
            }
        );
        assert_eq!(
            hevc(&[0x02, 0x01, 0x40]),
            NalRole::Picture {
                sync: false,
                first_slice: false
            }
        );
        assert_eq!(hevc(&[0x46, 0x01]), NalRole::Discard);
        assert_eq!(hevc(&[0x4E, 0x01]), NalRole::Prefix);
        assert_eq!(hevc(&[0x50, 0x01]), NalRole::Suffix);
        // 增强层
        assert_eq!(hevc(&[0x02, 0x09, 0x80]), NalRole::Discard);
    }

    #[test]
    fn test_classify_malformed() {
        assert!(classify_nal(CodecKind::Avc, &[0x80]).is_err());
        assert!(classify_nal(CodecKind::Hevc, &[0x02]).is_err());
    }
}
