//! 码流编码类型识别.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use nalmux_core::MuxError;

use crate::annexb::AnnexBSegmenter;

/// 嗅探时最多检查的 NAL 单元数
const SNIFF_MAX_UNITS: usize = 16;

/// 视频编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CodecKind {
    /// H.264 / AVC
    #[default]
    Avc,
    /// H.265 / HEVC
    Hevc,
}

impl CodecKind {
    /// 按文件名猜测编码类型
    ///
    /// 只检查文件名部分, 不看目录: 文件名包含 `265` 或 `hevc` 时为 HEVC, 否则为 AVC.
    /// 匹配不区分大小写, 因此 `clip.HEVC` 也判为 HEVC, 而 `h265/clip.264` 判为 AVC.
    pub fn from_filename(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.contains("265") || name.contains("hevc") {
            Self::Hevc
        } else {
            Self::Avc
        }
    }

    /// 按 NAL 头嗅探编码类型
    ///
    /// 逐个检查前若干个 NAL 单元, 返回第一个只符合一种编码的判断.
    /// 所有单元都有歧义时返回 `None`.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        for slice in AnnexBSegmenter::new(data).take(SNIFF_MAX_UNITS) {
            let payload = slice.payload();
            match (looks_like_avc(payload), looks_like_hevc(payload)) {
                (true, false) => return Some(Self::Avc),
                (false, true) => return Some(Self::Hevc),
                _ => {}
            }
        }
        None
    }

    /// 短名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Avc => "h264",
            Self::Hevc => "h265",
        }
    }

    /// MP4 样本描述四字符码
    pub fn sample_entry(&self) -> &'static [u8; 4] {
        match self {
            Self::Avc => b"avc1",
            Self::Hevc => b"hvc1",
        }
    }

    /// 解码器配置记录 box 类型
    pub fn config_box(&self) -> &'static [u8; 4] {
        match self {
            Self::Avc => b"avcC",
            Self::Hevc => b"hvcC",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avc => write!(f, "H.264/AVC"),
            Self::Hevc => write!(f, "H.265/HEVC"),
        }
    }
}

impl FromStr for CodecKind {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "264" => Ok(Self::Avc),
            "h265" | "hevc" | "265" => Ok(Self::Hevc),
            other => Err(MuxError::InvalidArgument(format!(
                "未知编码类型: {other}"
            ))),
        }
    }
}

/// 头字节是否像 H.264 NAL
///
/// SEI/AUD/填充数据的 nal_ref_idc 必须为 0.
fn looks_like_avc(payload: &[u8]) -> bool {
    let Some(&header) = payload.first() else {
        return false;
    };
    if header & 0x80 != 0 {
        return false;
    }
    let ref_idc = (header >> 5) & 0x03;
    match header & 0x1F {
        1 | 5 | 7 | 8 => true,
        6 | 9 | 12 => ref_idc == 0,
        _ => false,
    }
}

/// 头字节是否像 H.265 基础层 NAL
fn looks_like_hevc(payload: &[u8]) -> bool {
    if payload.len() < 2 || payload[0] & 0x80 != 0 {
        return false;
    }
    let nal_type = (payload[0] >> 1) & 0x3F;
    let layer_id = ((payload[0] & 1) << 5) | (payload[1] >> 3);
    let temporal_id_plus1 = payload[1] & 0x07;
    if layer_id != 0 || temporal_id_plus1 == 0 {
        return false;
    }
    matches!(nal_type, 0..=9 | 16..=21 | 32..=40)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_filename() {
        assert_eq!(CodecKind::from_filename(Path::new("in.264")), CodecKind::Avc);
        assert_eq!(CodecKind::from_filename(Path::new("foo.h265")), CodecKind::Hevc);
        assert_eq!(
            CodecKind::from_filename(Path::new("/tmp/clip_HEVC.bin")),
            CodecKind::Hevc
        );
        assert_eq!(CodecKind::from_filename(Path::new("video.h264")), CodecKind::Avc);
    }

    #[test]
    fn test_from_filename_ignores_directory() {
        assert_eq!(
            CodecKind::from_filename(Path::new("/data/hevc/clip.264")),
            CodecKind::Avc
        );
        assert_eq!(CodecKind::from_filename(Path::new("h265/clip.264")), CodecKind::Avc);
        assert_eq!(CodecKind::from_filename(Path::new("clip.HEVC")), CodecKind::Hevc);
    }

    #[test]
    fn test_sniff_avc() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E, //
            0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80,
        ];
        assert_eq!(CodecKind::sniff(&data), Some(CodecKind::Avc));
    }

    #[test]
    fn test_sniff_hevc() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x0C, 0x01, // VPS
            0x00, 0x00, 0x00, 0x01, 0x42, 0x01, 0x01, 0x01, // SPS
        ];
        assert_eq!(CodecKind::sniff(&data), Some(CodecKind::Hevc));
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(CodecKind::sniff(&[0xFF, 0xFF, 0xFF, 0xFF]), None);
        assert_eq!(CodecKind::sniff(&[]), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("H264".parse::<CodecKind>().unwrap(), CodecKind::Avc);
        assert_eq!("hevc".parse::<CodecKind>().unwrap(), CodecKind::Hevc);
        assert!("vp9".parse::<CodecKind>().is_err());
    }

    #[test]
    fn test_fourcc() {
        assert_eq!(CodecKind::Avc.sample_entry(), b"avc1");
        assert_eq!(CodecKind::Hevc.config_box(), b"hvcC");
    }
}
