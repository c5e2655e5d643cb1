//! Annex B 字节流分割.
//!
//! Annex B 使用起始码 (start code) 分隔 NAL 单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! 分割器把整个输入视为一个缓冲区, 逐个产出 NAL 切片. 切片是对输入的借用,
//! 包含自身的起始码以及下一个起始码之前的全部字节 (含尾随 0 字节).
//!
//! # 边界规则
//!
//! ```text
//! 00 00 01 65 AA BB | 00 00 01 41 CC | 00 00 00 01 41 DD
//! ^ offset 0          ^ offset 6       ^ offset 11
//! ```
//!
//! - 扫描从当前单元起始码之后开始, 遇到 3 字节或 4 字节起始码即为边界.
//! - 剩余不足 4 字节时停止扫描, 其余字节全部归入当前单元.
//! - 长度小于 4 的单元视为噪声, 只前进 1 字节后重新定位.
//! - 输入开头不是起始码时, 扫描从第 2 个字节开始, 首个起始码之前的
//!   前导片段作为一个单元产出 (长度不足 4 时被跳过).

use std::iter::FusedIterator;

/// 有效 NAL 单元的最小长度 (字节, 含起始码)
pub const MIN_NAL_UNIT_SIZE: usize = 4;

/// 3 字节起始码
const START_CODE_3: [u8; 3] = [0x00, 0x00, 0x01];

/// 4 字节起始码
const START_CODE_4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// 返回 `data` 开头的起始码长度 (4, 3 或 0)
pub fn start_code_len(data: &[u8]) -> usize {
    if data.starts_with(&START_CODE_4) {
        4
    } else if data.starts_with(&START_CODE_3) {
        3
    } else {
        0
    }
}

/// 计算 `data` 开头的 NAL 单元长度
///
/// 返回值是下一个起始码的位置; 找不到时返回 `data.len()`.
/// 返回值小于 [`MIN_NAL_UNIT_SIZE`] 时调用方应只前进 1 字节.
pub fn nal_unit_len(data: &[u8]) -> usize {
    // 两种起始码都从第 3 字节开始扫描, 4 字节起始码的末字节 0x01 不会被误判
    let mut pos = if start_code_len(data) > 0 { 3 } else { 1 };
    while data.len().saturating_sub(pos) > 3 {
        let window = &data[pos..];
        if window.starts_with(&START_CODE_3) || window.starts_with(&START_CODE_4) {
            return pos;
        }
        pos += 1;
    }
    data.len()
}

/// 去除 NAL 数据尾部的 0 字节 (trailing_zero_8bits)
pub fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

/// 移除 emulation prevention 字节
///
/// NAL 数据中 `00 00 03` 序列的 `03` 是防竞争字节, 需要在解析 RBSP 前移除.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        if b == 0x00 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    out
}

// ============================================================
// NAL 切片
// ============================================================

/// 输入缓冲区中的一个 NAL 单元 (借用)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalSlice<'a> {
    offset: usize,
    data: &'a [u8],
}

impl<'a> NalSlice<'a> {
    /// 单元在输入缓冲区中的起始偏移
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 单元结束位置 (不含)
    pub fn end(&self) -> usize {
        self.offset + self.data.len()
    }

    /// 单元长度 (含起始码)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 分割器产出的切片总是至少 [`MIN_NAL_UNIT_SIZE`] 字节
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 原始字节 (含起始码与尾随 0 字节)
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// 起始码长度, 前导片段为 0
    pub fn start_code_len(&self) -> usize {
        start_code_len(self.data)
    }

    /// NAL 数据 (去掉起始码与尾随 0 字节, 从 NAL 头开始)
    pub fn payload(&self) -> &'a [u8] {
        trim_trailing_zeros(&self.data[self.start_code_len()..])
    }
}

// ============================================================
// 分割器
// ============================================================

/// Annex B 分割器
///
/// 按顺序产出 NAL 切片, 相邻切片首尾相接, 不重叠.
#[derive(Debug, Clone)]
pub struct AnnexBSegmenter<'a> {
    data: &'a [u8],
    pos: usize,
    skipped: usize,
}

impl<'a> AnnexBSegmenter<'a> {
    /// 创建分割器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            skipped: 0,
        }
    }

    /// 作为噪声跳过的字节数
    pub fn skipped_bytes(&self) -> usize {
        self.skipped
    }
}

impl<'a> Iterator for AnnexBSegmenter<'a> {
    type Item = NalSlice<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let rest = &self.data[self.pos..];
            let len = nal_unit_len(rest);
            if len < MIN_NAL_UNIT_SIZE {
                self.pos += 1;
                self.skipped += 1;
                continue;
            }
            let slice = NalSlice {
                offset: self.pos,
                data: &rest[..len],
            };
            self.pos += len;
            return Some(slice);
        }
        None
    }
}

impl FusedIterator for AnnexBSegmenter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(data: &[u8]) -> Vec<(usize, usize)> {
        AnnexBSegmenter::new(data)
            .map(|s| (s.offset(), s.len()))
            .collect()
    }

    #[test]
    fn test_start_code_len() {
        assert_eq!(start_code_len(&[0, 0, 0, 1, 0x67]), 4);
        assert_eq!(start_code_len(&[0, 0, 1, 0x67]), 3);
        assert_eq!(start_code_len(&[0, 0, 2]), 0);
        assert_eq!(start_code_len(&[0, 0]), 0);
    }

    #[test]
    fn test_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x01, 0x65, 0xAA, 0xBB, // 3 字节起始码
            0x00, 0x00, 0x01, 0x41, 0xCC, // 3 字节起始码
            0x00, 0x00, 0x00, 0x01, 0x41, 0xDD, // 4 字节起始码
        ];
        assert_eq!(collect(&data), vec![(0, 6), (6, 5), (11, 6)]);

        let units: Vec<_> = AnnexBSegmenter::new(&data).collect();
        assert_eq!(units[0].payload(), &[0x65, 0xAA, 0xBB]);
        assert_eq!(units[1].payload(), &[0x41, 0xCC]);
        assert_eq!(units[2].start_code_len(), 4);
        assert_eq!(units[2].payload(), &[0x41, 0xDD]);
    }

    #[test]
    fn test_units_cover_input_without_overlap() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, //
            0x00, 0x00, 0x01, 0x68, 0xCE, 0x38, 0x80, //
            0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x21, 0xA0,
        ];
        let units: Vec<_> = AnnexBSegmenter::new(&data).collect();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].offset(), 0);
        for pair in units.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset(), "切片应首尾相接");
        }
        assert_eq!(units[2].end(), data.len());
    }

    #[test]
    fn test_empty_input() {
        assert!(collect(&[]).is_empty());
    }

    #[test]
    fn test_short_buffer_without_start_code_yields_nothing() {
        let mut seg = AnnexBSegmenter::new(&[0x12, 0x34, 0x56]);
        assert!(seg.next().is_none());
        assert_eq!(seg.skipped_bytes(), 3);
    }

    #[test]
    fn test_buffer_without_start_code_is_one_unit() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(collect(&data), vec![(0, 5)]);
    }

    #[test]
    fn test_leading_fragment_shorter_than_minimum_is_skipped() {
        let data = [0xAB, 0xCD, 0x00, 0x00, 0x01, 0x65, 0x11, 0x22];
        let units: Vec<_> = AnnexBSegmenter::new(&data).collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].offset(), 2);
        assert_eq!(units[0].payload(), &[0x65, 0x11, 0x22]);
    }

    #[test]
    fn test_leading_fragment_is_emitted() {
        let data = [0xAB, 0xCD, 0xEF, 0x10, 0x00, 0x00, 0x01, 0x41, 0x9A];
        assert_eq!(collect(&data), vec![(0, 4), (4, 5)]);
    }

    #[test]
    fn test_trailing_bytes_after_last_start_code() {
        // 末尾只剩 3 字节时不再检测起始码
        let data = [0x00, 0x00, 0x01, 0x65, 0x11, 0x00, 0x00, 0x01];
        assert_eq!(collect(&data), vec![(0, 8)]);
    }

    #[test]
    fn test_empty_unit_is_skipped() {
        let data = [
            0x00, 0x00, 0x01, // 空单元
            0x00, 0x00, 0x01, 0x41, 0x9A, 0x02,
        ];
        let units: Vec<_> = AnnexBSegmenter::new(&data).collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].payload(), &[0x41, 0x9A, 0x02]);
    }

    #[test]
    fn test_concatenated_units_round_trip() {
        let payloads: [&[u8]; 4] = [
            &[0x67, 0x42, 0xC0, 0x1E],
            &[0x68, 0xCE, 0x3C, 0x80],
            &[0x65, 0x88, 0x80, 0x40, 0x01],
            &[0x41, 0x9A],
        ];
        let mut data = Vec::new();
        for (i, p) in payloads.iter().enumerate() {
            if i % 2 == 0 {
                data.extend_from_slice(&START_CODE_4);
            } else {
                data.extend_from_slice(&START_CODE_3);
            }
            data.extend_from_slice(p);
        }

        let got: Vec<&[u8]> = AnnexBSegmenter::new(&data).map(|s| s.payload()).collect();
        assert_eq!(got, payloads.to_vec());
    }

    #[test]
    fn test_trailing_zeros_stay_in_slice() {
        let data = [
            0x00, 0x00, 0x01, 0x65, 0x11, 0x00, 0x00, //
            0x00, 0x00, 0x01, 0x41, 0x22,
        ];
        let units: Vec<_> = AnnexBSegmenter::new(&data).collect();
        assert_eq!(units.len(), 2);
        // 尾随 0 属于第一个切片的字节, 但不属于 payload
        assert_eq!(units[0].payload(), &[0x65, 0x11]);
        assert_eq!(units[1].payload(), &[0x41, 0x22]);
        assert_eq!(units[0].end(), units[1].offset());
    }

    #[test]
    fn test_remove_emulation_prevention() {
        let data = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_trim_trailing_zeros() {
        assert_eq!(trim_trailing_zeros(&[0x65, 0x00, 0x00]), &[0x65]);
        assert!(trim_trailing_zeros(&[0x00, 0x00]).is_empty());
    }
}
