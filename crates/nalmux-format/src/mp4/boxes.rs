//! MP4 box 构建函数.
//!
//! # moov 结构
//! ```text
//! moov
//! ├── mvhd
//! ├── trak
//! │   ├── tkhd
//! │   └── mdia
//! │       ├── mdhd
//! │       ├── hdlr
//! │       └── minf
//! │           ├── vmhd
//! │           ├── dinf → dref
//! │           └── stbl
//! │               ├── stsd (avc1/hvc1 + avcC/hvcC)
//! │               ├── stts
//! │               ├── stsc
//! │               ├── stsz
//! │               ├── stco / co64
//! │               └── stss
//! ├── mvex (仅分片布局)
//! │   ├── mehd
//! │   └── trex
//! └── udta → meta → ilst → ©cmt (可选)
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use nalmux_codec::CodecKind;

/// 唯一视频轨道的 track_ID
pub(crate) const TRACK_ID: u32 = 1;

/// 单位矩阵 (3x3, 每个元素 4 字节, 固定点)
const UNITY_MATRIX: [u8; 36] = [
    0x00, 0x01, 0x00, 0x00, // a = 1.0
    0x00, 0x00, 0x00, 0x00, // b = 0
    0x00, 0x00, 0x00, 0x00, // u = 0
    0x00, 0x00, 0x00, 0x00, // c = 0
    0x00, 0x01, 0x00, 0x00, // d = 1.0
    0x00, 0x00, 0x00, 0x00, // v = 0
    0x00, 0x00, 0x00, 0x00, // x = 0
    0x00, 0x00, 0x00, 0x00, // y = 0
    0x40, 0x00, 0x00, 0x00, // w = 1.0 (fixed 2.30)
];

/// 视频轨道描述
#[derive(Debug, Clone)]
pub(crate) struct TrackInfo {
    pub codec: CodecKind,
    pub width: u32,
    pub height: u32,
    pub timescale: u32,
    /// avcC / hvcC 内容
    pub decoder_config: Vec<u8>,
}

/// 每个 sample 的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SampleEntry {
    /// 文件中的绝对偏移
    pub offset: u64,
    /// 数据大小
    pub size: u32,
    /// 时长 (ticks)
    pub duration: u32,
    /// 是否为同步样本
    pub sync: bool,
}

/// 构建 moov 所需的全部信息
#[derive(Debug)]
pub(crate) struct MovieLayout<'a> {
    pub timescale: u32,
    /// 没有解码器配置时不写 trak
    pub track: Option<&'a TrackInfo>,
    pub samples: &'a [SampleEntry],
    pub fragmented: bool,
    /// 分片布局是否写 mehd (关闭时回填)
    pub with_mehd: bool,
    pub comment: Option<&'a str>,
}

impl MovieLayout<'_> {
    fn duration(&self) -> u64 {
        self.samples.iter().map(|s| u64::from(s.duration)).sum()
    }
}

// ============================================================
// 通用写入
// ============================================================

/// 写一个 box: 先写占位大小, 内容写完后回填
pub(crate) fn write_box(buf: &mut BytesMut, fourcc: &[u8; 4], body: impl FnOnce(&mut BytesMut)) {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(fourcc);
    body(buf);
    let size = (buf.len() - start) as u32;
    BigEndian::write_u32(&mut buf[start..start + 4], size);
}

/// 写一个 full box (version + flags)
pub(crate) fn write_full_box(
    buf: &mut BytesMut,
    fourcc: &[u8; 4],
    version: u8,
    flags: u32,
    body: impl FnOnce(&mut BytesMut),
) {
    write_box(buf, fourcc, |b| {
        b.put_u32((u32::from(version) << 24) | (flags & 0x00FF_FFFF));
        body(b);
    });
}

/// mdat 头的长度
pub(crate) fn mdat_header_len(payload_len: u64) -> u64 {
    if payload_len + 8 > u64::from(u32::MAX) {
        16
    } else {
        8
    }
}

/// 写 mdat 头, 超过 32 位时使用 largesize
pub(crate) fn put_mdat_header(buf: &mut BytesMut, payload_len: u64) {
    if mdat_header_len(payload_len) == 16 {
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(payload_len + 16);
    } else {
        buf.put_u32((payload_len + 8) as u32);
        buf.put_slice(b"mdat");
    }
}

// ============================================================
// 顶层 box
// ============================================================

/// ftyp box
pub(crate) fn build_ftyp() -> BytesMut {
    // major_brand=isom, minor_version=0x200, compatible=[isom, iso2, iso6, mp41]
    let brands: [&[u8; 4]; 4] = [b"isom", b"iso2", b"iso6", b"mp41"];
    let mut buf = BytesMut::with_capacity(32);
    write_box(&mut buf, b"ftyp", |b| {
        b.put_slice(b"isom");
        b.put_u32(0x200);
        for brand in brands {
            b.put_slice(brand);
        }
    });
    buf
}

/// moov box
///
/// 返回 moov 数据与 mehd 中 fragment_duration 字段相对 moov 起点的偏移.
pub(crate) fn build_moov(layout: &MovieLayout<'_>) -> (BytesMut, Option<usize>) {
    let duration = layout.duration();
    let mut buf = BytesMut::with_capacity(1024 + layout.samples.len() * 16);
    let mut mehd_field = None;

    write_box(&mut buf, b"moov", |b| {
        put_mvhd(b, layout.timescale, duration);
        if let Some(track) = layout.track {
            put_trak(b, track, layout.samples, duration);
        }
        if layout.fragmented {
            mehd_field = put_mvex(b, layout.with_mehd);
        }
        if let Some(text) = layout.comment {
            put_udta_comment(b, text);
        }
    });

    (buf, mehd_field)
}

/// mvhd box, 时长超过 32 位时使用版本 1
fn put_mvhd(buf: &mut BytesMut, timescale: u32, duration: u64) {
    let version = u8::from(duration > u64::from(u32::MAX));
    write_full_box(buf, b"mvhd", version, 0, |b| {
        if version == 1 {
            // creation_time(8) + modification_time(8)
            b.put_bytes(0, 16);
            b.put_u32(timescale);
            b.put_u64(duration);
        } else {
            b.put_bytes(0, 8);
            b.put_u32(timescale);
            b.put_u32(duration as u32);
        }
        // rate (1.0)
        b.put_u32(0x0001_0000);
        // volume (1.0)
        b.put_u16(0x0100);
        // reserved (10 bytes)
        b.put_bytes(0, 10);
        b.put_slice(&UNITY_MATRIX);
        // pre_defined (24 bytes)
        b.put_bytes(0, 24);
        // next_track_ID
        b.put_u32(TRACK_ID + 1);
    });
}

fn put_trak(buf: &mut BytesMut, track: &TrackInfo, samples: &[SampleEntry], duration: u64) {
    write_box(buf, b"trak", |b| {
        put_tkhd(b, track, duration);
        write_box(b, b"mdia", |b| {
            put_mdhd(b, track.timescale, duration);
            put_hdlr(b, b"vide", b"VideoHandler\0");
            write_box(b, b"minf", |b| {
                put_vmhd(b);
                put_dinf(b);
                put_stbl(b, track, samples);
            });
        });
    });
}

/// tkhd box, flag 0x03 = track_enabled | track_in_movie
fn put_tkhd(buf: &mut BytesMut, track: &TrackInfo, duration: u64) {
    let version = u8::from(duration > u64::from(u32::MAX));
    write_full_box(buf, b"tkhd", version, 0x03, |b| {
        if version == 1 {
            b.put_bytes(0, 16);
            b.put_u32(TRACK_ID);
            b.put_u32(0);
            b.put_u64(duration);
        } else {
            b.put_bytes(0, 8);
            b.put_u32(TRACK_ID);
            b.put_u32(0);
            b.put_u32(duration as u32);
        }
        // reserved(8) + layer(2) + alternate_group(2) + volume(2) + reserved(2)
        b.put_bytes(0, 16);
        b.put_slice(&UNITY_MATRIX);
        // width / height (16.16 fixed point)
        b.put_u32(track.width << 16);
        b.put_u32(track.height << 16);
    });
}

fn put_mdhd(buf: &mut BytesMut, timescale: u32, duration: u64) {
    let version = u8::from(duration > u64::from(u32::MAX));
    write_full_box(buf, b"mdhd", version, 0, |b| {
        if version == 1 {
            b.put_bytes(0, 16);
            b.put_u32(timescale);
            b.put_u64(duration);
        } else {
            b.put_bytes(0, 8);
            b.put_u32(timescale);
            b.put_u32(duration as u32);
        }
        // language 'und'
        b.put_u16(0x55C4);
        b.put_u16(0);
    });
}

fn put_hdlr(buf: &mut BytesMut, handler_type: &[u8; 4], name: &[u8]) {
    write_full_box(buf, b"hdlr", 0, 0, |b| {
        // pre_defined
        b.put_u32(0);
        b.put_slice(handler_type);
        // reserved(12)
        b.put_bytes(0, 12);
        b.put_slice(name);
    });
}

/// vmhd box (视频媒体头)
fn put_vmhd(buf: &mut BytesMut) {
    write_full_box(buf, b"vmhd", 0, 1, |b| {
        // graphicsmode(2) + opcolor(6)
        b.put_bytes(0, 8);
    });
}

/// dinf + dref, 一个自包含的 'url ' 条目
fn put_dinf(buf: &mut BytesMut) {
    write_box(buf, b"dinf", |b| {
        write_full_box(b, b"dref", 0, 0, |b| {
            b.put_u32(1);
            write_full_box(b, b"url ", 0, 1, |_| {});
        });
    });
}

fn put_stbl(buf: &mut BytesMut, track: &TrackInfo, samples: &[SampleEntry]) {
    write_box(buf, b"stbl", |b| {
        put_stsd(b, track);
        put_stts(b, samples);
        put_stsc(b, samples);
        put_stsz(b, samples);
        put_stco(b, samples);
        put_stss(b, samples);
    });
}

/// stsd box, 单个视频 sample entry
fn put_stsd(buf: &mut BytesMut, track: &TrackInfo) {
    write_full_box(buf, b"stsd", 0, 0, |b| {
        // entry_count = 1
        b.put_u32(1);
        write_box(b, track.codec.sample_entry(), |b| {
            // reserved(6) + data_reference_index(2)
            b.put_bytes(0, 6);
            b.put_u16(1);
            // pre_defined(2) + reserved(2) + pre_defined(12)
            b.put_bytes(0, 16);
            b.put_u16(track.width as u16);
            b.put_u16(track.height as u16);
            // horizresolution / vertresolution (72 dpi)
            b.put_u32(0x0048_0000);
            b.put_u32(0x0048_0000);
            b.put_u32(0);
            // frame_count = 1
            b.put_u16(1);
            // compressorname (32 bytes)
            b.put_bytes(0, 32);
            // depth = 0x0018, pre_defined = -1
            b.put_u16(0x0018);
            b.put_i16(-1);
            write_box(b, track.codec.config_box(), |b| {
                b.put_slice(&track.decoder_config);
            });
        });
    });
}

/// stts box, 连续相同的 duration 合并
fn put_stts(buf: &mut BytesMut, samples: &[SampleEntry]) {
    let entries = rle_durations(samples);
    write_full_box(buf, b"stts", 0, 0, |b| {
        b.put_u32(entries.len() as u32);
        for (count, duration) in &entries {
            b.put_u32(*count);
            b.put_u32(*duration);
        }
    });
}

/// stsc box, 每个 sample 一个 chunk
fn put_stsc(buf: &mut BytesMut, samples: &[SampleEntry]) {
    write_full_box(buf, b"stsc", 0, 0, |b| {
        if samples.is_empty() {
            b.put_u32(0);
            return;
        }
        b.put_u32(1);
        // first_chunk, samples_per_chunk, sample_description_index
        b.put_u32(1);
        b.put_u32(1);
        b.put_u32(1);
    });
}

fn put_stsz(buf: &mut BytesMut, samples: &[SampleEntry]) {
    write_full_box(buf, b"stsz", 0, 0, |b| {
        // sample_size = 0 (可变)
        b.put_u32(0);
        b.put_u32(samples.len() as u32);
        for sample in samples {
            b.put_u32(sample.size);
        }
    });
}

/// stco box, 偏移超过 32 位时改用 co64
fn put_stco(buf: &mut BytesMut, samples: &[SampleEntry]) {
    let needs_64bit = samples.iter().any(|s| s.offset > u64::from(u32::MAX));
    let fourcc = if needs_64bit { b"co64" } else { b"stco" };
    write_full_box(buf, fourcc, 0, 0, |b| {
        b.put_u32(samples.len() as u32);
        for sample in samples {
            if needs_64bit {
                b.put_u64(sample.offset);
            } else {
                b.put_u32(sample.offset as u32);
            }
        }
    });
}

/// stss box (同步样本, 从 1 开始编号)
fn put_stss(buf: &mut BytesMut, samples: &[SampleEntry]) {
    let sync: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.sync)
        .map(|(i, _)| i as u32 + 1)
        .collect();
    write_full_box(buf, b"stss", 0, 0, |b| {
        b.put_u32(sync.len() as u32);
        for index in sync {
            b.put_u32(index);
        }
    });
}

/// mvex box, 返回 mehd fragment_duration 字段相对 `buf` 起点的偏移
fn put_mvex(buf: &mut BytesMut, with_mehd: bool) -> Option<usize> {
    let mut mehd_field = None;
    write_box(buf, b"mvex", |b| {
        if with_mehd {
            write_full_box(b, b"mehd", 1, 0, |b| {
                mehd_field = Some(b.len());
                // fragment_duration, 关闭时回填
                b.put_u64(0);
            });
        }
        write_full_box(b, b"trex", 0, 0, |b| {
            b.put_u32(TRACK_ID);
            // default_sample_description_index
            b.put_u32(1);
            // default_sample_duration / size / flags
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(0);
        });
    });
    mehd_field
}

/// iTunes 风格注释: udta → meta → hdlr(mdir) + ilst → ©cmt → data
fn put_udta_comment(buf: &mut BytesMut, text: &str) {
    write_box(buf, b"udta", |b| {
        write_full_box(b, b"meta", 0, 0, |b| {
            write_full_box(b, b"hdlr", 0, 0, |b| {
                b.put_u32(0);
                b.put_slice(b"mdir");
                b.put_slice(b"appl");
                b.put_bytes(0, 8);
                b.put_u8(0);
            });
            write_box(b, b"ilst", |b| {
                write_box(b, b"\xA9cmt", |b| {
                    write_box(b, b"data", |b| {
                        // type = 1 (UTF-8)
                        b.put_u32(1);
                        // locale
                        b.put_u32(0);
                        b.put_slice(text.as_bytes());
                    });
                });
            });
        });
    });
}

/// RLE 压缩 duration 列表
fn rle_durations(samples: &[SampleEntry]) -> Vec<(u32, u32)> {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    for sample in samples {
        match entries.last_mut() {
            Some((count, dur)) if *dur == sample.duration => *count += 1,
            _ => entries.push((1, sample.duration)),
        }
    }
    entries
}
