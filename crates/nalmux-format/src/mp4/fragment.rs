//! 分片 (moof) 构建.
//!
//! 每个样本单独成一个分片:
//! ```text
//! moof
//! ├── mfhd (sequence_number)
//! └── traf
//!     ├── tfhd (default-base-is-moof)
//!     ├── tfdt (版本 1, 64 位解码时间)
//!     └── trun (data_offset + duration + size + flags)
//! mdat
//! ```

use bytes::{BufMut, BytesMut};

use super::boxes::{TRACK_ID, mdat_header_len, put_mdat_header, write_box, write_full_box};

/// tfhd: default-base-is-moof
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

/// trun: data-offset | sample-duration | sample-size | sample-flags
const TRUN_FLAGS: u32 = 0x00_0001 | 0x00_0100 | 0x00_0200 | 0x00_0400;

/// 同步样本: sample_depends_on = 2
const SAMPLE_FLAGS_SYNC: u32 = 0x0200_0000;

/// 非同步样本: sample_depends_on = 1, sample_is_non_sync_sample = 1
const SAMPLE_FLAGS_NON_SYNC: u32 = 0x0101_0000;

/// 一个分片的描述
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment {
    /// mfhd 序号, 从 1 开始
    pub sequence: u32,
    /// 本分片第一个样本的解码时间
    pub base_decode_time: u64,
    pub duration: u32,
    pub size: u32,
    pub sync: bool,
}

/// 构建 moof + mdat 头, 调用方随后写出样本数据
pub(crate) fn build_fragment_header(fragment: &Fragment) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    let mut data_offset_field = 0;

    write_box(&mut buf, b"moof", |b| {
        write_full_box(b, b"mfhd", 0, 0, |b| b.put_u32(fragment.sequence));
        write_box(b, b"traf", |b| {
            write_full_box(b, b"tfhd", 0, TFHD_DEFAULT_BASE_IS_MOOF, |b| {
                b.put_u32(TRACK_ID);
            });
            write_full_box(b, b"tfdt", 1, 0, |b| b.put_u64(fragment.base_decode_time));
            write_full_box(b, b"trun", 0, TRUN_FLAGS, |b| {
                // sample_count
                b.put_u32(1);
                data_offset_field = b.len();
                // data_offset, moof 写完后回填
                b.put_i32(0);
                b.put_u32(fragment.duration);
                b.put_u32(fragment.size);
                b.put_u32(if fragment.sync {
                    SAMPLE_FLAGS_SYNC
                } else {
                    SAMPLE_FLAGS_NON_SYNC
                });
            });
        });
    });

    // 数据紧跟在 mdat 头之后, 偏移相对 moof 起点
    let payload_len = u64::from(fragment.size);
    let data_offset = buf.len() as u64 + mdat_header_len(payload_len);
    buf[data_offset_field..data_offset_field + 4]
        .copy_from_slice(&(data_offset as i32).to_be_bytes());

    put_mdat_header(&mut buf, payload_len);
    buf
}

#[cfg(test)]
mod tests {
    use byteorder::{BigEndian, ByteOrder};

    use super::*;

    fn fragment(sync: bool) -> Fragment {
        Fragment {
            sequence: 3,
            base_decode_time: 6000,
            duration: 3000,
            size: 42,
            sync,
        }
    }

    #[test]
    fn test_fragment_layout() {
        let buf = build_fragment_header(&fragment(true));
        let moof_size = BigEndian::read_u32(&buf[0..4]) as usize;
        assert_eq!(&buf[4..8], b"moof");
        // moof 之后紧跟 8 字节 mdat 头
        assert_eq!(buf.len(), moof_size + 8);
        assert_eq!(&buf[moof_size + 4..moof_size + 8], b"mdat");
        assert_eq!(BigEndian::read_u32(&buf[moof_size..]), 50);

        // mfhd: size(4) type(4) vf(4) seq(4)
        assert_eq!(&buf[12..16], b"mfhd");
        assert_eq!(BigEndian::read_u32(&buf[20..24]), 3);
    }

    #[test]
    fn test_trun_data_offset_points_at_payload() {
        let buf = build_fragment_header(&fragment(false));
        let trun = buf.windows(4).position(|w| w == b"trun").unwrap() - 4;
        // size(4) type(4) vf(4) sample_count(4) data_offset(4)
        let data_offset = BigEndian::read_i32(&buf[trun + 16..]) as usize;
        assert_eq!(data_offset, buf.len());
        assert_eq!(BigEndian::read_u32(&buf[trun + 20..]), 3000);
        assert_eq!(BigEndian::read_u32(&buf[trun + 24..]), 42);
        assert_eq!(BigEndian::read_u32(&buf[trun + 28..]), SAMPLE_FLAGS_NON_SYNC);
    }

    #[test]
    fn test_tfdt_decode_time() {
        let buf = build_fragment_header(&fragment(true));
        let tfdt = buf.windows(4).position(|w| w == b"tfdt").unwrap() - 4;
        assert_eq!(buf[tfdt + 8], 1);
        assert_eq!(BigEndian::read_u64(&buf[tfdt + 12..]), 6000);
    }
}
