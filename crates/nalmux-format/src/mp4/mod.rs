//! MP4 封装会话.
//!
//! 接收逐个 NAL 单元, 组装成样本后按三种布局之一写出:
//!
//! | 模式 | 布局 |
//! |------|------|
//! | 普通 | `ftyp`, `mdat` (64 位大小占位), 样本, `moov`; 关闭时回填 mdat 大小 |
//! | 顺序写 | `ftyp`, 每个样本一个 `mdat`, 关闭时写 `moov`; 从不回写 |
//! | 分片 | `ftyp`, 首个样本写出时写 `moov` (含 `mvex`), 之后每个样本一组 `moof` + `mdat` |
//!
//! 样本内 NAL 以 4 字节大端长度前缀存储, 参数集进入 avcC/hvcC.

mod boxes;
mod fragment;

use byteorder::{BigEndian, ByteOrder};
use bytes::BytesMut;
use log::{debug, warn};
use nalmux_codec::annexb::trim_trailing_zeros;
use nalmux_codec::{CodecKind, NalRole, ParameterSets, classify_nal, start_code_len};
use nalmux_core::{MP4_TIMESCALE, MuxError, MuxResult};

use crate::io::OutputSink;
use crate::session::{MuxMode, MuxSession, MuxStats, SessionState};

use boxes::{MovieLayout, SampleEntry, TrackInfo, build_ftyp, build_moov, put_mdat_header};
use fragment::{Fragment, build_fragment_header};

/// 普通布局的 mdat 头长度 (size=1 + largesize)
const MDAT_LARGE_HEADER_LEN: u64 = 16;

/// 视频轨道状态
struct TrackState {
    codec: CodecKind,
    width: u32,
    height: u32,
    params: ParameterSets,
    /// 是否已提示过参数集缺失
    warned_missing_params: bool,
}

/// 正在组装的样本
struct PendingSample {
    /// 长度前缀格式的 NAL 数据
    data: Vec<u8>,
    duration: u32,
    sync: bool,
}

/// 分片布局状态
#[derive(Default)]
struct FragmentState {
    init_written: bool,
    sequence: u32,
    decode_time: u64,
    /// mehd fragment_duration 字段的绝对偏移
    mehd_offset: Option<u64>,
}

/// MP4 封装会话
///
/// 输出接口可以按值传入, 也可以传入 `&mut S` 由调用方保留所有权.
pub struct Mp4Session<S: OutputSink> {
    sink: S,
    state: SessionState,
    mode: MuxMode,
    timescale: u32,
    track: Option<TrackState>,
    comment: Option<String>,
    pending: Option<PendingSample>,
    /// 等待附着到下一个图像的 NAL (长度前缀格式)
    prefix: Vec<u8>,
    /// 已写出样本的表项 (分片布局不记录)
    samples: Vec<SampleEntry>,
    /// 下一次追加写入的位置
    cursor: u64,
    /// 已写出区域的最大末尾
    high_water: u64,
    mdat_start: u64,
    fragments: FragmentState,
    stats: MuxStats,
}

impl<S: OutputSink> Mp4Session<S> {
    /// 使用 90 kHz 时间刻度创建会话
    pub fn new(sink: S) -> Self {
        Self::with_timescale(sink, MP4_TIMESCALE)
    }

    /// 指定媒体时间刻度创建会话
    pub fn with_timescale(sink: S, timescale: u32) -> Self {
        Self {
            sink,
            state: SessionState::Uninitialized,
            mode: MuxMode::MONOLITHIC,
            timescale,
            track: None,
            comment: None,
            pending: None,
            prefix: Vec::new(),
            samples: Vec::new(),
            cursor: 0,
            high_water: 0,
            mdat_start: 0,
            fragments: FragmentState::default(),
            stats: MuxStats::default(),
        }
    }

    /// 消耗会话, 取回输出接口
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn ensure_open(&self, op: &str) -> MuxResult<()> {
        if self.state != SessionState::Open {
            return Err(MuxError::ContractViolation(format!(
                "{op} 需要会话处于 Open 状态, 当前状态: {}",
                self.state
            )));
        }
        Ok(())
    }

    // ========================
    // 写入
    // ========================

    /// 带写入保护的定位写入
    fn write_at(&mut self, offset: u64, data: &[u8]) -> MuxResult<()> {
        if self.mode.sequential && offset < self.high_water {
            return Err(MuxError::ContractViolation(format!(
                "顺序写模式不允许回写: offset={offset}, 已写到 {}",
                self.high_water
            )));
        }
        self.sink.write_at(offset, data)?;
        self.high_water = self.high_water.max(offset + data.len() as u64);
        Ok(())
    }

    /// 在当前末尾追加
    fn append(&mut self, data: &[u8]) -> MuxResult<()> {
        self.write_at(self.cursor, data)?;
        self.cursor += data.len() as u64;
        Ok(())
    }

    /// 写出文件头, 任何失败都视为输出不可用
    fn write_header(&mut self) -> MuxResult<()> {
        let ftyp = build_ftyp();
        self.append(&ftyp)?;
        if !self.mode.sequential && !self.mode.fragmented {
            self.mdat_start = self.cursor;
            let mut header = [0u8; MDAT_LARGE_HEADER_LEN as usize];
            BigEndian::write_u32(&mut header[0..4], 1);
            header[4..8].copy_from_slice(b"mdat");
            BigEndian::write_u64(&mut header[8..16], MDAT_LARGE_HEADER_LEN);
            self.append(&header)?;
        }
        Ok(())
    }

    // ========================
    // 样本组装
    // ========================

    fn params_complete(&self) -> bool {
        self.track.as_ref().is_some_and(|t| t.params.is_complete())
    }

    /// 写出正在组装的样本
    fn flush_pending(&mut self) -> MuxResult<()> {
        let Some(sample) = self.pending.take() else {
            return Ok(());
        };
        let size = u32::try_from(sample.data.len()).map_err(|_| {
            MuxError::MalformedSegment(format!("样本过大: {} 字节", sample.data.len()))
        })?;

        if self.mode.fragmented {
            self.write_fragment(&sample, size)?;
        } else {
            if self.mode.sequential {
                let mut header = BytesMut::with_capacity(16);
                put_mdat_header(&mut header, u64::from(size));
                self.append(&header)?;
            }
            let offset = self.cursor;
            self.append(&sample.data)?;
            self.samples.push(SampleEntry {
                offset,
                size,
                duration: sample.duration,
                sync: sample.sync,
            });
        }

        self.stats.samples += 1;
        self.stats.bytes += u64::from(size);
        self.stats.duration += u64::from(sample.duration);
        Ok(())
    }

    fn track_info(&self) -> MuxResult<Option<TrackInfo>> {
        let Some(track) = &self.track else {
            return Ok(None);
        };
        if !track.params.is_complete() {
            return Ok(None);
        }
        Ok(Some(TrackInfo {
            codec: track.codec,
            width: track.width,
            height: track.height,
            timescale: self.timescale,
            decoder_config: track.params.decoder_config()?,
        }))
    }

    // ========================
    // 分片布局
    // ========================

    /// 写出初始化段 (moov + mvex)
    fn write_init_segment(&mut self) -> MuxResult<()> {
        let track = self.track_info()?;
        let with_mehd = !self.mode.sequential;
        let (moov, mehd_field) = build_moov(&MovieLayout {
            timescale: self.timescale,
            track: track.as_ref(),
            samples: &[],
            fragmented: true,
            with_mehd,
            comment: self.comment.as_deref(),
        });
        let moov_pos = self.cursor;
        self.append(&moov)?;
        self.fragments.mehd_offset = mehd_field.map(|field| moov_pos + field as u64);
        self.fragments.init_written = true;
        debug!("MP4: 写入初始化段, moov={} 字节", moov.len());
        Ok(())
    }

    fn write_fragment(&mut self, sample: &PendingSample, size: u32) -> MuxResult<()> {
        if !self.fragments.init_written {
            self.write_init_segment()?;
        }
        self.fragments.sequence += 1;
        let header = build_fragment_header(&Fragment {
            sequence: self.fragments.sequence,
            base_decode_time: self.fragments.decode_time,
            duration: sample.duration,
            size,
            sync: sample.sync,
        });
        self.append(&header)?;
        self.append(&sample.data)?;
        self.fragments.decode_time += u64::from(sample.duration);
        Ok(())
    }

    // ========================
    // 关闭
    // ========================

    fn finalize(&mut self) -> MuxResult<()> {
        self.flush_pending()?;
        if !self.prefix.is_empty() {
            debug!("MP4: 丢弃 {} 字节未附着到图像的 NAL", self.prefix.len());
            self.prefix.clear();
        }

        if self.mode.fragmented {
            if !self.fragments.init_written {
                self.write_init_segment()?;
            }
            if let Some(pos) = self.fragments.mehd_offset {
                let mut field = [0u8; 8];
                BigEndian::write_u64(&mut field, self.fragments.decode_time);
                self.write_at(pos, &field)?;
            }
        } else {
            let mdat_end = self.cursor;
            let track = self.track_info()?;
            let (moov, _) = build_moov(&MovieLayout {
                timescale: self.timescale,
                track: track.as_ref(),
                samples: &self.samples,
                fragmented: false,
                with_mehd: false,
                comment: self.comment.as_deref(),
            });
            self.append(&moov)?;
            if !self.mode.sequential {
                // 回填 mdat largesize
                let mut field = [0u8; 8];
                BigEndian::write_u64(&mut field, mdat_end - self.mdat_start);
                self.write_at(self.mdat_start + 8, &field)?;
            }
            debug!(
                "MP4: 写入 moov, {} 个样本, moov={} 字节",
                self.samples.len(),
                moov.len()
            );
        }

        self.sink.flush()?;
        Ok(())
    }
}

/// 追加一个 4 字节长度前缀的 NAL
fn put_length_prefixed(buf: &mut Vec<u8>, payload: &[u8]) {
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
}

impl<S: OutputSink> MuxSession for Mp4Session<S> {
    fn open(&mut self, mode: MuxMode) -> MuxResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(MuxError::ContractViolation(format!(
                "open 只能调用一次, 当前状态: {}",
                self.state
            )));
        }
        if self.timescale == 0 {
            return Err(MuxError::InvalidArgument("时间刻度不能为 0".into()));
        }
        if mode.needs_rewind() && !self.sink.is_seekable() {
            return Err(MuxError::OutputUnavailable(format!(
                "{mode} 布局需要可定位的输出"
            )));
        }

        self.mode = mode;
        self.write_header().map_err(|e| {
            MuxError::OutputUnavailable(format!("写入文件头失败: {e}"))
        })?;
        self.state = SessionState::Open;
        debug!("MP4: 打开会话, 模式={mode}, 时间刻度={}", self.timescale);
        Ok(())
    }

    fn init_track(&mut self, width: u32, height: u32, codec: CodecKind) -> MuxResult<()> {
        self.ensure_open("init_track")?;
        if self.track.is_some() {
            return Err(MuxError::ContractViolation("init_track 只能调用一次".into()));
        }
        let max = u32::from(u16::MAX);
        if width == 0 || height == 0 || width > max || height > max {
            return Err(MuxError::InvalidArgument(format!(
                "无效的画面尺寸: {width}x{height}"
            )));
        }
        self.track = Some(TrackState {
            codec,
            width,
            height,
            params: ParameterSets::new(codec),
            warned_missing_params: false,
        });
        debug!("MP4: 视频轨道 {codec} {width}x{height}");
        Ok(())
    }

    fn set_comment(&mut self, text: &str) -> MuxResult<()> {
        if self.state == SessionState::Closed {
            return Err(MuxError::ContractViolation("会话已关闭, 无法设置注释".into()));
        }
        if self.fragments.init_written {
            return Err(MuxError::ContractViolation(
                "moov 已写出, 无法设置注释".into(),
            ));
        }
        self.comment = Some(text.to_string());
        Ok(())
    }

    fn write_nal(&mut self, nal: &[u8], duration: u32) -> MuxResult<()> {
        self.ensure_open("write_nal")?;
        let Some(codec) = self.track.as_ref().map(|t| t.codec) else {
            return Err(MuxError::ContractViolation(
                "write_nal 之前需要调用 init_track".into(),
            ));
        };
        if duration == 0 {
            return Err(MuxError::InvalidArgument("样本时长不能为 0".into()));
        }

        self.stats.nal_units += 1;
        let prefix = start_code_len(nal);
        if prefix == 0 {
            self.stats.dropped += 1;
            debug!("MP4: 丢弃没有起始码的数据, {} 字节", nal.len());
            return Ok(());
        }
        let payload = trim_trailing_zeros(&nal[prefix..]);
        if payload.is_empty() {
            self.stats.dropped += 1;
            debug!("MP4: 丢弃空 NAL 单元");
            return Ok(());
        }

        match classify_nal(codec, payload)? {
            NalRole::ParameterSet(kind) => {
                let init_written = self.fragments.init_written;
                if let Some(track) = self.track.as_mut() {
                    let added = track.params.insert(kind, payload)?;
                    if added && init_written {
                        warn!("MP4: 初始化段已写出, 新的 {kind:?} 不会进入 moov");
                    }
                }
            }
            NalRole::Picture { sync, first_slice } => {
                if !self.params_complete() {
                    self.stats.dropped += 1;
                    self.prefix.clear();
                    if let Some(track) = self.track.as_mut() {
                        if !track.warned_missing_params {
                            warn!("MP4: 参数集不完整, 丢弃图像切片");
                            track.warned_missing_params = true;
                        }
                    }
                    return Ok(());
                }
                if first_slice || self.pending.is_none() {
                    self.flush_pending()?;
                    let mut data = std::mem::take(&mut self.prefix);
                    put_length_prefixed(&mut data, payload);
                    self.pending = Some(PendingSample {
                        data,
                        duration,
                        sync,
                    });
                } else if let Some(pending) = self.pending.as_mut() {
                    pending.data.append(&mut self.prefix);
                    put_length_prefixed(&mut pending.data, payload);
                }
            }
            NalRole::Prefix => put_length_prefixed(&mut self.prefix, payload),
            NalRole::Suffix => match self.pending.as_mut() {
                Some(pending) => put_length_prefixed(&mut pending.data, payload),
                None => {
                    self.stats.dropped += 1;
                    debug!("MP4: 没有当前图像, 丢弃后缀 NAL");
                }
            },
            NalRole::Discard => {}
        }
        Ok(())
    }

    fn close(&mut self) -> MuxResult<()> {
        self.ensure_open("close")?;
        let result = self.finalize();
        self.state = SessionState::Closed;
        if result.is_ok() {
            debug!(
                "MP4: 关闭会话, {} 个样本, 丢弃 {} 个 NAL",
                self.stats.samples, self.stats.dropped
            );
        }
        result
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn stats(&self) -> MuxStats {
        self.stats
    }
}
