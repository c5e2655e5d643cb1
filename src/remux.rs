//! 封装编排.
//!
//! 打开封装会话, 声明轨道, 逐个喂入分割出的 NAL 单元, 最后关闭会话.
//! 任何一步失败都立即中止 (不尝试关闭会话), 错误带上失败的阶段.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info, trace, warn};
use nalmux_codec::{AnnexBSegmenter, CodecKind};
use nalmux_core::{MP4_TIMESCALE, MuxError, MuxResult, Rational, SampleClock};
use nalmux_format::{FileSink, Mp4Session, MuxMode, MuxSession, OutputSink, PipeSink};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 默认画面宽度 (占位, 不解析 SPS)
pub const DEFAULT_WIDTH: u32 = 352;

/// 默认画面高度
pub const DEFAULT_HEIGHT: u32 = 288;

/// 默认帧率
pub const DEFAULT_FRAME_RATE: Rational = Rational::new(30, 1);

// ============================================================
// 编码类型选择
// ============================================================

/// 编码类型的确定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecChoice {
    /// 按输入文件名猜测 (`265`/`hevc` 为 HEVC)
    #[default]
    Auto,
    /// 按码流中的 NAL 头判断, 失败时退回文件名
    Sniff,
    /// 强制 H.264
    #[serde(rename = "h264", alias = "avc")]
    Avc,
    /// 强制 H.265
    #[serde(rename = "h265", alias = "hevc")]
    Hevc,
}

impl CodecChoice {
    /// 确定实际编码类型
    pub fn resolve(self, path: Option<&Path>, data: &[u8]) -> CodecKind {
        let by_name = || path.map(CodecKind::from_filename).unwrap_or_default();
        match self {
            Self::Avc => CodecKind::Avc,
            Self::Hevc => CodecKind::Hevc,
            Self::Auto => by_name(),
            Self::Sniff => CodecKind::sniff(data).unwrap_or_else(|| {
                let fallback = by_name();
                warn!("无法从码流判断编码类型, 按文件名使用 {fallback}");
                fallback
            }),
        }
    }
}

impl fmt::Display for CodecChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Sniff => write!(f, "sniff"),
            Self::Avc => write!(f, "h264"),
            Self::Hevc => write!(f, "h265"),
        }
    }
}

impl FromStr for CodecChoice {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sniff" => Ok(Self::Sniff),
            other => other.parse::<CodecKind>().map(|kind| match kind {
                CodecKind::Avc => Self::Avc,
                CodecKind::Hevc => Self::Hevc,
            }),
        }
    }
}

// ============================================================
// 选项
// ============================================================

/// 封装选项, 可从 JSON 加载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemuxOptions {
    /// 只向前写
    pub sequential: bool,
    /// 分片布局
    pub fragmented: bool,
    /// 编码类型
    pub codec: CodecChoice,
    /// 恒定帧率
    pub frame_rate: Rational,
    /// 媒体时间刻度
    pub timescale: u32,
    /// 画面宽度
    pub width: u32,
    /// 画面高度
    pub height: u32,
    /// 文本注释 (写入 udta)
    pub comment: Option<String>,
}

impl Default for RemuxOptions {
    fn default() -> Self {
        Self {
            sequential: false,
            fragmented: false,
            codec: CodecChoice::Auto,
            frame_rate: DEFAULT_FRAME_RATE,
            timescale: MP4_TIMESCALE,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            comment: None,
        }
    }
}

impl RemuxOptions {
    /// 从 JSON 文件加载, 缺省字段取默认值
    pub fn from_json_file(path: &Path) -> MuxResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MuxError::InvalidArgument(format!("无法读取配置文件 {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// 从 JSON 文本解析
    pub fn from_json(text: &str) -> MuxResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| MuxError::InvalidArgument(format!("配置文件格式错误: {e}")))
    }

    /// 输出布局
    pub fn mode(&self) -> MuxMode {
        MuxMode::new(self.sequential, self.fragmented)
    }
}

// ============================================================
// 错误与报告
// ============================================================

/// 编排阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemuxPhase {
    /// 读取输入
    Input,
    /// 打开输出与会话
    Open,
    /// 声明轨道
    Init,
    /// 喂入 NAL 单元
    Feed,
    /// 关闭会话
    Close,
}

impl fmt::Display for RemuxPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Open => write!(f, "open"),
            Self::Init => write!(f, "init"),
            Self::Feed => write!(f, "feed"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// 带阶段信息的封装错误
#[derive(Debug, Error)]
#[error("{phase} 阶段失败")]
pub struct RemuxError {
    /// 失败的阶段
    pub phase: RemuxPhase,
    /// 底层错误
    pub source: MuxError,
}

impl RemuxError {
    /// 创建错误
    pub fn new(phase: RemuxPhase, source: MuxError) -> Self {
        Self { phase, source }
    }

    /// 生成 `map_err` 用的转换函数
    pub fn at(phase: RemuxPhase) -> impl FnOnce(MuxError) -> Self {
        move |source| Self::new(phase, source)
    }
}

/// 封装结果汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemuxReport {
    /// 编码类型
    pub codec: CodecKind,
    /// 输出布局
    pub mode: String,
    /// 分割出的 NAL 单元数
    pub units: u64,
    /// 写出的样本数
    pub samples: u64,
    /// 被丢弃的 NAL 单元数
    pub dropped: u64,
    /// 作为噪声跳过的字节数
    pub skipped_bytes: u64,
    /// 样本数据字节数
    pub bytes: u64,
    /// 总时长 (ticks)
    pub duration_ticks: u64,
    /// 时间刻度
    pub timescale: u32,
    /// 总时长 (秒)
    pub duration_seconds: f64,
}

// ============================================================
// 编排
// ============================================================

/// 把内存中的 Annex B 码流封装到 `sink`
///
/// `sink` 可以按值传入, 也可以传入 `&mut S` 保留所有权.
pub fn remux_annex_b<S: OutputSink>(
    input: &[u8],
    sink: S,
    codec: CodecKind,
    opts: &RemuxOptions,
) -> Result<RemuxReport, RemuxError> {
    let mode = opts.mode();
    let mut session = Mp4Session::with_timescale(sink, opts.timescale);
    session.open(mode).map_err(RemuxError::at(RemuxPhase::Open))?;

    let clock = SampleClock::from_frame_rate(opts.timescale, opts.frame_rate)
        .map_err(RemuxError::at(RemuxPhase::Init))?;
    session
        .init_track(opts.width, opts.height, codec)
        .map_err(RemuxError::at(RemuxPhase::Init))?;
    if let Some(text) = &opts.comment {
        session
            .set_comment(text)
            .map_err(RemuxError::at(RemuxPhase::Init))?;
    }
    debug!(
        "封装开始: {codec}, 模式={mode}, {}x{}, 样本时长={}",
        opts.width,
        opts.height,
        clock.duration_ticks()
    );

    let duration = clock.duration_ticks();
    let mut segmenter = AnnexBSegmenter::new(input);
    let mut units = 0u64;
    for nal in segmenter.by_ref() {
        trace!("NAL #{units}: [{}, {}), len={}", nal.offset(), nal.end(), nal.len());
        session
            .write_nal(nal.as_bytes(), duration)
            .map_err(RemuxError::at(RemuxPhase::Feed))?;
        units += 1;
    }
    let skipped_bytes = segmenter.skipped_bytes() as u64;
    if skipped_bytes > 0 {
        debug!("跳过 {skipped_bytes} 字节无效数据");
    }

    session.close().map_err(RemuxError::at(RemuxPhase::Close))?;

    let stats = session.stats();
    let report = RemuxReport {
        codec,
        mode: mode.to_string(),
        units,
        samples: stats.samples,
        dropped: stats.dropped,
        skipped_bytes,
        bytes: stats.bytes,
        duration_ticks: stats.duration,
        timescale: clock.timescale(),
        duration_seconds: clock.ticks_to_seconds(stats.duration),
    };
    info!(
        "封装完成: {} 个 NAL, {} 个样本, 丢弃 {}, 时长 {:.3}s",
        report.units,
        report.samples,
        report.dropped,
        report.duration_seconds
    );
    Ok(report)
}

/// 读取输入文件并封装到 `output` (`-` 表示标准输出, 需要顺序写模式)
pub fn remux_file(
    input: &Path,
    output: &Path,
    opts: &RemuxOptions,
) -> Result<RemuxReport, RemuxError> {
    let data = std::fs::read(input).map_err(|e| {
        RemuxError::new(
            RemuxPhase::Input,
            MuxError::InputUnavailable(format!("无法读取 {}: {e}", input.display())),
        )
    })?;
    let codec = opts.codec.resolve(Some(input), &data);
    info!("输入: {} ({} 字节, {codec})", input.display(), data.len());

    if output == Path::new("-") {
        let stdout = io::stdout();
        remux_annex_b(&data, PipeSink::new(stdout.lock()), codec, opts)
    } else {
        let sink = FileSink::create(output).map_err(RemuxError::at(RemuxPhase::Open))?;
        remux_annex_b(&data, sink, codec, opts)
    }
}
