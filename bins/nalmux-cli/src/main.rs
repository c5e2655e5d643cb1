//! nalmux - Annex B 裸码流封装命令行工具
//!
//! 把 H.264/H.265 裸码流封装为 MP4, 支持普通、顺序写与分片三种布局.

mod logging;

use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use anyhow::{Context, bail};
use clap::Parser;
use log::{info, warn};

use nalmux::{CodecChoice, RemuxOptions, remux_file};
use nalmux_core::Rational;

#[derive(Parser, Debug)]
#[command(name = "nalmux", version, about = "Annex B 裸码流封装为 MP4")]
struct Cli {
    /// 输入裸码流文件 (.264/.h264/.265/.hevc)
    input: Option<PathBuf>,

    /// 输出 MP4 文件, "-" 表示标准输出 (需要 -s)
    output: Option<PathBuf>,

    /// 顺序写: 从不回写已写出的字节
    #[arg(short, long)]
    sequential: bool,

    /// 分片 (fMP4) 布局
    #[arg(short, long)]
    fragmented: bool,

    /// 编码类型 (auto/sniff/h264/h265)
    #[arg(long)]
    codec: Option<CodecChoice>,

    /// 帧率 (如 "25" 或 "30000/1001")
    #[arg(short = 'r', long = "fps")]
    fps: Option<Rational>,

    /// 画面尺寸 (如 "1280x720")
    #[arg(long)]
    size: Option<FrameSize>,

    /// 媒体时间刻度
    #[arg(long)]
    timescale: Option<u32>,

    /// 写入 udta 的文本注释
    #[arg(long)]
    comment: Option<String>,

    /// JSON 配置文件, 命令行参数优先
    #[arg(long)]
    config: Option<PathBuf>,

    /// 完成后在标准输出打印 JSON 报告
    #[arg(long)]
    report: bool,

    /// 覆盖输出文件
    #[arg(short = 'y', long)]
    overwrite: bool,

    /// 日志级别 (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 画面尺寸 `宽x高`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameSize {
    width: u32,
    height: u32,
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("尺寸格式应为 宽x高: '{s}'"))?;
        let width: u32 = w.trim().parse().map_err(|_| format!("无效宽度: '{w}'"))?;
        let height: u32 = h.trim().parse().map_err(|_| format!("无效高度: '{h}'"))?;
        if width == 0 || height == 0 || width > u32::from(u16::MAX) || height > u32::from(u16::MAX)
        {
            return Err(format!("尺寸超出范围: {width}x{height}"));
        }
        Ok(Self { width, height })
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init("nalmux", cli.verbose);

    let Some((input, output)) = positional_paths(&cli) else {
        print_banner();
        return;
    };

    if let Err(e) = run(&cli, input, output) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

/// 输入与输出都给出时返回两者, 否则只打印用法
fn positional_paths(cli: &Cli) -> Option<(&Path, &Path)> {
    Some((cli.input.as_deref()?, cli.output.as_deref()?))
}

fn run(cli: &Cli, input: &Path, output: &Path) -> anyhow::Result<()> {
    let to_stdout = output == Path::new("-");
    if !to_stdout && !cli.overwrite && output.exists() {
        bail!("输出文件已存在 '{}', 使用 -y 覆盖", output.display());
    }

    let opts = build_options(cli)?;
    info!(
        "{} -> {} ({}, {}x{}, {} fps)",
        input.display(),
        output.display(),
        opts.mode(),
        opts.width,
        opts.height,
        opts.frame_rate
    );

    let report = remux_file(input, output, &opts)
        .with_context(|| format!("封装 '{}' 失败", input.display()))?;

    if cli.report {
        if to_stdout {
            warn!("输出为标准输出, 忽略 --report");
        } else {
            let json = serde_json::to_string_pretty(&report).context("序列化报告失败")?;
            println!("{json}");
        }
    }
    Ok(())
}

/// 合并配置文件与命令行参数
fn build_options(cli: &Cli) -> anyhow::Result<RemuxOptions> {
    let mut opts = match &cli.config {
        Some(path) => RemuxOptions::from_json_file(path)
            .with_context(|| format!("加载配置 '{}' 失败", path.display()))?,
        None => RemuxOptions::default(),
    };
    if cli.sequential {
        opts.sequential = true;
    }
    if cli.fragmented {
        opts.fragmented = true;
    }
    if let Some(codec) = cli.codec {
        opts.codec = codec;
    }
    if let Some(fps) = cli.fps {
        opts.frame_rate = fps;
    }
    if let Some(size) = cli.size {
        opts.width = size.width;
        opts.height = size.height;
    }
    if let Some(timescale) = cli.timescale {
        opts.timescale = timescale;
    }
    if let Some(comment) = &cli.comment {
        opts.comment = Some(comment.clone());
    }
    Ok(opts)
}

fn print_banner() {
    println!(
        "nalmux 版本 {} -- Annex B 裸码流封装为 MP4",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("用法: nalmux <输入文件> <输出文件> [选项]");
    println!();
    println!("选项:");
    println!("  -s, --sequential    顺序写, 不回写 (可写到管道)");
    println!("  -f, --fragmented    分片 (fMP4) 布局");
    println!("  --codec <类型>      auto/sniff/h264/h265 (默认按文件名判断)");
    println!("  -r, --fps <帧率>    帧率 (默认 30)");
    println!("  --size <宽x高>      画面尺寸 (默认 352x288)");
    println!("  --timescale <值>    时间刻度 (默认 90000)");
    println!("  --comment <文本>    写入文件注释");
    println!("  --config <文件>     JSON 配置文件");
    println!("  --report            打印 JSON 报告");
    println!("  -y                  覆盖输出文件");
    println!("  -v                  提高日志级别 (NALMUX_LOG 覆盖文件日志)");
    println!();
    println!("示例:");
    println!("  nalmux input.264 output.mp4                 普通 MP4");
    println!("  nalmux input.265 output.mp4 -f              分片 MP4");
    println!("  nalmux input.264 - -s -f > out.mp4          顺序写到标准输出");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_parse() {
        assert_eq!(
            "1280x720".parse::<FrameSize>().unwrap(),
            FrameSize {
                width: 1280,
                height: 720
            }
        );
        assert!("1280".parse::<FrameSize>().is_err());
        assert!("0x720".parse::<FrameSize>().is_err());
        assert!("70000x10".parse::<FrameSize>().is_err());
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "nalmux", "in.265", "out.mp4", "-s", "-f", "--fps", "25", "--size", "640x480",
            "--comment", "hello",
        ]);
        let opts = build_options(&cli).unwrap();
        assert!(opts.sequential && opts.fragmented);
        assert_eq!(opts.frame_rate, Rational::new(25, 1));
        assert_eq!((opts.width, opts.height), (640, 480));
        assert_eq!(opts.comment.as_deref(), Some("hello"));
        assert_eq!(opts.codec, CodecChoice::Auto);
    }

    #[test]
    fn test_missing_output_shows_usage() {
        let cli = Cli::parse_from(["nalmux", "in.264"]);
        assert!(cli.output.is_none());
        assert!(positional_paths(&cli).is_none());

        let cli = Cli::parse_from(["nalmux"]);
        assert!(positional_paths(&cli).is_none());

        let cli = Cli::parse_from(["nalmux", "in.264", "-"]);
        let (input, output) = positional_paths(&cli).unwrap();
        assert_eq!(input, Path::new("in.264"));
        assert_eq!(output, Path::new("-"));
    }

    #[test]
    fn test_codec_flag() {
        let cli = Cli::parse_from(["nalmux", "in.bin", "out.mp4", "--codec", "sniff"]);
        assert_eq!(cli.codec, Some(CodecChoice::Sniff));
    }
}
