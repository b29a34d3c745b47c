//! ying-probe - Bink 文件信息探测工具
//!
//! 输出头部、流和帧偏移表信息, 可选地以不限速方式完整解码一遍并给出逐帧校验值.

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ying::driver::{
    AudioSink, DriverConfig, ManualClock, PresentationSink, StepOutcome, StreamDriver,
};
use ying::logging::LoggingConfig;
use ying_codec::{AudioFrame, VideoFrame};
use ying_core::MediaType;
use ying_format::{BinkHeader, Demuxer, IoContext, Stream, StreamParams};

/// Ying Bink 文件探测工具
#[derive(Parser, Debug)]
#[command(name = "ying-probe", version, about = "纯 Rust Bink 文件探测工具")]
struct Cli {
    /// 输入文件路径
    input: PathBuf,

    /// 显示帧偏移表
    #[arg(long)]
    show_frames: bool,

    /// 完整解码一遍, 输出帧数、采样数与逐帧校验值
    #[arg(long)]
    decode: bool,

    /// JSON 配置文件 (包含 logging 与 driver 两部分)
    #[arg(long)]
    config: Option<PathBuf>,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 提高日志级别 (-v 为 debug, -vv 为 trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 配置文件内容
#[derive(Debug, Default, Deserialize)]
struct ProbeConfig {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    driver: DriverConfig,
}

// ============================================================
// JSON 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    format: FormatInfo,
    streams: Vec<StreamInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<Vec<FrameInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decode: Option<DecodeSummary>,
}

/// 头部信息
#[derive(Serialize)]
struct FormatInfo {
    filename: String,
    codec_tag: String,
    revision: String,
    width: u32,
    height: u32,
    frame_rate: String,
    frame_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    has_alpha: bool,
    largest_frame_size: u32,
    file_size: u64,
    nb_streams: usize,
}

/// 流信息
#[derive(Serialize)]
struct StreamInfo {
    index: usize,
    codec_type: String,
    codec_name: String,
    time_base: String,
    // 视频字段
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_rate: Option<String>,
    // 音频字段
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u32>,
    nb_frames: u64,
}

/// 帧偏移表中的一项
#[derive(Serialize)]
struct FrameInfo {
    index: u32,
    offset: u64,
    size: u64,
    keyframe: bool,
}

/// 解码统计
#[derive(Serialize, Default)]
struct DecodeSummary {
    frames_decoded: u64,
    audio_blocks: u64,
    audio_samples: u64,
    audio_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    checksums: Vec<FrameChecksum>,
}

/// 单帧 BGRA 数据的校验值
#[derive(Serialize)]
struct FrameChecksum {
    index: i64,
    keyframe: bool,
    crc32: String,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProbeConfig::default(),
    };
    init_logging(cli, config.logging.clone());

    let mut io = IoContext::open_read(&cli.input)
        .with_context(|| format!("无法打开文件 '{}'", cli.input.display()))?;
    let mut demuxer = ying_format::BinkDemuxer::new();
    demuxer.open(&mut io).context("无法解析 Bink 头部")?;
    let header = demuxer.header().context("解封装器未返回头部")?.clone();

    let format = build_format_info(
        &cli.input,
        &header,
        demuxer.streams().len(),
        demuxer.duration(),
    );
    let streams = demuxer.streams().iter().map(build_stream_info).collect();
    let frames = cli.show_frames.then(|| {
        header
            .frames
            .iter()
            .map(|f| FrameInfo {
                index: f.index,
                offset: f.offset,
                size: f.size,
                keyframe: f.keyframe,
            })
            .collect()
    });
    let decode = if cli.decode {
        Some(decode_all(&cli.input, &header, config.driver)?)
    } else {
        None
    };

    let output = ProbeOutput {
        format,
        streams,
        frames,
        decode,
    };
    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("序列化 JSON 失败")?;
        println!("{json}");
    } else {
        print_text(&output);
    }

    if let Some(err) = output.decode.as_ref().and_then(|d| d.error.as_ref()) {
        anyhow::bail!("解码中止: {err}");
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<ProbeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("解析配置文件失败, path={}", path.display()))
}

/// 初始化日志; 失败时仅提示, 不影响探测
fn init_logging(cli: &Cli, mut logging: LoggingConfig) {
    match cli.verbose {
        0 => {}
        1 => logging.level = "debug".into(),
        _ => logging.level = "trace".into(),
    }
    // 标准输出留给探测结果
    logging.console = false;
    if let Err(err) = ying::logging::init(&logging) {
        eprintln!("警告: 日志初始化失败: {err:#}");
    }
}

fn build_format_info(
    path: &Path,
    header: &BinkHeader,
    nb_streams: usize,
    duration: Option<f64>,
) -> FormatInfo {
    FormatInfo {
        filename: path.display().to_string(),
        codec_tag: String::from_utf8_lossy(&header.codec_tag).into_owned(),
        revision: header.revision().to_string(),
        width: header.width,
        height: header.height,
        frame_rate: header.frame_rate.to_string(),
        frame_count: header.frame_count(),
        duration,
        has_alpha: header.has_alpha(),
        largest_frame_size: header.largest_frame_size,
        file_size: header.file_size,
        nb_streams,
    }
}

/// 从 Stream 构建 StreamInfo
fn build_stream_info(stream: &Stream) -> StreamInfo {
    let codec_type = match stream.media_type {
        MediaType::Video => "video",
        MediaType::Audio => "audio",
    }
    .to_string();

    let mut info = StreamInfo {
        index: stream.index,
        codec_type,
        codec_name: stream.codec_id.name().to_string(),
        time_base: stream.time_base.to_string(),
        width: None,
        height: None,
        frame_rate: None,
        sample_rate: None,
        channels: None,
        nb_frames: stream.nb_frames,
    };

    match &stream.params {
        StreamParams::Video(v) => {
            info.width = Some(v.width);
            info.height = Some(v.height);
            info.frame_rate = Some(v.frame_rate.to_string());
        }
        StreamParams::Audio(a) => {
            info.sample_rate = Some(a.sample_rate);
            info.channels = Some(a.channels);
        }
    }

    info
}

/// 记录每帧校验值
#[derive(Default)]
struct ChecksumSink {
    checksums: Vec<FrameChecksum>,
}

impl PresentationSink for ChecksumSink {
    fn present(&mut self, frame: &VideoFrame) {
        self.checksums.push(FrameChecksum {
            index: frame.pts,
            keyframe: frame.is_keyframe,
            crc32: format!("{:08x}", crc32_mpeg2(&frame.data)),
        });
    }
}

/// 统计音频块与采样数
#[derive(Default)]
struct SampleCounter {
    blocks: u64,
    samples: u64,
}

impl AudioSink for SampleCounter {
    fn queue(&mut self, frame: &AudioFrame) {
        self.blocks += 1;
        self.samples += u64::from(frame.nb_samples);
    }
}

/// 以虚拟时钟不限速地解码全部帧
fn decode_all(path: &Path, header: &BinkHeader, config: DriverConfig) -> Result<DecodeSummary> {
    let io = IoContext::open_read(path)
        .with_context(|| format!("无法打开文件 '{}'", path.display()))?;
    let clock = ManualClock::new(0);
    let mut driver = StreamDriver::new(io, clock.clone(), config);
    driver.open().context("无法打开解码驱动器")?;

    let mut video = ChecksumSink::default();
    let mut audio = SampleCounter::default();
    let mut summary = DecodeSummary::default();
    loop {
        match driver.step(&mut video, &mut audio) {
            Ok(StepOutcome::Presented(_)) => summary.frames_decoded += 1,
            Ok(StepOutcome::NotDue) => {
                // 虚拟时钟直接跳到下一帧的呈现时刻
                clock.set(header.frame_rate.frame_time_ms(driver.current_frame()));
            }
            Ok(StepOutcome::Finished) => break,
            Err(err) => {
                summary.error = Some(err.to_string());
                break;
            }
        }
    }
    tracing::info!(
        "解码完成: {} 帧, {} 个音频块",
        summary.frames_decoded,
        audio.blocks
    );

    summary.audio_blocks = audio.blocks;
    summary.audio_samples = audio.samples;
    summary.audio_active = driver.audio_active();
    summary.checksums = video.checksums;
    Ok(summary)
}

/// CRC-32/MPEG-2
fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            if crc & 0x8000_0000 != 0 {
                crc = (crc << 1) ^ 0x04C1_1DB7;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// 文本格式输出
fn print_text(output: &ProbeOutput) {
    let f = &output.format;
    println!("[FORMAT]");
    println!("  文件名       : {}", f.filename);
    println!("  FourCC       : {} (修订版 {})", f.codec_tag, f.revision);
    println!("  分辨率       : {}x{}", f.width, f.height);
    println!("  帧率         : {}", f.frame_rate);
    println!("  帧数         : {}", f.frame_count);
    if let Some(dur) = f.duration {
        println!("  时长         : {dur:.3} 秒");
    }
    println!("  alpha 平面   : {}", if f.has_alpha { "是" } else { "否" });
    println!("  最大帧       : {} 字节", f.largest_frame_size);
    println!("  文件大小     : {} 字节", f.file_size);
    println!("  流数量       : {}", f.nb_streams);
    println!("[/FORMAT]");
    println!();

    for stream in &output.streams {
        println!("[STREAM #{}]", stream.index);
        println!("  类型         : {}", stream.codec_type);
        println!("  编解码器     : {}", stream.codec_name);
        println!("  时间基       : {}", stream.time_base);
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            println!("  分辨率       : {w}x{h}");
        }
        if let Some(ref fr) = stream.frame_rate {
            println!("  帧率         : {fr}");
        }
        if let Some(sr) = stream.sample_rate {
            println!("  采样率       : {sr} Hz");
        }
        if let Some(ch) = stream.channels {
            println!("  声道数       : {ch}");
        }
        println!("  帧数         : {}", stream.nb_frames);
        println!("[/STREAM]");
        println!();
    }

    if let Some(ref frames) = output.frames {
        println!("[FRAMES]");
        for frame in frames {
            println!(
                "  #{:<6} 偏移 {:>10}  大小 {:>8}{}",
                frame.index,
                frame.offset,
                frame.size,
                if frame.keyframe { "  关键帧" } else { "" }
            );
        }
        println!("[/FRAMES]");
        println!();
    }

    if let Some(ref decode) = output.decode {
        println!("[DECODE]");
        println!("  视频帧       : {}", decode.frames_decoded);
        println!("  音频块       : {}", decode.audio_blocks);
        println!("  音频采样     : {}", decode.audio_samples);
        println!(
            "  音频输出     : {}",
            if decode.audio_active { "开启" } else { "关闭" }
        );
        for c in &decode.checksums {
            println!(
                "  帧 {:<6} {}{}",
                c.index,
                c.crc32,
                if c.keyframe { "  关键帧" } else { "" }
            );
        }
        if let Some(ref err) = decode.error {
            println!("  错误         : {err}");
        }
        println!("[/DECODE]");
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_mpeg2_校验值() {
        assert_eq!(crc32_mpeg2(b"123456789"), 0x0376_E6E7);
        assert_eq!(crc32_mpeg2(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn test_配置文件部分字段() {
        let config: ProbeConfig =
            match serde_json::from_str(r#"{"driver":{"audio_enabled":false}}"#) {
                Ok(c) => c,
                Err(err) => panic!("解析配置失败: {}", err),
            };
        assert!(!config.driver.audio_enabled);
        assert_eq!(config.logging.level, "info");
    }
}
