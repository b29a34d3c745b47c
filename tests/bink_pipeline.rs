//! 端到端测试: 在内存中构造 Bink 文件, 经 StreamDriver 按节拍解码.

use ying::codec::{AudioFrame, VideoFrame};
use ying::core::{BitWriter, YingError};
use ying::driver::{
    AudioSink, DriverConfig, DriverState, ManualClock, NullAudioSink, PresentationSink,
    StepOutcome, StreamDriver,
};
use ying::format::IoContext;

const BLOCK_SKIP: u32 = 0;
const BLOCK_FILL: u32 = 6;

/// 音轨标志: DCT
const TRACK_DCT: u16 = 0x1000;

struct TestFrame {
    audio: Vec<Vec<u8>>,
    video: Vec<u8>,
    keyframe: bool,
}

/// 构造 16x16 的 Bink 文件
fn build_file(
    tag: &[u8; 4],
    fps: (u32, u32),
    tracks: &[(u16, u16)],
    frames: &[TestFrame],
) -> Vec<u8> {
    let header_len = 44 + tracks.len() * 12 + frames.len() * 4;
    let mut records = Vec::new();
    let mut offsets = Vec::new();
    for f in frames {
        offsets.push((header_len + records.len()) as u32 | u32::from(f.keyframe));
        for a in &f.audio {
            records.extend_from_slice(&(a.len() as u32).to_le_bytes());
            records.extend_from_slice(a);
        }
        records.extend_from_slice(&f.video);
    }

    let mut out = Vec::new();
    out.extend_from_slice(tag);
    let total = header_len + records.len();
    for v in [
        (total - 8) as u32,
        frames.len() as u32,
        records.len() as u32,
        0,
        16,
        16,
        fps.0,
        fps.1,
        0,
        tracks.len() as u32,
    ] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend(std::iter::repeat_n(0u8, 4 * tracks.len()));
    for &(rate, flags) in tracks {
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
    }
    for i in 0..tracks.len() as u32 {
        out.extend_from_slice(&i.to_le_bytes());
    }
    for o in offsets {
        out.extend_from_slice(&o.to_le_bytes());
    }
    out.extend_from_slice(&records);
    out
}

/// 平面内全部块同为 `block_type`, Fill 时每行一个颜色 `color`
fn write_plane(bw: &mut BitWriter, chroma: bool, block_type: u32, color: u8) {
    for _ in 0..23 {
        bw.write_bits(0, 4);
    }
    let (per_row, rows, sub_len) = if chroma { (1, 1, 9) } else { (2, 2, 10) };
    let fill = block_type == BLOCK_FILL;
    for row in 0..rows {
        bw.write_bits(per_row, 10);
        bw.write_bit(1);
        bw.write_bits(block_type, 4);
        if row == 0 {
            bw.write_bits(0, sub_len);
        }
        if fill {
            bw.write_bits(per_row, 10);
            bw.write_bit(1);
            bw.write_bits(u32::from(color >> 4), 4);
            bw.write_bits(u32::from(color & 0x0F), 4);
        } else if row == 0 {
            bw.write_bits(0, 10);
        }
        if row == 0 {
            for _ in 0..6 {
                bw.write_bits(0, 10);
            }
        }
    }
    bw.align_to_32();
}

/// 修订版 f 的视频包, 颜色为偏置前的亮度值, 色度取中性
fn video_packet(block_type: u32, luma: u8) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_plane(&mut bw, false, block_type, luma);
    write_plane(&mut bw, true, block_type, 0);
    write_plane(&mut bw, true, block_type, 0);
    bw.finish()
}

/// 11025Hz 单声道的静音音频包 (一个块)
fn silent_audio_packet() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(480 * 2, 32);
    bw.write_bits(0, 2);
    bw.write_bits(0, 29);
    bw.write_bits(0, 29);
    // 11025Hz 时共 20 个频带
    for _ in 0..20 {
        bw.write_bits(0, 8);
    }
    bw.write_bit(1);
    bw.write_bits(15, 4);
    bw.write_bits(0, 4);
    bw.align_to_32();
    bw.finish()
}

fn frame(audio: Vec<Vec<u8>>, video: Vec<u8>, keyframe: bool) -> TestFrame {
    TestFrame {
        audio,
        video,
        keyframe,
    }
}

#[derive(Default)]
struct Collect {
    frames: Vec<VideoFrame>,
}

impl PresentationSink for Collect {
    fn present(&mut self, frame: &VideoFrame) {
        self.frames.push(frame.clone());
    }
}

#[derive(Default)]
struct CollectAudio {
    frames: Vec<AudioFrame>,
}

impl AudioSink for CollectAudio {
    fn queue(&mut self, frame: &AudioFrame) {
        self.frames.push(frame.clone());
    }
}

fn open_driver(data: Vec<u8>, config: DriverConfig) -> (StreamDriver<ManualClock>, ManualClock) {
    let clock = ManualClock::new(1000);
    let mut driver = StreamDriver::new(IoContext::from_memory(data), clock.clone(), config);
    driver.open().unwrap();
    (driver, clock)
}

fn assert_uniform(frame: &VideoFrame, bgra: [u8; 4]) {
    for y in 0..frame.height {
        for x in 0..frame.width {
            assert_eq!(frame.pixel(x, y), Some(bgra), "像素 ({}, {})", x, y);
        }
    }
}

#[test]
fn test_灰色填充后全部skip_两帧相同且按节拍呈现() {
    let data = build_file(
        b"BIKf",
        (30, 1),
        &[],
        &[
            frame(vec![], video_packet(BLOCK_FILL, 0), true),
            frame(vec![], video_packet(BLOCK_SKIP, 0), false),
        ],
    );
    let (mut driver, clock) = open_driver(data, DriverConfig::default());
    assert_eq!(driver.state(), DriverState::HeaderParsed);
    assert_eq!(driver.frame_count(), 2);

    let mut video = Collect::default();
    let mut audio = NullAudioSink;

    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(0));
    assert_eq!(driver.state(), DriverState::Decoding);
    // 第 1 帧在 33ms 处
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::NotDue);
    assert!(driver.has_time_to_spare());
    clock.advance(22);
    assert!(!driver.has_time_to_spare());
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::NotDue);
    clock.advance(11);
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(1));

    // 帧数用尽后在下一个节拍结束
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::NotDue);
    clock.advance(33);
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Finished);
    assert_eq!(driver.state(), DriverState::Finished);
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Finished);

    assert_eq!(video.frames.len(), 2);
    assert_uniform(&video.frames[0], [0x80, 0x80, 0x80, 0xFF]);
    assert_eq!(video.frames[0].data, video.frames[1].data);
    assert!(video.frames[0].is_keyframe);
    assert!(!video.frames[1].is_keyframe);
    assert_eq!(video.frames[1].pts, 1);
}

#[test]
fn test_帧率为零_打开即失败() {
    let data = build_file(
        b"BIKf",
        (0, 1),
        &[],
        &[frame(vec![], video_packet(BLOCK_FILL, 0), true)],
    );
    let mut driver = StreamDriver::new(
        IoContext::from_memory(data),
        ManualClock::new(0),
        DriverConfig::default(),
    );
    let err = driver.open().unwrap_err();
    assert!(matches!(err, YingError::Format(_)));
    assert_eq!(driver.state(), DriverState::Uninitialized);

    let mut video = Collect::default();
    assert!(driver.step(&mut video, &mut NullAudioSink).is_err());
    assert!(video.frames.is_empty());
}

#[test]
fn test_音轨解码为静音块() {
    let data = build_file(
        b"BIKg",
        (25, 1),
        &[(11025, TRACK_DCT)],
        &[frame(
            vec![silent_audio_packet()],
            video_packet(BLOCK_FILL, 0),
            true,
        )],
    );
    let (mut driver, _clock) = open_driver(data, DriverConfig::default());
    assert!(driver.audio_active());

    let mut video = Collect::default();
    let mut audio = CollectAudio::default();
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(0));

    assert_eq!(video.frames.len(), 1);
    assert_eq!(audio.frames.len(), 1);
    assert_eq!(audio.frames[0].sample_rate, 11025);
    assert_eq!(audio.frames[0].channels, 1);
    assert_eq!(audio.frames[0].samples.len(), 480);
    assert!(audio.frames[0].samples.iter().all(|&s| s == 0));
}

#[test]
fn test_关闭音频时不输出采样() {
    let data = build_file(
        b"BIKg",
        (25, 1),
        &[(11025, TRACK_DCT)],
        &[frame(
            vec![silent_audio_packet()],
            video_packet(BLOCK_FILL, 0),
            true,
        )],
    );
    let config = DriverConfig {
        audio_enabled: false,
        ..DriverConfig::default()
    };
    let (mut driver, _clock) = open_driver(data, config);
    assert!(!driver.audio_active());

    let mut video = Collect::default();
    let mut audio = CollectAudio::default();
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(0));
    assert_eq!(video.frames.len(), 1);
    assert!(audio.frames.is_empty());
}

#[test]
fn test_不存在的音轨被忽略() {
    let data = build_file(
        b"BIKg",
        (25, 1),
        &[(11025, TRACK_DCT)],
        &[frame(
            vec![silent_audio_packet()],
            video_packet(BLOCK_FILL, 0),
            true,
        )],
    );
    let config = DriverConfig {
        audio_track: 3,
        ..DriverConfig::default()
    };
    let (mut driver, _clock) = open_driver(data, config);
    assert!(!driver.audio_active());

    let mut video = Collect::default();
    let mut audio = CollectAudio::default();
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(0));
    assert!(audio.frames.is_empty());
}

#[test]
fn test_rdft音轨被关闭_视频继续() {
    let rdft_packet = vec![0x40, 0x00, 0x00, 0x00, 0, 0, 0, 0];
    let data = build_file(
        b"BIKh",
        (10, 1),
        &[(22050, 0)],
        &[
            frame(vec![rdft_packet.clone()], video_packet(BLOCK_FILL, 0), true),
            frame(vec![rdft_packet], video_packet(BLOCK_SKIP, 0), false),
        ],
    );
    let (mut driver, clock) = open_driver(data, DriverConfig::default());
    assert!(driver.audio_active());

    let mut video = Collect::default();
    let mut audio = CollectAudio::default();
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(0));
    assert!(!driver.audio_active());

    clock.advance(100);
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(1));
    assert_eq!(video.frames.len(), 2);
    assert!(audio.frames.is_empty());
}

#[test]
fn test_定位到关键帧后重新计时() {
    let data = build_file(
        b"BIKf",
        (20, 1),
        &[],
        &[
            frame(vec![], video_packet(BLOCK_FILL, 0), true),
            frame(vec![], video_packet(BLOCK_SKIP, 0), false),
            frame(vec![], video_packet(BLOCK_FILL, 0x10), true),
            frame(vec![], video_packet(BLOCK_SKIP, 0), false),
        ],
    );
    let (mut driver, clock) = open_driver(data, DriverConfig::default());
    let mut video = Collect::default();
    let mut audio = NullAudioSink;
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(0));

    assert_eq!(driver.seek_frame(3).unwrap(), 2);
    assert_eq!(driver.current_frame(), 2);
    // 目标关键帧立即到期
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(2));
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::NotDue);
    clock.advance(50);
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Presented(3));

    assert_eq!(video.frames.len(), 3);
    assert_eq!(video.frames[1].pts, 2);
    assert_uniform(&video.frames[1], [0x90, 0x90, 0x90, 0xFF]);
    assert_eq!(video.frames[2].data, video.frames[1].data);

    assert!(matches!(
        driver.seek_frame(4),
        Err(YingError::InvalidArgument(_))
    ));
}

#[test]
fn test_截断的视频包_致命错误后结束() {
    let data = build_file(
        b"BIKf",
        (30, 1),
        &[],
        &[
            frame(vec![], vec![0u8; 4], true),
            frame(vec![], video_packet(BLOCK_SKIP, 0), false),
        ],
    );
    let (mut driver, clock) = open_driver(data, DriverConfig::default());
    let mut video = Collect::default();
    let mut audio = NullAudioSink;

    let err = driver.step(&mut video, &mut audio).unwrap_err();
    assert!(matches!(err, YingError::Bounds(_)));
    assert!(err.is_fatal());
    assert_eq!(driver.state(), DriverState::Finished);

    clock.advance(1000);
    assert_eq!(driver.step(&mut video, &mut audio).unwrap(), StepOutcome::Finished);
    assert!(video.frames.is_empty());
}
