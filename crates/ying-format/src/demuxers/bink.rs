//! Bink 解封装器.
//!
//! 文件结构 (除 FourCC 外均为小端):
//! ```text
//! 头部:    FourCC "BIKf"/"BIKg"/"BIKh"/"BIKi" + 文件大小-8 + 帧数 + 最大帧大小
//!          + 保留 4 字节 + 宽 + 高 + 帧率分子 + 帧率分母 + 视频标志 + 音轨数
//! 音轨:    每轨 4 字节 (未用), 每轨 u16 采样率 + u16 标志, 每轨 4 字节音轨 ID
//! 帧偏移:  每帧一个 u32, 最低位为关键帧标志
//! 帧记录:  每条音轨 u32 长度 + 音频包, 剩余字节为视频包
//! ```

use std::collections::VecDeque;
use std::io::SeekFrom;

use bytes::Bytes;
use log::{debug, trace, warn};
use ying_codec::{CodecId, Packet};
use ying_core::{MediaType, Rational, YingError, YingResult};

use crate::demuxer::Demuxer;
use crate::io::IoContext;
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

/// 音轨标志位: DCT 合成 (否则为 RDFT)
pub const AUDIO_FLAG_DCT: u16 = 0x1000;
/// 音轨标志位: 立体声
pub const AUDIO_FLAG_STEREO: u16 = 0x2000;

/// 音轨声道数上限
const MAX_AUDIO_CHANNELS: u32 = 2;

/// 支持的 FourCC
const KNOWN_TAGS: [&[u8; 4]; 4] = [b"BIKf", b"BIKg", b"BIKh", b"BIKi"];

/// 帧偏移表中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinkFrameEntry {
    /// 帧序号
    pub index: u32,
    /// 帧记录在文件中的字节偏移 (已去掉关键帧位)
    pub offset: u64,
    /// 帧记录字节数
    pub size: u64,
    /// 是否为关键帧
    pub keyframe: bool,
}

/// 一条音轨的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinkAudioTrack {
    /// 音轨 ID
    pub id: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 原始标志位
    pub flags: u16,
    /// 声道数 (1 或 2)
    pub channels: u32,
    /// 对应的解码器
    pub codec_id: CodecId,
}

/// Bink 文件头部
#[derive(Debug, Clone)]
pub struct BinkHeader {
    /// 四字符码
    pub codec_tag: [u8; 4],
    /// 头部声明的文件大小
    pub file_size: u64,
    /// 最大帧记录字节数
    pub largest_frame_size: u32,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 帧率
    pub frame_rate: Rational,
    /// 视频标志位 (bit 20 为 alpha)
    pub video_flags: u32,
    /// 音轨列表
    pub tracks: Vec<BinkAudioTrack>,
    /// 帧偏移表
    pub frames: Vec<BinkFrameEntry>,
}

impl BinkHeader {
    /// 从字节源解析头部与帧偏移表
    ///
    /// `source_size` 为字节源总大小, 用于计算最后一帧的大小.
    pub fn parse(io: &mut IoContext, source_size: u64) -> YingResult<Self> {
        let codec_tag = io.read_tag()?;
        if !KNOWN_TAGS.contains(&&codec_tag) {
            return Err(YingError::Format(format!(
                "未知的 Bink FourCC: {:02X?}",
                codec_tag
            )));
        }

        let file_size = u64::from(io.read_u32_le()?) + 8;
        let frame_count = io.read_u32_le()?;
        let largest_frame_size = io.read_u32_le()?;
        if u64::from(largest_frame_size) > file_size {
            return Err(YingError::Format(format!(
                "最大帧大小 {} 超过文件大小 {}",
                largest_frame_size, file_size
            )));
        }
        io.skip(4)?;

        let width = io.read_u32_le()?;
        let height = io.read_u32_le()?;
        if width == 0 || height == 0 {
            return Err(YingError::Format(format!("无效的画面尺寸 {}x{}", width, height)));
        }
        let frame_rate = Rational::new(io.read_u32_le()?, io.read_u32_le()?);
        if !frame_rate.is_valid() {
            return Err(YingError::Format(format!("无效的帧率 {}", frame_rate)));
        }
        let video_flags = io.read_u32_le()?;

        let track_count = io.read_u32_le()? as usize;
        io.skip(4 * track_count)?;
        let mut tracks = Vec::with_capacity(track_count.min(16));
        for _ in 0..track_count {
            tracks.push(Self::parse_track(io)?);
        }
        for track in tracks.iter_mut() {
            track.id = io.read_u32_le()?;
        }

        let frames = Self::parse_frame_table(io, frame_count, source_size)?;

        Ok(Self {
            codec_tag,
            file_size,
            largest_frame_size,
            width,
            height,
            frame_rate,
            video_flags,
            tracks,
            frames,
        })
    }

    fn parse_track(io: &mut IoContext) -> YingResult<BinkAudioTrack> {
        let sample_rate = u32::from(io.read_u16_le()?);
        let flags = io.read_u16_le()?;
        let channels = if flags & AUDIO_FLAG_STEREO != 0 { 2 } else { 1 };
        if channels > MAX_AUDIO_CHANNELS {
            return Err(YingError::Format(format!("音轨声道数过多: {}", channels)));
        }
        let codec_id = if flags & AUDIO_FLAG_DCT != 0 {
            CodecId::BinkAudioDct
        } else {
            CodecId::BinkAudioRdft
        };
        Ok(BinkAudioTrack {
            id: 0,
            sample_rate,
            flags,
            channels,
            codec_id,
        })
    }

    /// 每项大小为相邻偏移之差, 最后一帧延伸到字节源末尾
    fn parse_frame_table(
        io: &mut IoContext,
        frame_count: u32,
        source_size: u64,
    ) -> YingResult<Vec<BinkFrameEntry>> {
        // 帧数来自文件, 预分配量以数据大小为上限
        let capacity = (frame_count as usize).min(source_size as usize / 4);
        let mut frames: Vec<BinkFrameEntry> = Vec::with_capacity(capacity);
        for index in 0..frame_count {
            let raw = io.read_u32_le()?;
            let offset = u64::from(raw & !1);
            if let Some(prev) = frames.last_mut() {
                prev.size = offset.checked_sub(prev.offset).ok_or_else(|| {
                    YingError::Format(format!(
                        "帧 {} 的偏移 {} 小于上一帧偏移 {}",
                        index, offset, prev.offset
                    ))
                })?;
            }
            frames.push(BinkFrameEntry {
                index,
                offset,
                size: 0,
                keyframe: raw & 1 != 0,
            });
        }
        if let Some(last) = frames.last_mut() {
            last.size = source_size.checked_sub(last.offset).ok_or_else(|| {
                YingError::Format(format!(
                    "末帧偏移 {} 超出数据大小 {}",
                    last.offset, source_size
                ))
            })?;
        }
        Ok(frames)
    }

    /// 修订版字符 (`f`..`i`)
    pub fn revision(&self) -> char {
        char::from(self.codec_tag[3])
    }

    /// 是否带 alpha 平面
    pub fn has_alpha(&self) -> bool {
        self.video_flags & ying_codec::decoders::bink::VIDEO_FLAG_ALPHA != 0
    }

    /// 帧数
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Bink 解封装器
pub struct BinkDemuxer {
    header: Option<BinkHeader>,
    streams: Vec<Stream>,
    /// 下一个要读取的帧
    next_frame: usize,
    /// 当前帧中尚未返回的数据包
    queue: VecDeque<Packet>,
}

impl BinkDemuxer {
    /// 创建 Bink 解封装器实例 (工厂函数)
    pub fn create() -> YingResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    pub fn new() -> Self {
        Self {
            header: None,
            streams: Vec::new(),
            next_frame: 0,
            queue: VecDeque::new(),
        }
    }

    /// 已解析的头部
    pub fn header(&self) -> Option<&BinkHeader> {
        self.header.as_ref()
    }

    /// 下一个要读取的帧序号
    pub fn next_frame(&self) -> usize {
        self.next_frame
    }

    fn build_streams(header: &BinkHeader) -> Vec<Stream> {
        let time_base = header.frame_rate.invert();
        let nb_frames = header.frames.len() as u64;
        let mut streams = vec![Stream {
            index: 0,
            media_type: MediaType::Video,
            codec_id: CodecId::BinkVideo,
            time_base,
            nb_frames,
            extra_data: header.video_flags.to_le_bytes().to_vec(),
            params: StreamParams::Video(VideoStreamParams {
                width: header.width,
                height: header.height,
                frame_rate: header.frame_rate,
                codec_tag: header.codec_tag,
            }),
        }];
        for (i, track) in header.tracks.iter().enumerate() {
            streams.push(Stream {
                index: i + 1,
                media_type: MediaType::Audio,
                codec_id: track.codec_id,
                time_base,
                nb_frames,
                extra_data: Vec::new(),
                params: StreamParams::Audio(AudioStreamParams {
                    sample_rate: track.sample_rate,
                    channels: track.channels,
                }),
            });
        }
        streams
    }

    /// 读取一条帧记录, 拆分为音频包和视频包放入队列
    fn read_frame(
        &mut self,
        io: &mut IoContext,
        entry: BinkFrameEntry,
        time_base: Rational,
        track_count: usize,
    ) -> YingResult<()> {
        io.seek(SeekFrom::Start(entry.offset))?;
        let pts = i64::from(entry.index);
        let packet = |data: Vec<u8>, stream_index: usize| Packet {
            data: Bytes::from(data),
            pts,
            time_base,
            stream_index,
            is_keyframe: entry.keyframe,
            pos: entry.offset as i64,
        };

        let mut remaining = entry.size;
        for track in 0..track_count {
            if remaining < 4 {
                return Err(YingError::Format(format!(
                    "帧 {} 不足以容纳音轨 {} 的长度字段",
                    entry.index, track
                )));
            }
            let len = u64::from(io.read_u32_le()?);
            remaining -= 4;
            if len > remaining {
                return Err(YingError::Format(format!(
                    "帧 {} 音轨 {} 的音频包 ({} 字节) 超出帧剩余大小 {}",
                    entry.index, track, len, remaining
                )));
            }
            if len >= 4 {
                let data = io.read_bytes(len as usize)?;
                self.queue.push_back(packet(data, track + 1));
            } else {
                io.skip(len as usize)?;
            }
            remaining -= len;
        }

        let data = io.read_bytes(remaining as usize)?;
        self.queue.push_back(packet(data, 0));
        trace!(
            "bink: 帧 {} 偏移 {}, 视频包 {} 字节, 关键帧={}",
            entry.index, entry.offset, remaining, entry.keyframe
        );
        Ok(())
    }
}

impl Default for BinkDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for BinkDemuxer {
    fn name(&self) -> &str {
        "bink"
    }

    fn open(&mut self, io: &mut IoContext) -> YingResult<()> {
        let source_size = io
            .size()
            .ok_or_else(|| YingError::InvalidArgument("字节源大小未知".into()))?;
        let header = BinkHeader::parse(io, source_size)?;

        if header.tracks.len() > 1 {
            warn!("发现 {} 条音轨, 仅解码其中一条", header.tracks.len());
        }
        debug!(
            "打开 Bink: {}, {}x{}, {} fps, {} 帧, {} 条音轨, alpha={}",
            String::from_utf8_lossy(&header.codec_tag),
            header.width,
            header.height,
            header.frame_rate,
            header.frames.len(),
            header.tracks.len(),
            header.has_alpha(),
        );

        self.streams = Self::build_streams(&header);
        self.header = Some(header);
        self.next_frame = 0;
        self.queue.clear();
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> YingResult<Packet> {
        if let Some(pkt) = self.queue.pop_front() {
            return Ok(pkt);
        }
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| YingError::InvalidArgument("解封装器未打开".into()))?;
        let Some(&entry) = header.frames.get(self.next_frame) else {
            return Err(YingError::Eof);
        };
        let time_base = header.frame_rate.invert();
        let track_count = header.tracks.len();

        self.read_frame(io, entry, time_base, track_count)?;
        self.next_frame += 1;
        self.queue.pop_front().ok_or(YingError::Eof)
    }

    fn seek(&mut self, _io: &mut IoContext, frame_index: u64) -> YingResult<u64> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| YingError::InvalidArgument("解封装器未打开".into()))?;
        if frame_index >= header.frames.len() as u64 {
            return Err(YingError::InvalidArgument(format!(
                "目标帧 {} 超出帧数 {}",
                frame_index,
                header.frames.len()
            )));
        }
        let target = header.frames[..=frame_index as usize]
            .iter()
            .rposition(|f| f.keyframe)
            .unwrap_or(0);

        debug!("bink: 定位到帧 {} (目标 {})", target, frame_index);
        self.next_frame = target;
        self.queue.clear();
        Ok(target as u64)
    }

    fn duration(&self) -> Option<f64> {
        let header = self.header.as_ref()?;
        Some(header.frames.len() as f64 / header.frame_rate.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 一帧记录: 各音轨的音频包 (含 4 字节采样字节数) 与视频包
    struct TestFrame {
        audio: Vec<Vec<u8>>,
        video: Vec<u8>,
        keyframe: bool,
    }

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
            // 偏移最低位是关键帧标志, 记录须从偶数偏移开始; 补齐字节计入上一帧
            if (header_len + records.len()) % 2 == 1 {
                records.push(0);
            }
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
        let largest = records.len() as u32;
        for v in [(total - 8) as u32, frames.len() as u32, largest, 0, 16, 16, fps.0, fps.1, 0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
        out.extend(std::iter::repeat_n(0u8, 4 * tracks.len()));
        for &(rate, flags) in tracks {
            out.extend_from_slice(&rate.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
        }
        for i in 0..tracks.len() as u32 {
            out.extend_from_slice(&(100 + i).to_le_bytes());
        }
        for o in offsets {
            out.extend_from_slice(&o.to_le_bytes());
        }
        out.extend_from_slice(&records);
        out
    }

    fn frame(audio: Vec<Vec<u8>>, video: &[u8], keyframe: bool) -> TestFrame {
        TestFrame {
            audio,
            video: video.to_vec(),
            keyframe,
        }
    }

    fn open(data: Vec<u8>) -> (BinkDemuxer, IoContext) {
        let mut io = IoContext::from_memory(data);
        let mut demuxer = BinkDemuxer::new();
        demuxer.open(&mut io).unwrap();
        (demuxer, io)
    }

    #[test]
    fn test_解析头部() {
        let data = build_file(
            b"BIKi",
            (30000, 1001),
            &[(44100, AUDIO_FLAG_DCT | AUDIO_FLAG_STEREO), (22050, 0)],
            &[
                frame(vec![vec![0; 8], vec![]], &[1, 2, 3], true),
                frame(vec![vec![], vec![]], &[4, 5], false),
            ],
        );
        let total = data.len() as u64;
        let (demuxer, _) = open(data);
        let header = demuxer.header().unwrap();

        assert_eq!(&header.codec_tag, b"BIKi");
        assert_eq!(header.revision(), 'i');
        assert_eq!(header.file_size, total);
        assert_eq!((header.width, header.height), (16, 16));
        assert_eq!(header.frame_rate, Rational::new(30000, 1001));
        assert!(!header.has_alpha());

        assert_eq!(header.tracks.len(), 2);
        assert_eq!(header.tracks[0].sample_rate, 44100);
        assert_eq!(header.tracks[0].channels, 2);
        assert_eq!(header.tracks[0].codec_id, CodecId::BinkAudioDct);
        assert_eq!(header.tracks[0].id, 100);
        assert_eq!(header.tracks[1].channels, 1);
        assert_eq!(header.tracks[1].codec_id, CodecId::BinkAudioRdft);

        let frames = &header.frames;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].keyframe);
        assert!(!frames[1].keyframe);
        // 3 字节视频后补齐 1 字节
        assert_eq!(frames[0].size, 4 + 8 + 4 + 3 + 1);
        assert_eq!(frames[1].offset % 2, 0);
        assert_eq!(frames[1].size, 4 + 4 + 2);
        assert_eq!(frames[1].offset + frames[1].size, total);

        let streams = demuxer.streams();
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[0].media_type, MediaType::Video);
        assert_eq!(streams[2].codec_id, CodecId::BinkAudioRdft);
        assert_eq!(streams[0].time_base, Rational::new(1001, 30000));
    }

    #[test]
    fn test_帧率为零() {
        let data = build_file(b"BIKf", (0, 1), &[], &[frame(vec![], &[0], true)]);
        let mut io = IoContext::from_memory(data);
        let err = BinkDemuxer::new().open(&mut io).unwrap_err();
        assert!(matches!(err, YingError::Format(_)));

        let data = build_file(b"BIKf", (25, 0), &[], &[frame(vec![], &[0], true)]);
        let mut io = IoContext::from_memory(data);
        let err = BinkDemuxer::new().open(&mut io).unwrap_err();
        assert!(matches!(err, YingError::Format(_)));
    }

    #[test]
    fn test_未知签名() {
        let data = build_file(b"BIKb", (25, 1), &[], &[frame(vec![], &[0], true)]);
        let mut io = IoContext::from_memory(data);
        let err = BinkDemuxer::new().open(&mut io).unwrap_err();
        assert!(matches!(err, YingError::Format(_)));
    }

    #[test]
    fn test_最大帧超过文件大小() {
        let mut data = build_file(b"BIKg", (25, 1), &[], &[frame(vec![], &[0], true)]);
        data[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut io = IoContext::from_memory(data);
        let err = BinkDemuxer::new().open(&mut io).unwrap_err();
        assert!(matches!(err, YingError::Format(_)));
    }

    #[test]
    fn test_按帧切分数据包() {
        let audio = vec![4, 0, 0, 0, 0xAA, 0xBB];
        let data = build_file(
            b"BIKf",
            (25, 1),
            &[(22050, AUDIO_FLAG_DCT), (22050, AUDIO_FLAG_DCT)],
            &[
                frame(vec![audio.clone(), vec![9, 9]], &[1, 2, 3, 4], true),
                frame(vec![vec![], vec![]], &[5, 6], false),
            ],
        );
        let (mut demuxer, mut io) = open(data);

        let p = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(p.stream_index, 1);
        assert_eq!(&p.data[..], &audio[..]);
        assert!(p.is_keyframe);
        // 第二条音轨长度 2 < 4, 跳过
        let p = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(p.stream_index, 0);
        assert_eq!(&p.data[..], &[1, 2, 3, 4]);
        assert_eq!(p.pts, 0);

        let p = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(p.stream_index, 0);
        assert_eq!(&p.data[..], &[5, 6]);
        assert_eq!(p.pts, 1);
        assert!(!p.is_keyframe);
        assert_eq!(p.time_base, Rational::new(1, 25));

        assert!(matches!(demuxer.read_packet(&mut io), Err(YingError::Eof)));
        assert_eq!(demuxer.duration(), Some(2.0 / 25.0));
    }

    #[test]
    fn test_音频包超出帧大小() {
        let mut data = build_file(
            b"BIKf",
            (25, 1),
            &[(22050, AUDIO_FLAG_DCT)],
            &[frame(vec![vec![0; 4]], &[1], true)],
        );
        // 把音频包长度改为 100
        let len_pos = data.len() - 1 - 4 - 4;
        data[len_pos..len_pos + 4].copy_from_slice(&100u32.to_le_bytes());
        let (mut demuxer, mut io) = open(data);
        let err = demuxer.read_packet(&mut io).unwrap_err();
        assert!(matches!(err, YingError::Format(_)));
    }

    #[test]
    fn test_定位到关键帧() {
        let frames = (0..6)
            .map(|i| frame(vec![], &[i as u8], i % 3 == 0))
            .collect::<Vec<_>>();
        let data = build_file(b"BIKh", (10, 1), &[], &frames);
        let (mut demuxer, mut io) = open(data);

        assert_eq!(demuxer.seek(&mut io, 5).unwrap(), 3);
        let p = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(p.pts, 3);
        assert!(p.is_keyframe);
        assert_eq!(&p.data[..], &[3, 0]);

        assert_eq!(demuxer.seek(&mut io, 2).unwrap(), 0);
        assert_eq!(demuxer.next_frame(), 0);
        assert!(matches!(
            demuxer.seek(&mut io, 6),
            Err(YingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_无帧文件() {
        let data = build_file(b"BIKf", (25, 1), &[], &[]);
        let (mut demuxer, mut io) = open(data);
        assert_eq!(demuxer.header().unwrap().frame_count(), 0);
        assert!(matches!(demuxer.read_packet(&mut io), Err(YingError::Eof)));
    }
}
