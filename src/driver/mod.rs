//! 按帧率节拍驱动解封装与解码.
//!
//! [`StreamDriver`] 持有字节源、Bink 解封装器和视频/音频解码器. 宿主循环反复调用
//! [`StreamDriver::step`], 每次最多解码并呈现一帧视频, 同时把当前音轨的音频包
//! 交给音频解码器. 时钟与输出端都由宿主显式提供.

mod clock;
mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sink::{AudioSink, NullAudioSink, PresentationSink};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
use ying_codec::{Decoder, Frame, Packet};
use ying_core::{Rational, YingError, YingResult};
use ying_format::{BinkDemuxer, BinkHeader, Demuxer, IoContext};

/// 视频流固定为 0 号流, 音轨 i 对应 i + 1 号流
const VIDEO_STREAM_INDEX: usize = 0;

/// 下一帧距今超过该毫秒数时认为宿主尚有空闲
const SPARE_TIME_MARGIN_MS: u64 = 11;

/// 驱动器配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    /// 要解码的音轨序号
    #[serde(default)]
    pub audio_track: usize,
    /// 是否解码音频
    #[serde(default = "default_true")]
    pub audio_enabled: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            audio_track: 0,
            audio_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// 驱动器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// 尚未解析头部
    Uninitialized,
    /// 头部已解析, 尚未呈现任何帧
    HeaderParsed,
    /// 正在逐帧解码
    Decoding,
    /// 已播完或遇到致命错误
    Finished,
}

/// 单次 `step()` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 下一帧的呈现时刻未到
    NotDue,
    /// 已呈现指定序号的帧
    Presented(u64),
    /// 所有帧都已呈现
    Finished,
}

/// Bink 流驱动器
pub struct StreamDriver<C: Clock> {
    io: IoContext,
    clock: C,
    config: DriverConfig,
    demuxer: BinkDemuxer,
    video: Option<Box<dyn Decoder>>,
    audio: Option<Box<dyn Decoder>>,
    /// 当前音轨对应的流索引
    audio_stream: Option<usize>,
    state: DriverState,
    frame_rate: Rational,
    frame_count: u64,
    /// 下一个要呈现的帧
    cur_frame: u64,
    /// 节拍起点对应的帧 (定位后为目标关键帧)
    pace_origin: u64,
    /// 节拍起点时刻, 首次 `step()` 时锁定
    start_ms: Option<u64>,
}

impl<C: Clock> StreamDriver<C> {
    /// 创建驱动器, 此时尚未读取任何数据
    pub fn new(io: IoContext, clock: C, config: DriverConfig) -> Self {
        Self {
            io,
            clock,
            config,
            demuxer: BinkDemuxer::new(),
            video: None,
            audio: None,
            audio_stream: None,
            state: DriverState::Uninitialized,
            frame_rate: Rational::UNDEFINED,
            frame_count: 0,
            cur_frame: 0,
            pace_origin: 0,
            start_ms: None,
        }
    }

    /// 解析头部并创建解码器
    pub fn open(&mut self) -> YingResult<()> {
        if self.state != DriverState::Uninitialized {
            return Err(YingError::InvalidArgument("驱动器已打开".into()));
        }
        self.demuxer.open(&mut self.io)?;
        let registry = crate::default_codec_registry();

        let streams = self.demuxer.streams();
        let video_stream = streams
            .get(VIDEO_STREAM_INDEX)
            .ok_or(YingError::StreamNotFound(VIDEO_STREAM_INDEX))?;
        let mut video = registry.create_decoder(video_stream.codec_id)?;
        video.open(&video_stream.codec_parameters())?;

        let track_count = streams.len() - 1;
        let mut audio = None;
        if !self.config.audio_enabled {
            debug!("音频已在配置中关闭");
        } else if track_count == 0 {
            debug!("文件不含音轨");
        } else if self.config.audio_track >= track_count {
            warn!(
                "音轨 {} 不存在 (共 {} 条), 关闭音频",
                self.config.audio_track, track_count
            );
        } else {
            let stream = &streams[self.config.audio_track + 1];
            let mut decoder = registry.create_decoder(stream.codec_id)?;
            decoder.open(&stream.codec_parameters())?;
            debug!("音轨 {} 使用解码器 {}", self.config.audio_track, decoder.name());
            audio = Some((stream.index, decoder));
        }

        let header = self
            .demuxer
            .header()
            .ok_or_else(|| YingError::InvalidArgument("解封装器未返回头部".into()))?;
        self.frame_rate = header.frame_rate;
        self.frame_count = header.frames.len() as u64;
        info!(
            "打开 Bink 流: {}x{}, {} fps, {} 帧, {} 条音轨",
            header.width, header.height, header.frame_rate, self.frame_count, track_count
        );

        self.video = Some(video);
        if let Some((index, decoder)) = audio {
            self.audio_stream = Some(index);
            self.audio = Some(decoder);
        }
        self.cur_frame = 0;
        self.pace_origin = 0;
        self.start_ms = None;
        self.set_state(DriverState::HeaderParsed);
        Ok(())
    }

    /// 推进一步: 到达下一帧的呈现时刻时解码并呈现它
    ///
    /// 致命错误会使驱动器进入 `Finished` 并原样返回.
    pub fn step(
        &mut self,
        video_sink: &mut dyn PresentationSink,
        audio_sink: &mut dyn AudioSink,
    ) -> YingResult<StepOutcome> {
        match self.state {
            DriverState::Uninitialized => {
                return Err(YingError::InvalidArgument("驱动器未打开".into()));
            }
            DriverState::Finished => return Ok(StepOutcome::Finished),
            DriverState::HeaderParsed | DriverState::Decoding => {}
        }

        let now = self.clock.now_ms();
        let start = *self.start_ms.get_or_insert(now);
        if now.saturating_sub(start) < self.frame_time_ms() {
            return Ok(StepOutcome::NotDue);
        }

        if self.cur_frame >= self.frame_count {
            info!("全部 {} 帧已呈现", self.frame_count);
            self.set_state(DriverState::Finished);
            return Ok(StepOutcome::Finished);
        }

        match self.decode_next(video_sink, audio_sink) {
            Ok(()) => {
                let index = self.cur_frame;
                trace!("呈现帧 {} (t={}ms)", index, now.saturating_sub(start));
                self.cur_frame += 1;
                self.set_state(DriverState::Decoding);
                Ok(StepOutcome::Presented(index))
            }
            Err(err) => {
                error!("解码帧 {} 失败, 中止: {}", self.cur_frame, err);
                self.set_state(DriverState::Finished);
                Err(err)
            }
        }
    }

    /// 下一帧是否还在 11ms 之后, 宿主可据此安排其他工作
    pub fn has_time_to_spare(&self) -> bool {
        let now = self.clock.now_ms();
        let start = self.start_ms.unwrap_or(now);
        now.saturating_sub(start) + SPARE_TIME_MARGIN_MS < self.frame_time_ms()
    }

    /// 定位到目标帧之前 (含) 最近的关键帧, 返回实际帧序号
    ///
    /// 节拍从该帧重新开始计时, 解码器内部缓冲被清空.
    pub fn seek_frame(&mut self, frame_index: u64) -> YingResult<u64> {
        if self.state == DriverState::Uninitialized {
            return Err(YingError::InvalidArgument("驱动器未打开".into()));
        }
        let target = self.demuxer.seek(&mut self.io, frame_index)?;
        if let Some(video) = self.video.as_mut() {
            video.flush();
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.flush();
        }
        self.cur_frame = target;
        self.pace_origin = target;
        self.start_ms = None;
        debug!("定位到帧 {} (目标 {})", target, frame_index);
        self.set_state(DriverState::Decoding);
        Ok(target)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// 下一个要呈现的帧序号
    pub fn current_frame(&self) -> u64 {
        self.cur_frame
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn header(&self) -> Option<&BinkHeader> {
        self.demuxer.header()
    }

    /// 音频是否仍在解码
    pub fn audio_active(&self) -> bool {
        self.audio.is_some()
    }

    /// 当前帧相对节拍起点的呈现时刻
    fn frame_time_ms(&self) -> u64 {
        let elapsed = self.frame_rate.frame_time_ms(self.cur_frame);
        elapsed.saturating_sub(self.frame_rate.frame_time_ms(self.pace_origin))
    }

    fn set_state(&mut self, state: DriverState) {
        if self.state != state {
            debug!("驱动器状态 {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// 读取当前帧的全部数据包, 音频交给音频解码器, 视频解码后呈现
    fn decode_next(
        &mut self,
        video_sink: &mut dyn PresentationSink,
        audio_sink: &mut dyn AudioSink,
    ) -> YingResult<()> {
        loop {
            let packet = self.demuxer.read_packet(&mut self.io)?;
            if packet.stream_index == VIDEO_STREAM_INDEX {
                return self.decode_video(&packet, video_sink);
            }
            if Some(packet.stream_index) == self.audio_stream {
                self.decode_audio(&packet, audio_sink)?;
            } else {
                trace!(
                    "跳过流 {} 的数据包 ({} 字节)",
                    packet.stream_index,
                    packet.size()
                );
            }
        }
    }

    fn decode_video(&mut self, packet: &Packet, sink: &mut dyn PresentationSink) -> YingResult<()> {
        let video = self
            .video
            .as_mut()
            .ok_or_else(|| YingError::InvalidArgument("视频解码器未创建".into()))?;
        video.send_packet(packet)?;
        match video.receive_frame()? {
            Frame::Video(frame) => {
                sink.present(&frame);
                Ok(())
            }
            Frame::Audio(_) => Err(YingError::InvalidArgument(
                "视频解码器输出了音频帧".into(),
            )),
        }
    }

    fn decode_audio(&mut self, packet: &Packet, sink: &mut dyn AudioSink) -> YingResult<()> {
        let Some(decoder) = self.audio.as_mut() else {
            return Ok(());
        };
        match decoder.send_packet(packet) {
            Ok(()) => loop {
                match decoder.receive_frame() {
                    Ok(Frame::Audio(frame)) => sink.queue(&frame),
                    Ok(Frame::Video(_)) => {}
                    Err(YingError::NeedMoreData) => return Ok(()),
                    Err(err) => return Err(err),
                }
            },
            Err(err) if !err.is_fatal() => {
                warn!("音频解码不可用, 后续仅解码视频: {}", err);
                self.audio = None;
                self.audio_stream = None;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
