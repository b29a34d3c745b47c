//! Bink 视频解码器 (修订版 f/g/h/i).
//!
//! 每个视频包依次包含可选的 alpha 平面、亮度平面和两个色度平面,
//! 每个平面结束后对齐到 32 位. 解码完成后把 YUVA 平面转换为 BGRA,
//! 再交换当前/上一帧平面, 供下一帧的 Skip/Motion 等块类型引用.
//!
//! 修订版差异:
//! - `h`/`i`: 色度平面按 V, U 顺序存放
//! - `i`: alpha 平面和亮度平面之前各有一个 32 位字, 颜色值不做偏置

mod bundle;
mod convert;
mod huffman;
mod plane;
mod tables;
mod transform;


use log::{debug, trace, warn};
use ying_core::{BitCursor, Rational, YingError, YingResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, CodecParamsType};
use crate::decoder::Decoder;
use crate::frame::{Frame, PictureType, VideoFrame};
use crate::packet::Packet;

use self::bundle::Bundles;
use self::plane::{Plane, PlaneDecoder};

/// 视频标志位: 带 alpha 平面
pub const VIDEO_FLAG_ALPHA: u32 = 1 << 20;
/// 视频标志位: 灰度 (不解码色度)
pub const VIDEO_FLAG_GRAY: u32 = 1 << 17;

/// Bink 码流修订版, 取自四字符码的最后一个字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinkRevision {
    F,
    G,
    H,
    I,
}

impl BinkRevision {
    /// 从四字符码解析修订版
    pub fn from_tag(tag: &[u8; 4]) -> Option<Self> {
        if &tag[..3] != b"BIK" {
            return None;
        }
        match tag[3] {
            b'f' => Some(Self::F),
            b'g' => Some(Self::G),
            b'h' => Some(Self::H),
            b'i' => Some(Self::I),
            _ => None,
        }
    }

    /// 色度平面是否按 V, U 顺序存放
    pub fn swaps_chroma(self) -> bool {
        self >= Self::H
    }

    /// 颜色值是否做符号折叠与偏置
    pub fn rebias_colors(self) -> bool {
        self != Self::I
    }

    /// 平面数据前是否带一个 32 位字
    fn has_plane_prefix(self) -> bool {
        self == Self::I
    }
}

/// 打开后分配一次的解码状态
struct VideoState {
    width: usize,
    height: usize,
    revision: BinkRevision,
    has_alpha: bool,
    /// Y, U, V, A
    cur: [Plane; 4],
    prev: [Plane; 4],
    bundles: Bundles,
    time_base: Rational,
}

impl VideoState {
    fn new(width: u32, height: u32, revision: BinkRevision, has_alpha: bool) -> Self {
        let planes = || {
            let (w, h) = (width as usize, height as usize);
            [
                Plane::new(w, h, false, 0),
                Plane::new(w, h, true, 0),
                Plane::new(w, h, true, 0),
                Plane::new(w, h, false, 255),
            ]
        };
        Self {
            width: width as usize,
            height: height as usize,
            revision,
            has_alpha,
            cur: planes(),
            prev: planes(),
            bundles: Bundles::new(width, height, revision.rebias_colors()),
            time_base: Rational::UNDEFINED,
        }
    }

    /// 解码一个平面; `index` 为 0..4 (Y, U, V, A)
    fn decode_plane(&mut self, br: &mut BitCursor<'_>, index: usize) -> YingResult<()> {
        let chroma = index == 1 || index == 2;
        let (block_w, block_h) = if chroma {
            ((self.width + 15) >> 4, (self.height + 15) >> 4)
        } else {
            ((self.width + 7) >> 3, (self.height + 7) >> 3)
        };
        PlaneDecoder::new(br, &mut self.bundles, &mut self.cur[index], &self.prev[index])
            .decode(block_w, block_h, chroma)
    }

    fn decode_frame(&mut self, data: &[u8]) -> YingResult<()> {
        let mut br = BitCursor::new(data);

        if self.has_alpha {
            if self.revision.has_plane_prefix() {
                br.skip(32)?;
            }
            self.decode_plane(&mut br, 3)?;
        }
        if self.revision.has_plane_prefix() {
            br.skip(32)?;
        }

        for i in 0..3 {
            let index = if i == 0 || !self.revision.swaps_chroma() {
                i
            } else {
                i ^ 3
            };
            self.decode_plane(&mut br, index)?;
            // 亮度平面总要解码, 之后数据耗尽则保留剩余平面
            if br.pos() >= br.size() {
                break;
            }
        }
        Ok(())
    }

    fn output(&self, frame: &mut VideoFrame) {
        convert::yuva_to_bgra(&self.cur, self.width, self.height, &mut frame.data);
    }
}

/// Bink 视频解码器
pub struct BinkVideoDecoder {
    state: Option<VideoState>,
    /// 已解码待取出的帧
    pending: Option<Frame>,
}

impl BinkVideoDecoder {
    pub fn create() -> YingResult<Box<dyn Decoder>> {
        Ok(Box::new(Self {
            state: None,
            pending: None,
        }))
    }
}

impl Decoder for BinkVideoDecoder {
    fn codec_id(&self) -> CodecId {
        CodecId::BinkVideo
    }

    fn name(&self) -> &str {
        "binkvideo"
    }

    fn open(&mut self, params: &CodecParameters) -> YingResult<()> {
        let video = match &params.params {
            CodecParamsType::Video(v) => v,
            _ => {
                return Err(YingError::InvalidArgument(
                    "binkvideo 解码器需要视频参数".into(),
                ));
            }
        };
        if video.width == 0 || video.height == 0 {
            return Err(YingError::InvalidArgument("宽度和高度不能为 0".into()));
        }
        let revision = BinkRevision::from_tag(&video.codec_tag).ok_or_else(|| {
            YingError::Format(format!(
                "不支持的 Bink 修订版: {}",
                String::from_utf8_lossy(&video.codec_tag)
            ))
        })?;

        let flags = match params.extra_data.get(..4) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        };
        let has_alpha = flags & VIDEO_FLAG_ALPHA != 0;
        if flags & VIDEO_FLAG_GRAY != 0 {
            warn!("Bink 灰度标志不受支持, 按彩色解码");
        }

        let mut state = VideoState::new(video.width, video.height, revision, has_alpha);
        if video.frame_rate.is_valid() {
            state.time_base = video.frame_rate.invert();
        }
        debug!(
            "打开 binkvideo 解码器: {}x{}, 修订版={:?}, alpha={}",
            video.width, video.height, revision, has_alpha,
        );

        self.state = Some(state);
        self.pending = None;
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> YingResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Err(YingError::InvalidArgument(
                "解码器未打开, 请先调用 open()".into(),
            ));
        };
        if self.pending.is_some() {
            return Err(YingError::NeedMoreData);
        }

        state.decode_frame(&packet.data)?;

        let mut frame = VideoFrame::new(state.width as u32, state.height as u32);
        state.output(&mut frame);
        frame.pts = packet.pts;
        frame.time_base = if packet.time_base.is_valid() {
            packet.time_base
        } else {
            state.time_base
        };
        frame.is_keyframe = packet.is_keyframe;
        frame.picture_type = if packet.is_keyframe {
            PictureType::I
        } else {
            PictureType::P
        };
        std::mem::swap(&mut state.cur, &mut state.prev);

        trace!("binkvideo: 帧 {} 解码完成, {} 字节", packet.pts, packet.size());
        self.pending = Some(Frame::Video(frame));
        Ok(())
    }

    fn receive_frame(&mut self) -> YingResult<Frame> {
        self.pending.take().ok_or(YingError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.pending = None;
    }
}
