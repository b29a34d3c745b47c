//! Bink 音频解码器.
//!
//! 每个音频包以 4 字节小端的采样字节数开头, 其后是若干个 32 位对齐的块.
//! 每个块对各声道读取分频带量化的频域系数, 经 DCT-III 合成为时域采样,
//! 与上一块的尾部做线性交叉淡化后输出 `(帧长 - 重叠长度) * 声道数` 个交错采样.
//!
//! RDFT 变体只解析参数, 解码时报告为不支持.

mod dct;
mod tables;

use std::collections::VecDeque;

use log::{debug, trace, warn};
use ying_core::{BitCursor, YingError, YingResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, CodecParamsType};
use crate::decoder::Decoder;
use crate::frame::{AudioFrame, Frame};
use crate::packet::Packet;

use self::dct::DctIII;
use self::tables::*;

/// 频域合成方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinkAudioVariant {
    Dct,
    Rdft,
}

/// 一条音轨的解码状态, 打开时一次性分配
struct AudioState {
    sample_rate: u32,
    channels: usize,
    frame_len: usize,
    overlap_len: usize,
    /// 每块输出的交错采样数
    block_size: usize,
    root: f32,
    /// 频带边界 (系数下标的一半), 共 `band_count + 1` 项
    bands: Vec<usize>,
    quant: [f32; MAX_BANDS],
    /// 每声道 `frame_len` 个系数
    coeffs: Vec<Vec<f32>>,
    dct: DctIII,
    /// 交错的整块输出 (`frame_len * channels`)
    out: Vec<i16>,
    /// 上一块的重叠尾部
    tail: Vec<i16>,
    first: bool,
}

impl AudioState {
    fn new(sample_rate: u32, channels: usize) -> Self {
        let frame_bits = if sample_rate < 22050 {
            9
        } else if sample_rate < 44100 {
            10
        } else {
            11
        };
        let frame_len = 1usize << frame_bits;
        let overlap_len = frame_len / 16;
        let half_rate = (sample_rate + 1) / 2;

        let mut band_count = 1;
        while band_count < MAX_BANDS && half_rate > CRITICAL_FREQS[band_count - 1] {
            band_count += 1;
        }
        let mut bands = vec![1usize; band_count + 1];
        for (i, band) in bands.iter_mut().enumerate().take(band_count).skip(1) {
            *band = (u64::from(CRITICAL_FREQS[i - 1]) * (frame_len as u64 / 2)
                / u64::from(half_rate.max(1))) as usize;
        }
        bands[band_count] = frame_len / 2;

        Self {
            sample_rate,
            channels,
            frame_len,
            overlap_len,
            block_size: (frame_len - overlap_len) * channels,
            root: 2.0 / (frame_len as f32).sqrt(),
            bands,
            quant: [0.0; MAX_BANDS],
            coeffs: vec![vec![0.0; frame_len]; channels],
            dct: DctIII::new(frame_bits),
            out: vec![0; frame_len * channels],
            tail: vec![0; overlap_len * channels],
            first: true,
        }
    }

    fn band_count(&self) -> usize {
        self.bands.len() - 1
    }

    /// 5 位指数 + 23 位尾数 + 符号位
    fn read_float(br: &mut BitCursor<'_>) -> YingResult<f32> {
        let power = br.bits(5)? as i32;
        let mantissa = br.bits(23)? as f32;
        let f = mantissa * 2f32.powi(power - 23);
        Ok(if br.flag()? { -f } else { f })
    }

    /// 读取一个声道的频域系数
    fn read_coeffs(&mut self, br: &mut BitCursor<'_>, ch: usize) -> YingResult<()> {
        let root = self.root;
        let frame_len = self.frame_len;
        let coeffs = &mut self.coeffs[ch];

        coeffs[0] = Self::read_float(br)? * root;
        coeffs[1] = Self::read_float(br)? * root;

        let band_count = self.bands.len() - 1;
        for q in self.quant.iter_mut().take(band_count) {
            let v = br.bits(8)?.min(MAX_QUANT_INDEX);
            *q = (v as f32 * QUANT_EXP_SCALE).exp() * root;
        }

        let bands = &self.bands;
        let mut q = 0.0f32;
        let mut k = 0usize;
        let mut i = 2usize;
        while i < frame_len {
            let run = if br.flag()? {
                RLE_LENGTHS[br.bits(4)? as usize] * 8
            } else {
                8
            };
            let j = (i + run).min(frame_len);

            let width = br.bits(4)?;
            if width == 0 {
                coeffs[i..j].fill(0.0);
                i = j;
                while bands[k] * 2 < i {
                    q = self.quant[k];
                    k += 1;
                }
            } else {
                while i < j {
                    if bands[k] * 2 == i {
                        q = self.quant[k];
                        k += 1;
                    }
                    let coeff = br.bits(width)?;
                    coeffs[i] = if coeff == 0 {
                        0.0
                    } else if br.flag()? {
                        -q * coeff as f32
                    } else {
                        q * coeff as f32
                    };
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// 解码一个块的频域系数并合成完整的 `frame_len * channels` 个交错采样
    fn synthesize(&mut self, br: &mut BitCursor<'_>) -> YingResult<()> {
        br.skip(2)?;

        let scale = self.dct.len() as f32 / 2.0;
        for ch in 0..self.channels {
            self.read_coeffs(br, ch)?;
            let coeffs = &mut self.coeffs[ch];
            coeffs[0] /= 0.5;
            self.dct.calc(coeffs);
            for (i, c) in coeffs.iter().enumerate() {
                let v = 385.0 + c * scale * (1.0 / 32767.0);
                self.out[i * self.channels + ch] = float_to_i16(v);
            }
        }
        Ok(())
    }

    /// 与上一块尾部交叉淡化, 并保存本块尾部
    fn overlap(&mut self) {
        let count = self.overlap_len * self.channels;
        if !self.first {
            let shift = count.trailing_zeros();
            let count = count as i32;
            for (i, (out, &prev)) in self.out.iter_mut().zip(self.tail.iter()).enumerate() {
                let i = i as i32;
                *out = ((i32::from(prev) * (count - i) + i32::from(*out) * i) >> shift) as i16;
            }
        }
        self.tail
            .copy_from_slice(&self.out[self.block_size..self.block_size + count]);
        self.first = false;
    }

    /// 解码一个块, 返回可输出的交错采样
    fn decode_block(&mut self, br: &mut BitCursor<'_>) -> YingResult<Vec<i16>> {
        self.synthesize(br)?;
        self.overlap();
        br.align_to_32();
        Ok(self.out[..self.block_size].to_vec())
    }

    fn reset(&mut self) {
        self.tail.fill(0);
        self.first = true;
    }
}

/// 把 `384.0..386.0` 范围内的浮点数映射为 i16
///
/// 该范围内尾数的低 16 位即 `样本 + 0x8000`; 超出范围的值饱和到 i16 边界.
fn float_to_i16(v: f32) -> i16 {
    let bits = v.to_bits() as i32;
    let t = if bits & 0xF_0000 != 0 {
        (0x43C0_FFFF - i64::from(bits)) >> 63
    } else {
        i64::from(bits)
    };
    (t - 0x8000) as i16
}

/// Bink 音频解码器
pub struct BinkAudioDecoder {
    variant: BinkAudioVariant,
    state: Option<AudioState>,
    /// 已解码待取出的块
    pending: VecDeque<Frame>,
}

impl BinkAudioDecoder {
    fn new(variant: BinkAudioVariant) -> Self {
        Self {
            variant,
            state: None,
            pending: VecDeque::new(),
        }
    }

    pub fn create_dct() -> YingResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new(BinkAudioVariant::Dct)))
    }

    pub fn create_rdft() -> YingResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new(BinkAudioVariant::Rdft)))
    }
}

impl Decoder for BinkAudioDecoder {
    fn codec_id(&self) -> CodecId {
        match self.variant {
            BinkAudioVariant::Dct => CodecId::BinkAudioDct,
            BinkAudioVariant::Rdft => CodecId::BinkAudioRdft,
        }
    }

    fn name(&self) -> &str {
        self.codec_id().name()
    }

    fn open(&mut self, params: &CodecParameters) -> YingResult<()> {
        let audio = match &params.params {
            CodecParamsType::Audio(a) => a,
            _ => {
                return Err(YingError::InvalidArgument(
                    "binkaudio 解码器需要音频参数".into(),
                ));
            }
        };
        if audio.sample_rate == 0 {
            return Err(YingError::InvalidArgument("采样率不能为 0".into()));
        }
        if !(1..=2).contains(&audio.channels) {
            return Err(YingError::InvalidArgument(format!(
                "不支持的声道数: {}",
                audio.channels
            )));
        }

        let state = AudioState::new(audio.sample_rate, audio.channels as usize);
        debug!(
            "打开 {} 解码器: {} Hz, {} 声道, 帧长={}, 频带数={}",
            self.name(),
            audio.sample_rate,
            audio.channels,
            state.frame_len,
            state.band_count(),
        );
        self.state = Some(state);
        self.pending.clear();
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> YingResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Err(YingError::InvalidArgument(
                "解码器未打开, 请先调用 open()".into(),
            ));
        };
        let Some(header) = packet.data.get(..4) else {
            return Err(YingError::Format(format!(
                "音频包过短: {} 字节",
                packet.size()
            )));
        };
        let sample_bytes = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);

        let mut br = BitCursor::new(&packet.data[4..]);
        if self.variant == BinkAudioVariant::Rdft && !br.is_eof() {
            warn!("binkaudio: RDFT 合成尚未实现");
            return Err(YingError::Unsupported("Bink 音频 RDFT 变体".into()));
        }

        let channels = state.channels;
        let mut blocks = 0usize;
        while br.pos() < br.size() {
            let samples = state.decode_block(&mut br)?;
            self.pending.push_back(Frame::Audio(AudioFrame {
                nb_samples: (samples.len() / channels) as u32,
                samples,
                sample_rate: state.sample_rate,
                channels: channels as u32,
                pts: packet.pts,
            }));
            blocks += 1;
        }
        trace!(
            "binkaudio: 包 {} 声明 {} 采样字节, 解码 {} 块",
            packet.pts, sample_bytes, blocks
        );
        Ok(())
    }

    fn receive_frame(&mut self) -> YingResult<Frame> {
        self.pending.pop_front().ok_or(YingError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.pending.clear();
        if let Some(state) = self.state.as_mut() {
            state.reset();
        }
    }
}
