//! 解码器 trait 定义.
//!
//! 所有解码器实现必须实现 `Decoder` trait.

use ying_core::YingResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::frame::Frame;
use crate::packet::Packet;

/// 解码器 trait
///
/// 解码流程:
/// 1. 调用 `open()` 传入参数, 解码器在此一次性分配全部缓冲区
/// 2. 调用 `send_packet()` 送入压缩数据
/// 3. 循环调用 `receive_frame()` 取出解码后的帧, 直到返回 `NeedMoreData`
pub trait Decoder: Send {
    /// 获取解码器标识
    fn codec_id(&self) -> CodecId;

    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 使用参数配置解码器
    fn open(&mut self, params: &CodecParameters) -> YingResult<()>;

    /// 送入一个压缩数据包进行解码
    ///
    /// # 返回
    /// - `Ok(())`: 数据包已解码, 结果可通过 `receive_frame()` 取出
    /// - `Err(YingError::Unsupported)`: 编码变体不受支持, 调用方可关闭该流继续
    /// - 其他错误: 码流损坏, 应中止解码
    fn send_packet(&mut self, packet: &Packet) -> YingResult<()>;

    /// 从解码器取出一帧解码数据
    ///
    /// # 返回
    /// - `Ok(frame)`: 成功取出一帧
    /// - `Err(YingError::NeedMoreData)`: 需要送入更多数据包
    fn receive_frame(&mut self) -> YingResult<Frame>;

    /// 刷新解码器, 清空待取出的帧并重置跨包状态
    ///
    /// 用于 seek 到关键帧之后.
    fn flush(&mut self);
}
