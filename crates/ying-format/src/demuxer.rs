//! 解封装器 (Demuxer) trait 定义.

use ying_codec::Packet;
use ying_core::YingResult;

use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 解析头部
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包, 直到返回 `Eof`
/// 4. 可选: 调用 `seek()` 定位到关键帧
pub trait Demuxer: Send {
    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开容器并解析头部信息
    fn open(&mut self, io: &mut IoContext) -> YingResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(YingError::Eof)`: 已读完全部帧
    fn read_packet(&mut self, io: &mut IoContext) -> YingResult<Packet>;

    /// 定位到目标帧之前 (含) 最近的关键帧, 返回实际定位到的帧序号
    fn seek(&mut self, io: &mut IoContext, frame_index: u64) -> YingResult<u64>;

    /// 获取时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;
}
