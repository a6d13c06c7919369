//! 统一错误类型定义.
//!
//! 所有 VDE crate 共用的错误类型, 支持跨模块传播.
//!
//! 错误分为三类:
//! - 码流错误: 比特读取器耗尽, 变长码非法
//! - 能力错误: 语法合法但超出支持的 Baseline 子集
//! - 设备错误: GEM 分配/映射/导出失败, 解码请求被驱动拒绝
//!
//! 设备调用中的 `EINTR`/`EAGAIN` 会被透明重试, 不会以错误形式出现在这里.

use std::io;

use thiserror::Error;

/// VDE 框架统一错误类型
#[derive(Debug, Error)]
pub enum VdeError {
    /// 比特读取器已耗尽
    #[error("比特流数据不足")]
    OutOfData,

    /// 请求的位宽超出目标整数类型容量
    #[error("无效位宽: 请求 {requested} 位, 最多 {max} 位")]
    InvalidWidth {
        /// 请求读取的位数
        requested: u32,
        /// 目标类型可容纳的最大位数
        max: u32,
    },

    /// Exp-Golomb 前缀达到 32 个零仍未终止
    #[error("Exp-Golomb 码过长, 前导零达到 32 个")]
    CodeTooLong,

    /// 语法合法但不在支持范围内
    #[error("不支持: {0}")]
    Unsupported(String),

    /// profile_idc 不是 Baseline
    #[error("不支持的 profile_idc: {0} (仅支持 Baseline=66)")]
    UnsupportedProfile(u8),

    /// 像素格式未注册
    #[error("未知像素格式: {0:#010x}")]
    UnknownFormat(u32),

    /// 无效数据 (长度字段越界等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 无效参数 (调用方配置错误)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// GEM 缓冲区分配失败
    #[error("GEM 缓冲区分配失败, size={size}")]
    AllocationFailed {
        /// 请求的字节数
        size: usize,
        #[source]
        source: io::Error,
    },

    /// GEM 缓冲区映射失败
    #[error("GEM 缓冲区映射失败, handle={handle}")]
    MapFailed {
        /// GEM 句柄
        handle: u32,
        #[source]
        source: io::Error,
    },

    /// GEM 句柄导出为文件描述符失败
    #[error("GEM 句柄导出失败, handle={handle}")]
    ExportFailed {
        /// GEM 句柄
        handle: u32,
        #[source]
        source: io::Error,
    },

    /// GEM 句柄释放失败
    #[error("GEM 句柄释放失败, handle={handle}")]
    ReleaseFailed {
        /// GEM 句柄
        handle: u32,
        #[source]
        source: io::Error,
    },

    /// 解码请求被硬件/驱动拒绝
    #[error("设备错误: {context}")]
    DeviceError {
        /// 出错的设备操作
        context: String,
        #[source]
        source: io::Error,
    },

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),
}

/// VDE 框架统一 Result 类型
pub type VdeResult<T> = Result<T, VdeError>;
