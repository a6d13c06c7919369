//! # vde-device
//!
//! VDE 解码框架设备访问库, 负责与 Tegra DRM / VDE 内核驱动交互.
//!
//! - [`buffer`]: GEM 缓冲区的分配、映射、导出与释放
//! - [`session`]: 解码会话, 将切片数据与参数集提交给硬件
//! - [`backend`]: 设备原语抽象, 真实设备由 [`TegraBackend`] 实现
//!
//! 所有设备调用都是阻塞的, 被信号打断或暂时无法完成时透明重试.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use vde_device::{DecodeSession, SessionConfig};
//!
//! # fn demo(extradata: &[u8], slice: &[u8]) -> vde_core::VdeResult<()> {
//! let config = vde_codec::h264::parse_config(extradata)?;
//! let mut session = DecodeSession::open_tegra(SessionConfig::default())?;
//!
//! let mut frame = session.decode(&config, slice)?;
//! let image = session.detile(&mut frame)?;
//! println!("{}x{}, pitch={}", image.width, image.height, image.pitch);
//!
//! session.release_frame(frame)?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod backend;
pub mod buffer;
pub mod config;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod request;
pub mod retry;
pub mod session;
#[cfg(test)]
mod test_support;

// 重导出常用类型
pub use backend::{PrimeFlags, TegraBackend, VdeBackend};
pub use buffer::HardwareBuffer;
pub use config::SessionConfig;
pub use request::{BufferRef, DecodeRequest, FrameDescriptor, FrameFlags, H264DecodeParams};
pub use session::{DecodeSession, TiledFrame};
