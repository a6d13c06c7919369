//! 设备后端.
//!
//! [`VdeBackend`] 只描述单次设备原语, 每个方法对应一次系统调用,
//! 重试策略由上层 ([`crate::retry`]) 统一施加.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

use bitflags::bitflags;
use log::debug;
use memmap2::{MmapMut, MmapOptions};

use crate::abi::{self, TegraVdeH264DecoderCtx, TegraVdeH264Frame};
use crate::request::DecodeRequest;

bitflags! {
    /// PRIME 导出标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PrimeFlags: u32 {
        /// `DRM_CLOEXEC`
        const CLOEXEC = libc::O_CLOEXEC as u32;
        /// `DRM_RDWR`
        const RDWR    = libc::O_RDWR as u32;
    }
}

/// 设备原语
pub trait VdeBackend {
    /// 分配 GEM 对象, 返回句柄
    fn gem_create(&self, size: usize) -> io::Result<u32>;

    /// 查询 GEM 对象的 mmap 偏移
    fn gem_mmap_offset(&self, handle: u32) -> io::Result<u64>;

    /// 在给定偏移处建立可写共享映射
    fn map(&self, handle: u32, offset: u64, size: usize) -> io::Result<MmapMut>;

    /// 将 GEM 句柄导出为文件描述符
    fn prime_handle_to_fd(&self, handle: u32, flags: PrimeFlags) -> io::Result<OwnedFd>;

    /// 关闭 GEM 句柄
    fn gem_close(&self, handle: u32) -> io::Result<()>;

    /// 提交一次 H.264 解码
    fn decode_h264(&self, request: &DecodeRequest) -> io::Result<()>;
}

impl<T: VdeBackend + ?Sized> VdeBackend for &T {
    fn gem_create(&self, size: usize) -> io::Result<u32> {
        (**self).gem_create(size)
    }

    fn gem_mmap_offset(&self, handle: u32) -> io::Result<u64> {
        (**self).gem_mmap_offset(handle)
    }

    fn map(&self, handle: u32, offset: u64, size: usize) -> io::Result<MmapMut> {
        (**self).map(handle, offset, size)
    }

    fn prime_handle_to_fd(&self, handle: u32, flags: PrimeFlags) -> io::Result<OwnedFd> {
        (**self).prime_handle_to_fd(handle, flags)
    }

    fn gem_close(&self, handle: u32) -> io::Result<()> {
        (**self).gem_close(handle)
    }

    fn decode_h264(&self, request: &DecodeRequest) -> io::Result<()> {
        (**self).decode_h264(request)
    }
}

/// Tegra DRM + VDE 设备节点后端
#[derive(Debug)]
pub struct TegraBackend {
    drm: File,
    vde: File,
}

impl TegraBackend {
    /// 以读写方式打开 DRM 与 VDE 设备节点
    pub fn open(drm_path: impl AsRef<Path>, vde_path: impl AsRef<Path>) -> io::Result<Self> {
        let drm = open_node(drm_path.as_ref())?;
        let vde = open_node(vde_path.as_ref())?;
        debug!(
            "打开设备节点: drm={}, vde={}",
            drm_path.as_ref().display(),
            vde_path.as_ref().display()
        );
        Ok(Self { drm, vde })
    }
}

fn open_node(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// 单次 ioctl, 失败时返回 errno
fn ioctl<T>(fd: &impl AsRawFd, request: u64, arg: &mut T) -> io::Result<()> {
    // SAFETY: `arg` 指向与 `request` 编码尺寸一致的 ABI 结构, 调用期间保持独占借用.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, arg as *mut T) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl VdeBackend for TegraBackend {
    fn gem_create(&self, size: usize) -> io::Result<u32> {
        let mut args = abi::DrmTegraGemCreate {
            size: size as u64,
            ..Default::default()
        };
        ioctl(&self.drm, abi::DRM_IOCTL_TEGRA_GEM_CREATE, &mut args)?;
        Ok(args.handle)
    }

    fn gem_mmap_offset(&self, handle: u32) -> io::Result<u64> {
        let mut args = abi::DrmTegraGemMmap {
            handle,
            ..Default::default()
        };
        ioctl(&self.drm, abi::DRM_IOCTL_TEGRA_GEM_MMAP, &mut args)?;
        Ok(args.offset)
    }

    fn map(&self, _handle: u32, offset: u64, size: usize) -> io::Result<MmapMut> {
        // SAFETY: GEM 对象由本进程独占持有, 映射存活期间不会被截断.
        unsafe { MmapOptions::new().offset(offset).len(size).map_mut(&self.drm) }
    }

    fn prime_handle_to_fd(&self, handle: u32, flags: PrimeFlags) -> io::Result<OwnedFd> {
        let mut args = abi::DrmPrimeHandle {
            handle,
            flags: flags.bits(),
            fd: -1,
        };
        ioctl(&self.drm, abi::DRM_IOCTL_PRIME_HANDLE_TO_FD, &mut args)?;
        // SAFETY: 驱动返回的是新分配且未被其他对象持有的描述符.
        Ok(unsafe { OwnedFd::from_raw_fd(args.fd) })
    }

    fn gem_close(&self, handle: u32) -> io::Result<()> {
        let mut args = abi::DrmGemClose { handle, pad: 0 };
        ioctl(&self.drm, abi::DRM_IOCTL_GEM_CLOSE, &mut args)
    }

    fn decode_h264(&self, request: &DecodeRequest) -> io::Result<()> {
        let frames: Vec<TegraVdeH264Frame> = request.frames.iter().map(Into::into).collect();
        let mut ctx = TegraVdeH264DecoderCtx::new(request, &frames);
        ioctl(&self.vde, abi::TEGRA_VDE_IOCTL_DECODE_H264, &mut ctx)
    }
}
