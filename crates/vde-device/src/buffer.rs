//! 硬件缓冲区 (GEM 对象) 管理.
//!
//! 缓冲区不持有设备引用, 每个操作显式传入后端.
//! 映射与导出都是惰性的, 可以独立于句柄释放.
//! 句柄只能通过 [`HardwareBuffer::release`] 释放一次, 未释放就被丢弃时记录泄漏警告.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::{debug, warn};
use memmap2::MmapMut;
use vde_core::{VdeError, VdeResult};

use crate::backend::{PrimeFlags, VdeBackend};
use crate::retry::retry;

/// 设备可见的内存缓冲区
#[derive(Debug)]
pub struct HardwareBuffer {
    handle: u32,
    size: usize,
    map: Option<MmapMut>,
    fd: Option<OwnedFd>,
    released: bool,
}

impl HardwareBuffer {
    /// 分配 `size` 字节的 GEM 对象
    pub fn create<B: VdeBackend + ?Sized>(backend: &B, size: usize) -> VdeResult<Self> {
        let handle = retry("GEM_CREATE", || backend.gem_create(size))
            .map_err(|source| VdeError::AllocationFailed { size, source })?;

        debug!("GEM 缓冲区已分配: handle={handle}, size={size}");

        Ok(Self {
            handle,
            size,
            map: None,
            fd: None,
            released: false,
        })
    }

    /// GEM 句柄
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// 字节数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 是否已映射
    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    /// 映射到进程地址空间
    ///
    /// 已映射时直接返回现有映射, 不再发起设备调用.
    pub fn map<B: VdeBackend + ?Sized>(&mut self, backend: &B) -> VdeResult<&mut [u8]> {
        let map = match self.map.take() {
            Some(map) => map,
            None => {
                let handle = self.handle;
                let offset = retry("GEM_MMAP", || backend.gem_mmap_offset(handle))
                    .map_err(|source| VdeError::MapFailed { handle, source })?;
                let map = backend
                    .map(handle, offset, self.size)
                    .map_err(|source| VdeError::MapFailed { handle, source })?;
                debug!("GEM 缓冲区已映射: handle={handle}, offset={offset:#x}");
                map
            }
        };
        Ok(&mut self.map.insert(map)[..])
    }

    /// 当前映射 (只读)
    pub fn mapped(&self) -> Option<&[u8]> {
        self.map.as_deref()
    }

    /// 解除映射, 句柄与导出的描述符保持有效
    pub fn unmap(&mut self) {
        if self.map.take().is_some() {
            debug!("GEM 缓冲区已解除映射: handle={}", self.handle);
        }
    }

    /// 导出为文件描述符
    ///
    /// 已导出时返回现有描述符.
    pub fn export<B: VdeBackend + ?Sized>(
        &mut self,
        backend: &B,
        flags: PrimeFlags,
    ) -> VdeResult<RawFd> {
        if let Some(fd) = &self.fd {
            return Ok(fd.as_raw_fd());
        }

        let handle = self.handle;
        let fd = retry("PRIME_HANDLE_TO_FD", || {
            backend.prime_handle_to_fd(handle, flags)
        })
        .map_err(|source| VdeError::ExportFailed { handle, source })?;

        let raw = fd.as_raw_fd();
        self.fd = Some(fd);
        debug!("GEM 缓冲区已导出: handle={handle}, fd={raw}");
        Ok(raw)
    }

    /// 已导出的文件描述符
    pub fn fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// 解除映射, 关闭导出的描述符, 释放句柄
    pub fn release<B: VdeBackend + ?Sized>(mut self, backend: &B) -> VdeResult<()> {
        self.map = None;
        self.fd = None;

        let handle = self.handle;
        retry("GEM_CLOSE", || backend.gem_close(handle))
            .map_err(|source| VdeError::ReleaseFailed { handle, source })?;

        self.released = true;
        debug!("GEM 缓冲区已释放: handle={handle}");
        Ok(())
    }

    /// 出错回滚时释放, 释放本身的错误只记录不返回
    pub(crate) fn discard<B: VdeBackend + ?Sized>(self, backend: &B) {
        let handle = self.handle;
        if let Err(err) = self.release(backend) {
            warn!("回滚时释放 GEM 缓冲区失败: handle={handle}, {err}");
        }
    }
}

impl Drop for HardwareBuffer {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "GEM 缓冲区未释放即被丢弃, 句柄泄漏: handle={}, size={}",
                self.handle, self.size
            );
        }
    }
}
