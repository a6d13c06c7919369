//! 进程内模拟后端.
//!
//! 每个 GEM 对象由一个匿名临时文件承载, 映射与导出都作用于真实的文件描述符,
//! 因此 "写入映射 → 解除映射 → 重新映射" 与硬件行为一致.
//! 模拟后端统计每种设备调用的次数, 并可按调用类型注入错误.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileExt;

use log::trace;
use memmap2::{MmapMut, MmapOptions};
use vde_core::LinearImage;

use crate::backend::{PrimeFlags, VdeBackend};
use crate::request::DecodeRequest;

/// 可注入错误的设备调用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    GemCreate,
    GemMmap,
    Map,
    PrimeHandleToFd,
    GemClose,
    DecodeH264,
}

/// 各设备调用的累计次数 (含失败的调用)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockCalls {
    pub gem_create: usize,
    pub gem_mmap_offset: usize,
    pub map: usize,
    pub prime_handle_to_fd: usize,
    pub gem_close: usize,
    pub decode_h264: usize,
}

/// 一次被接受的解码请求
#[derive(Debug, Clone)]
pub struct RecordedDecode {
    pub request: DecodeRequest,
    /// 提交时码流暂存缓冲区的完整内容
    pub bitstream: Vec<u8>,
}

#[derive(Debug)]
struct MockObject {
    file: File,
    size: usize,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u32,
    objects: HashMap<u32, MockObject>,
    exported: HashMap<RawFd, u32>,
    faults: HashMap<MockOp, VecDeque<Option<i32>>>,
    calls: MockCalls,
    decodes: Vec<RecordedDecode>,
    decode_output: Option<LinearImage>,
}

/// 模拟 Tegra 设备
#[derive(Debug, Default)]
pub struct MockBackend {
    state: RefCell<MockState>,
}

fn mmap_offset_of(handle: u32) -> u64 {
    u64::from(handle) << 12
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 令下一次 `op` 调用以 `errno` 失败, 多次调用按顺序排队
    pub fn fail_next(&self, op: MockOp, errno: i32) {
        self.fail_after(op, 0, errno);
    }

    /// 放行接下来 `successes` 次 `op` 调用, 之后的一次以 `errno` 失败
    pub fn fail_after(&self, op: MockOp, successes: usize, errno: i32) {
        let mut state = self.state.borrow_mut();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat_n(None, successes));
        queue.push_back(Some(errno));
    }

    /// 解码成功时写入输出帧的图像
    ///
    /// 图像按请求中的修饰符平铺后写入目标帧, 尺寸须与请求的宏块尺寸一致.
    pub fn set_decode_output(&self, image: LinearImage) {
        self.state.borrow_mut().decode_output = Some(image);
    }

    pub fn calls(&self) -> MockCalls {
        self.state.borrow().calls
    }

    /// 尚未关闭的 GEM 对象数量
    pub fn live_objects(&self) -> usize {
        self.state.borrow().objects.len()
    }

    pub fn is_live(&self, handle: u32) -> bool {
        self.state.borrow().objects.contains_key(&handle)
    }

    /// 读取 GEM 对象的完整内容
    pub fn read_object(&self, handle: u32) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let object = state.objects.get(&handle)?;
        read_all(object).ok()
    }

    /// 已接受的解码请求
    pub fn decodes(&self) -> Vec<RecordedDecode> {
        self.state.borrow().decodes.clone()
    }

    fn enter(&self, op: MockOp) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let calls = &mut state.calls;
        match op {
            MockOp::GemCreate => calls.gem_create += 1,
            MockOp::GemMmap => calls.gem_mmap_offset += 1,
            MockOp::Map => calls.map += 1,
            MockOp::PrimeHandleToFd => calls.prime_handle_to_fd += 1,
            MockOp::GemClose => calls.gem_close += 1,
            MockOp::DecodeH264 => calls.decode_h264 += 1,
        }

        match state.faults.get_mut(&op).and_then(VecDeque::pop_front).flatten() {
            Some(code) => {
                trace!("模拟后端注入错误: {op:?}, errno={code}");
                Err(errno(code))
            }
            None => Ok(()),
        }
    }
}

fn read_all(object: &MockObject) -> io::Result<Vec<u8>> {
    let mut data = vec![0u8; object.size];
    object.file.read_exact_at(&mut data, 0)?;
    Ok(data)
}

impl MockState {
    fn resolve_fd(&self, fd: RawFd) -> io::Result<&MockObject> {
        self.exported
            .get(&fd)
            .and_then(|handle| self.objects.get(handle))
            .ok_or_else(|| errno(libc::EBADF))
    }

    fn write_decode_output(&self, request: &DecodeRequest) -> io::Result<()> {
        let Some(image) = &self.decode_output else {
            return Ok(());
        };
        let frame = request.frames.first().ok_or_else(|| errno(libc::EINVAL))?;
        let target = self.resolve_fd(frame.y_fd)?;

        let params = &request.params;
        let layout = vde_scale::layout(
            params.pic_width_in_mbs * 16,
            params.pic_height_in_mbs * 16,
            image.format,
            frame.modifier,
        )
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let tiled = vde_scale::tile(image, &layout)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        if u64::from(frame.y_offset) + tiled.len() as u64 > target.size as u64 {
            return Err(errno(libc::EINVAL));
        }
        target.file.write_all_at(&tiled, u64::from(frame.y_offset))
    }
}

impl VdeBackend for MockBackend {
    fn gem_create(&self, size: usize) -> io::Result<u32> {
        self.enter(MockOp::GemCreate)?;
        if size == 0 {
            return Err(errno(libc::EINVAL));
        }

        let file = tempfile::tempfile()?;
        file.set_len(size as u64)?;

        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.objects.insert(handle, MockObject { file, size });
        Ok(handle)
    }

    fn gem_mmap_offset(&self, handle: u32) -> io::Result<u64> {
        self.enter(MockOp::GemMmap)?;
        if !self.is_live(handle) {
            return Err(errno(libc::ENOENT));
        }
        Ok(mmap_offset_of(handle))
    }

    fn map(&self, handle: u32, offset: u64, size: usize) -> io::Result<MmapMut> {
        self.enter(MockOp::Map)?;
        let state = self.state.borrow();
        let object = state.objects.get(&handle).ok_or_else(|| errno(libc::ENOENT))?;
        if offset != mmap_offset_of(handle) || size > object.size {
            return Err(errno(libc::EINVAL));
        }
        // SAFETY: 临时文件只由本模拟后端持有, 长度在对象存活期间不变.
        unsafe { MmapOptions::new().len(size).map_mut(&object.file) }
    }

    fn prime_handle_to_fd(&self, handle: u32, _flags: PrimeFlags) -> io::Result<OwnedFd> {
        self.enter(MockOp::PrimeHandleToFd)?;
        let mut state = self.state.borrow_mut();
        let object = state.objects.get(&handle).ok_or_else(|| errno(libc::ENOENT))?;
        let fd = OwnedFd::from(object.file.try_clone()?);
        state.exported.insert(fd.as_raw_fd(), handle);
        Ok(fd)
    }

    fn gem_close(&self, handle: u32) -> io::Result<()> {
        self.enter(MockOp::GemClose)?;
        let mut state = self.state.borrow_mut();
        if state.objects.remove(&handle).is_none() {
            return Err(errno(libc::EINVAL));
        }
        state.exported.retain(|_, h| *h != handle);
        Ok(())
    }

    fn decode_h264(&self, request: &DecodeRequest) -> io::Result<()> {
        self.enter(MockOp::DecodeH264)?;
        let mut state = self.state.borrow_mut();

        let bitstream = read_all(state.resolve_fd(request.bitstream.fd)?)?;
        state.resolve_fd(request.secure.fd)?;
        if request.frames.is_empty() {
            return Err(errno(libc::EINVAL));
        }
        for frame in &request.frames {
            state.resolve_fd(frame.y_fd)?;
        }

        state.write_decode_output(request)?;
        state.decodes.push(RecordedDecode {
            request: request.clone(),
            bitstream,
        });
        Ok(())
    }
}
