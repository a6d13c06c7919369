//! 硬件解码会话.
//!
//! # 生命周期
//! ```text
//! open ──▶ Open ──decode──▶ Open ──close──▶ Closed
//!            ▲               │
//!            └── TiledFrame ─┘ (所有权转交调用方, 由 release_frame 释放)
//! ```
//!
//! 会话持有两个暂存缓冲区: 码流暂存区与安全上下文. 同一会话同一时刻只允许一次解码,
//! 由 `decode(&mut self)` 的独占借用保证.

use std::os::fd::RawFd;

use log::{debug, info, trace, warn};
use vde_codec::DecoderConfig;
use vde_core::format::FourCc;
use vde_core::{LinearImage, VdeError, VdeResult};
use vde_scale::TiledLayout;

use crate::backend::{PrimeFlags, TegraBackend, VdeBackend};
use crate::buffer::HardwareBuffer;
use crate::config::SessionConfig;
use crate::request::{BufferRef, DecodeRequest, FrameDescriptor, FrameFlags, H264DecodeParams};
use crate::retry::retry;

/// 硬件解码输出帧 (块线性布局)
#[derive(Debug)]
pub struct TiledFrame {
    buffer: HardwareBuffer,
    layout: TiledLayout,
}

impl TiledFrame {
    /// 帧布局
    pub fn layout(&self) -> &TiledLayout {
        &self.layout
    }

    /// 底层缓冲区
    pub fn buffer(&self) -> &HardwareBuffer {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    /// 导出的文件描述符
    pub fn fd(&self) -> Option<RawFd> {
        self.buffer.fd()
    }
}

#[derive(Debug)]
struct Scratch {
    bitstream: HardwareBuffer,
    bitstream_fd: RawFd,
    secure: HardwareBuffer,
    secure_fd: RawFd,
}

/// 硬件解码会话
#[derive(Debug)]
pub struct DecodeSession<B: VdeBackend> {
    backend: B,
    config: SessionConfig,
    format: FourCc,
    export_flags: PrimeFlags,
    scratch: Option<Scratch>,
}

/// 分配并导出缓冲区, 导出失败时释放已分配的句柄
fn create_exported<B: VdeBackend + ?Sized>(
    backend: &B,
    size: usize,
    flags: PrimeFlags,
) -> VdeResult<(HardwareBuffer, RawFd)> {
    let mut buffer = HardwareBuffer::create(backend, size)?;
    match buffer.export(backend, flags) {
        Ok(fd) => Ok((buffer, fd)),
        Err(err) => {
            buffer.discard(backend);
            Err(err)
        }
    }
}

impl DecodeSession<TegraBackend> {
    /// 打开配置中的设备节点并建立会话
    pub fn open_tegra(config: SessionConfig) -> VdeResult<Self> {
        config.validate()?;
        let backend = TegraBackend::open(&config.drm_device, &config.vde_device).map_err(
            |source| VdeError::DeviceError {
                context: format!(
                    "打开设备节点失败: {} / {}",
                    config.drm_device.display(),
                    config.vde_device.display()
                ),
                source,
            },
        )?;
        Self::open(backend, config)
    }
}

impl<B: VdeBackend> DecodeSession<B> {
    /// 在给定后端上建立会话: 分配并导出两个暂存缓冲区
    ///
    /// 任一步失败时, 已分配的缓冲区全部释放后返回首个错误.
    pub fn open(backend: B, config: SessionConfig) -> VdeResult<Self> {
        config.validate()?;
        let format = config.output_format()?;
        let export_flags = config.export_flags()?;

        let (bitstream, bitstream_fd) =
            create_exported(&backend, config.bitstream_size, export_flags)?;
        let (secure, secure_fd) = match create_exported(&backend, config.secure_size, export_flags)
        {
            Ok(pair) => pair,
            Err(err) => {
                bitstream.discard(&backend);
                return Err(err);
            }
        };

        info!(
            "解码会话已建立: bitstream={} 字节, secure={} 字节, 输出格式 {format}, modifier={:#018x}",
            config.bitstream_size, config.secure_size, config.modifier
        );

        Ok(Self {
            backend,
            config,
            format,
            export_flags,
            scratch: Some(Scratch {
                bitstream,
                bitstream_fd,
                secure,
                secure_fd,
            }),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 解码一帧
    ///
    /// `payload` 为一幅编码图像的完整切片数据, 原样转交硬件.
    /// 成功时返回的帧归调用方所有, 须通过 [`release_frame`](Self::release_frame) 释放.
    pub fn decode(&mut self, config: &DecoderConfig, payload: &[u8]) -> VdeResult<TiledFrame> {
        let params = H264DecodeParams::from_config(config)?;

        let Some(scratch) = self.scratch.as_mut() else {
            return Err(VdeError::InvalidArgument("解码会话已关闭".into()));
        };

        if payload.is_empty() {
            return Err(VdeError::InvalidArgument("切片数据为空".into()));
        }
        if payload.len() > scratch.bitstream.size() {
            return Err(VdeError::InvalidArgument(format!(
                "切片数据 {} 字节超出码流暂存区 {} 字节",
                payload.len(),
                scratch.bitstream.size()
            )));
        }

        let staging = scratch.bitstream.map(&self.backend)?;
        let (head, tail) = staging.split_at_mut(payload.len());
        head.copy_from_slice(payload);
        tail.fill(0);
        scratch.bitstream.unmap();

        let (Some(width), Some(height)) = (
            params.pic_width_in_mbs.checked_mul(16),
            params.pic_height_in_mbs.checked_mul(16),
        ) else {
            return Err(VdeError::InvalidData(format!(
                "H.264: 图像尺寸溢出, {}x{} 宏块",
                params.pic_width_in_mbs, params.pic_height_in_mbs
            )));
        };
        let layout = vde_scale::layout(width, height, self.format, self.config.modifier)?;

        let (buffer, frame_fd) = create_exported(&self.backend, layout.size, self.export_flags)?;

        let request = DecodeRequest {
            bitstream: BufferRef {
                fd: scratch.bitstream_fd,
                offset: 0,
            },
            secure: BufferRef {
                fd: scratch.secure_fd,
                offset: 0,
            },
            frames: vec![FrameDescriptor {
                y_fd: frame_fd,
                cb_fd: frame_fd,
                cr_fd: frame_fd,
                aux_fd: -1,
                y_offset: layout.offsets[0] as u32,
                cb_offset: layout.offsets[1] as u32,
                cr_offset: layout.offsets[2] as u32,
                aux_offset: 0,
                frame_num: 0,
                flags: FrameFlags::REFERENCE,
                modifier: self.config.modifier,
            }],
            ref_frames_with_earlier_poc: 0,
            params,
        };

        trace!(
            "提交解码请求: {width}x{height}, 切片 {} 字节, 帧缓冲 handle={}",
            payload.len(),
            buffer.handle()
        );

        if let Err(source) = retry("DECODE_H264", || self.backend.decode_h264(&request)) {
            buffer.discard(&self.backend);
            return Err(VdeError::DeviceError {
                context: format!("H.264 解码请求被拒绝 ({width}x{height})"),
                source,
            });
        }

        debug!("解码完成: {width}x{height}, {} 字节平铺帧", layout.size);
        Ok(TiledFrame { buffer, layout })
    }

    /// 映射帧缓冲区
    pub fn map_frame<'f>(&self, frame: &'f mut TiledFrame) -> VdeResult<&'f mut [u8]> {
        frame.buffer.map(&self.backend)
    }

    /// 将帧转换为线性图像
    pub fn detile(&self, frame: &mut TiledFrame) -> VdeResult<LinearImage> {
        let layout = frame.layout;
        let data = self.map_frame(frame)?;
        vde_scale::detile(data, &layout)
    }

    /// 释放帧
    pub fn release_frame(&self, frame: TiledFrame) -> VdeResult<()> {
        frame.buffer.release(&self.backend)
    }

    /// 关闭会话, 释放两个暂存缓冲区
    pub fn close(mut self) -> VdeResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> VdeResult<()> {
        let Some(scratch) = self.scratch.take() else {
            return Ok(());
        };

        let bitstream = scratch.bitstream.release(&self.backend);
        let secure = scratch.secure.release(&self.backend);
        debug!("解码会话已关闭");
        bitstream.and(secure)
    }
}

impl<B: VdeBackend> Drop for DecodeSession<B> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("关闭解码会话失败: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockOp};
    use crate::test_support::sample_config;
    use vde_core::DRM_FORMAT_YUV420;
    use vde_scale::DEFAULT_MODIFIER;

    fn small_config() -> SessionConfig {
        SessionConfig {
            bitstream_size: 4096,
            secure_size: 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_open_allocates_and_exports_scratch() {
        let mock = MockBackend::new();
        let session = DecodeSession::open(&mock, small_config()).unwrap();
        assert_eq!(mock.live_objects(), 2);
        assert_eq!(mock.calls().prime_handle_to_fd, 2);

        session.close().unwrap();
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn test_open_retries_transient_errors() {
        let mock = MockBackend::new();
        mock.fail_next(MockOp::GemCreate, libc::EINTR);
        mock.fail_after(MockOp::PrimeHandleToFd, 1, libc::EAGAIN);

        let session = DecodeSession::open(&mock, small_config()).unwrap();
        assert_eq!(mock.calls().gem_create, 3);
        assert_eq!(mock.calls().prime_handle_to_fd, 3);
        assert_eq!(mock.live_objects(), 2);
        session.close().unwrap();
    }

    #[test]
    fn test_open_unwinds_when_secure_allocation_fails() {
        let mock = MockBackend::new();
        mock.fail_after(MockOp::GemCreate, 1, libc::ENOMEM);

        let err = DecodeSession::open(&mock, small_config()).unwrap_err();
        assert!(matches!(err, VdeError::AllocationFailed { size: 1024, .. }));
        assert_eq!(mock.calls().gem_close, 1);
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn test_open_unwinds_when_secure_export_fails() {
        let mock = MockBackend::new();
        mock.fail_after(MockOp::PrimeHandleToFd, 1, libc::EACCES);

        let err = DecodeSession::open(&mock, small_config()).unwrap_err();
        assert!(matches!(err, VdeError::ExportFailed { .. }));
        assert_eq!(mock.calls().gem_create, 2);
        assert_eq!(mock.calls().gem_close, 2);
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mock = MockBackend::new();
        let config = SessionConfig {
            output_format: "NV12".into(),
            ..small_config()
        };
        assert!(matches!(
            DecodeSession::open(&mock, config),
            Err(VdeError::UnknownFormat(_))
        ));
        assert_eq!(mock.calls().gem_create, 0);
    }

    #[test]
    fn test_frame_allocation_failure_keeps_session_usable() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();

        mock.fail_next(MockOp::GemCreate, libc::ENOMEM);
        let err = session.decode(&sample_config(), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, VdeError::AllocationFailed { .. }));

        mock.fail_next(MockOp::PrimeHandleToFd, libc::EBADF);
        let err = session.decode(&sample_config(), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, VdeError::ExportFailed { .. }));
        assert_eq!(mock.live_objects(), 2);
        assert_eq!(mock.calls().decode_h264, 0);

        let frame = session.decode(&sample_config(), &[1, 2, 3]).unwrap();
        session.release_frame(frame).unwrap();
    }

    #[test]
    fn test_decode_builds_request() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();
        let payload = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00];

        let frame = session.decode(&sample_config(), &payload).unwrap();
        assert_eq!((frame.width(), frame.height()), (1280, 720));

        let decodes = mock.decodes();
        assert_eq!(decodes.len(), 1);
        let recorded = &decodes[0];

        // 码流从偏移 0 开始, 其余部分清零
        assert_eq!(recorded.bitstream.len(), 4096);
        assert_eq!(&recorded.bitstream[..payload.len()], &payload);
        assert!(recorded.bitstream[payload.len()..].iter().all(|&b| b == 0));

        let request = &recorded.request;
        assert_eq!(request.bitstream.offset, 0);
        assert_eq!(request.secure.offset, 0);
        assert_eq!(request.ref_frames_with_earlier_poc, 0);
        assert_eq!(request.frames.len(), 1);

        let desc = request.frames[0];
        let layout = frame.layout();
        assert_eq!(Some(desc.y_fd), frame.fd());
        assert_eq!(desc.cb_fd, desc.y_fd);
        assert_eq!(desc.cr_fd, desc.y_fd);
        assert_eq!(desc.aux_fd, -1);
        assert_eq!(desc.y_offset, 0);
        assert_eq!(desc.cb_offset as usize, layout.offsets[1]);
        assert_eq!(desc.cr_offset as usize, layout.offsets[2]);
        assert_eq!(desc.flags, FrameFlags::REFERENCE);
        assert_eq!(desc.modifier, DEFAULT_MODIFIER);
        assert_eq!(request.params.pic_width_in_mbs, 80);
        assert_eq!(request.params.level_idc, 31);

        assert_eq!(frame.buffer().size(), layout.size);
        session.release_frame(frame).unwrap();
        session.close().unwrap();
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn test_decode_stale_bitstream_is_cleared() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();
        let config = sample_config();

        let frame = session.decode(&config, &[0xAA; 64]).unwrap();
        session.release_frame(frame).unwrap();
        let frame = session.decode(&config, &[0x55; 16]).unwrap();
        session.release_frame(frame).unwrap();

        let decodes = mock.decodes();
        let second = &decodes[1].bitstream;
        assert!(second[..16].iter().all(|&b| b == 0x55));
        assert!(second[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_rejects_oversized_payload() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();

        let err = session.decode(&sample_config(), &[0u8; 4097]).unwrap_err();
        assert!(matches!(err, VdeError::InvalidArgument(_)));
        let err = session.decode(&sample_config(), &[]).unwrap_err();
        assert!(matches!(err, VdeError::InvalidArgument(_)));
        assert_eq!(mock.calls().decode_h264, 0);
        assert_eq!(mock.live_objects(), 2);
    }

    #[test]
    fn test_decode_retries_interrupted_request() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();
        mock.fail_next(MockOp::DecodeH264, libc::EINTR);
        mock.fail_next(MockOp::DecodeH264, libc::EAGAIN);

        let frame = session.decode(&sample_config(), &[1, 2, 3]).unwrap();
        assert_eq!(mock.calls().decode_h264, 3);
        session.release_frame(frame).unwrap();
    }

    #[test]
    fn test_decode_failure_releases_frame() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();
        mock.fail_next(MockOp::DecodeH264, libc::EIO);

        let err = session.decode(&sample_config(), &[1, 2, 3]).unwrap_err();
        match err {
            VdeError::DeviceError { source, .. } => {
                assert_eq!(source.raw_os_error(), Some(libc::EIO));
            }
            other => panic!("意外错误: {other:?}"),
        }
        // 只剩两个暂存缓冲区
        assert_eq!(mock.live_objects(), 2);
    }

    #[test]
    fn test_decode_rejects_overflowing_dimensions() {
        let mock = MockBackend::new();
        let mut session = DecodeSession::open(&mock, small_config()).unwrap();

        let mut config = sample_config();
        config.sps.pic_width_in_mbs_minus1 = 0x1000_0000;
        let err = session.decode(&config, &[0x65]).unwrap_err();
        assert!(matches!(&err, VdeError::InvalidData(msg) if msg.contains("溢出")));

        // 宽高各自不溢出, 但平铺布局总字节数超出上限
        let mut config = sample_config();
        config.sps.pic_width_in_mbs_minus1 = u32::MAX / 16 - 1;
        config.sps.pic_height_in_map_units_minus1 = u32::MAX / 16 - 1;
        assert!(matches!(
            session.decode(&config, &[0x65]),
            Err(VdeError::InvalidArgument(_))
        ));

        assert_eq!(mock.calls().decode_h264, 0);
        assert_eq!(mock.live_objects(), 2);
    }

    #[test]
    fn test_detile_decoded_frame() {
        let mock = MockBackend::new();
        let mut config = sample_config();
        config.sps.pic_width_in_mbs_minus1 = 3;
        config.sps.pic_height_in_map_units_minus1 = 1;

        let mut expected = LinearImage::new(64, 32, DRM_FORMAT_YUV420).unwrap();
        for (i, byte) in expected.data_mut().iter_mut().enumerate() {
            *byte = (i * 7 % 251) as u8;
        }
        mock.set_decode_output(expected.clone());

        let mut session = DecodeSession::open(&mock, small_config()).unwrap();
        let mut frame = session.decode(&config, &[0x65, 0x00]).unwrap();

        let image = session.detile(&mut frame).unwrap();
        assert_eq!(image, expected);
        assert!(frame.buffer().is_mapped());

        session.release_frame(frame).unwrap();
        session.close().unwrap();
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn test_drop_closes_session() {
        let mock = MockBackend::new();
        {
            let _session = DecodeSession::open(&mock, small_config()).unwrap();
            assert_eq!(mock.live_objects(), 2);
        }
        assert_eq!(mock.live_objects(), 0);
    }
}
