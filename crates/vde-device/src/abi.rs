//! 内核驱动 ABI.
//!
//! DRM GEM / PRIME 与 Tegra VDE 的 ioctl 编号和参数结构.
//! 结构布局必须与内核头文件逐字节一致, 尺寸在编译期断言.

use std::mem::size_of;

use crate::request::{DecodeRequest, FrameDescriptor};

// ============================================================
// ioctl 编号
// ============================================================

const IOC_NRBITS: u64 = 8;
const IOC_TYPEBITS: u64 = 8;
const IOC_SIZEBITS: u64 = 14;

const IOC_NRSHIFT: u64 = 0;
const IOC_TYPESHIFT: u64 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u64 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u64 = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

const fn ioc(dir: u64, ty: u8, nr: u8, size: usize) -> u64 {
    (dir << IOC_DIRSHIFT)
        | ((ty as u64) << IOC_TYPESHIFT)
        | ((nr as u64) << IOC_NRSHIFT)
        | ((size as u64) << IOC_SIZESHIFT)
}

const fn iow<T>(ty: u8, nr: u8) -> u64 {
    ioc(IOC_WRITE, ty, nr, size_of::<T>())
}

const fn iowr<T>(ty: u8, nr: u8) -> u64 {
    ioc(IOC_READ | IOC_WRITE, ty, nr, size_of::<T>())
}

const DRM_IOCTL_BASE: u8 = b'd';
const DRM_COMMAND_BASE: u8 = 0x40;

const DRM_TEGRA_GEM_CREATE: u8 = 0x00;
const DRM_TEGRA_GEM_MMAP: u8 = 0x01;

const TEGRA_VDE_IOCTL_BASE: u8 = b'v' + 0x20;
const TEGRA_VDE_DECODE_H264: u8 = 0x00;

pub const DRM_IOCTL_GEM_CLOSE: u64 = iow::<DrmGemClose>(DRM_IOCTL_BASE, 0x09);
pub const DRM_IOCTL_PRIME_HANDLE_TO_FD: u64 = iowr::<DrmPrimeHandle>(DRM_IOCTL_BASE, 0x2d);
pub const DRM_IOCTL_TEGRA_GEM_CREATE: u64 =
    iowr::<DrmTegraGemCreate>(DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_TEGRA_GEM_CREATE);
pub const DRM_IOCTL_TEGRA_GEM_MMAP: u64 =
    iowr::<DrmTegraGemMmap>(DRM_IOCTL_BASE, DRM_COMMAND_BASE + DRM_TEGRA_GEM_MMAP);
pub const TEGRA_VDE_IOCTL_DECODE_H264: u64 =
    iow::<TegraVdeH264DecoderCtx>(TEGRA_VDE_IOCTL_BASE, TEGRA_VDE_DECODE_H264);

// ============================================================
// DRM 结构
// ============================================================

/// `struct drm_tegra_gem_create`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmTegraGemCreate {
    pub size: u64,
    pub flags: u32,
    pub handle: u32,
}

/// `struct drm_tegra_gem_mmap`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmTegraGemMmap {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

/// `struct drm_gem_close`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmGemClose {
    pub handle: u32,
    pub pad: u32,
}

/// `struct drm_prime_handle`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmPrimeHandle {
    pub handle: u32,
    pub flags: u32,
    pub fd: i32,
}

// ============================================================
// Tegra VDE 结构
// ============================================================

/// `struct tegra_vde_h264_frame`
#[repr(C, packed)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TegraVdeH264Frame {
    pub y_fd: i32,
    pub cb_fd: i32,
    pub cr_fd: i32,
    pub aux_fd: i32,
    pub y_offset: u32,
    pub cb_offset: u32,
    pub cr_offset: u32,
    pub aux_offset: u32,
    pub frame_num: u32,
    pub flags: u32,
    pub modifier: u64,
}

/// `struct tegra_vde_h264_decoder_ctx`
#[repr(C, packed)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TegraVdeH264DecoderCtx {
    pub bitstream_data_fd: i32,
    pub bitstream_data_offset: u32,
    pub secure_fd: i32,
    pub secure_offset: u32,

    pub dpb_frames_ptr: u64,
    pub dpb_frames_nb: u32,
    pub dpb_ref_frames_with_earlier_poc_nb: u32,

    // SPS
    pub baseline_profile: u32,
    pub level_idc: u32,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub direct_8x8_inference_flag: u32,
    pub pic_width_in_mbs: u32,
    pub pic_height_in_mbs: u32,

    // PPS
    pub pic_init_qp: u32,
    pub deblocking_filter_control_present_flag: u32,
    pub constrained_intra_pred_flag: u32,
    pub chroma_qp_index_offset: u32,
    pub pic_order_present_flag: u32,

    // 切片头默认值
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,

    pub reserved: u32,
}

const _: () = assert!(size_of::<DrmTegraGemCreate>() == 16);
const _: () = assert!(size_of::<DrmTegraGemMmap>() == 16);
const _: () = assert!(size_of::<DrmGemClose>() == 8);
const _: () = assert!(size_of::<DrmPrimeHandle>() == 12);
const _: () = assert!(size_of::<TegraVdeH264Frame>() == 48);
const _: () = assert!(size_of::<TegraVdeH264DecoderCtx>() == 96);

impl From<&FrameDescriptor> for TegraVdeH264Frame {
    fn from(frame: &FrameDescriptor) -> Self {
        Self {
            y_fd: frame.y_fd,
            cb_fd: frame.cb_fd,
            cr_fd: frame.cr_fd,
            aux_fd: frame.aux_fd,
            y_offset: frame.y_offset,
            cb_offset: frame.cb_offset,
            cr_offset: frame.cr_offset,
            aux_offset: frame.aux_offset,
            frame_num: frame.frame_num,
            flags: frame.flags.bits(),
            modifier: frame.modifier,
        }
    }
}

impl TegraVdeH264DecoderCtx {
    /// 由解码请求填充驱动参数
    ///
    /// `frames` 必须在 ioctl 返回前保持有效, 其地址写入 `dpb_frames_ptr`.
    pub fn new(request: &DecodeRequest, frames: &[TegraVdeH264Frame]) -> Self {
        let p = &request.params;
        Self {
            bitstream_data_fd: request.bitstream.fd,
            bitstream_data_offset: request.bitstream.offset,
            secure_fd: request.secure.fd,
            secure_offset: request.secure.offset,
            dpb_frames_ptr: frames.as_ptr() as u64,
            dpb_frames_nb: frames.len() as u32,
            dpb_ref_frames_with_earlier_poc_nb: request.ref_frames_with_earlier_poc,
            baseline_profile: u32::from(p.baseline_profile),
            level_idc: p.level_idc,
            log2_max_pic_order_cnt_lsb: p.log2_max_pic_order_cnt_lsb,
            log2_max_frame_num: p.log2_max_frame_num,
            pic_order_cnt_type: p.pic_order_cnt_type,
            direct_8x8_inference_flag: u32::from(p.direct_8x8_inference_flag),
            pic_width_in_mbs: p.pic_width_in_mbs,
            pic_height_in_mbs: p.pic_height_in_mbs,
            pic_init_qp: p.pic_init_qp,
            deblocking_filter_control_present_flag: u32::from(
                p.deblocking_filter_control_present_flag,
            ),
            constrained_intra_pred_flag: u32::from(p.constrained_intra_pred_flag),
            chroma_qp_index_offset: p.chroma_qp_index_offset,
            pic_order_present_flag: u32::from(p.pic_order_present_flag),
            num_ref_idx_l0_active_minus1: p.num_ref_idx_l0_active_minus1,
            num_ref_idx_l1_active_minus1: p.num_ref_idx_l1_active_minus1,
            reserved: 0,
        }
    }
}
