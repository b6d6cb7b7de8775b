//! Register-save `va_list` records.
//!
//! Field order, sizes and padding must match the published ABI for each
//! target exactly. A mismatch does not crash; it silently formats the
//! wrong arguments.

use super::HandleLayout;
use std::ffi::c_void;
use std::fmt::Debug;
use std::ptr;

/// A `va_list` representation that primitives advance in place
pub trait StatefulRecord: Copy + Debug + 'static {
    /// Short name of the calling convention
    const ABI: &'static str;

    /// Layout tag for this record
    fn layout() -> HandleLayout;
}

/// System V AMD64 `__va_list_tag`
///
/// See the System V AMD64 psABI, section 3.5.7.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SysVX64Record {
    /// Byte offset into `reg_save_area` of the next general-purpose argument
    pub gp_offset: u32,
    /// Byte offset into `reg_save_area` of the next floating-point argument
    pub fp_offset: u32,
    /// Next argument passed on the stack
    pub overflow_arg_area: *mut c_void,
    /// Snapshot of the argument registers at the call site
    pub reg_save_area: *mut c_void,
}

impl SysVX64Record {
    /// `gp_offset` value once all six general-purpose registers are consumed
    pub const GP_AREA_END: u32 = 6 * 8;
    /// `fp_offset` value once all eight vector registers are consumed
    pub const FP_AREA_END: u32 = Self::GP_AREA_END + 8 * 16;
}

impl Default for SysVX64Record {
    fn default() -> Self {
        Self {
            gp_offset: 0,
            fp_offset: Self::GP_AREA_END,
            overflow_arg_area: ptr::null_mut(),
            reg_save_area: ptr::null_mut(),
        }
    }
}

impl StatefulRecord for SysVX64Record {
    const ABI: &'static str = "sysv-x64";

    fn layout() -> HandleLayout {
        HandleLayout::SysVX64
    }
}

/// AAPCS64 `va_list`
///
/// See the Procedure Call Standard for the Arm 64-bit Architecture,
/// appendix "Variable argument lists".
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aapcs64Record {
    /// Next stacked argument
    pub stack: *mut c_void,
    /// End of the general register save area
    pub gr_top: *mut c_void,
    /// End of the vector register save area
    pub vr_top: *mut c_void,
    /// Negative offset from `gr_top` of the next general register argument
    pub gr_offs: i32,
    /// Negative offset from `vr_top` of the next vector register argument
    pub vr_offs: i32,
}

impl Default for Aapcs64Record {
    fn default() -> Self {
        Self {
            stack: ptr::null_mut(),
            gr_top: ptr::null_mut(),
            vr_top: ptr::null_mut(),
            gr_offs: 0,
            vr_offs: 0,
        }
    }
}

impl StatefulRecord for Aapcs64Record {
    const ABI: &'static str = "aapcs64";

    fn layout() -> HandleLayout {
        HandleLayout::Aapcs64
    }
}

// Both records are only produced by 64-bit call sites.
#[cfg(target_pointer_width = "64")]
const _: () = {
    use std::mem::{offset_of, size_of};

    assert!(size_of::<SysVX64Record>() == 24);
    assert!(offset_of!(SysVX64Record, gp_offset) == 0);
    assert!(offset_of!(SysVX64Record, fp_offset) == 4);
    assert!(offset_of!(SysVX64Record, overflow_arg_area) == 8);
    assert!(offset_of!(SysVX64Record, reg_save_area) == 16);

    assert!(size_of::<Aapcs64Record>() == 32);
    assert!(offset_of!(Aapcs64Record, stack) == 0);
    assert!(offset_of!(Aapcs64Record, gr_top) == 8);
    assert!(offset_of!(Aapcs64Record, vr_top) == 16);
    assert!(offset_of!(Aapcs64Record, gr_offs) == 24);
    assert!(offset_of!(Aapcs64Record, vr_offs) == 28);
};
