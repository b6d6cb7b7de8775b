//! Test doubles for the C runtime.
//!
//! [`ScriptedPrimitives`] is a tiny `printf` (`%d`, `%s`, `%%`) that reads
//! its arguments through a `va_list` exactly as the real routines do: a
//! pointer list is advanced in a local copy, register-save records are
//! advanced in place. The frame builders lay out argument areas the way a
//! variadic call site would.

use crate::handle::{Aapcs64Record, HandleLayout, ListArg, RawListHandle, SysVX64Record};
use crate::protocol::{FormatPrimitives, FormatRequest};
use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void, CStr};

/// Failure to inject into [`ScriptedPrimitives`]
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// `measure` returns this code
    Measure(c_int),
    /// `render` returns this code without writing
    Render(c_int),
    /// `render` writes and reports only this many bytes
    Truncate(usize),
    /// `render` fills the whole buffer and leaves out the terminator
    NoTerminator,
}

#[derive(Debug)]
pub(crate) struct ScriptedPrimitives {
    layout: HandleLayout,
    fault: Option<Fault>,
    seen: RefCell<Vec<*mut c_void>>,
    measure_calls: Cell<usize>,
    render_calls: Cell<usize>,
}

impl ScriptedPrimitives {
    pub(crate) fn new(layout: HandleLayout) -> Self {
        Self {
            layout,
            fault: None,
            seen: RefCell::new(Vec::new()),
            measure_calls: Cell::new(0),
            render_calls: Cell::new(0),
        }
    }

    pub(crate) fn fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub(crate) fn handles_seen(&self) -> Vec<*mut c_void> {
        self.seen.borrow().clone()
    }

    pub(crate) fn measure_calls(&self) -> usize {
        self.measure_calls.get()
    }

    pub(crate) fn render_calls(&self) -> usize {
        self.render_calls.get()
    }

    unsafe fn expand(&self, format: &CStr, args: ListArg<'_>) -> Option<Vec<u8>> {
        let raw = args.into_raw();
        self.seen.borrow_mut().push(raw);
        let mut cursor = Cursor::new(self.layout, raw);

        let mut out = Vec::new();
        let mut bytes = format.to_bytes().iter();
        while let Some(&b) = bytes.next() {
            if b != b'%' {
                out.push(b);
                continue;
            }
            match *bytes.next()? {
                b'%' => out.push(b'%'),
                b'd' => {
                    let value = unsafe { cursor.next_word() } as u32 as i32;
                    out.extend_from_slice(value.to_string().as_bytes());
                }
                b's' => {
                    let ptr = unsafe { cursor.next_word() } as usize as *const std::ffi::c_char;
                    if ptr.is_null() {
                        out.extend_from_slice(b"(null)");
                    } else {
                        out.extend_from_slice(unsafe { CStr::from_ptr(ptr) }.to_bytes());
                    }
                }
                _ => return None,
            }
        }
        Some(out)
    }
}

impl FormatPrimitives for ScriptedPrimitives {
    unsafe fn measure(&self, format: &CStr, args: ListArg<'_>) -> c_int {
        self.measure_calls.set(self.measure_calls.get() + 1);
        if let Some(Fault::Measure(code)) = self.fault {
            return code;
        }
        match unsafe { self.expand(format, args) } {
            Some(out) => out.len() as c_int,
            None => -1,
        }
    }

    unsafe fn render(&self, buffer: &mut [u8], format: &CStr, args: ListArg<'_>) -> c_int {
        self.render_calls.set(self.render_calls.get() + 1);
        if let Some(Fault::Render(code)) = self.fault {
            return code;
        }
        let Some(out) = (unsafe { self.expand(format, args) }) else {
            return -1;
        };

        let room = buffer.len().saturating_sub(1);
        match self.fault {
            Some(Fault::Truncate(n)) => {
                let n = n.min(room).min(out.len());
                buffer[..n].copy_from_slice(&out[..n]);
                buffer[n] = 0;
                n as c_int
            }
            Some(Fault::NoTerminator) => {
                let n = out.len().min(buffer.len());
                buffer[..n].copy_from_slice(&out[..n]);
                buffer[n..].fill(b'x');
                out.len() as c_int
            }
            _ => {
                let n = out.len().min(room);
                buffer[..n].copy_from_slice(&out[..n]);
                if let Some(slot) = buffer.get_mut(n) {
                    *slot = 0;
                }
                out.len() as c_int
            }
        }
    }
}

enum Cursor {
    Pointer(*const u64),
    SysV(*mut SysVX64Record),
    Aapcs64(*mut Aapcs64Record),
}

impl Cursor {
    fn new(layout: HandleLayout, raw: *mut c_void) -> Self {
        match layout {
            HandleLayout::Pointer => Cursor::Pointer(raw.cast()),
            HandleLayout::SysVX64 => Cursor::SysV(raw.cast()),
            HandleLayout::Aapcs64 => Cursor::Aapcs64(raw.cast()),
        }
    }

    unsafe fn next_word(&mut self) -> u64 {
        unsafe {
            match self {
                Cursor::Pointer(p) => {
                    let value = p.read();
                    *p = p.add(1);
                    value
                }
                Cursor::SysV(record) => {
                    let record = &mut **record;
                    if record.gp_offset < SysVX64Record::GP_AREA_END {
                        let slot = record
                            .reg_save_area
                            .cast::<u8>()
                            .add(record.gp_offset as usize)
                            .cast::<u64>();
                        record.gp_offset += 8;
                        slot.read()
                    } else {
                        let slot = record.overflow_arg_area.cast::<u64>();
                        record.overflow_arg_area = slot.add(1).cast();
                        slot.read()
                    }
                }
                Cursor::Aapcs64(record) => {
                    let record = &mut **record;
                    if record.gr_offs < 0 {
                        let slot = record
                            .gr_top
                            .cast::<u8>()
                            .offset(record.gr_offs as isize)
                            .cast::<u64>();
                        record.gr_offs += 8;
                        slot.read()
                    } else {
                        let slot = record.stack.cast::<u64>();
                        record.stack = slot.add(1).cast();
                        slot.read()
                    }
                }
            }
        }
    }
}

fn word_of(value: Arg) -> u64 {
    match value {
        Arg::Int(v) => v as u64,
        Arg::Str(s) => s.as_ptr() as usize as u64,
    }
}

#[derive(Clone, Copy)]
enum Arg {
    Int(i64),
    Str(&'static CStr),
}

/// Arguments laid out contiguously, read through a plain pointer
pub(crate) struct PointerFrame {
    slots: Vec<u64>,
}

impl PointerFrame {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn int(mut self, value: i64) -> Self {
        self.slots.push(word_of(Arg::Int(value)));
        self
    }

    pub(crate) fn str(mut self, value: &'static CStr) -> Self {
        self.slots.push(word_of(Arg::Str(value)));
        self
    }

    pub(crate) fn raw(&self) -> RawListHandle {
        RawListHandle::new(self.slots.as_ptr().cast_mut().cast())
    }

    pub(crate) unsafe fn request<'a>(&'a self, format: &'a CStr) -> FormatRequest<'a> {
        unsafe { FormatRequest::from_raw(HandleLayout::Pointer, format.as_ptr(), self.raw()) }
            .expect("valid request")
    }
}

const SYSV_GP_SLOTS: usize = 6;
const SYSV_SAVE_WORDS: usize = SysVX64Record::FP_AREA_END as usize / 8;

/// A System V x86-64 variadic call site
pub(crate) struct SysVFrame {
    reg_save: Box<[u64; SYSV_SAVE_WORDS]>,
    overflow: Vec<u64>,
    gp_used: usize,
    record: Box<SysVX64Record>,
}

impl SysVFrame {
    pub(crate) fn new() -> Self {
        let mut frame = Self {
            reg_save: Box::new([0; SYSV_SAVE_WORDS]),
            overflow: Vec::new(),
            gp_used: 0,
            record: Box::new(SysVX64Record {
                fp_offset: SysVX64Record::FP_AREA_END,
                ..SysVX64Record::default()
            }),
        };
        frame.sync();
        frame
    }

    pub(crate) fn int(self, value: i64) -> Self {
        self.push(Arg::Int(value))
    }

    pub(crate) fn str(self, value: &'static CStr) -> Self {
        self.push(Arg::Str(value))
    }

    fn push(mut self, arg: Arg) -> Self {
        if self.gp_used < SYSV_GP_SLOTS {
            self.reg_save[self.gp_used] = word_of(arg);
            self.gp_used += 1;
        } else {
            self.overflow.push(word_of(arg));
        }
        self.sync();
        self
    }

    fn sync(&mut self) {
        self.record.reg_save_area = self.reg_save.as_mut_ptr().cast();
        self.record.overflow_arg_area = self.overflow.as_mut_ptr().cast();
    }

    pub(crate) fn record(&self) -> SysVX64Record {
        *self.record
    }

    pub(crate) fn raw(&self) -> RawListHandle {
        let ptr: *const SysVX64Record = &*self.record;
        RawListHandle::new(ptr.cast_mut().cast())
    }

    pub(crate) unsafe fn request<'a>(&'a self, format: &'a CStr) -> FormatRequest<'a> {
        unsafe { FormatRequest::from_raw(HandleLayout::SysVX64, format.as_ptr(), self.raw()) }
            .expect("valid request")
    }
}

const AAPCS64_GR_SLOTS: usize = 8;

/// An AAPCS64 variadic call site
pub(crate) struct Aapcs64Frame {
    gr_save: Box<[u64; AAPCS64_GR_SLOTS]>,
    stack: Vec<u64>,
    gr_used: usize,
    record: Box<Aapcs64Record>,
}

impl Aapcs64Frame {
    pub(crate) fn new() -> Self {
        let mut frame = Self {
            gr_save: Box::new([0; AAPCS64_GR_SLOTS]),
            stack: Vec::new(),
            gr_used: 0,
            record: Box::new(Aapcs64Record {
                gr_offs: -((AAPCS64_GR_SLOTS * 8) as i32),
                ..Aapcs64Record::default()
            }),
        };
        frame.sync();
        frame
    }

    pub(crate) fn int(self, value: i64) -> Self {
        self.push(Arg::Int(value))
    }

    pub(crate) fn str(self, value: &'static CStr) -> Self {
        self.push(Arg::Str(value))
    }

    fn push(mut self, arg: Arg) -> Self {
        if self.gr_used < AAPCS64_GR_SLOTS {
            self.gr_save[self.gr_used] = word_of(arg);
            self.gr_used += 1;
        } else {
            self.stack.push(word_of(arg));
        }
        self.sync();
        self
    }

    fn sync(&mut self) {
        // gr_top is one past the end of the save area.
        self.record.gr_top = self.gr_save.as_mut_ptr_range().end.cast();
        self.record.stack = self.stack.as_mut_ptr().cast();
    }

    pub(crate) fn record(&self) -> Aapcs64Record {
        *self.record
    }

    pub(crate) fn raw(&self) -> RawListHandle {
        let ptr: *const Aapcs64Record = &*self.record;
        RawListHandle::new(ptr.cast_mut().cast())
    }

    pub(crate) unsafe fn request<'a>(&'a self, format: &'a CStr) -> FormatRequest<'a> {
        unsafe { FormatRequest::from_raw(HandleLayout::Aapcs64, format.as_ptr(), self.raw()) }
            .expect("valid request")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_printf_consumes_sysv_record_in_place() {
        let frame = SysVFrame::new().int(42).str(c"ok");
        let primitives = ScriptedPrimitives::new(HandleLayout::SysVX64);
        let mut record = frame.record();

        let ptr = (&mut record as *mut SysVX64Record).cast();
        let len = unsafe { primitives.measure(c"%d-%s", ListArg::new(ptr)) };

        assert_eq!(len, 5);
        assert_eq!(record.gp_offset, 16);
    }

    #[test]
    fn test_unknown_conversion_fails() {
        let frame = PointerFrame::new().int(1);
        let primitives = ScriptedPrimitives::new(HandleLayout::Pointer);
        let len = unsafe { primitives.measure(c"%f", ListArg::new(frame.raw().as_ptr())) };
        assert_eq!(len, -1);
    }
}
