//! Callback sessions.
//!
//! Native code hands format requests back through a plain C function
//! pointer with no user-data slot:
//!
//! ```c
//! typedef void (*callback)(const char *format, va_list args);
//! ```
//!
//! A [`Session`] therefore installs itself in a thread-local slot for the
//! duration of one trigger call. The `extern "C"` callbacks, one per
//! [`HandleLayout`], look the session up, run the two-phase protocol and
//! record the outcome. They never return anything to C and never unwind
//! into it.

use crate::error::{Error, Result};
use crate::handle::{HandleLayout, RawListHandle};
use crate::protocol::{FormatPrimitives, FormatRequest, Formatter};
use std::cell::RefCell;
use std::ffi::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// C signature of a format request callback
pub type FormatCallback = unsafe extern "C" fn(format: *const c_char, args: *mut c_void);

/// C signature of a native entry point that issues format requests
pub type TriggerFn = unsafe extern "C" fn(callback: FormatCallback);

trait ActiveSession {
    fn deliver(&mut self, layout: HandleLayout, format: *const c_char, args: RawListHandle);

    fn record(&mut self, outcome: Result<String>);

    fn into_outputs(self: Box<Self>) -> Vec<Result<String>>;
}

thread_local! {
    static ACTIVE: RefCell<Option<Box<dyn ActiveSession>>> = const { RefCell::new(None) };
}

/// Collects the outcome of every format request issued during one trigger
#[derive(Debug)]
pub struct Session<P> {
    formatter: Formatter<P>,
    outputs: Vec<Result<String>>,
}

impl<P: FormatPrimitives + 'static> Session<P> {
    /// Creates a session around a formatter
    pub fn new(formatter: Formatter<P>) -> Self {
        Self {
            formatter,
            outputs: Vec::new(),
        }
    }

    /// Runs `trigger` with the callback for this session's dispatch.
    ///
    /// Requests delivered to that callback on this thread while `trigger`
    /// runs are formatted and returned in arrival order. Fails if another
    /// session is already active on this thread.
    pub fn run<T>(
        self,
        trigger: impl FnOnce(FormatCallback) -> T,
    ) -> Result<(T, Vec<Result<String>>)> {
        let callback = self.formatter.dispatch().callback();

        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(Error::internal("a session is already active on this thread"));
            }
            *slot = Some(Box::new(self));
            Ok(())
        })?;
        let _guard = Uninstall;

        debug!("Session installed");
        let value = trigger(callback);

        let outputs = ACTIVE
            .with(|slot| slot.borrow_mut().take())
            .map(|session| session.into_outputs())
            .ok_or_else(|| Error::internal("session vanished while active"))?;
        debug!("Session finished with {} request(s)", outputs.len());
        Ok((value, outputs))
    }

    /// Calls a native entry point and collects the requests it issues.
    ///
    /// # Safety
    ///
    /// `entry` must be a function with the [`TriggerFn`] signature that only
    /// passes `va_list`s built by call sites of this session's layout.
    pub unsafe fn trigger(self, entry: TriggerFn) -> Result<Vec<Result<String>>> {
        // SAFETY: guaranteed by the caller.
        let ((), outputs) = self.run(|callback| unsafe { entry(callback) })?;
        Ok(outputs)
    }
}

impl<P: FormatPrimitives> ActiveSession for Session<P> {
    fn deliver(&mut self, layout: HandleLayout, format: *const c_char, args: RawListHandle) {
        // SAFETY: the callback contract: native code passes a valid format
        // and a `va_list` built by a `layout` call site, alive until we return.
        let outcome = unsafe { FormatRequest::from_raw(layout, format, args) }
            .and_then(|request| self.formatter.format(&request));
        self.record(outcome);
    }

    fn record(&mut self, outcome: Result<String>) {
        if let Err(ref e) = outcome {
            debug!("Format request failed: {}", e);
        }
        self.outputs.push(outcome);
    }

    fn into_outputs(self: Box<Self>) -> Vec<Result<String>> {
        self.outputs
    }
}

struct Uninstall;

impl Drop for Uninstall {
    fn drop(&mut self) {
        // Already empty unless `trigger` unwound.
        let _ = ACTIVE.try_with(|slot| slot.borrow_mut().take());
    }
}

fn route_request(layout: HandleLayout, format: *const c_char, args: *mut c_void) {
    let Some(mut session) = ACTIVE.with(|slot| slot.borrow_mut().take()) else {
        warn!("Dropping format request received outside of a session");
        return;
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        session.deliver(layout, format, RawListHandle::new(args));
    }));
    if outcome.is_err() {
        session.record(Err(Error::internal("panic while handling format request")));
    }

    ACTIVE.with(|slot| *slot.borrow_mut() = Some(session));
}

unsafe extern "C" fn on_pointer_request(format: *const c_char, args: *mut c_void) {
    route_request(HandleLayout::Pointer, format, args);
}

unsafe extern "C" fn on_sysv_x64_request(format: *const c_char, args: *mut c_void) {
    route_request(HandleLayout::SysVX64, format, args);
}

unsafe extern "C" fn on_aapcs64_request(format: *const c_char, args: *mut c_void) {
    route_request(HandleLayout::Aapcs64, format, args);
}

/// Returns the C callback that interprets its `va_list` as `layout`
pub fn callback_for(layout: HandleLayout) -> FormatCallback {
    match layout {
        HandleLayout::Pointer => on_pointer_request,
        HandleLayout::SysVX64 => on_sysv_x64_request,
        HandleLayout::Aapcs64 => on_aapcs64_request,
    }
}
