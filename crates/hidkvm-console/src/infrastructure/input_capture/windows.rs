//! Windows low-level keyboard and mouse hooks.
//!
//! Installs `WH_KEYBOARD_LL` and `WH_MOUSE_LL` on a dedicated Win32
//! message-loop thread.  Hook callbacks only translate the hook struct and
//! push it into the channel; all further work happens on the session's
//! dispatch thread.  Events are observed, never swallowed: the local desktop
//! keeps receiving them.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidkvm_core::{KeyLookup, MouseButtons, WindowsVkLookup};
use parking_lot::Mutex;
use tracing::{debug, warn};

use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
    UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, WH_KEYBOARD_LL,
    WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN,
    WM_MBUTTONUP, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use super::{CaptureError, CaptureMode, InputSource, RawInputEvent};

/// Sender used by the hook callbacks.  Only one hook source runs at a time.
static EVENT_SENDER: Mutex<Option<Sender<RawInputEvent>>> = Mutex::new(None);

/// How long `start()` waits for the hook thread to report installation.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(2);

/// System-wide capture through low-level hooks.
pub struct GlobalHookSource {
    thread_id: Option<u32>,
    worker: Option<JoinHandle<()>>,
}

impl GlobalHookSource {
    /// Creates a new (unstarted) source.
    pub fn new() -> Self {
        Self {
            thread_id: None,
            worker: None,
        }
    }
}

impl Default for GlobalHookSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for GlobalHookSource {
    fn start(&mut self) -> Result<mpsc::Receiver<RawInputEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel::<RawInputEvent>();
        {
            let mut slot = EVENT_SENDER.lock();
            if slot.is_some() {
                return Err(CaptureError::AlreadyRunning);
            }
            *slot = Some(tx);
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();
        let spawned = thread::Builder::new()
            .name("hidkvm-hook-loop".to_string())
            .spawn(move || run_hook_message_loop(ready_tx));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                *EVENT_SENDER.lock() = None;
                return Err(CaptureError::ThreadSpawn(e));
            }
        };

        match ready_rx.recv_timeout(INSTALL_TIMEOUT) {
            Ok(Ok(thread_id)) => {
                debug!(thread_id, "low-level hooks installed");
                self.thread_id = Some(thread_id);
                self.worker = Some(worker);
                Ok(rx)
            }
            Ok(Err(reason)) => {
                *EVENT_SENDER.lock() = None;
                let _ = worker.join();
                Err(CaptureError::PermissionDenied(reason))
            }
            Err(_) => {
                *EVENT_SENDER.lock() = None;
                Err(CaptureError::PermissionDenied(
                    "hook thread did not report installation".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        *EVENT_SENDER.lock() = None;
        if let Some(thread_id) = self.thread_id.take() {
            // SAFETY: posting a message to a thread id we created; failure only
            // means the thread has already exited.
            if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
                warn!("failed to post WM_QUIT to hook thread: {e}");
            }
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            debug!("low-level hooks removed");
        }
    }

    fn mode(&self) -> CaptureMode {
        CaptureMode::Global
    }

    fn keymap(&self) -> Arc<dyn KeyLookup> {
        Arc::new(WindowsVkLookup)
    }
}

impl Drop for GlobalHookSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Entry point for the dedicated Win32 message loop thread.
fn run_hook_message_loop(ready: Sender<Result<u32, String>>) {
    // SAFETY: SetWindowsHookExW requires the calling thread to run a message
    // loop, which follows immediately.
    let kbd_hook = match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready.send(Err(format!("WH_KEYBOARD_LL: {e}")));
            return;
        }
    };
    // SAFETY: as above.
    let mouse_hook = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            // SAFETY: kbd_hook was installed by this thread.
            unsafe {
                UnhookWindowsHookEx(kbd_hook).ok();
            }
            let _ = ready.send(Err(format!("WH_MOUSE_LL: {e}")));
            return;
        }
    };

    // SAFETY: trivially safe query of the calling thread id.
    let thread_id = unsafe { GetCurrentThreadId() };
    let _ = ready.send(Ok(thread_id));

    // Win32 message loop – blocks until WM_QUIT is posted
    let mut msg = MSG::default();
    // SAFETY: Standard Win32 GetMessage/DispatchMessage loop pattern.
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            DispatchMessageW(&msg);
        }
        UnhookWindowsHookEx(kbd_hook).ok();
        UnhookWindowsHookEx(mouse_hook).ok();
    }
}

fn deliver(event: RawInputEvent) {
    if let Some(sender) = EVENT_SENDER.lock().as_ref() {
        // Ignore send errors (channel closed during shutdown).
        let _ = sender.send(event);
    }
}

/// Low-level keyboard hook callback.
///
/// # Safety
///
/// Called by Windows on the hook thread; must return quickly (< ~300ms) to
/// avoid hook removal by the OS.
unsafe extern "system" fn keyboard_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a KBDLLHOOKSTRUCT when n_code == HC_ACTION.
        let kbs = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
        let keycode = kbs.vkCode;

        match w_param.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => deliver(RawInputEvent::KeyDown { keycode }),
            WM_KEYUP | WM_SYSKEYUP => deliver(RawInputEvent::KeyUp { keycode }),
            _ => {}
        }
    }

    // SAFETY: Forward the event to the next hook in the chain.
    CallNextHookEx(None, n_code, w_param, l_param)
}

/// Low-level mouse hook callback.
///
/// # Safety
///
/// Called by Windows on the hook thread; must return quickly.
unsafe extern "system" fn mouse_hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a MSLLHOOKSTRUCT when n_code == HC_ACTION.
        let mhs = &*(l_param.0 as *const MSLLHOOKSTRUCT);
        let (x, y) = (mhs.pt.x, mhs.pt.y);

        let event = match w_param.0 as u32 {
            WM_MOUSEMOVE => Some(RawInputEvent::PointerMove { x, y }),
            WM_LBUTTONDOWN => Some(RawInputEvent::ButtonDown { button: MouseButtons::LEFT, x, y }),
            WM_LBUTTONUP => Some(RawInputEvent::ButtonUp { button: MouseButtons::LEFT, x, y }),
            WM_RBUTTONDOWN => Some(RawInputEvent::ButtonDown { button: MouseButtons::RIGHT, x, y }),
            WM_RBUTTONUP => Some(RawInputEvent::ButtonUp { button: MouseButtons::RIGHT, x, y }),
            WM_MBUTTONDOWN => Some(RawInputEvent::ButtonDown { button: MouseButtons::MIDDLE, x, y }),
            WM_MBUTTONUP => Some(RawInputEvent::ButtonUp { button: MouseButtons::MIDDLE, x, y }),
            WM_MOUSEWHEEL => {
                let delta = i32::from((mhs.mouseData >> 16) as i16);
                Some(RawInputEvent::Wheel { delta, x, y })
            }
            _ => None,
        };
        if let Some(event) = event {
            deliver(event);
        }
    }

    // SAFETY: Forward to the next hook in the chain.
    CallNextHookEx(None, n_code, w_param, l_param)
}
