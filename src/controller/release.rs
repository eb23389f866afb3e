//! Physical key-release tracking through a low-level keyboard hook.
//!
//! The hook runs on its own thread with a message loop and forwards the
//! virtual-key code of every non-injected key-up to a consumer thread, which
//! hands it to the caller's callback.

#[cfg(windows)]
pub use win32::KeyReleaseHook;

#[cfg(windows)]
mod win32 {
    use anyhow::{anyhow, Result};
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, GetMessageW, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
        UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG, PM_NOREMOVE,
        WH_KEYBOARD_LL, WM_KEYUP, WM_QUIT, WM_SYSKEYUP, WM_USER,
    };

    use crate::controller::hotkey::message_received;
    use crate::controller::keys::VirtualKey;

    static RELEASES: Mutex<Option<Sender<VirtualKey>>> = Mutex::new(None);

    fn clear_channel() {
        if let Ok(mut slot) = RELEASES.lock() {
            slot.take();
        }
    }

    unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        let message = wparam.0 as u32;
        if code >= 0 && (message == WM_KEYUP || message == WM_SYSKEYUP) {
            let event = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
            // Our own SendInput releases are tracked by the controller already
            if event.flags.0 & LLKHF_INJECTED.0 == 0 {
                if let Ok(slot) = RELEASES.lock() {
                    if let Some(tx) = slot.as_ref() {
                        let _ = tx.send(event.vkCode as VirtualKey);
                    }
                }
            }
        }

        unsafe { CallNextHookEx(HHOOK::default(), code, wparam, lparam) }
    }

    /// An installed `WH_KEYBOARD_LL` hook. Only one may exist at a time.
    pub struct KeyReleaseHook {
        thread_id: u32,
        hook_thread: JoinHandle<()>,
        consumer: JoinHandle<()>,
    }

    impl KeyReleaseHook {
        /// Installs the hook. `on_release` runs on a dedicated thread for
        /// every physical key release until [`KeyReleaseHook::stop`].
        pub fn install<F>(mut on_release: F) -> Result<Self>
        where
            F: FnMut(VirtualKey) + Send + 'static,
        {
            let (tx, rx) = mpsc::channel::<VirtualKey>();
            {
                let mut slot = RELEASES
                    .lock()
                    .map_err(|_| anyhow!("Key release channel poisoned"))?;
                if slot.is_some() {
                    return Err(anyhow!("Key release hook already installed"));
                }
                *slot = Some(tx);
            }

            let consumer = match thread::Builder::new()
                .name("key-release".to_string())
                .spawn(move || {
                    for vk in rx {
                        on_release(vk);
                    }
                }) {
                Ok(handle) => handle,
                Err(e) => {
                    clear_channel();
                    return Err(e.into());
                }
            };

            let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
            let hook_thread = thread::Builder::new()
                .name("keyboard-hook".to_string())
                .spawn(move || {
                    let hook = match unsafe {
                        SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE::default(), 0)
                    } {
                        Ok(hook) => hook,
                        Err(e) => {
                            let _ = ready_tx.send(Err(anyhow!("Failed to install keyboard hook: {}", e)));
                            return;
                        }
                    };

                    // Create the message queue before the thread id is published
                    let mut msg = MSG::default();
                    unsafe {
                        let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);
                    }
                    let _ = ready_tx.send(Ok(unsafe { GetCurrentThreadId() }));
                    crate::log("Keyboard hook installed");

                    loop {
                        let ret = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
                        match message_received(ret.0) {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                crate::log(&format!("Keyboard hook loop ended: {}", e));
                                break;
                            }
                        }
                    }

                    unsafe {
                        let _ = UnhookWindowsHookEx(hook);
                    }
                    crate::log("Keyboard hook removed");
                });

            let hook_thread = match hook_thread {
                Ok(handle) => handle,
                Err(e) => {
                    clear_channel();
                    let _ = consumer.join();
                    return Err(e.into());
                }
            };

            let thread_id = match ready_rx.recv() {
                Ok(Ok(id)) => id,
                Ok(Err(e)) => {
                    let _ = hook_thread.join();
                    clear_channel();
                    let _ = consumer.join();
                    return Err(e);
                }
                Err(_) => {
                    let _ = hook_thread.join();
                    clear_channel();
                    let _ = consumer.join();
                    return Err(anyhow!("Keyboard hook thread exited during startup"));
                }
            };

            Ok(Self {
                thread_id,
                hook_thread,
                consumer,
            })
        }

        /// Removes the hook and waits for both threads to finish.
        pub fn stop(self) {
            unsafe {
                let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            let _ = self.hook_thread.join();
            clear_channel();
            let _ = self.consumer.join();
        }
    }
}
