use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static IN_SHIM: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as being inside a shim entry point.
///
/// File operations the engine performs on its own behalf can end up back in
/// an intercepted entry point. While a guard is alive those nested calls see
/// [`ReentrancyGuard::try_enter`] fail and go straight to the OS.
#[derive(Debug)]
pub struct ReentrancyGuard {
    // tied to the thread that set the flag
    _not_send: PhantomData<*const ()>,
}

impl ReentrancyGuard {
    pub fn try_enter() -> Option<Self> {
        IN_SHIM.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(ReentrancyGuard {
                    _not_send: PhantomData,
                })
            }
        })
    }

    pub fn is_active() -> bool {
        IN_SHIM.with(Cell::get)
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_SHIM.with(|flag| flag.set(false));
    }
}
