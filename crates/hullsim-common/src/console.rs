// console.rs — console output for the simulation core
//
// Diagnostics from the collision and physics code go through here so the
// host can capture them. Output can be redirected into a buffer, which the
// tests use to assert on recovery messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

static DEVELOPER: AtomicBool = AtomicBool::new(false);
static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

/// Enable or disable developer-level output.
pub fn set_developer(on: bool) {
    DEVELOPER.store(on, Ordering::Relaxed);
}

/// Begin capturing console output into a buffer instead of stdout.
pub fn begin_redirect() {
    *RD_BUFFER.lock().unwrap() = Some(String::new());
}

/// Stop capturing and return everything printed since begin_redirect.
pub fn end_redirect() -> String {
    RD_BUFFER.lock().unwrap().take().unwrap_or_default()
}

pub fn com_printf(msg: &str) {
    // if redirecting, append to buffer
    {
        let mut buf = RD_BUFFER.lock().unwrap();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

pub fn com_dprintf(msg: &str) {
    if !DEVELOPER.load(Ordering::Relaxed) {
        return;
    }
    com_printf(msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    // the redirect buffer is process-wide, so serialize these tests
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn redirect_captures_output() {
        let _guard = TEST_LOCK.lock().unwrap();
        begin_redirect();
        com_printf("hello ");
        com_printf("world\n");
        let captured = end_redirect();
        assert_eq!(captured, "hello world\n");
    }

    #[test]
    fn dprintf_gated_on_developer() {
        let _guard = TEST_LOCK.lock().unwrap();
        set_developer(false);
        begin_redirect();
        com_dprintf("quiet\n");
        assert_eq!(end_redirect(), "");

        set_developer(true);
        begin_redirect();
        com_dprintf("loud\n");
        assert_eq!(end_redirect(), "loud\n");
        set_developer(false);
    }
}
