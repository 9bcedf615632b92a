use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(unix)]
extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// SIGTERM/SIGINT/SIGHUP only set a flag; the cycle loop notices it between
/// cycles or while sleeping.
#[cfg(unix)]
pub(crate) fn install_shutdown_handlers() -> Result<()> {
    use anyhow::anyhow;

    for signum in [libc::SIGTERM, libc::SIGINT, libc::SIGHUP] {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction =
                request_shutdown as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = libc::SA_RESTART;

            if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
                return Err(anyhow!("failed to install handler for signal {signum}"));
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn install_shutdown_handlers() -> Result<()> {
    Ok(())
}
