//! Cooperative cancellation token, wired to Ctrl-C by the CLI front end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::errors::{FpError, Result};

/// Cloneable cancellation flag shared between the CLI, engine workers, and
/// the resource monitor.
///
/// Cancellation is cooperative: consumers poll at channel boundaries and
/// between entries. An in-flight syscall is never aborted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn shared_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Flip the token when the user interrupts the process.
///
/// Unix registers SIGINT/SIGTERM flags; Windows installs a console control
/// handler. The first signal only requests cooperative shutdown; the process
/// keeps running until workers drain.
pub fn install_interrupt_handler(token: &CancelToken) -> Result<()> {
    #[cfg(unix)]
    {
        let flag = token.shared_flag();
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag)).map_err(
            |e| FpError::Internal {
                details: format!("failed to register SIGINT handler: {e}"),
            },
        )?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, flag).map_err(|e| {
            FpError::Internal {
                details: format!("failed to register SIGTERM handler: {e}"),
            }
        })?;
        Ok(())
    }

    #[cfg(windows)]
    {
        use std::sync::OnceLock;

        use windows::Win32::Foundation::{BOOL, TRUE};
        use windows::Win32::System::Console::{
            CTRL_BREAK_EVENT, CTRL_C_EVENT, SetConsoleCtrlHandler,
        };

        static INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

        unsafe extern "system" fn ctrl_handler(ctrl_type: u32) -> BOOL {
            if matches!(ctrl_type, CTRL_C_EVENT | CTRL_BREAK_EVENT)
                && let Some(flag) = INTERRUPT_FLAG.get()
            {
                flag.store(true, Ordering::SeqCst);
                return TRUE;
            }
            BOOL(0)
        }

        INTERRUPT_FLAG
            .set(token.shared_flag())
            .map_err(|_| FpError::Internal {
                details: "interrupt handler installed twice".to_string(),
            })?;
        unsafe { SetConsoleCtrlHandler(Some(ctrl_handler), TRUE) }.map_err(|e| {
            FpError::Internal {
                details: format!("failed to install console control handler: {e}"),
            }
        })?;
        Ok(())
    }
}
