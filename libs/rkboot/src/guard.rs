use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use rkboot_bootstrap::logging::{flush_all, EVENT_TARGET};

/// Run `fut`; if it panics, log the payload with a backtrace, flush every log sink and
/// resume the panic. The panic is never swallowed.
pub async fn sync_on_panic<F, T>(scope: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(out) => out,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = Backtrace::force_capture();

            tracing::error!(scope, panic = %message, backtrace = %backtrace, "panic during boot lifecycle");
            tracing::error!(target: EVENT_TARGET, scope, panic = %message, "boot lifecycle aborted");

            flush_all();
            panic::resume_unwind(payload)
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
