//! Fault isolation around calls into plugin code.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::PluginError;
use super::store::PluginDescriptor;
use super::traits::PluginHook;

/// Runs `f`, converting a panic into [`PluginError::Panicked`].
pub(super) fn call_guarded<T, F>(f: F) -> Result<T, PluginError>
where
    F: FnOnce() -> Result<T, PluginError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PluginError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(super) fn log_plugin_error(hook: PluginHook, identity: &str, error: &PluginError) {
    tracing::warn!(plugin = identity, hook = %hook, error = %error, "Plugin hook failed");
}

/// Calls `destroy` on a descriptor's instance, logging any failure.
pub(super) fn teardown(descriptor: &PluginDescriptor) {
    if let Err(e) = call_guarded(|| descriptor.instance().destroy()) {
        log_plugin_error(PluginHook::Destroy, descriptor.identity(), &e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_and_err_pass_through() {
        assert_eq!(call_guarded(|| Ok(7)).unwrap(), 7);
        let err = call_guarded::<(), _>(|| Err(PluginError::hook("bad input"))).unwrap_err();
        assert_eq!(err.to_string(), "bad input");
    }

    #[test]
    fn test_panic_is_captured() {
        let err = call_guarded::<(), _>(|| panic!("exploded")).unwrap_err();
        match err {
            PluginError::Panicked(message) => assert_eq!(message, "exploded"),
            other => panic!("unexpected: {other}"),
        }

        let err = call_guarded::<(), _>(|| panic!("code {}", 42)).unwrap_err();
        assert!(matches!(err, PluginError::Panicked(m) if m == "code 42"));
    }
}
