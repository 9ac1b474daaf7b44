//! # Stacktrace Reporting
//!
//! Emit resolved stack traces through `tracing`, on demand or from a panic
//! hook.
//!
//! ```rust,no_run
//! use symtrace_utils::{init_logging, install_panic_hook};
//!
//! let _guard = init_logging().expect("Failed to initialize logging");
//! install_panic_hook();
//! ```

use std::panic;

use symtrace_core::{CaptureConfig, Stacktrace};
use tracing::Level;

/// Capture the caller's stack and log it at `level`.
///
/// File names are shortened to their base name unless `full_paths` is set.
#[inline(never)]
pub fn log_stacktrace(level: Level, full_paths: bool)
{
    // Skip this function's own frame.
    let trace = Stacktrace::capture_config(&CaptureConfig {
        skip: 1,
        ..CaptureConfig::default()
    });
    log_trace(level, "stacktrace", &trace, full_paths);
}

/// Log an already captured trace, one event with the rendered frames.
pub fn log_trace(level: Level, message: &str, trace: &Stacktrace, full_paths: bool)
{
    let frames = trace.len();
    let rendered = trace.display(full_paths).to_string();

    if level == Level::ERROR {
        tracing::error!(frames, "{message}\n{rendered}");
    } else if level == Level::WARN {
        tracing::warn!(frames, "{message}\n{rendered}");
    } else if level == Level::INFO {
        tracing::info!(frames, "{message}\n{rendered}");
    } else if level == Level::DEBUG {
        tracing::debug!(frames, "{message}\n{rendered}");
    } else {
        tracing::trace!(frames, "{message}\n{rendered}");
    }
}

/// Log every panic at `error` together with the panicking thread's stack.
///
/// The previously installed hook still runs afterwards, so the default
/// message on stderr is kept.
pub fn install_panic_hook()
{
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let trace = Stacktrace::capture_config(&CaptureConfig::default());
        let thread = std::thread::current();
        let message = format!("thread '{}' {info}", thread.name().unwrap_or("<unnamed>"));
        log_trace(Level::ERROR, &message, &trace, false);
        previous(info);
    }));
}

#[cfg(test)]
mod tests
{
    use std::io;
    use std::sync::{Arc, Mutex};

    use symtrace_core::{Address, Frame};
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured
    {
        fn text(&self) -> String
        {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured
    {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize>
        {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()>
        {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured
    {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer
        {
            self.clone()
        }
    }

    fn subscriber(output: &Captured, level: Level) -> impl tracing::Subscriber
    {
        tracing_subscriber::fmt()
            .with_writer(output.clone())
            .with_max_level(level)
            .with_ansi(false)
            .finish()
    }

    fn sample_trace() -> Stacktrace
    {
        Stacktrace::from_frames(vec![
            Frame::debug(Address::new(0x10), "inner", "/src/app/inner.rs", 7),
            Frame::unresolved(Address::new(0x20), "[0x20]"),
        ])
    }

    #[test]
    fn test_log_trace_renders_every_frame()
    {
        let output = Captured::default();
        tracing::subscriber::with_default(subscriber(&output, Level::INFO), || {
            log_trace(Level::WARN, "worker stalled", &sample_trace(), false);
        });

        let text = output.text();
        assert!(text.contains("WARN"));
        assert!(text.contains("worker stalled"));
        assert!(text.contains(" 0# inner in inner.rs:7"));
        assert!(text.contains(" 1# [0x20]"));
        assert!(!text.contains("/src/app/inner.rs"));
    }

    #[test]
    fn test_log_trace_full_paths()
    {
        let output = Captured::default();
        tracing::subscriber::with_default(subscriber(&output, Level::TRACE), || {
            log_trace(Level::DEBUG, "dump", &sample_trace(), true);
        });
        assert!(output.text().contains("/src/app/inner.rs:7"));
    }

    #[test]
    fn test_level_below_filter_is_not_emitted()
    {
        let output = Captured::default();
        tracing::subscriber::with_default(subscriber(&output, Level::INFO), || {
            log_trace(Level::DEBUG, "hidden", &sample_trace(), false);
        });
        assert!(output.text().is_empty());
    }

    #[test]
    fn test_log_stacktrace_emits_one_event()
    {
        let output = Captured::default();
        tracing::subscriber::with_default(subscriber(&output, Level::INFO), || {
            log_stacktrace(Level::INFO, false);
        });
        let text = output.text();
        assert!(text.contains("stacktrace"));
        assert!(text.contains("frames="));
    }

    #[inline(never)]
    fn report_from_helper()
    {
        log_stacktrace(Level::INFO, false);
        std::hint::black_box(());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_log_stacktrace_starts_at_its_caller()
    {
        let output = Captured::default();
        tracing::subscriber::with_default(subscriber(&output, Level::INFO), report_from_helper);

        let text = output.text();
        let first = text.lines().find(|line| line.starts_with(" 0# ")).unwrap();
        assert!(first.contains("report_from_helper"), "{text}");
    }

    #[test]
    fn test_panic_hook_logs_message()
    {
        let output = Captured::default();
        tracing::subscriber::with_default(subscriber(&output, Level::ERROR), || {
            install_panic_hook();
            let result = panic::catch_unwind(|| panic!("boom in worker"));
            let _ = panic::take_hook();
            assert!(result.is_err());
        });

        let text = output.text();
        assert!(text.contains("ERROR"));
        assert!(text.contains("boom in worker"));
    }
}
