use log::info;

/// Status screen. Best effort: implementations must not block or fail.
pub trait DisplaySink: Send {
    fn show(&mut self, header: &str, body: &str);
}

/// Mirrors display updates to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn show(&mut self, header: &str, body: &str) {
        info!("[{}] {}", header.trim(), body);
    }
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn show(&mut self, header: &str, body: &str) {
        (**self).show(header, body)
    }
}
