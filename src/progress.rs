//! Progress reporting and cooperative cancellation.
//!
//! Long operations report `(percent, message)` at fixed checkpoints: once per
//! merge unit while building, once per output file while saving, once per
//! audio destination, once per copied image. The reporter answers with a
//! [`Signal`]; [`Signal::Cancel`] makes the operation stop cleanly and return
//! `Ok(false)` instead of an error.

/// Answer from a progress reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Cancel,
}

impl Signal {
    pub fn is_cancel(self) -> bool {
        self == Signal::Cancel
    }
}

impl From<bool> for Signal {
    /// `true` means "cancel", matching the `(percent, message) -> cancel?`
    /// callback convention.
    fn from(cancel: bool) -> Self {
        if cancel {
            Signal::Cancel
        } else {
            Signal::Continue
        }
    }
}

/// Receives progress updates and decides whether to continue.
pub trait Progress {
    fn report(&mut self, percent: u32, message: &str) -> Signal;
}

impl<F> Progress for F
where
    F: FnMut(u32, &str) -> bool,
{
    fn report(&mut self, percent: u32, message: &str) -> Signal {
        Signal::from(self(percent, message))
    }
}

/// A reporter that ignores updates and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {
    fn report(&mut self, _percent: u32, _message: &str) -> Signal {
        Signal::Continue
    }
}

/// Forwards to `log::debug!` and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn report(&mut self, percent: u32, message: &str) -> Signal {
        log::debug!("[{percent:>3}%] {message}");
        Signal::Continue
    }
}

/// `100 * done / total`, with an empty total counting as complete.
pub fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (done.saturating_mul(100) / total) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_reporter() {
        let mut seen = Vec::new();
        let mut reporter = |p: u32, m: &str| {
            seen.push((p, m.to_string()));
            p >= 50
        };
        assert_eq!(reporter.report(10, "a"), Signal::Continue);
        assert_eq!(reporter.report(50, "b"), Signal::Cancel);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 4), 0);
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_silent_never_cancels() {
        assert!(!Silent.report(0, "x").is_cancel());
        assert!(!LogProgress.report(100, "done").is_cancel());
    }
}
