//! Two-phase computations: describe now, realize later
//!
//! Reducers hand back a [`Deferred`] that owns its inputs. Nothing runs until
//! [`Deferred::realize`] is called, and a deferred value realizes at most once.

use crate::types::SarResult;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

type Computation<T> = Box<dyn FnOnce() -> SarResult<T> + Send>;

/// A computation that has been described but not yet run
pub struct Deferred<T> {
    description: String,
    compute: Computation<T>,
}

impl<T: 'static> Deferred<T> {
    pub fn new<F>(description: impl Into<String>, compute: F) -> Self
    where
        F: FnOnce() -> SarResult<T> + Send + 'static,
    {
        Self {
            description: description.into(),
            compute: Box::new(compute),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the computation without progress feedback
    pub fn realize(self) -> SarResult<T> {
        log::debug!("Realizing {}", self.description);
        (self.compute)()
    }

    /// Run the computation, showing a spinner while it works if asked to
    pub fn realize_with_progress(self, show_progress: bool) -> SarResult<T> {
        let pb = spinner(&self.description, show_progress);
        let result = (self.compute)();
        pb.finish_and_clear();
        result
    }

    /// Chain a further step onto the computation without running it
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: 'static,
        F: FnOnce(T) -> SarResult<U> + Send + 'static,
    {
        let compute = self.compute;
        Deferred {
            description: self.description,
            compute: Box::new(move || compute().and_then(f)),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Spinner with a message, or a hidden bar when progress is off
pub(crate) fn spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Counting bar over `len` units of work, or a hidden bar when progress is off
pub(crate) fn counter(len: u64, message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_nothing_runs_until_realized() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let deferred = Deferred::new("flag", move || {
            flag.store(true, Ordering::SeqCst);
            Ok(42)
        });

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(deferred.description(), "flag");
        assert_eq!(deferred.realize().unwrap(), 42);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_map_and_hidden_progress() {
        let deferred = Deferred::new("seven", || Ok(7)).map(|v| Ok(v * 6));
        assert_eq!(deferred.realize_with_progress(false).unwrap(), 42);
    }
}
