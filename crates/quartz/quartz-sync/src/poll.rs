use std::time::{Duration, Instant};

/// Poll `predicate` every `poll_interval` until it returns `true` or `timeout`
/// has elapsed.
///
/// The predicate is always evaluated at least once, and once more after the
/// deadline passes, so a condition that became true during the last sleep is
/// not reported as a timeout. Returns whether the predicate was satisfied.
/// A timeout too large to express as an `Instant` polls until the predicate
/// holds.
pub fn wait_until<F>(mut predicate: F, poll_interval: Duration, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if predicate() {
            return true;
        }
        let nap = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => poll_interval.min(left),
                _ => return false,
            },
            None => poll_interval,
        };
        std::thread::sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn true_predicate_returns_immediately() {
        let start = Instant::now();
        assert!(wait_until(|| true, Duration::from_secs(1), Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn zero_timeout_polls_once() {
        let mut calls = 0;
        let ok = wait_until(
            || {
                calls += 1;
                false
            },
            Duration::from_millis(1),
            Duration::ZERO,
        );
        assert!(!ok);
        assert_eq!(calls, 1);
    }

    #[test]
    fn unbounded_timeout_is_accepted() {
        let mut calls = 0;
        assert!(wait_until(
            || {
                calls += 1;
                calls == 3
            },
            Duration::from_millis(1),
            Duration::MAX
        ));
        assert_eq!(calls, 3);
    }

    #[test]
    fn times_out_on_false_predicate() {
        let start = Instant::now();
        assert!(!wait_until(
            || false,
            Duration::from_millis(5),
            Duration::from_millis(50)
        ));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn observes_flag_set_by_another_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let f2 = Arc::clone(&flag);
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            f2.store(true, Ordering::Release);
        });
        assert!(wait_until(
            || flag.load(Ordering::Acquire),
            Duration::from_millis(2),
            Duration::from_secs(5)
        ));
        setter.join().unwrap();
    }
}
