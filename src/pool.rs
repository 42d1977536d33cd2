//! The cooperative cancellation protocol shared by every worker loop
//! (brute-force, dictionary, plaintext-attack candidate fan-out).
//!
//! Each worker processes its batch and reports one of three outcomes after
//! every batch instead of just a bool, so the pool can tell "keep going"
//! apart from "I'm done and you should stop everyone else too":
//!
//! - [`WorkOutcome::More`] — nothing found yet, keep calling this worker.
//! - [`WorkOutcome::Exit`] — this worker exhausted its own share of the
//!   work with nothing found; it's done, others may still be running.
//! - [`WorkOutcome::CancelSiblings`] — this worker found the answer; every
//!   other worker should stop at its next cooperative checkpoint.
//!
//! There's no OS-level cancellation here (no thread killing, no async
//! task abort) — `cancel` is just an `AtomicBool` every worker polls
//! between batches, same as the teacher's progress-reporting loop did with
//! its pause flag.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

/// What a single batch of a worker's loop accomplished.
pub enum WorkOutcome<T> {
    More,
    Exit,
    CancelSiblings(T),
}

/// Runs `workers` concurrently (one rayon task per entry), each repeatedly
/// invoking its batch closure until it returns [`WorkOutcome::Exit`] or
/// [`WorkOutcome::CancelSiblings`], or until `cancel` is observed set by a
/// sibling. Returns the first found result, if any.
pub fn run<T: Send>(
    workers: Vec<Box<dyn Fn(&AtomicBool) -> WorkOutcome<T> + Send + Sync>>,
) -> Option<T> {
    let cancel = AtomicBool::new(false);

    workers
        .into_par_iter()
        .find_map_any(|worker| loop {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            match worker(&cancel) {
                WorkOutcome::More => continue,
                WorkOutcome::Exit => return None,
                WorkOutcome::CancelSiblings(found) => {
                    cancel.store(true, Ordering::Relaxed);
                    return Some(found);
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn first_worker_to_find_something_cancels_the_rest() {
        let calls = Arc::new(AtomicUsize::new(0));

        let mut workers: Vec<Box<dyn Fn(&AtomicBool) -> WorkOutcome<u32> + Send + Sync>> = Vec::new();
        for i in 0..4u32 {
            let calls = Arc::clone(&calls);
            workers.push(Box::new(move |_cancel| {
                calls.fetch_add(1, Ordering::Relaxed);
                if i == 2 {
                    WorkOutcome::CancelSiblings(i)
                } else {
                    WorkOutcome::Exit
                }
            }));
        }

        let result = run(workers);
        assert_eq!(result, Some(2));
    }

    #[test]
    fn all_workers_exiting_with_nothing_found_yields_none() {
        let workers: Vec<Box<dyn Fn(&AtomicBool) -> WorkOutcome<u32> + Send + Sync>> =
            (0..3).map(|_| -> Box<dyn Fn(&AtomicBool) -> WorkOutcome<u32> + Send + Sync> {
                Box::new(|_cancel| WorkOutcome::Exit)
            }).collect();

        assert_eq!(run(workers), None);
    }
}
