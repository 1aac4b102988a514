// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast-only notification primitives. Three of these back the
//! new-block, height-changed, and new-mini-block channels; each pairs a
//! mutex with a condvar and only ever calls `notify_all`, so a slow waiter
//! never causes another to be skipped.

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
pub struct Notifier {
    lock: Mutex<u64>,
    condvar: Condvar,
}

impl Notifier {
    pub fn new() -> Self {
        Notifier::default()
    }

    /// Bump the generation counter and wake every waiter.
    pub fn broadcast(&self) {
        let mut generation = self.lock.lock();
        *generation += 1;
        self.condvar.notify_all();
    }

    /// Block until the generation counter advances past `since`.
    pub fn wait_for_next(&self, since: u64) -> u64 {
        let mut generation = self.lock.lock();
        while *generation <= since {
            self.condvar.wait(&mut generation);
        }
        *generation
    }

    pub fn generation(&self) -> u64 {
        *self.lock.lock()
    }
}

#[derive(Default)]
pub struct Notifiers {
    pub new_block: Notifier,
    pub height_changed: Notifier,
    pub new_mini_block: Notifier,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn broadcast_wakes_waiter() {
        let notifier = Arc::new(Notifier::new());
        let waiter = notifier.clone();
        let handle = thread::spawn(move || {
            waiter.wait_for_next(0);
        });

        thread::sleep(Duration::from_millis(20));
        notifier.broadcast();
        handle.join().expect("waiter thread panicked");
    }
}
