// Copyright 2024 Tally Labs Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry logic for async calls

use std::time::Duration;

use backoff::backoff::Backoff;

/// A backoff policy that waits a fixed interval between attempts and
/// gives up after a maximum attempt count.
///
/// The slow decryption path uses this to re-poll the gateway while an
/// ACL grant propagates: the settling delay is not a guaranteed bound,
/// so a small, capped number of evenly spaced retries is layered on top
/// of the single gateway call.
#[derive(Debug, Clone)]
pub struct FixedIntervalRetry {
    interval: Duration,
    max_attempts: usize,
    attempted: usize,
}

impl FixedIntervalRetry {
    /// Creates a policy that retries every `interval`, at most
    /// `max_attempts` times, then returns `None` to stop retrying.
    pub fn new(interval: Duration, max_attempts: usize) -> Self {
        Self {
            interval,
            max_attempts,
            attempted: 0,
        }
    }

    /// Remaining attempts before the policy gives up.
    pub fn remaining(&self) -> usize {
        self.max_attempts.saturating_sub(self.attempted)
    }
}

impl Backoff for FixedIntervalRetry {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.attempted < self.max_attempts).then(|| {
            self.attempted += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.attempted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_attempts() {
        let mut policy =
            FixedIntervalRetry::new(Duration::from_millis(10), 3);
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_backoff(), None);
        assert_eq!(policy.remaining(), 0);
    }

    #[test]
    fn reset_restores_the_budget() {
        let mut policy = FixedIntervalRetry::new(Duration::from_millis(5), 1);
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
        policy.reset();
        assert!(policy.next_backoff().is_some());
    }
}
