/// Remaining retry attempts for a single run.
///
/// The budget only ever shrinks: [`RetryBudget::try_consume`] takes one retry
/// when a retryable failure happens and reports whether one was available.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RetryBudget {
    remaining: usize,
}

impl RetryBudget {
    pub fn new(retries: usize) -> Self {
        Self { remaining: retries }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn try_consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }
}
