//! Trailing-edge debounce for resize requests.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Debouncer {
    delay: f64,
    deadline: Option<f64>,
}

impl Debouncer {
    pub fn new(delay: f64) -> Self {
        Self {
            delay: delay.max(0.0),
            deadline: None,
        }
    }

    /// Record a request. Every call pushes the deadline back.
    pub fn request(&mut self, now: f64) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` once, when the quiet period after the last request has passed.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
