//! Filtering for raw sensor samples

/// A generic filter interface.
///
/// `None` means the filter has not settled on an output yet.
pub trait Filter<T> {
    /// Feed one sample
    fn filter(&mut self, input: T) -> Option<T>;

    /// Forget everything seen so far
    fn reset(&mut self);
}

/// Clamps range readings to `[0, max_range]`
#[derive(Debug, Clone)]
pub struct RangeClamp {
    max_range: f64,
}

impl RangeClamp {
    pub fn new(max_range: f64) -> Self {
        RangeClamp { max_range }
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }
}

impl Filter<f64> for RangeClamp {
    fn filter(&mut self, input: f64) -> Option<f64> {
        // Ultrasonic drivers report "nothing in range" as NaN or infinity
        if input.is_finite() {
            Some(input.clamp(0.0, self.max_range))
        } else {
            Some(self.max_range)
        }
    }

    fn reset(&mut self) {}
}

/// Passes a value through once two consecutive samples agree
#[derive(Debug, Clone, Default)]
pub struct ConsecutiveAgreement<T> {
    last: Option<T>,
}

impl<T> ConsecutiveAgreement<T> {
    pub fn new() -> Self {
        ConsecutiveAgreement { last: None }
    }
}

impl<T: PartialEq + Copy> Filter<T> for ConsecutiveAgreement<T> {
    fn filter(&mut self, input: T) -> Option<T> {
        let agreed = self.last == Some(input);
        self.last = Some(input);
        agreed.then_some(input)
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
