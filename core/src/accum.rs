use crate::FaultFlags;

// COMPENSATED SUMMATION
// ================================================================================================

/// Neumaier error-tracking accumulator over 64-bit integers.
///
/// The pair maintains the invariant that `sum + err` equals the true
/// accumulated value at every point, with `err` absorbing whatever a
/// saturated `sum` could not represent. The compensated result depends on
/// the values *and* on the order adds and merges are applied; callers that
/// need platform-independent totals must fix that order (see
/// [`crate::ReductionTree`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensatedSum {
    sum: i64,
    err: i64,
}

impl CompensatedSum {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// An empty accumulator.
    pub const fn new() -> Self {
        Self { sum: 0, err: 0 }
    }

    /// An accumulator seeded with a single value.
    pub const fn from_value(v: i64) -> Self {
        Self { sum: v, err: 0 }
    }

    // ACCUMULATION
    // --------------------------------------------------------------------------------------------

    /// Adds one value, capturing any saturation loss in the error term.
    pub fn add(&mut self, v: i64, faults: &mut FaultFlags) {
        let total = sat_add64(self.sum, v, faults);
        let lost = if self.sum.unsigned_abs() >= v.unsigned_abs() {
            sat_add64(sat_sub64(self.sum, total, faults), v, faults)
        } else {
            sat_add64(sat_sub64(v, total, faults), self.sum, faults)
        };
        self.sum = total;
        self.err = sat_add64(self.err, lost, faults);
    }

    /// Folds another accumulator into this one: compensated add of its sum,
    /// then direct combination of the error terms.
    pub fn merge(&mut self, other: &CompensatedSum, faults: &mut FaultFlags) {
        self.add(other.sum, faults);
        self.err = sat_add64(self.err, other.err, faults);
    }

    /// Returns the compensated total.
    pub fn finalize(&self, faults: &mut FaultFlags) -> i64 {
        sat_add64(self.sum, self.err, faults)
    }

    /// Zeroes both terms without touching any fault state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// SATURATING 64-BIT HELPERS
// ================================================================================================

fn sat_add64(a: i64, b: i64, faults: &mut FaultFlags) -> i64 {
    match a.checked_add(b) {
        Some(v) => v,
        None if b > 0 => {
            faults.insert(FaultFlags::OVERFLOW);
            i64::MAX
        },
        None => {
            faults.insert(FaultFlags::UNDERFLOW);
            i64::MIN
        },
    }
}

fn sat_sub64(a: i64, b: i64, faults: &mut FaultFlags) -> i64 {
    match a.checked_sub(b) {
        Some(v) => v,
        None if b < 0 => {
            faults.insert(FaultFlags::OVERFLOW);
            i64::MAX
        },
        None => {
            faults.insert(FaultFlags::UNDERFLOW);
            i64::MIN
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_naive_sum_within_range() {
        let values = [5i64, -3, 1 << 40, -(1 << 20), 7, 0, -1];
        let mut acc = CompensatedSum::new();
        let mut faults = FaultFlags::default();
        for v in values {
            acc.add(v, &mut faults);
        }
        assert_eq!(acc.finalize(&mut faults), values.iter().sum::<i64>());
        assert!(faults.is_empty());
    }

    #[test]
    fn merge_equals_sequential_adds() {
        let mut faults = FaultFlags::default();

        let mut left = CompensatedSum::new();
        left.add(100, &mut faults);
        left.add(-40, &mut faults);
        let mut right = CompensatedSum::new();
        right.add(7, &mut faults);
        right.add(9, &mut faults);

        let mut merged = left;
        merged.merge(&right, &mut faults);

        let mut sequential = CompensatedSum::new();
        for v in [100i64, -40, 7, 9] {
            sequential.add(v, &mut faults);
        }
        assert_eq!(
            merged.finalize(&mut faults),
            sequential.finalize(&mut faults)
        );
    }

    #[test]
    fn saturation_is_flagged_and_error_term_tracks_loss() {
        let mut faults = FaultFlags::default();
        let mut acc = CompensatedSum::from_value(i64::MAX);
        acc.add(1, &mut faults);
        assert!(faults.contains(FaultFlags::OVERFLOW));
        // the sum pinned at MAX; finalize stays saturated rather than wrapping
        assert_eq!(acc.finalize(&mut faults), i64::MAX);
    }

    #[test]
    fn reset_clears_both_terms() {
        let mut faults = FaultFlags::default();
        let mut acc = CompensatedSum::from_value(123);
        acc.add(9, &mut faults);
        acc.reset();
        assert_eq!(acc, CompensatedSum::new());
    }
}
