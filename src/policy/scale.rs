use tracing::warn;

use crate::error::{Error, Result};

/// Floating-point slack for the range and resource comparisons.
const TOLERANCE: f64 = 1e-9;

/// Share of a source battery's resources, each in `[0, 1]`.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Scale {
    state_of_charge: f64,
    max_capacity: f64,
    max_discharge_rate: f64,
    max_charge_rate: f64,
}

impl Scale {
    pub const FULL: Self = Self::splat(1.0);
    pub const ZERO: Self = Self::splat(0.0);

    const fn splat(fraction: f64) -> Self {
        Self {
            state_of_charge: fraction,
            max_capacity: fraction,
            max_discharge_rate: fraction,
            max_charge_rate: fraction,
        }
    }

    /// The same share of every resource.
    pub fn uniform(fraction: f64) -> Result<Self> {
        Self::new(fraction, fraction, fraction, fraction)
    }

    /// Construct a validated scale, clamping values within the tolerance into `[0, 1]`.
    pub fn new(
        state_of_charge: f64,
        max_capacity: f64,
        max_discharge_rate: f64,
        max_charge_rate: f64,
    ) -> Result<Self> {
        let fields = [state_of_charge, max_capacity, max_discharge_rate, max_charge_rate];
        if !fields.iter().all(|field| (-TOLERANCE..=1.0 + TOLERANCE).contains(field)) {
            warn!(?fields, "scale is out of range");
            return Err(Error::ScaleOutOfRange(fields));
        }
        let [state_of_charge, max_capacity, max_discharge_rate, max_charge_rate] =
            fields.map(|field| field.clamp(0.0, 1.0));
        Ok(Self { state_of_charge, max_capacity, max_discharge_rate, max_charge_rate })
    }

    #[must_use]
    pub const fn state_of_charge(self) -> f64 {
        self.state_of_charge
    }

    #[must_use]
    pub const fn max_capacity(self) -> f64 {
        self.max_capacity
    }

    #[must_use]
    pub const fn max_discharge_rate(self) -> f64 {
        self.max_discharge_rate
    }

    #[must_use]
    pub const fn max_charge_rate(self) -> f64 {
        self.max_charge_rate
    }

    const fn fields(self) -> [f64; 4] {
        [self.state_of_charge, self.max_capacity, self.max_discharge_rate, self.max_charge_rate]
    }

    /// Subtract the share, failing unless every field of `self` covers the `subtrahend`.
    pub fn checked_sub(self, subtrahend: Self) -> Result<Self> {
        let covered = self
            .fields()
            .into_iter()
            .zip(subtrahend.fields())
            .all(|(minuend, subtrahend)| minuend + TOLERANCE >= subtrahend);
        if !covered {
            warn!(minuend = ?self, ?subtrahend, "insufficient resource");
            return Err(Error::InsufficientResource { minuend: self, subtrahend });
        }
        Self::new(
            self.state_of_charge - subtrahend.state_of_charge,
            self.max_capacity - subtrahend.max_capacity,
            self.max_discharge_rate - subtrahend.max_discharge_rate,
            self.max_charge_rate - subtrahend.max_charge_rate,
        )
    }

    /// Add the share, failing if any field would leave `[0, 1]`.
    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        Self::new(
            self.state_of_charge + rhs.state_of_charge,
            self.max_capacity + rhs.max_capacity,
            self.max_discharge_rate + rhs.max_discharge_rate,
            self.max_charge_rate + rhs.max_charge_rate,
        )
        .map_err(|_| {
            warn!(lhs = ?self, ?rhs, "scale overflow");
            Error::ScaleOverflow { lhs: self, rhs }
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(matches!(Scale::new(1.5, 0.0, 0.0, 0.0), Err(Error::ScaleOutOfRange(_))));
        assert!(matches!(Scale::new(0.0, -0.1, 0.0, 0.0), Err(Error::ScaleOutOfRange(_))));
        assert!(matches!(Scale::new(0.0, 0.0, f64::NAN, 0.0), Err(Error::ScaleOutOfRange(_))));
    }

    #[test]
    fn uniform_rejects_out_of_range() {
        assert!(matches!(Scale::uniform(2.0), Err(Error::ScaleOutOfRange(_))));
        assert!(matches!(Scale::uniform(-0.5), Err(Error::ScaleOutOfRange(_))));
        assert_eq!(Scale::uniform(1.0).unwrap(), Scale::FULL);
        assert_eq!(Scale::uniform(0.0).unwrap(), Scale::ZERO);
    }

    #[test]
    fn clamps_within_tolerance() {
        let scale = Scale::new(1.0 + 1e-12, -1e-12, 0.5, 0.25).unwrap();
        assert_eq!(scale.state_of_charge(), 1.0);
        assert_eq!(scale.max_capacity(), 0.0);
        assert_eq!(scale.max_discharge_rate(), 0.5);
        assert_eq!(scale.max_charge_rate(), 0.25);
    }

    #[test]
    fn sub_then_add_restores() {
        let a = Scale::new(0.9, 0.7, 0.3, 1.0).unwrap();
        let b = Scale::new(0.1, 0.7, 0.2, 0.45).unwrap();
        let restored = a.checked_sub(b).unwrap().checked_add(b).unwrap();
        for (restored, original) in restored.fields().into_iter().zip(a.fields()) {
            assert_abs_diff_eq!(restored, original, epsilon = 1e-9);
        }
    }

    #[test]
    fn insufficient_resource() {
        let a = Scale::uniform(0.5).unwrap();
        let b = Scale::new(0.1, 0.6, 0.1, 0.1).unwrap();
        assert!(matches!(a.checked_sub(b), Err(Error::InsufficientResource { .. })));
        assert!(Scale::FULL.checked_sub(Scale::FULL).is_ok());
    }

    #[test]
    fn overflow() {
        assert!(matches!(
            Scale::uniform(0.6).unwrap().checked_add(Scale::uniform(0.5).unwrap()),
            Err(Error::ScaleOverflow { .. }),
        ));
        assert_eq!(Scale::ZERO.checked_add(Scale::FULL).unwrap(), Scale::FULL);
    }
}
