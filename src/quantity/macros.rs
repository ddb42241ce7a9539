/// Define an integer electrical quantity in milli-units.
macro_rules! quantity {
    ($(#[$attribute:meta])* $name:ident, suffix: $suffix:literal) => {
        $(#[$attribute])*
        #[repr(transparent)]
        #[derive(
            ::derive_more::Add,
            ::derive_more::AddAssign,
            ::derive_more::From,
            ::derive_more::FromStr,
            ::derive_more::Into,
            ::derive_more::Neg,
            ::derive_more::Sub,
            ::derive_more::SubAssign,
            ::derive_more::Sum,
            ::serde::Deserialize,
            ::serde::Serialize,
            ::std::clone::Clone,
            ::std::marker::Copy,
            ::std::default::Default,
            ::std::cmp::Eq,
            ::std::cmp::Ord,
            ::std::cmp::PartialEq,
            ::std::cmp::PartialOrd,
            ::std::hash::Hash,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $crate::quantity::Zero for $name {
            const ZERO: Self = Self(0);
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(formatter, "{} {}", self.0, $suffix)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(formatter, "{}{}", self.0, $suffix)
            }
        }

        impl $name {
            #[allow(clippy::cast_precision_loss)]
            #[must_use]
            pub const fn to_f64(self) -> f64 {
                self.0 as f64
            }
        }

        /// Scale the quantity, truncating towards zero.
        impl ::std::ops::Mul<f64> for $name {
            type Output = Self;

            #[allow(clippy::cast_possible_truncation)]
            fn mul(self, rhs: f64) -> Self::Output {
                Self((self.to_f64() * rhs) as i64)
            }
        }

        /// Ratio of two quantities of the same kind.
        impl ::std::ops::Div for $name {
            type Output = f64;

            fn div(self, rhs: Self) -> Self::Output {
                self.to_f64() / rhs.to_f64()
            }
        }
    };
}
