use crate::{directory::BatteryId, policy::Scale, quantity::current::Milliamps};

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Recoverable splitter anomalies.
///
/// None of these is fatal: the operation that produced one has left all shared state untouched,
/// and the caller may retry with corrected input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scale parameter is not within `[0, 1]`: {0:?}")]
    ScaleOutOfRange([f64; 4]),

    #[error("not enough resource to subtract {subtrahend:?} from {minuend:?}")]
    InsufficientResource { minuend: Scale, subtrahend: Scale },

    #[error("sum of {lhs:?} and {rhs:?} is not within `[0, 1]`")]
    ScaleOverflow { lhs: Scale, rhs: Scale },

    #[error("source battery `{0}` is not resolved")]
    UnresolvedSource(String),

    #[error("battery `{0}` does not exist")]
    UnknownBattery(String),

    #[error("battery #{0} does not exist")]
    UnknownId(BatteryId),

    #[error("battery `{0}` already exists")]
    NameTaken(String),

    #[error("battery #{child} does not draw from policy `{policy}`")]
    NotAChild { policy: String, child: BatteryId },

    #[error("battery `{0}` cannot be bound to a policy")]
    NotVirtual(String),

    #[error("battery `{0}` is already bound to a policy")]
    AlreadyBound(String),

    #[error("battery `{0}` is not bound to any policy")]
    Unbound(String),

    #[error("target current {target:?} is outside of `-{max_charging:?}..={max_discharging:?}`")]
    CurrentLimitExceeded { target: Milliamps, max_charging: Milliamps, max_discharging: Milliamps },

    #[error("scheduling window is empty")]
    EmptyWindow,

    #[error("battery #{0} is still drawing {1:?}")]
    ChildBusy(BatteryId, Milliamps),

    #[error("battery #{0} cannot be merged into itself")]
    SelfMerge(BatteryId),

    #[error("the battery directory has been dropped")]
    DirectoryGone,
}
