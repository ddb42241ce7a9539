quantity!(
    /// Signed electric current: positive values discharge the battery, negative values charge it.
    Milliamps, suffix: "mA"
);
