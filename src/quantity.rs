#[macro_use]
mod macros;

pub mod charge;
pub mod current;
pub mod voltage;
mod zero;

pub use self::zero::Zero;
