mod raw;

pub mod helpers;
pub mod op;
mod secret;

pub use raw::{Raw, RawConversionError, NANO_CURRENCY_CODE, RAW_PER_NANO};
pub use secret::Secret;
