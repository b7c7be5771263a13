//! This module re-exports the different versions of arrow we support.

#[cfg(feature = "arrow-55")]
mod arrow_compat_shims {
    pub use arrow_55 as arrow;
}

#[cfg(all(feature = "arrow-54", not(feature = "arrow-55")))]
mod arrow_compat_shims {
    pub use arrow_54 as arrow;
}

// the converted schema and the projected vectors are arrow types, so one version must be enabled
#[cfg(all(not(feature = "arrow-54"), not(feature = "arrow-55")))]
compile_error!("Please enable the `arrow-54` or `arrow-55` feature");

#[cfg(any(feature = "arrow-54", feature = "arrow-55"))]
pub use arrow_compat_shims::*;
