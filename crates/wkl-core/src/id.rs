#![forbid(unsafe_code)]

//! Caller-assigned identifiers.
//!
//! Ids are chosen by the script side and never generated internally. Each
//! entity kind gets its own newtype so a worklet id cannot be passed where a
//! shared-value id is expected.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an id from its raw value.
            #[must_use]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Get the raw id value.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a shared value cell.
    SharedValueId,
    "sv"
);
define_id!(
    /// Identifier of a registered worklet.
    WorkletId,
    "worklet"
);
define_id!(
    /// Identifier of an applier binding (render or event).
    ApplierId,
    "applier"
);
define_id!(
    /// Identifier of a mapper.
    MapperId,
    "mapper"
);

/// Convert a boundary number into a raw id.
///
/// Returns `None` for NaN, infinities, negatives, fractions and values that do
/// not fit in `u32`.
#[must_use]
pub fn raw_id_from_number(n: f64) -> Option<u32> {
    if !n.is_finite() || n < 0.0 || n.fract() != 0.0 || n > f64::from(u32::MAX) {
        return None;
    }
    Some(n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        assert_eq!(SharedValueId::new(3).to_string(), "sv#3");
        assert_eq!(WorkletId::new(10).to_string(), "worklet#10");
        assert_eq!(ApplierId::from(7).to_string(), "applier#7");
        assert_eq!(MapperId::new(1).raw(), 1);
    }

    #[test]
    fn number_conversion_rejects_non_ids() {
        assert_eq!(raw_id_from_number(0.0), Some(0));
        assert_eq!(raw_id_from_number(42.0), Some(42));
        assert_eq!(raw_id_from_number(-1.0), None);
        assert_eq!(raw_id_from_number(1.5), None);
        assert_eq!(raw_id_from_number(f64::NAN), None);
        assert_eq!(raw_id_from_number(f64::INFINITY), None);
        assert_eq!(raw_id_from_number(f64::from(u32::MAX) + 1.0), None);
    }
}
