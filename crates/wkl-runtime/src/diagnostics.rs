#![forbid(unsafe_code)]

//! Registry snapshots for debugging from the script side.
//!
//! The script side asks with a bare number; anything outside the known
//! selectors gets [`INVALID_SELECTOR_MESSAGE`] back instead of a list.

use std::fmt;

use crate::error::RuntimeError;

/// Delivered verbatim for an unknown selector.
pub const INVALID_SELECTOR_MESSAGE: &str = "error: registers state invalid option provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrySelector {
    SharedValues,
    Worklets,
    /// Render-bound and event-bound appliers together.
    Appliers,
}

impl RegistrySelector {
    pub const ALL: [Self; 3] = [Self::SharedValues, Self::Worklets, Self::Appliers];

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::SharedValues => 1,
            Self::Worklets => 2,
            Self::Appliers => 3,
        }
    }
}

impl TryFrom<i32> for RegistrySelector {
    type Error = RuntimeError;

    fn try_from(selector: i32) -> Result<Self, Self::Error> {
        match selector {
            1 => Ok(Self::SharedValues),
            2 => Ok(Self::Worklets),
            3 => Ok(Self::Appliers),
            _ => Err(RuntimeError::InvalidSelector { selector }),
        }
    }
}

impl fmt::Display for RegistrySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SharedValues => "shared values",
            Self::Worklets => "worklets",
            Self::Appliers => "appliers",
        })
    }
}

/// Space-separated ids, as the script side expects them.
#[must_use]
pub fn format_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_codes_round_trip() {
        for selector in RegistrySelector::ALL {
            assert_eq!(RegistrySelector::try_from(selector.code()).unwrap(), selector);
        }
    }

    #[test]
    fn unknown_selectors_are_rejected() {
        for code in [0, 4, -1, i32::MAX] {
            assert!(matches!(
                RegistrySelector::try_from(code),
                Err(RuntimeError::InvalidSelector { selector }) if selector == code
            ));
        }
    }

    #[test]
    fn ids_are_space_joined() {
        assert_eq!(format_ids(&[]), "");
        assert_eq!(format_ids(&[4]), "4");
        assert_eq!(format_ids(&[1, 2, 30]), "1 2 30");
    }
}
