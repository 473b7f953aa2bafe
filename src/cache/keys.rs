//! Page cache key definitions.

use std::fmt;

use crate::domain::device::DeviceClass;

/// Identifies one rendered variant of a route.
///
/// Routes rendered for different device classes never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    route: String,
    device: DeviceClass,
}

impl PageKey {
    pub fn new(route: impl Into<String>, device: DeviceClass) -> Self {
        Self {
            route: route.into(),
            device,
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.route, self.device)
    }
}
