//! Binary device classification used to key rendered pages.

use std::fmt;

use serde::Serialize;

/// Substrings (lowercase) that mark a user agent as mobile.
const MOBILE_MARKERS: [&str; 5] = ["mobile", "android", "iphone", "ipad", "ipod"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    #[default]
    Desktop,
}

impl DeviceClass {
    /// Classify a client from its `User-Agent`; absent descriptors are desktop.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(agent) = user_agent else {
            return Self::Desktop;
        };
        let agent = agent.to_ascii_lowercase();
        if MOBILE_MARKERS.iter().any(|marker| agent.contains(marker)) {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
