//! Festival seasons, the unlock calendar and the content masking rules
//! shared by every read path that returns sticker messages.

mod calendar;
mod visibility;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use calendar::{FestivalCalendar, UnlockOverride, UnlockQuery, china_local, current_year};
pub use visibility::{LOCKED_CONTENT, MessageView, SenderInfo, mask_content};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "season", rename_all = "lowercase")]
pub enum Season {
    Christmas,
    Spring,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Christmas => "christmas",
            Season::Spring => "spring",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "christmas" => Ok(Season::Christmas),
            "spring" => Ok(Season::Spring),
            other => Err(AppError::InvalidInput(format!(
                "unknown season '{}', expected christmas or spring",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_parses_wire_names() {
        assert_eq!("spring".parse::<Season>().unwrap(), Season::Spring);
        assert_eq!("christmas".parse::<Season>().unwrap(), Season::Christmas);
        assert!("easter".parse::<Season>().is_err());
        assert_eq!(Season::Spring.to_string(), "spring");
    }

    #[test]
    fn season_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Season::Christmas).unwrap(), "\"christmas\"");
    }
}
