use crate::{Error, ErrorContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating mode; each mode maps to exactly one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Canned, content-derived replies. Needs no credentials.
    #[default]
    Demo,
    /// Deterministic replay for tests.
    Scripted,
    /// Every request fails with `Unauthorized`.
    Offline,
    /// Real providers over HTTP.
    Live,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Demo, Mode::Scripted, Mode::Offline, Mode::Live];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Demo => "demo",
            Mode::Scripted => "scripted",
            Mode::Offline => "offline",
            Mode::Live => "live",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(Mode::Demo),
            "scripted" | "test" => Ok(Mode::Scripted),
            "offline" => Ok(Mode::Offline),
            "live" | "production" => Ok(Mode::Live),
            other => Err(Error::configuration_with_context(
                "unknown mode",
                ErrorContext::new()
                    .with_field_path("mode")
                    .with_details(format!("{:?} (expected demo, scripted, offline or live)", other)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("Live".parse::<Mode>().unwrap(), Mode::Live);
        assert_eq!(" test ".parse::<Mode>().unwrap(), Mode::Scripted);
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert!("turbo".parse::<Mode>().is_err());
    }
}
