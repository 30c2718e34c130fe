use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Candle interval. Variants are ordered finest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::FifteenMinutes,
        Granularity::ThirtyMinutes,
        Granularity::OneHour,
        Granularity::OneDay,
    ];

    pub fn as_seconds(&self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::FifteenMinutes => 900,
            Granularity::ThirtyMinutes => 1_800,
            Granularity::OneHour => 3_600,
            Granularity::OneDay => 86_400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.as_seconds())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1min",
            Granularity::FiveMinutes => "5min",
            Granularity::FifteenMinutes => "15min",
            Granularity::ThirtyMinutes => "30min",
            Granularity::OneHour => "1h",
            Granularity::OneDay => "1d",
        }
    }

    pub fn is_intraday(&self) -> bool {
        *self != Granularity::OneDay
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1min" | "1m" => Ok(Granularity::OneMinute),
            "5min" | "5m" => Ok(Granularity::FiveMinutes),
            "15min" | "15m" => Ok(Granularity::FifteenMinutes),
            "30min" | "30m" => Ok(Granularity::ThirtyMinutes),
            "1h" | "60min" => Ok(Granularity::OneHour),
            "1d" | "daily" => Ok(Granularity::OneDay),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_finest_first() {
        assert!(Granularity::OneMinute < Granularity::OneHour);
        assert!(Granularity::OneHour < Granularity::OneDay);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("60min".parse::<Granularity>(), Ok(Granularity::OneHour));
        assert_eq!("1D".parse::<Granularity>(), Ok(Granularity::OneDay));
        assert!("tick".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_serde_uses_short_names() {
        let json = serde_json::to_string(&Granularity::FifteenMinutes).unwrap();
        assert_eq!(json, "\"15min\"");
        let parsed: Granularity = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(parsed, Granularity::OneHour);
    }
}
