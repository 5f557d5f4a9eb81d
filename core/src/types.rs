//! Parameter types accepted by the API, with their validation rules.
//!
//! # Design
//! Callers hand in loosely typed values (ids that may arrive as strings from
//! a previous response, enum names typed by a user). Each operation turns
//! them into the types below before building a request, so an invalid value
//! fails with `Error::Validation` and never reaches the network.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::Error;

/// Response format requested through the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Xml,
    Json,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Xml => "xml",
            DataFormat::Json => "json",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            DataFormat::Xml => "application/xml",
            DataFormat::Json => "application/json",
        }
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xml" => Ok(DataFormat::Xml),
            "json" => Ok(DataFormat::Json),
            other => Err(Error::Configuration(format!(
                "invalid response format {other:?}, expected \"xml\" or \"json\""
            ))),
        }
    }
}

/// Generates a closed set of names with `as_str` and a validating `FromStr`.
macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::validation(
                        $label,
                        format!(
                            "unknown value {other:?}, expected one of: {}",
                            [$($text),+].join(", ")
                        ),
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum!(
    /// Datacenter hosting a new server.
    Datacenter, "datacenter" {
        Oversun => "oversun",
        Kh => "kh",
    }
);

named_enum!(
    /// `VirtualServer` has fixed memory; `ScaleServer` scales between a
    /// minimum and a maximum.
    ServerType, "server type" {
        VirtualServer => "VirtualServer",
        ScaleServer => "ScaleServer",
    }
);

named_enum!(
    PowerAction, "power action" {
        Start => "start",
        Stop => "stop",
        Reboot => "reboot",
    }
);

/// Support plan for a new server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportLevel {
    Standard = 1,
    Extended = 3,
}

impl SupportLevel {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl FromStr for SupportLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(SupportLevel::Standard),
            "3" => Ok(SupportLevel::Extended),
            other => Err(Error::validation(
                "support level",
                format!("unknown value {other:?}, expected 1 or 3"),
            )),
        }
    }
}

/// Parse a named value, reporting failures against `operation`.
pub(crate) fn parse_for<T>(operation: &'static str, value: &str) -> Result<T, Error>
where
    T: FromStr<Err = Error>,
{
    value.parse().map_err(|err| match err {
        Error::Validation { reason, .. } => Error::Validation { operation, reason },
        other => other,
    })
}

/// True when `value` reads as a finite decimal number. Sign, fraction and
/// exponent are accepted; `inf` and `NaN` are not.
pub fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Render `value` and require it to be numeric. Returns the rendering so it
/// can go straight into a path or body.
pub(crate) fn numeric(
    operation: &'static str,
    field: &str,
    value: impl fmt::Display,
) -> Result<String, Error> {
    let rendered = value.to_string();
    if is_numeric(&rendered) {
        Ok(rendered)
    } else {
        Err(Error::validation(
            operation,
            format!("{field} must be numeric, got {rendered:?}"),
        ))
    }
}

/// Parse a date into Unix seconds. Naive dates and times are taken as UTC.
///
/// Accepted: `1700000000`, `@1700000000`, RFC 3339, `2024-01-31 12:30:00`,
/// `2024-01-31 12:30`, `2024-01-31`, `31.01.2024`.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(epoch) = value.strip_prefix('@').unwrap_or(value).parse::<i64>() {
        return Some(epoch);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.timestamp());
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(value, pattern) {
            return Some(datetime.and_utc().timestamp());
        }
    }
    for pattern in ["%Y-%m-%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, pattern) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|datetime| datetime.and_utc().timestamp());
        }
    }
    None
}

pub(crate) fn timestamp(operation: &'static str, field: &str, value: &str) -> Result<i64, Error> {
    parse_timestamp(value).ok_or_else(|| {
        Error::validation(
            operation,
            format!("{field} is not a recognised date, got {value:?}"),
        )
    })
}

/// Parameters for a new server, as supplied by the caller.
///
/// Enumerated fields are given by name and numeric fields in any form that
/// renders as a number; `create_server` checks all of them before sending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewServer {
    /// `oversun` or `kh`.
    pub datacenter: String,
    pub name: String,
    /// `VirtualServer` or `ScaleServer`.
    pub server_type: String,
    /// RAM in megabytes. For `VirtualServer` this is the fixed amount.
    pub memory: String,
    /// Upper RAM bound in megabytes; `0` for `VirtualServer`.
    pub memory_max: String,
    /// Disk size in gigabytes.
    pub hdd: String,
    /// `1` for standard support, `3` for extended.
    pub support: String,
    /// Operating system image id.
    pub os: String,
}
