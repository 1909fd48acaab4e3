//! `TZID` resolution.
//!
//! Exchange/Outlook feeds name zones with Windows identifiers ("Pacific
//! Standard Time") instead of IANA names. Those are mapped through a subset of
//! CLDR's `windowsZones.xml`; anything else must be a valid IANA name.

use chrono_tz::Tz;

/// Windows zone name to IANA zone, from CLDR `windowsZones.xml` (territory 001).
const WINDOWS_ZONES: &[(&str, &str)] = &[
    // North America
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Mountain Standard Time", "America/Denver"),
    ("Central Standard Time", "America/Chicago"),
    ("Eastern Standard Time", "America/New_York"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Canada Central Standard Time", "America/Regina"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("Mexico Standard Time", "America/Mexico_City"),
    // South America
    ("Argentina Standard Time", "America/Buenos_Aires"),
    ("Brazil Standard Time", "America/Sao_Paulo"),
    ("E. South America Standard Time", "America/Sao_Paulo"),
    ("Chile Standard Time", "America/Santiago"),
    // Europe
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("FLE Standard Time", "Europe/Kiev"),
    ("GTB Standard Time", "Europe/Bucharest"),
    ("Russian Standard Time", "Europe/Moscow"),
    // Africa and Middle East
    ("South Africa Standard Time", "Africa/Johannesburg"),
    ("Egypt Standard Time", "Africa/Cairo"),
    ("W. Central Africa Standard Time", "Africa/Lagos"),
    ("West Africa Standard Time", "Africa/Lagos"),
    ("Middle East Standard Time", "Asia/Beirut"),
    ("Israel Standard Time", "Asia/Jerusalem"),
    ("Arabian Standard Time", "Asia/Dubai"),
    ("Arab Standard Time", "Asia/Riyadh"),
    ("Iran Standard Time", "Asia/Tehran"),
    // Asia and Pacific
    ("India Standard Time", "Asia/Calcutta"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("AUS Central Standard Time", "Australia/Darwin"),
    ("W. Australia Standard Time", "Australia/Perth"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    // UTC spellings
    ("UTC", "UTC"),
    ("Coordinated Universal Time", "UTC"),
    ("GMT", "UTC"),
];

/// Resolves a `TZID` parameter to a zone, or `None` if it names no known zone.
pub fn resolve_tzid(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');
    WINDOWS_ZONES
        .iter()
        .find(|(windows, _)| *windows == tzid)
        .and_then(|(_, iana)| iana.parse().ok())
        .or_else(|| tzid.parse().ok())
}
