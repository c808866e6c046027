use serde::Deserialize;

/// Response of the IP geolocation lookup (`http://ip-api.com/json`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub country_code: String,
    pub country: String,
    pub city: String,
}

/// What the user is told about their location, and whether real-money play may go on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationVerdict {
    pub message: String,
    pub can_continue: bool,
}
