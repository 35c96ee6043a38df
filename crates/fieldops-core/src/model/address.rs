use serde::{Deserialize, Serialize};

/// A site address parsed from the `"street - city, state zip"` wire string.
///
/// Serializes back to the original string untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub original: String,
}

impl Address {
    /// Parse a raw address. Parts that are missing come back empty.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let original = raw.to_string();
        let (street, rest) = raw
            .split_once(" - ")
            .map_or((raw.trim(), ""), |(street, rest)| (street.trim(), rest.trim()));

        let (city, state_zip) = rest
            .rsplit_once(',')
            .map_or((rest, ""), |(city, tail)| (city.trim(), tail.trim()));

        let mut parts = state_zip.split_whitespace();
        let state = parts.next().unwrap_or_default().to_string();
        let zip = parts.collect::<Vec<_>>().join(" ");

        Self {
            street: street.to_string(),
            city: city.to_string(),
            state,
            zip,
            original,
        }
    }

    /// Whether the address carries nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.original.trim().is_empty()
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.original
    }
}
