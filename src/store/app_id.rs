//! Application identifiers and share-link parsing
//!
//! A share link looks like
//! `https://apps.apple.com/<country>/app/<slug>/id<digits>?<query>`.
//! The identifier is the digits of the last path segment of the form
//! `id<digits>`. A bare string of digits is accepted as an identifier too.

use rewind_core::LinkError;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Numeric marketplace identifier of an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId(String);

impl AppId {
    /// Parse either a share link or a bare numeric id
    pub fn parse(input: &str) -> Result<Self, LinkError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LinkError::Empty);
        }
        if is_numeric(input) {
            return Ok(Self(input.to_string()));
        }
        Self::from_share_link(input)
    }

    /// Parse a share link
    pub fn from_share_link(link: &str) -> Result<Self, LinkError> {
        let link = link.trim();
        if link.is_empty() {
            return Err(LinkError::Empty);
        }
        let url = Url::parse(link).map_err(|e| LinkError::InvalidUrl(format!("{}: {}", link, e)))?;

        url.path_segments()
            .into_iter()
            .flatten()
            .filter_map(|segment| segment.strip_prefix("id"))
            .filter(|digits| is_numeric(digits))
            .last()
            .map(|digits| Self(digits.to_string()))
            .ok_or_else(|| LinkError::MissingAppId(link.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AppId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
