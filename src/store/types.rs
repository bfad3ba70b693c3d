//! Marketplace data passed between the protocol client and the session

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// `customerMessage` the marketplace sends when a second-factor code is needed
pub const SECOND_FACTOR_MESSAGE: &str = "MZFinance.BadLogin.Configurator_message";

/// `failureType` for a wrong account id or password
pub const FAILURE_INVALID_CREDENTIALS: &str = "-5000";

/// `failureType` values meaning the session token is no longer accepted
pub const FAILURE_TOKEN_EXPIRED: &[&str] = &["2034", "2042"];

/// `failureType` for a release the account holds no license for
pub const FAILURE_LICENSE_NOT_FOUND: &str = "9610";

/// Everything the marketplace handed back for a successful sign-in.
#[derive(Debug)]
pub struct AccountInfo {
    pub account_id: String,
    pub display_name: Option<String>,
    pub dsid: String,
    pub password_token: SecretString,
    pub store_front: Option<String>,
    pub guid: String,
}

/// One downloadable release as described by the marketplace.
#[derive(Debug, Clone)]
pub struct DownloadTicket {
    /// Where the encrypted `.ipa` can be fetched from
    pub url: String,
    /// DRM blobs to place inside the bundle's `SC_Info`
    pub sinfs: Vec<Vec<u8>>,
    /// Store metadata, written out as `iTunesMetadata.plist`
    pub metadata: plist::Dictionary,
}

/// The marketplace's own record of releases for an app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseListing {
    pub release_ids: Vec<String>,
    pub current_release_id: Option<String>,
    pub current_version: Option<String>,
}

impl DownloadTicket {
    /// Read the release list out of the ticket metadata.
    ///
    /// The order is the marketplace's; nothing is sorted.
    pub fn release_listing(&self) -> ReleaseListing {
        let release_ids = self
            .metadata
            .get("softwareVersionExternalIdentifiers")
            .and_then(plist::Value::as_array)
            .map(|ids| ids.iter().filter_map(plist_id).collect())
            .unwrap_or_default();
        let current_release_id = self
            .metadata
            .get("softwareVersionExternalIdentifier")
            .and_then(plist_id);
        let current_version = self
            .metadata
            .get("bundleShortVersionString")
            .and_then(plist::Value::as_string)
            .map(str::to_string);

        ReleaseListing {
            release_ids,
            current_release_id,
            current_version,
        }
    }
}

/// Release ids show up as integers or strings depending on the endpoint.
fn plist_id(value: &plist::Value) -> Option<String> {
    if let Some(n) = value.as_unsigned_integer() {
        return Some(n.to_string());
    }
    if let Some(n) = value.as_signed_integer() {
        return Some(n.to_string());
    }
    value.as_string().map(str::to_string)
}

/// Accept `"123"` or `123` for an identifier field.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
    })
}

/// Optional variant of [`string_or_number`].
pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_or_number")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(s)| s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_with(metadata: plist::Dictionary) -> DownloadTicket {
        DownloadTicket {
            url: "https://example.invalid/app.ipa".to_string(),
            sinfs: Vec::new(),
            metadata,
        }
    }

    #[test]
    fn test_release_listing_keeps_marketplace_order() {
        let mut metadata = plist::Dictionary::new();
        metadata.insert(
            "softwareVersionExternalIdentifiers".to_string(),
            plist::Value::Array(vec![
                plist::Value::Integer(30u64.into()),
                plist::Value::Integer(10u64.into()),
                plist::Value::Integer(20u64.into()),
            ]),
        );
        metadata.insert(
            "softwareVersionExternalIdentifier".to_string(),
            plist::Value::Integer(20u64.into()),
        );
        metadata.insert(
            "bundleShortVersionString".to_string(),
            plist::Value::String("3.2.1".to_string()),
        );

        let listing = ticket_with(metadata).release_listing();
        assert_eq!(listing.release_ids, vec!["30", "10", "20"]);
        assert_eq!(listing.current_release_id.as_deref(), Some("20"));
        assert_eq!(listing.current_version.as_deref(), Some("3.2.1"));
    }

    #[test]
    fn test_release_listing_empty_metadata() {
        let listing = ticket_with(plist::Dictionary::new()).release_listing();
        assert_eq!(listing, ReleaseListing::default());
    }

    #[test]
    fn test_string_or_number_accepts_both() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "string_or_number")]
            id: String,
            #[serde(default, deserialize_with = "opt_string_or_number")]
            other: Option<String>,
        }

        let a: Probe = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        let b: Probe = serde_json::from_str(r#"{"id": "42", "other": 7}"#).unwrap();
        assert_eq!(a.id, "42");
        assert_eq!(a.other, None);
        assert_eq!(b.id, "42");
        assert_eq!(b.other.as_deref(), Some("7"));
    }
}
