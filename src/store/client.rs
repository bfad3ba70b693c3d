//! Marketplace protocol client
//!
//! The marketplace speaks XML property lists over HTTPS. Sign-in posts the
//! account id and derived secret and gets back a person id plus a password
//! token; every later call presents those as headers.

use crate::config::Config;
use crate::di::MarketplaceClient;
use crate::store::types::{
    opt_string_or_number, AccountInfo, DownloadTicket, FAILURE_INVALID_CREDENTIALS,
    FAILURE_LICENSE_NOT_FOUND, FAILURE_TOKEN_EXPIRED, SECOND_FACTOR_MESSAGE,
};
use crate::store::AppId;
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{header, Client as HttpClient};
use rewind_core::{AuthError, FetchError, RewindError, RewindResult};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// The marketplace wants a form content type even though the body is a plist.
const PLIST_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Header carrying the storefront the account belongs to
const STORE_FRONT_RESPONSE_HEADER: &str = "x-set-apple-store-front";

/// Marketplace client
pub struct StoreClient {
    http_client: HttpClient,
    download_client: HttpClient,
    auth_url: String,
    download_url: String,
}

#[derive(Serialize)]
struct AuthRequestBody<'a> {
    #[serde(rename = "appleId")]
    apple_id: &'a str,
    attempt: &'a str,
    #[serde(rename = "createSession")]
    create_session: &'a str,
    guid: &'a str,
    password: &'a str,
    rmp: &'a str,
    why: &'a str,
}

#[derive(Deserialize, Default)]
struct AuthResponseBody {
    #[serde(rename = "m-allowed", default)]
    allowed: bool,
    #[serde(rename = "dsPersonId", default, deserialize_with = "opt_string_or_number")]
    ds_person_id: Option<String>,
    #[serde(rename = "passwordToken", default)]
    password_token: Option<String>,
    #[serde(rename = "accountInfo", default)]
    account_info: Option<AccountInfoBody>,
    #[serde(rename = "failureType", default, deserialize_with = "opt_string_or_number")]
    failure_type: Option<String>,
    #[serde(rename = "customerMessage", default)]
    customer_message: Option<String>,
}

#[derive(Deserialize, Default)]
struct AccountInfoBody {
    #[serde(default)]
    address: Option<AddressBody>,
}

#[derive(Deserialize, Default)]
struct AddressBody {
    #[serde(rename = "firstName", default)]
    first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    last_name: Option<String>,
}

#[derive(Serialize)]
struct DownloadRequestBody<'a> {
    #[serde(rename = "creditDisplay")]
    credit_display: &'a str,
    guid: &'a str,
    #[serde(rename = "salableAdamId")]
    salable_adam_id: &'a str,
    #[serde(rename = "externalVersionId", skip_serializing_if = "Option::is_none")]
    external_version_id: Option<&'a str>,
}

#[derive(Deserialize, Default)]
struct DownloadResponseBody {
    #[serde(rename = "songList", default)]
    song_list: Vec<SongItem>,
    #[serde(rename = "failureType", default, deserialize_with = "opt_string_or_number")]
    failure_type: Option<String>,
    #[serde(rename = "customerMessage", default)]
    customer_message: Option<String>,
}

#[derive(Deserialize)]
struct SongItem {
    #[serde(rename = "URL")]
    url: String,
    #[serde(default)]
    sinfs: Vec<SinfItem>,
    #[serde(default)]
    metadata: plist::Dictionary,
}

#[derive(Deserialize)]
struct SinfItem {
    sinf: plist::Value,
}

/// Stable per-account device guid: first 12 hex digits of SHA-256 of the account id.
pub fn device_guid(account_id: &str) -> String {
    let digest = Sha256::digest(account_id.trim().to_lowercase().as_bytes());
    hex::encode_upper(&digest[..6])
}

fn encode_plist<T: Serialize>(body: &T) -> Result<Vec<u8>, plist::Error> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, body)?;
    Ok(buf)
}

fn with_guid(base: &str, guid: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("guid", guid);
    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn interpret_auth(
    body: AuthResponseBody,
    account_id: &str,
    guid: String,
    store_front: Option<String>,
) -> Result<AccountInfo, AuthError> {
    let message = non_empty(body.customer_message);
    if message.as_deref() == Some(SECOND_FACTOR_MESSAGE) {
        return Err(AuthError::SecondFactorRequired);
    }
    if let Some(failure) = non_empty(body.failure_type) {
        if failure == FAILURE_INVALID_CREDENTIALS {
            return Err(AuthError::InvalidCredentials);
        }
        return Err(AuthError::MarketplaceRejected(
            message.unwrap_or_else(|| format!("failure type {}", failure)),
        ));
    }
    if !body.allowed {
        return Err(AuthError::MarketplaceRejected(
            message.unwrap_or_else(|| "sign-in was not allowed".to_string()),
        ));
    }

    let dsid = non_empty(body.ds_person_id).ok_or_else(|| {
        AuthError::MarketplaceRejected("sign-in response carried no person id".to_string())
    })?;
    let token = non_empty(body.password_token).ok_or_else(|| {
        AuthError::MarketplaceRejected("sign-in response carried no token".to_string())
    })?;
    let display_name = body
        .account_info
        .and_then(|info| info.address)
        .map(|address| {
            format!(
                "{} {}",
                address.first_name.unwrap_or_default(),
                address.last_name.unwrap_or_default()
            )
        })
        .and_then(|name| non_empty(Some(name)));

    Ok(AccountInfo {
        account_id: account_id.to_string(),
        display_name,
        dsid,
        password_token: SecretString::from(token),
        store_front,
        guid,
    })
}

fn interpret_ticket(
    body: DownloadResponseBody,
    app_id: &AppId,
    release_id: Option<&str>,
) -> Result<DownloadTicket, FetchError> {
    let unavailable = |reason: String| FetchError::ReleaseUnavailable {
        app_id: app_id.to_string(),
        release_id: release_id.unwrap_or("current").to_string(),
        reason,
    };

    let message = non_empty(body.customer_message);
    if let Some(failure) = non_empty(body.failure_type) {
        if FAILURE_TOKEN_EXPIRED.contains(&failure.as_str()) {
            return Err(FetchError::NotAuthenticated);
        }
        if failure == FAILURE_LICENSE_NOT_FOUND {
            return Err(unavailable(
                "the account holds no license for this app".to_string(),
            ));
        }
        return Err(unavailable(
            message.unwrap_or_else(|| format!("failure type {}", failure)),
        ));
    }

    let item = body
        .song_list
        .into_iter()
        .next()
        .ok_or_else(|| unavailable("the marketplace returned no download".to_string()))?;

    Ok(DownloadTicket {
        url: item.url,
        sinfs: item
            .sinfs
            .into_iter()
            .filter_map(|s| s.sinf.into_data())
            .collect(),
        metadata: item.metadata,
    })
}

impl StoreClient {
    /// Create a new marketplace client
    pub fn new(config: &Config) -> RewindResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RewindError::Config(format!("Failed to create HTTP client: {}", e)))?;

        // Packages run to gigabytes; only the connect phase is bounded.
        let download_client = HttpClient::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RewindError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            download_client,
            auth_url: config.auth_url.clone(),
            download_url: config.download_url.clone(),
        })
    }

    async fn stream_to_file(
        &self,
        url: &str,
        partial: &Path,
    ) -> Result<(), FetchError> {
        let response = self
            .download_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkInterrupted(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::NetworkInterrupted(format!(
                "package download returned HTTP {}",
                response.status()
            )));
        }

        let total = response.content_length();
        let progress = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };

        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::NetworkInterrupted(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Storage(e.to_string()))?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }
        file.flush()
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        progress.finish_and_clear();

        if let Some(expected) = total {
            if written != expected {
                return Err(FetchError::NetworkInterrupted(format!(
                    "received {} of {} bytes",
                    written, expected
                )));
            }
        }
        debug!(bytes = written, "package download complete");
        Ok(())
    }
}

#[async_trait]
impl MarketplaceClient for StoreClient {
    async fn authenticate(
        &self,
        account_id: &str,
        derived_secret: &SecretString,
        request_code: bool,
    ) -> Result<AccountInfo, AuthError> {
        let guid = device_guid(account_id);
        let body = AuthRequestBody {
            apple_id: account_id,
            attempt: if request_code { "2" } else { "4" },
            create_session: "true",
            guid: &guid,
            password: derived_secret.expose_secret(),
            rmp: "0",
            why: "signIn",
        };
        let payload = encode_plist(&body).map_err(|e| {
            AuthError::MarketplaceRejected(format!("could not encode sign-in request: {}", e))
        })?;
        let url = with_guid(&self.auth_url, &guid)
            .map_err(|e| AuthError::MarketplaceRejected(format!("bad sign-in URL: {}", e)))?;

        debug!(account = %account_id, request_code, "signing in to marketplace");
        let response = self
            .http_client
            .post(url)
            .header(header::CONTENT_TYPE, PLIST_CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| AuthError::NetworkUnavailable(e.to_string()))?;

        let store_front = response
            .headers()
            .get(STORE_FRONT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::NetworkUnavailable(e.to_string()))?;

        // Only a readable marketplace verdict may reject credentials
        if status.is_server_error() {
            return Err(AuthError::NetworkUnavailable(format!(
                "sign-in returned HTTP {}",
                status
            )));
        }
        let body: AuthResponseBody = plist::from_bytes(&bytes).map_err(|e| {
            if status.is_success() {
                AuthError::NetworkUnavailable(format!("unreadable sign-in response: {}", e))
            } else {
                AuthError::NetworkUnavailable(format!("sign-in returned HTTP {}", status))
            }
        })?;

        let account = interpret_auth(body, account_id, guid, store_front)?;
        info!(account = %account.account_id, "marketplace accepted sign-in");
        Ok(account)
    }

    async fn download_ticket(
        &self,
        account: &AccountInfo,
        app_id: &AppId,
        release_id: Option<&str>,
    ) -> Result<DownloadTicket, FetchError> {
        let body = DownloadRequestBody {
            credit_display: "",
            guid: &account.guid,
            salable_adam_id: app_id.as_str(),
            external_version_id: release_id,
        };
        let payload = encode_plist(&body)
            .map_err(|e| FetchError::Storage(format!("could not encode request: {}", e)))?;
        let url = with_guid(&self.download_url, &account.guid)
            .map_err(|e| FetchError::NetworkInterrupted(format!("bad download URL: {}", e)))?;

        let mut request = self
            .http_client
            .post(url)
            .header(header::CONTENT_TYPE, PLIST_CONTENT_TYPE)
            .header("X-Dsid", &account.dsid)
            .header("iCloud-DSID", &account.dsid)
            .header("X-Token", account.password_token.expose_secret())
            .body(payload);
        if let Some(ref store_front) = account.store_front {
            request = request.header("X-Apple-Store-Front", store_front);
        }

        debug!(app = %app_id, release = release_id.unwrap_or("current"), "requesting download ticket");
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::NetworkInterrupted(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::NetworkInterrupted(e.to_string()))?;

        let body: DownloadResponseBody = plist::from_bytes(&bytes).map_err(|e| {
            if status.is_success() {
                FetchError::CorruptDownload(format!("unreadable download ticket: {}", e))
            } else {
                FetchError::NetworkInterrupted(format!("download ticket returned HTTP {}", status))
            }
        })?;

        interpret_ticket(body, app_id, release_id)
    }

    async fn download_package(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let partial = dest.with_extension("partial");
        let result = self.stream_to_file(url, &partial).await;
        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!(path = %partial.display(), error = %cleanup, "could not remove partial download");
            }
            return Err(e);
        }
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn plist_body(dict: plist::Dictionary) -> Vec<u8> {
        let mut buf = Vec::new();
        plist::Value::Dictionary(dict).to_writer_xml(&mut buf).unwrap();
        buf
    }

    fn config_for(server: &MockServer) -> Config {
        Config {
            auth_url: format!("{}/auth", server.uri()),
            download_url: format!("{}/download", server.uri()),
            request_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn signed_in_dict() -> plist::Dictionary {
        let mut address = plist::Dictionary::new();
        address.insert("firstName".into(), "Ada".into());
        address.insert("lastName".into(), "Lovelace".into());
        let mut info = plist::Dictionary::new();
        info.insert("address".into(), plist::Value::Dictionary(address));

        let mut dict = plist::Dictionary::new();
        dict.insert("m-allowed".into(), true.into());
        dict.insert("dsPersonId".into(), "8000000001".into());
        dict.insert("passwordToken".into(), "tok-123".into());
        dict.insert("accountInfo".into(), plist::Value::Dictionary(info));
        dict
    }

    fn account() -> AccountInfo {
        AccountInfo {
            account_id: "user@example.com".to_string(),
            display_name: None,
            dsid: "8000000001".to_string(),
            password_token: SecretString::from("tok-123".to_string()),
            store_front: Some("143441-1,29".to_string()),
            guid: device_guid("user@example.com"),
        }
    }

    #[test]
    fn test_device_guid_is_stable_and_normalized() {
        let a = device_guid("User@Example.com");
        let b = device_guid(" user@example.com ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_interpret_auth_second_factor_wins_over_failure_type() {
        let body = AuthResponseBody {
            failure_type: Some(String::new()),
            customer_message: Some(SECOND_FACTOR_MESSAGE.to_string()),
            ..Default::default()
        };
        let result = interpret_auth(body, "a", "G".to_string(), None);
        assert_eq!(result.unwrap_err(), AuthError::SecondFactorRequired);
    }

    #[test]
    fn test_interpret_auth_missing_token() {
        let body = AuthResponseBody {
            allowed: true,
            ds_person_id: Some("1".to_string()),
            ..Default::default()
        };
        let result = interpret_auth(body, "a", "G".to_string(), None);
        assert!(matches!(result, Err(AuthError::MarketplaceRejected(_))));
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(query_param("guid", device_guid("user@example.com").as_str()))
            .and(body_string_contains("<string>signIn</string>"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-set-apple-store-front", "143441-1,29")
                    .set_body_bytes(plist_body(signed_in_dict())),
            )
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("pw123456".to_string());
        let account = client
            .authenticate("user@example.com", &secret, false)
            .await
            .unwrap();

        assert_eq!(account.dsid, "8000000001");
        assert_eq!(account.password_token.expose_secret(), "tok-123");
        assert_eq!(account.store_front.as_deref(), Some("143441-1,29"));
        assert_eq!(account.display_name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_authenticate_second_factor_required() {
        let server = MockServer::start().await;
        let mut dict = plist::Dictionary::new();
        dict.insert("failureType".into(), "".into());
        dict.insert("customerMessage".into(), SECOND_FACTOR_MESSAGE.into());
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(dict)))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("pw".to_string());
        let result = client.authenticate("user@example.com", &secret, true).await;
        assert_eq!(result.unwrap_err(), AuthError::SecondFactorRequired);
    }

    #[tokio::test]
    async fn test_authenticate_invalid_credentials() {
        let server = MockServer::start().await;
        let mut dict = plist::Dictionary::new();
        dict.insert("failureType".into(), "-5000".into());
        dict.insert(
            "customerMessage".into(),
            "Your Apple ID or password was entered incorrectly.".into(),
        );
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(dict)))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("wrong".to_string());
        let result = client.authenticate("user@example.com", &secret, false).await;
        assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_authenticate_other_failure_is_rejection() {
        let server = MockServer::start().await;
        let mut dict = plist::Dictionary::new();
        dict.insert("failureType".into(), "5002".into());
        dict.insert("customerMessage".into(), "Account locked".into());
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(dict)))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("pw".to_string());
        let result = client.authenticate("user@example.com", &secret, false).await;
        assert_eq!(
            result.unwrap_err(),
            AuthError::MarketplaceRejected("Account locked".to_string())
        );
    }

    #[tokio::test]
    async fn test_authenticate_unreachable() {
        // Port 9 (discard) on loopback is closed in test environments
        let config = Config {
            auth_url: "http://127.0.0.1:9/auth".to_string(),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let client = StoreClient::new(&config).unwrap();
        let secret = SecretString::from("pw".to_string());
        let result = client.authenticate("user@example.com", &secret, false).await;
        assert!(matches!(result, Err(AuthError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_authenticate_server_error_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string("<html>Service Unavailable</html>"),
            )
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("pw".to_string());
        let result = client.authenticate("user@example.com", &secret, false).await;
        assert!(matches!(result, Err(AuthError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_authenticate_server_error_with_plist_is_network_failure() {
        let server = MockServer::start().await;
        let mut dict = plist::Dictionary::new();
        dict.insert("failureType".into(), "-5000".into());
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(502).set_body_bytes(plist_body(dict)))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("pw".to_string());
        let result = client.authenticate("user@example.com", &secret, false).await;
        assert!(matches!(result, Err(AuthError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_authenticate_html_page_is_network_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>Sign in to Wi-Fi</html>"))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let secret = SecretString::from("pw".to_string());
        let result = client.authenticate("user@example.com", &secret, false).await;
        assert!(matches!(result, Err(AuthError::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_download_ticket_posts_app_and_release() {
        let server = MockServer::start().await;
        let mut song = plist::Dictionary::new();
        song.insert("URL".into(), "https://cdn.example/app.ipa".into());
        let mut dict = plist::Dictionary::new();
        dict.insert("songList".into(), plist::Value::Array(vec![plist::Value::Dictionary(song)]));

        Mock::given(method("POST"))
            .and(path("/download"))
            .and(body_string_contains("<key>salableAdamId</key>"))
            .and(body_string_contains("<string>123456789</string>"))
            .and(body_string_contains("<key>externalVersionId</key>"))
            .and(body_string_contains("<string>42</string>"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(dict)))
            .expect(1)
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let app = AppId::parse("123456789").unwrap();
        let ticket = client
            .download_ticket(&account(), &app, Some("42"))
            .await
            .unwrap();
        assert_eq!(ticket.url, "https://cdn.example/app.ipa");
    }

    #[tokio::test]
    async fn test_download_ticket_parses_song_list() {
        let server = MockServer::start().await;

        let mut metadata = plist::Dictionary::new();
        metadata.insert(
            "softwareVersionExternalIdentifiers".into(),
            plist::Value::Array(vec![111u64.into(), 222u64.into()]),
        );
        let mut sinf = plist::Dictionary::new();
        sinf.insert("id".into(), 0u64.into());
        sinf.insert("sinf".into(), plist::Value::Data(b"SINFDATA".to_vec()));
        let mut song = plist::Dictionary::new();
        song.insert("URL".into(), "https://cdn.example/app.ipa".into());
        song.insert("sinfs".into(), plist::Value::Array(vec![plist::Value::Dictionary(sinf)]));
        song.insert("metadata".into(), plist::Value::Dictionary(metadata));
        let mut dict = plist::Dictionary::new();
        dict.insert("songList".into(), plist::Value::Array(vec![plist::Value::Dictionary(song)]));

        Mock::given(method("POST"))
            .and(path("/download"))
            .and(header_eq("X-Dsid", "8000000001"))
            .and(header_eq("X-Token", "tok-123"))
            .and(header_eq("X-Apple-Store-Front", "143441-1,29"))
            .and(body_string_contains("<string>999</string>"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(dict)))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let app = AppId::parse("123456789").unwrap();
        let ticket = client
            .download_ticket(&account(), &app, Some("999"))
            .await
            .unwrap();

        assert_eq!(ticket.url, "https://cdn.example/app.ipa");
        assert_eq!(ticket.sinfs, vec![b"SINFDATA".to_vec()]);
        assert_eq!(ticket.release_listing().release_ids, vec!["111", "222"]);
    }

    #[tokio::test]
    async fn test_download_ticket_empty_song_list_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/download"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(plist_body(plist::Dictionary::new())),
            )
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let app = AppId::parse("1").unwrap();
        let result = client.download_ticket(&account(), &app, Some("5")).await;
        match result {
            Err(FetchError::ReleaseUnavailable { release_id, .. }) => assert_eq!(release_id, "5"),
            other => panic!("Expected ReleaseUnavailable, got {:?}", other.map(|t| t.url)),
        }
    }

    #[tokio::test]
    async fn test_download_ticket_expired_token() {
        let server = MockServer::start().await;
        let mut dict = plist::Dictionary::new();
        dict.insert("failureType".into(), "2034".into());
        Mock::given(method("POST"))
            .and(path("/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(dict)))
            .mount(&server)
            .await;

        let client = StoreClient::new(&config_for(&server)).unwrap();
        let app = AppId::parse("1").unwrap();
        let result = client.download_ticket(&account(), &app, None).await;
        assert!(matches!(result, Err(FetchError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_download_package_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.ipa"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("pkg.ipa");
        let client = StoreClient::new(&config_for(&server)).unwrap();
        client
            .download_package(&format!("{}/pkg.ipa", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 4096]);
        assert!(!dest.with_extension("partial").exists());
    }

    #[tokio::test]
    async fn test_download_package_http_error_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.ipa"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let temp = tempfile::TempDir::new().unwrap();
        let dest = temp.path().join("gone.ipa");
        let client = StoreClient::new(&config_for(&server)).unwrap();
        let result = client
            .download_package(&format!("{}/gone.ipa", server.uri()), &dest)
            .await;

        assert!(matches!(result, Err(FetchError::NetworkInterrupted(_))));
        assert!(!dest.exists());
        assert!(!dest.with_extension("partial").exists());
    }
}
