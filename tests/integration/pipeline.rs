//! Whole downgrade against fake marketplace and history services

use super::common::plist_body;
use rewind::config::Config;
use rewind::di::mocks::{build_test_ipa, MemoryVault, RecordingLauncher};
use rewind::di::ServiceContainer;
use rewind::orchestrator::{DowngradeOrchestrator, DowngradeState};
use rewind::resolver::{HistoryClient, ResolutionStrategy};
use rewind::store::{restore_session, RestoreOutcome, SignInOutcome, StoreClient, StoreSession};
use rewind::CredentialVault;
use secrecy::SecretString;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP: &str = "123456789";

fn signed_in_dict() -> plist::Dictionary {
    let mut dict = plist::Dictionary::new();
    dict.insert("m-allowed".into(), true.into());
    dict.insert("dsPersonId".into(), "8000000001".into());
    dict.insert("passwordToken".into(), "tok-123".into());
    dict
}

fn second_factor_dict() -> plist::Dictionary {
    let mut dict = plist::Dictionary::new();
    dict.insert(
        "customerMessage".into(),
        "MZFinance.BadLogin.Configurator_message".into(),
    );
    dict
}

fn ticket_dict(package_url: &str) -> plist::Dictionary {
    let mut metadata = plist::Dictionary::new();
    metadata.insert("bundleDisplayName".into(), "Demo".into());
    metadata.insert("softwareVersionExternalIdentifier".into(), 850u64.into());
    let mut sinf = plist::Dictionary::new();
    sinf.insert("id".into(), 0u64.into());
    sinf.insert("sinf".into(), plist::Value::Data(b"SINFDATA".to_vec()));
    let mut song = plist::Dictionary::new();
    song.insert("URL".into(), package_url.into());
    song.insert(
        "sinfs".into(),
        plist::Value::Array(vec![plist::Value::Dictionary(sinf)]),
    );
    song.insert("metadata".into(), plist::Value::Dictionary(metadata));
    let mut dict = plist::Dictionary::new();
    dict.insert(
        "songList".into(),
        plist::Value::Array(vec![plist::Value::Dictionary(song)]),
    );
    dict
}

async fn fake_services(ipa_bytes: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(body_string_contains("<string>pw</string>"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(second_factor_dict())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(body_string_contains("<string>pw123456</string>"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(plist_body(signed_in_dict())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/download"))
        .and(body_string_contains("<string>850</string>"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(plist_body(ticket_dict(&format!("{}/cdn/pkg.ipa", server.uri())))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/pkg.ipa"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ipa_bytes))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/history/{}", APP)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"external_identifier": 850, "bundle_version": "2.0.0"}]
        })))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn test_downgrade_end_to_end() {
    let temp = TempDir::new().unwrap();
    let ipa = temp.path().join("source.ipa");
    build_test_ipa(&ipa, "com.example.app", "2.0.0").unwrap();
    let server = fake_services(fs::read(&ipa).unwrap()).await;

    let config = Config {
        auth_url: format!("{}/auth", server.uri()),
        download_url: format!("{}/download", server.uri()),
        history_url: format!("{}/history", server.uri()),
        delivery_port: 0,
        work_dir: Some(temp.path().join("work").to_string_lossy().to_string()),
        request_timeout_secs: 5,
        ..Default::default()
    };
    let vault = Arc::new(MemoryVault::new());
    let container = ServiceContainer::with_providers(
        Arc::new(config.clone()),
        Arc::new(StoreClient::new(&config).unwrap()),
        Arc::new(HistoryClient::new(&config).unwrap()),
        vault.clone(),
        Arc::new(RecordingLauncher::new()),
    );

    // Sign in with a second factor and keep the credentials
    let password = SecretString::from("pw".to_string());
    let mut session = StoreSession::new(Arc::clone(&container.marketplace));
    assert_eq!(
        session.sign_in("user@example.com", &password, None).await.unwrap(),
        SignInOutcome::ChallengeIssued
    );
    let outcome = session
        .sign_in("user@example.com", &password, Some("123456"))
        .await
        .unwrap();
    assert!(matches!(outcome, SignInOutcome::Authenticated(_)));
    vault.save(&session.credentials().unwrap()).unwrap();

    // A later run restores from the vault
    let mut restored = StoreSession::new(Arc::clone(&container.marketplace));
    let outcome = restore_session(container.vault(), &mut restored).await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::Restored(_)));

    let mut orchestrator = DowngradeOrchestrator::new(&container, restored).unwrap();
    let resolution = orchestrator
        .submit(APP, ResolutionStrategy::RemoteHistory)
        .await
        .unwrap();
    assert_eq!(resolution.candidates()[0].release_id, "850");

    let trigger = orchestrator.select("850").await.unwrap();
    assert!(trigger
        .manifest_url
        .starts_with("https://api.palera.in/genPlist?"));
    assert!(trigger.manifest_url.contains("bundleid=com.example.app"));
    assert!(trigger.manifest_url.contains("version=2.0.0"));

    let archive_url = trigger.install_page_url.replace("/install", "/signed.ipa");
    let bytes = reqwest::get(&archive_url)
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut sinf = Vec::new();
    std::io::Read::read_to_end(
        &mut archive.by_name("Payload/Demo.app/SC_Info/Demo.sinf").unwrap(),
        &mut sinf,
    )
    .unwrap();
    assert_eq!(sinf, b"SINFDATA");
    assert!(archive.by_name("iTunesMetadata.plist").is_ok());
    assert!(archive.by_name("iTunesArtwork").is_ok());

    let page = reqwest::get(&trigger.install_page_url)
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("itms-services://?action=download-manifest"));

    orchestrator.finish().unwrap();
    assert_eq!(orchestrator.state(), DowngradeState::Done);
}
