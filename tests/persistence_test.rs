//! Tests for session folding and the JSON snapshots of session, account and cache.

mod common;

use serde_json::json;
use tempfile::tempdir;

use common::{file_item, folder_details, folder_item, DRIVEWS, ROOT};
use icloud_drive::cache::CacheEntity;
use icloud_drive::http::HttpResponse;
use icloud_drive::models::Details;
use icloud_drive::session::{Cookie, HEADER_ACCOUNT_COUNTRY, HEADER_SESSION_ID};
use icloud_drive::{AccountData, Cache, Drivewsid, Session};

mod cookies {
    use super::*;

    fn response() -> HttpResponse {
        HttpResponse::new(200)
            .with_header("Set-Cookie", "X-APPLE-WEBAUTH-USER=\"v=1:s=0\"; Domain=.icloud.com; Path=/; Secure; HttpOnly")
            .with_header("Set-Cookie", "X-APPLE-DS-WEB-SESSION-TOKEN=abc; Max-Age=3600")
            .with_header(HEADER_SESSION_ID, "sid-1")
            .with_header(HEADER_ACCOUNT_COUNTRY, "USA")
    }

    #[test]
    fn applying_same_response_twice_is_idempotent() {
        let once = Session::new("me@example.com", "secret").apply_response(&response());
        let twice = once.clone().apply_response(&response());
        assert_eq!(once, twice);
        assert_eq!(once.cookies.len(), 2);
    }

    #[test]
    fn attributes_are_parsed() {
        let session = Session::default().apply_response(&response());
        let user = &session.cookies["X-APPLE-WEBAUTH-USER"];
        assert_eq!(user.value, "\"v=1:s=0\"");
        assert_eq!(user.domain.as_deref(), Some("icloud.com"));
        assert!(user.secure && user.http_only);
        assert_eq!(session.cookies["X-APPLE-DS-WEB-SESSION-TOKEN"].max_age, Some(3600));
        assert_eq!(session.session_id.as_deref(), Some("sid-1"));
        assert_eq!(session.account_country.as_deref(), Some("USA"));
    }

    #[test]
    fn max_age_zero_removes_cookie() {
        let session = Session::default().apply_response(&response());
        let expired = HttpResponse::new(200).with_header("Set-Cookie", "X-APPLE-DS-WEB-SESSION-TOKEN=; Max-Age=0");
        let session = session.apply_response(&expired);
        assert!(!session.cookies.contains_key("X-APPLE-DS-WEB-SESSION-TOKEN"));
        assert_eq!(session.cookie_header().as_deref(), Some("X-APPLE-WEBAUTH-USER=\"v=1:s=0\""));
    }

    #[test]
    fn headers_absent_from_response_are_kept() {
        let session = Session::default().apply_response(&response());
        let session = session.apply_response(&HttpResponse::new(200));
        assert_eq!(session.session_id.as_deref(), Some("sid-1"));
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        assert!(Cookie::parse("no-equals-sign").is_none());
        assert!(Cookie::parse("=value").is_none());
    }
}

mod snapshots {
    use super::*;

    #[test]
    fn session_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        let session = Session::new("me@example.com", "secret")
            .apply_response(&HttpResponse::new(200).with_header("Set-Cookie", "a=1"))
            .with_trust_token("trust");

        session.save(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), session);
    }

    #[test]
    fn account_data_keeps_unknown_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("account.json");
        let mut value = common::account_json(DRIVEWS);
        value["isExtendedLogin"] = json!(true);
        let account: AccountData = serde_json::from_value(value).unwrap();

        account.save(&path).unwrap();
        let loaded = AccountData::load(&path).unwrap();
        assert_eq!(loaded, account);
        assert_eq!(loaded.extra["isExtendedLogin"], json!(true));
        assert_eq!(loaded.webservice("drivews").unwrap(), DRIVEWS);
    }

    #[test]
    fn cache_round_trips_with_tags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = Cache::new();
        let root: Details = serde_json::from_value(folder_details(
            ROOT,
            "",
            vec![folder_item("A", "A"), file_item("F", "file", "txt")],
        ))
        .unwrap();
        cache.put_details(root).unwrap();

        cache.save(&path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["entities"][ROOT]["type"], "ROOT");
        assert_eq!(raw["entities"]["FILE::com.apple.CloudDocs::F"]["type"], "FILE_ITEM");

        let loaded = Cache::load(&path);
        assert_eq!(loaded, cache);
        assert!(matches!(
            loaded.get(&Drivewsid::from("FOLDER::com.apple.CloudDocs::A")),
            Some(CacheEntity::FolderItem { .. })
        ));
    }

    #[test]
    fn corrupt_cache_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"entities": {"x": {"type": "NOPE"}}}"#).unwrap();
        assert!(Cache::load(&path).is_empty());
    }
}
