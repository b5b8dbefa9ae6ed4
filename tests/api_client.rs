//! HTTP client tests against a local mock of the Plurk API.
//!
//! Covers the OAuth handshake with a stub verifier, request parameters of
//! each endpoint, payload decoding and the error mapping for non-2xx and
//! undecodable responses.

use httpmock::Method::GET;
use httpmock::MockServer;
use plurkdump::config::ApiConfig;
use plurkdump::oauth::{ConsumerCredentials, TokenPair, VerifierPrompt};
use plurkdump::{PlurkError, Session, authenticate};
use url::Url;

struct StubVerifier {
    code: &'static str,
    seen: Option<Url>,
}

impl VerifierPrompt for StubVerifier {
    fn verifier(&mut self, authorization_url: &Url) -> plurkdump::Result<String> {
        self.seen = Some(authorization_url.clone());
        Ok(self.code.to_string())
    }
}

fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.base_url(),
        timeout_secs: 5,
        ..ApiConfig::default()
    }
}

fn consumer() -> ConsumerCredentials {
    ConsumerCredentials {
        key: "ckey".to_string(),
        secret: "csecret".to_string(),
    }
}

fn session(server: &MockServer) -> Session {
    Session::with_access_token(
        &api_config(server),
        consumer(),
        TokenPair {
            token: "at".to_string(),
            secret: "ats".to_string(),
        },
    )
    .unwrap()
}

const TIMELINE_BODY: &str = r#"{
    "plurks": [
        {"plurk_id": 2, "owner_id": 1, "user_id": 1, "posted": "Sat, 06 Jun 2009 10:00:00 GMT",
         "qualifier": "says", "content": "second", "lang": "en", "is_unread": 0,
         "no_comments": 0, "plurk_type": 0},
        {"plurk_id": 1, "owner_id": 1, "user_id": 1, "posted": "Fri, 05 Jun 2009 23:07:13 GMT",
         "qualifier": "thinks", "content": "first", "lang": "en"}
    ],
    "plurk_users": {
        "1": {"id": 1, "display_name": "amix3", "nick_name": "amix", "gender": 0,
              "has_profile_image": 1, "avatar": 7}
    }
}"#;

#[test]
fn handshake_exchanges_tokens_through_verifier() {
    let server = MockServer::start();
    let request_token = server.mock(|when, then| {
        when.method(GET)
            .path("/OAuth/request_token")
            .header_exists("authorization");
        then.status(200)
            .body("oauth_token=rt&oauth_token_secret=rts&oauth_callback_confirmed=true");
    });
    let access_token = server.mock(|when, then| {
        when.method(GET)
            .path("/OAuth/access_token")
            .header_exists("authorization");
        then.status(200).body("oauth_token=at&oauth_token_secret=ats");
    });

    let mut verifier = StubVerifier {
        code: " 123456\n",
        seen: None,
    };
    let session = authenticate(&api_config(&server), consumer(), &mut verifier).unwrap();

    request_token.assert();
    access_token.assert();
    assert_eq!(session.access_token().token, "at");
    assert_eq!(session.access_token().secret, "ats");

    let seen = verifier.seen.unwrap();
    assert_eq!(seen.path(), "/OAuth/authorize");
    assert!(seen.query_pairs().any(|(k, v)| k == "oauth_token" && v == "rt"));
}

#[test]
fn rejected_request_token_is_auth_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/OAuth/request_token");
        then.status(401).body("invalid consumer");
    });

    let mut verifier = StubVerifier {
        code: "1",
        seen: None,
    };
    let err = authenticate(&api_config(&server), consumer(), &mut verifier).unwrap_err();
    assert!(matches!(
        err,
        PlurkError::AuthFailed {
            stage: "request token",
            ..
        }
    ));
    assert!(verifier.seen.is_none(), "verifier must not be asked");
}

#[test]
fn timeline_page_sends_paging_params_and_converts_dates() {
    let server = MockServer::start();
    let newest = server.mock(|when, then| {
        when.method(GET)
            .path("/APP/Timeline/getPlurks")
            .query_param("minimal_data", "1")
            .query_param("limit", "100")
            .header_exists("authorization");
        then.status(200)
            .header("Content-Type", "application/json")
            .body(TIMELINE_BODY);
    });

    let page = session(&server).fetch_timeline_page(None).unwrap();
    newest.assert();

    assert_eq!(page.posts.len(), 2);
    assert_eq!(page.posts[1].posted, 1_244_243_233.0);
    assert_eq!(page.authors["1"].avatar.as_deref(), Some("7"));
}

#[test]
fn timeline_offset_is_utc_iso() {
    let server = MockServer::start();
    let older = server.mock(|when, then| {
        when.method(GET)
            .path("/APP/Timeline/getPlurks")
            .query_param("offset", "2009-06-05T23:07:13");
        then.status(200).body(r#"{"plurks": [], "plurk_users": null}"#);
    });

    let page = session(&server)
        .fetch_timeline_page(Some(1_244_243_233.0))
        .unwrap();
    older.assert();
    assert!(page.posts.is_empty());
}

#[test]
fn replies_request_names_the_plurk() {
    let server = MockServer::start();
    let responses = server.mock(|when, then| {
        when.method(GET)
            .path("/APP/Responses/get")
            .query_param("plurk_id", "90812")
            .query_param("minimal_data", "1");
        then.status(200).body(
            r#"{"responses": [
                {"id": 5, "user_id": 3, "plurk_id": 90812, "qualifier": ":",
                 "posted": "Sun, 20 Apr 2025 17:31:18 GMT", "lang": "en", "content": "hi"}
            ],
            "friends": {"3": {"id": 3, "display_name": "Three"}},
            "responses_seen": 0}"#,
        );
    });

    let page = session(&server).fetch_replies(90812).unwrap();
    responses.assert();
    assert_eq!(page.replies.len(), 1);
    assert_eq!(page.replies[0].user_id, 3);
    assert_eq!(page.authors["3"].label(), "Three");
}

#[test]
fn own_profile_is_decoded() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/APP/Profile/getOwnProfile");
        then.status(200).body(
            r#"{"user_info": {"id": 1, "display_name": "me", "nick_name": "me_nick"},
                "fans_count": 3, "friends_count": 4, "plurks": []}"#,
        );
    });

    let profile = session(&server).fetch_own_profile().unwrap();
    assert_eq!(profile.user_info.unwrap().id, 1);
    assert_eq!(profile.friends_count, Some(4));
}

#[test]
fn server_error_is_http_error_and_resumable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/APP/Timeline/getPlurks");
        then.status(503).body("try later");
    });

    let err = session(&server).fetch_timeline_page(None).unwrap_err();
    match &err {
        PlurkError::Http {
            endpoint,
            status,
            body,
        } => {
            assert_eq!(endpoint, "/APP/Timeline/getPlurks");
            assert_eq!(*status, 503);
            assert_eq!(body, "try later");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_resumable());
}

#[test]
fn forbidden_is_not_resumable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/APP/Responses/get");
        then.status(403).body(r#"{"error_text": "no permission"}"#);
    });

    let err = session(&server).fetch_replies(1).unwrap_err();
    assert!(matches!(err, PlurkError::Http { status: 403, .. }));
    assert!(!err.is_resumable());
}

#[test]
fn undecodable_body_is_malformed_payload() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/APP/Timeline/getPlurks");
        then.status(200)
            .body(r#"{"plurks": [{"plurk_id": 1, "owner_id": 1, "posted": "last tuesday"}]}"#);
    });

    let err = session(&server).fetch_timeline_page(None).unwrap_err();
    assert!(matches!(err, PlurkError::MalformedPayload { .. }), "{err:?}");
}
