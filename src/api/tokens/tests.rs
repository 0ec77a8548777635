//! Unit tests for token API

use super::*;

fn request(body: &str) -> SaveTokenRequest {
    serde_json::from_str(body).unwrap()
}

#[test]
fn test_save_request_defaults() {
    let record = request(r#"{"access_token": "xoxp-1"}"#).into_record("slack").unwrap();
    assert_eq!(record.access_token, "xoxp-1");
    assert_eq!(record.provider_id, "slack");
    assert_eq!(record.token_type, "Bearer");
    assert!(record.refresh_token.is_none());
    assert!(record.expires_at.is_none());
}

#[test]
fn test_save_request_expires_in() {
    let before = Utc::now();
    let record = request(r#"{"access_token": "a", "refresh_token": "r", "expires_in": 3600}"#).into_record("gmail").unwrap();

    let expires_at = record.expires_at.unwrap();
    assert!(expires_at >= before + Duration::seconds(3600));
    assert!(expires_at <= Utc::now() + Duration::seconds(3600));
    assert_eq!(record.refresh_token(), Some("r"));
}

#[test]
fn test_save_request_expires_at_wins() {
    let record = request(
        r#"{"access_token": "a", "expires_at": "2030-01-01T00:00:00Z", "expires_in": 60, "token_type": "bot"}"#,
    )
    .into_record("slack")
    .unwrap();

    assert_eq!(record.expires_at.unwrap().to_rfc3339(), "2030-01-01T00:00:00+00:00");
    assert_eq!(record.token_type, "bot");
}

#[test]
fn test_save_request_expires_in_out_of_range() {
    for secs in [i64::MAX, i64::MIN] {
        let body = format!(r#"{{"access_token": "a", "expires_in": {}}}"#, secs);
        assert!(matches!(
            request(&body).into_record("gmail"),
            Err(AppError::BadRequest(msg)) if msg.contains("expires_in")
        ));
    }

    // An absolute expiry makes expires_in irrelevant
    let record = request(
        r#"{"access_token": "a", "expires_at": "2030-01-01T00:00:00Z", "expires_in": 9223372036854775807}"#,
    )
    .into_record("gmail")
    .unwrap();
    assert!(record.expires_at.is_some());
}

#[test]
fn test_save_request_empty_refresh_token() {
    let record = request(r#"{"access_token": "a", "refresh_token": "", "token_type": ""}"#).into_record("gmail").unwrap();
    assert!(record.refresh_token.is_none());
    assert_eq!(record.token_type, "Bearer");
}

#[test]
fn test_require_user() {
    assert_eq!(
        require_user(UserQuery { user_id: Some("u1".to_string()) }).unwrap(),
        "u1"
    );
    assert!(matches!(
        require_user(UserQuery { user_id: None }),
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        require_user(UserQuery { user_id: Some(String::new()) }),
        Err(AppError::BadRequest(_))
    ));
}

#[test]
fn test_require_supported() {
    assert!(require_supported("google-drive").is_ok());
    assert!(matches!(require_supported("github"), Err(AppError::BadRequest(_))));
}

#[test]
fn test_token_error_status_mapping() {
    let status = |e: TokenError| AppError::from(e).into_response().status();

    assert_eq!(status(TokenError::not_found("u1", "gmail")), StatusCode::NOT_FOUND);
    assert_eq!(
        status(TokenError::NoRefreshToken { provider_id: "gmail".into() }),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status(TokenError::refresh_failed("gmail", anyhow::anyhow!("invalid_grant"))),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status(TokenError::ProviderUnavailable { provider_id: "confluence".into() }),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        status(TokenError::InvalidRefreshResult { provider_id: "slack".into() }),
        StatusCode::BAD_GATEWAY
    );
}

#[test]
fn test_reconnect_message() {
    match AppError::from(TokenError::NoRefreshToken { provider_id: "slack".into() }) {
        AppError::Unauthorized(msg) => assert!(msg.ends_with("reconnect required")),
        other => panic!("unexpected error: {:?}", other),
    }
}
