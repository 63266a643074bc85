use crate::api::json::{read_json, write_json};
use crate::api::{BoxBody, Call};
use crate::data::users::{validate_email, validate_password_plaintext};
use crate::data::{tokens, with_deadline, Scope, StoreError};
use crate::error::ApiError;
use crate::server::AppState;
use crate::validator::Validator;
use http::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Credentials {
    email: String,
    password: String,
}

/// Exchange an email and password for a fresh authentication token. The
/// plaintext is returned here and never again.
pub async fn create_authentication(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let input: Credentials = read_json(&call.body)?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let timeout = state.config.auth.store_timeout;
    let user = match with_deadline(timeout, state.models.users.get_by_email(&input.email)).await {
        Ok(user) => user,
        Err(StoreError::RecordNotFound) => return Err(ApiError::InvalidLogin),
        Err(e) => return Err(e.into()),
    };

    // Hash verification is CPU-bound; keep it off the reactor threads.
    let user_id = user.id;
    let matches = tokio::task::spawn_blocking(move || user.password_matches(&input.password))
        .await
        .map_err(ApiError::server_fault)??;
    if !matches {
        return Err(ApiError::InvalidLogin);
    }

    let token = with_deadline(
        timeout,
        tokens::issue(
            state.models.tokens.as_ref(),
            user_id,
            state.config.auth.token_ttl,
            Scope::Authentication,
        ),
    )
    .await?;

    write_json(
        StatusCode::CREATED,
        &json!({
            "authentication_token": {
                "token": token.plaintext,
                "expiry": humantime::format_rfc3339_seconds(token.expiry).to_string(),
            },
        }),
    )
}

/// Revoke every authentication token held by the caller.
pub async fn revoke_authentication(state: AppState, call: Call) -> Result<Response<BoxBody>, ApiError> {
    let owner = call
        .ctx
        .principal()
        .id()
        .ok_or(ApiError::AuthenticationRequired)?;

    let timeout = state.config.auth.store_timeout;
    with_deadline(
        timeout,
        state
            .models
            .tokens
            .delete_all_for_owner(Scope::Authentication, owner),
    )
    .await?;

    tracing::info!("auth: tokens revoked, user_id={}", owner);
    write_json(
        StatusCode::OK,
        &json!({ "message": "authentication tokens revoked" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Principal, RequestContext};
    use crate::config::ApiConfig;
    use crate::data::{tokens::hash_plaintext, Models, User};
    use crate::routing::Params;
    use bytes::Bytes;
    use http::Method;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::time::Instant;

    async fn state_with_user() -> (AppState, User) {
        let state = AppState::new(ApiConfig::default(), Models::in_memory());
        let user = state
            .models
            .users
            .insert(User::new("Ada", "ada@example.com", "pa55word!", true).unwrap())
            .await
            .unwrap();
        (state, user)
    }

    fn call(principal: Principal, body: &str) -> Call {
        Call {
            ctx: RequestContext::new(
                Method::POST,
                "/v1/tokens/authentication".to_string(),
                "127.0.0.1".to_string(),
                principal,
                Instant::now(),
            ),
            params: Params::default(),
            query: Default::default(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn login_issues_a_usable_token() {
        let (state, user) = state_with_user().await;
        let resp = create_authentication(
            state.clone(),
            call(
                Principal::Anonymous,
                r#"{"email":"ada@example.com","password":"pa55word!"}"#,
            ),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let plaintext = v["authentication_token"]["token"].as_str().unwrap();
        assert_eq!(plaintext.len(), tokens::PLAINTEXT_LEN);

        let rec = state
            .models
            .tokens
            .lookup(&hash_plaintext(plaintext), Scope::Authentication)
            .await
            .unwrap();
        assert_eq!(rec.owner, user.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_read_the_same() {
        let (state, _) = state_with_user().await;
        let wrong = create_authentication(
            state.clone(),
            call(
                Principal::Anonymous,
                r#"{"email":"ada@example.com","password":"not-the-one"}"#,
            ),
        )
        .await
        .unwrap_err();
        let unknown = create_authentication(
            state,
            call(
                Principal::Anonymous,
                r#"{"email":"bob@example.com","password":"pa55word!"}"#,
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(wrong, ApiError::InvalidLogin));
        assert!(matches!(unknown, ApiError::InvalidLogin));
    }

    #[tokio::test]
    async fn login_validates_input() {
        let (state, _) = state_with_user().await;
        let err = create_authentication(
            state,
            call(Principal::Anonymous, r#"{"email":"nope","password":"short"}"#),
        )
        .await
        .unwrap_err();
        match err {
            ApiError::FailedValidation(errors) => {
                assert!(errors.contains_key("email"));
                assert!(errors.contains_key("password"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn logout_revokes_all_tokens() {
        let (state, user) = state_with_user().await;
        let ttl = std::time::Duration::from_secs(60);
        let a = tokens::issue(state.models.tokens.as_ref(), user.id, ttl, Scope::Authentication)
            .await
            .unwrap();
        let b = tokens::issue(state.models.tokens.as_ref(), user.id, ttl, Scope::Authentication)
            .await
            .unwrap();

        let resp = revoke_authentication(state.clone(), call(Principal::User(Arc::new(user)), ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        for t in [a, b] {
            assert!(state
                .models
                .tokens
                .lookup(&t.hash, Scope::Authentication)
                .await
                .is_err());
        }
    }
}
