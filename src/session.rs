//! Authentication state for the SMS gateway

use crate::errors::GatewayError;
use crate::transport::{GatewayRequest, GatewayTransport};
use std::fmt;
use tracing::{debug, info, warn};

/// Credentials plus the session cookie issued at login.
///
/// `Unauthenticated -> Authenticated -> Unauthenticated`: the cookie is set by
/// [`authenticate`](Self::authenticate) and cleared by [`logout`](Self::logout).
pub struct GatewaySession {
    email: String,
    password: String,
    secure: bool,
    cookie: Option<String>,
}

impl GatewaySession {
    pub fn new(email: impl Into<String>, password: impl Into<String>, secure: bool) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            secure,
            cookie: None,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn is_authenticated(&self) -> bool {
        self.cookie.is_some()
    }

    /// `Cookie` header value for authenticated calls
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    fn store_token(&mut self, sid: &str) {
        self.cookie = Some(format!("sid={}", urlencoding::encode(sid)));
    }

    /// Log in unless a session cookie is already held
    pub async fn authenticate(&mut self, transport: &GatewayTransport) -> Result<(), GatewayError> {
        if self.is_authenticated() {
            return Ok(());
        }

        let request = GatewayRequest::new("login")
            .param("email", self.email.as_str())
            .param("password", self.password.as_str());

        let data = transport.execute(&request, None).await?;

        let sid = data.get("sid").and_then(|sid| sid.as_str()).ok_or_else(|| {
            GatewayError::Interface("login request OK, but no 'sid' set".to_string())
        })?;

        self.store_token(sid);
        info!("Authenticated with SMS gateway as {}", self.email);
        Ok(())
    }

    /// Ask the gateway to drop the session, then forget the cookie regardless of the outcome
    pub async fn logout(&mut self, transport: &GatewayTransport) -> Result<(), GatewayError> {
        let Some(cookie) = self.cookie.take() else {
            debug!("Logout skipped, no active session");
            return Ok(());
        };

        let result = transport
            .execute(&GatewayRequest::new("logout"), Some(&cookie))
            .await
            .map(|_| ());

        if let Err(e) = &result {
            warn!("Gateway logout failed, session dropped locally: {}", e);
        }

        result
    }
}

impl fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySession")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("secure", &self.secure)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> GatewayTransport {
        GatewayTransport::new(&server.address().to_string(), false, true, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_stores_encoded_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=login"))
            .and(body_string_contains("email=ops%40example.test"))
            .and(body_string_contains("format=json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {"msg": {"err_code": 0}, "data": {"sid": "abc/1="}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server);
        let mut session = GatewaySession::new("ops@example.test", "secret", false);

        session.authenticate(&transport).await.unwrap();
        assert_eq!(session.cookie(), Some("sid=abc%2F1%3D"));

        // Already authenticated: no second login
        session.authenticate(&transport).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_without_sid_is_interface_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {"msg": {"err_code": 0}, "data": {}}
            })))
            .mount(&server)
            .await;

        let mut session = GatewaySession::new("ops@example.test", "secret", false);
        let err = session.authenticate(&transport(&server)).await.unwrap_err();

        assert!(matches!(err, GatewayError::Interface(_)));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_bad_credentials_surface_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {"msg": {"err_code": 2}}
            })))
            .mount(&server)
            .await;

        let mut session = GatewaySession::new("ops@example.test", "wrong", false);
        let err = session.authenticate(&transport(&server)).await.unwrap_err();

        assert_eq!(err.kind(), Some(crate::errors::ApiErrorKind::Auth));
    }

    #[tokio::test]
    async fn test_logout_clears_cookie_even_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {"msg": {"err_code": 0}, "data": {"sid": "abc"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=logout"))
            .and(header("Cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server);
        let mut session = GatewaySession::new("ops@example.test", "secret", false);
        session.authenticate(&transport).await.unwrap();

        let result = session.logout(&transport).await;
        assert!(matches!(result, Err(GatewayError::Interface(_))));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_debug_redacts_password() {
        let session = GatewaySession::new("ops@example.test", "secret", true);
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("ops@example.test"));
    }
}
