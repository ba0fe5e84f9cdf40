//! SMS gateway client with lazy login and a single re-authentication retry

use crate::config::Config;
use crate::errors::GatewayError;
use crate::session::GatewaySession;
use crate::transport::{GatewayRequest, GatewayTransport};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Anything that can deliver a text message to a phone number
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, GatewayError>;
}

/// Accounting returned by a successful `push_msg`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendReceipt {
    /// Number of raw SMS parts the message was split into
    pub raw_sms: u64,
    /// Remaining account balance
    pub credits: f64,
    pub data: Value,
}

fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

impl SendReceipt {
    /// Both `n_raw_sms` and `credits` must be present, whatever `err_code` said
    pub fn from_data(data: Value) -> Result<Self, GatewayError> {
        let raw_sms = data.get("n_raw_sms").and_then(count);
        let credits = data.get("credits").and_then(number);

        match (raw_sms, credits) {
            (Some(raw_sms), Some(credits)) => Ok(Self {
                raw_sms,
                credits,
                data,
            }),
            _ => Err(GatewayError::Interface(
                "could not find 'n_raw_sms' or 'credits' in successful push_msg response".to_string(),
            )),
        }
    }
}

/// Client owning one gateway session.
///
/// The session sits behind an async mutex held for a whole send, retry
/// included, so two logins never interleave.
#[derive(Debug)]
pub struct GatewayClient {
    transport: GatewayTransport,
    session: Mutex<GatewaySession>,
}

impl GatewayClient {
    pub fn new(
        session: GatewaySession,
        host: &str,
        verify_tls: bool,
        http_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let transport = GatewayTransport::new(host, session.secure(), verify_tls, http_timeout)?;

        Ok(Self {
            transport,
            session: Mutex::new(session),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let session = GatewaySession::new(
            config.gateway_email.clone(),
            config.gateway_password.clone(),
            config.gateway_secure,
        );

        Self::new(
            session,
            &config.gateway_host,
            config.gateway_verify_tls,
            config.gateway_timeout,
        )
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.is_authenticated()
    }

    /// Log in now instead of on first send
    pub async fn authenticate(&self) -> Result<(), GatewayError> {
        let mut session = self.session.lock().await;
        session.authenticate(&self.transport).await
    }

    /// Best-effort logout; the local session is dropped either way
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let mut session = self.session.lock().await;
        session.logout(&self.transport).await
    }

    /// Send `text` to `phone`. `extra` parameters override the defaults.
    pub async fn send(
        &self,
        phone: &str,
        text: &str,
        extra: &[(&str, &str)],
    ) -> Result<SendReceipt, GatewayError> {
        let mut request = GatewayRequest::new("push_msg")
            .param("unicode", "1")
            .param("phone", phone)
            .param("text", text);
        for (key, value) in extra {
            request = request.param(*key, *value);
        }

        let mut session = self.session.lock().await;
        session.authenticate(&self.transport).await?;

        let data = self.execute_with_recovery(&mut session, &request).await?;
        let receipt = SendReceipt::from_data(data)?;

        debug!(
            "Sent SMS to {} ({} parts, {} credits left)",
            phone, receipt.raw_sms, receipt.credits
        );
        Ok(receipt)
    }

    /// Attempt once; on a session-level failure log out, log back in and attempt exactly once more
    async fn execute_with_recovery(
        &self,
        session: &mut GatewaySession,
        request: &GatewayRequest,
    ) -> Result<Value, GatewayError> {
        let err = match self.transport.execute(request, session.cookie()).await {
            Err(err) if err.is_session_recoverable() => err,
            other => return other,
        };

        warn!(
            "Gateway {} failed with {}, re-authenticating once",
            request.method(),
            err
        );

        if let Err(e) = session.logout(&self.transport).await {
            debug!("Ignoring logout failure during recovery: {}", e);
        }
        session.authenticate(&self.transport).await?;

        let result = self.transport.execute(request, session.cookie()).await;
        if result.is_ok() {
            info!("Gateway {} succeeded after re-authentication", request.method());
        }
        result
    }
}

#[async_trait]
impl SmsSender for GatewayClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<SendReceipt, GatewayError> {
        self.send(phone, text, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiErrorKind;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope(code: i64, data: Value) -> Value {
        json!({"response": {"msg": {"err_code": code}, "data": data}})
    }

    fn client(server: &MockServer) -> GatewayClient {
        let session = GatewaySession::new("ops@example.test", "secret", false);
        GatewayClient::new(
            session,
            &server.address().to_string(),
            true,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_login(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(envelope(0, json!({"sid": "s1"}))),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_logout(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=logout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(0, json!({}))))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_push(server: &MockServer, body: Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(body_string_contains("method=push_msg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_send_authenticates_lazily() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=push_msg"))
            .and(body_string_contains("unicode=1"))
            .and(body_string_contains("phone=79991234567"))
            .and(header("Cookie", "sid=s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                0,
                json!({"n_raw_sms": 1, "credits": "42.50"}),
            )))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.is_authenticated().await);

        let receipt = client.send("79991234567", "Привет", &[]).await.unwrap();
        assert_eq!(receipt.raw_sms, 1);
        assert_eq!(receipt.credits, 42.5);
        assert!(client.is_authenticated().await);

        assert_ok!(client.send("79991234567", "Привет", &[]).await);
    }

    #[tokio::test]
    async fn test_extra_params_are_sent() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=push_msg"))
            .and(body_string_contains("sender_name=OPS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                0,
                json!({"n_raw_sms": 2, "credits": 10}),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client(&server)
            .send("79991234567", "text", &[("sender_name", "OPS")])
            .await
            .unwrap();
        assert_eq!(receipt.raw_sms, 2);
    }

    #[tokio::test]
    async fn test_missing_credits_is_interface_error() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        mount_push(&server, envelope(0, json!({"n_raw_sms": 1})), 1).await;

        let err = client(&server).send("79991234567", "text", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Interface(_)));
    }

    #[tokio::test]
    async fn test_persistent_session_expiry_retries_once() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        mount_logout(&server, 1).await;
        mount_push(&server, envelope(18, json!({})), 2).await;

        let err = client(&server).send("79991234567", "text", &[]).await.unwrap_err();
        assert_eq!(err.kind(), Some(ApiErrorKind::SessionExpired));
    }

    #[tokio::test]
    async fn test_gateway_timeout_recovers_after_relogin() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        mount_logout(&server, 1).await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=push_msg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(3, json!({}))))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_push(
            &server,
            envelope(0, json!({"n_raw_sms": 1, "credits": 9.5})),
            1,
        )
        .await;

        let client = client(&server);
        let receipt = client.send("79991234567", "text", &[]).await.unwrap();
        assert_eq!(receipt.credits, 9.5);
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_recovery_survives_failed_logout() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("method=push_msg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(18, json!({}))))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_push(
            &server,
            envelope(0, json!({"n_raw_sms": 2, "credits": 4})),
            1,
        )
        .await;

        let client = client(&server);
        let receipt = client.send("79991234567", "text", &[]).await.unwrap();
        assert_eq!(receipt.raw_sms, 2);
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;
        mount_logout(&server, 0).await;
        mount_push(&server, envelope(2, json!({})), 1).await;

        let err = client(&server).send("79991234567", "text", &[]).await.unwrap_err();
        assert_eq!(err.kind(), Some(ApiErrorKind::Auth));
    }

    #[tokio::test]
    async fn test_business_errors_surface_unretried() {
        for (code, kind) in [
            (36, ApiErrorKind::Balance),
            (37, ApiErrorKind::Spam),
            (29, ApiErrorKind::NoGate),
            (999, ApiErrorKind::Other(999)),
        ] {
            let server = MockServer::start().await;
            mount_login(&server, 1).await;
            mount_logout(&server, 0).await;
            mount_push(&server, envelope(code, json!({})), 1).await;

            let err = client(&server).send("79991234567", "text", &[]).await.unwrap_err();
            assert_eq!(err.kind(), Some(kind));
        }
    }

    #[tokio::test]
    async fn test_non_200_status_is_interface_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client(&server).send("79991234567", "text", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Interface(_)));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_interface_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).send("79991234567", "text", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Interface(_)));
    }

    #[tokio::test]
    async fn test_logout_forces_new_login() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;
        mount_logout(&server, 1).await;

        let client = client(&server);
        client.authenticate().await.unwrap();
        assert_ok!(client.logout().await);
        assert!(!client.is_authenticated().await);

        client.authenticate().await.unwrap();
        assert!(client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_network_error() {
        let session = GatewaySession::new("ops@example.test", "secret", false);
        let client = GatewayClient::new(session, "127.0.0.1:1", true, Duration::from_secs(2)).unwrap();

        let result = client.send("79991234567", "text", &[]).await;
        let err = assert_err!(result);
        assert!(err.is_network());
    }

    #[test]
    fn test_receipt_requires_both_fields() {
        assert!(SendReceipt::from_data(json!({"n_raw_sms": 1, "credits": 3})).is_ok());
        assert!(SendReceipt::from_data(json!({"credits": 3})).is_err());
        assert!(SendReceipt::from_data(json!({"n_raw_sms": 1})).is_err());
        assert!(SendReceipt::from_data(Value::Null).is_err());
    }

    #[test]
    fn test_receipt_sms_count_must_be_whole() {
        let receipt = SendReceipt::from_data(json!({"n_raw_sms": " 2 ", "credits": 1})).unwrap();
        assert_eq!(receipt.raw_sms, 2);

        assert!(SendReceipt::from_data(json!({"n_raw_sms": 1.5, "credits": 1})).is_err());
        assert!(SendReceipt::from_data(json!({"n_raw_sms": -1, "credits": 1})).is_err());
        assert!(SendReceipt::from_data(json!({"n_raw_sms": "1.5", "credits": 1})).is_err());
    }
}
