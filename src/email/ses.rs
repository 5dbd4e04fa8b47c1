use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::EmailConfig;

use super::sigv4::{self, AwsCredentials};
use super::{EmailError, EmailSender};

const SES_API_VERSION: &str = "2010-12-01";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Amazon SES client using the `SendEmail` query action
#[derive(Clone)]
pub struct SesMailer {
    client: Client,
    endpoint: Url,
    region: String,
    credentials: AwsCredentials,
    from: String,
    timeout: Duration,
}

impl SesMailer {
    pub fn new(
        client: Client,
        endpoint: Url,
        region: String,
        credentials: AwsCredentials,
        from: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint,
            region,
            credentials,
            from,
            timeout,
        }
    }

    /// Build a mailer when both AWS keys are configured
    pub fn from_config(client: Client, config: &EmailConfig) -> Result<Option<Self>, EmailError> {
        let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        else {
            return Ok(None);
        };

        let endpoint = match &config.endpoint {
            Some(endpoint) => Url::parse(endpoint)?,
            None => Url::parse(&format!("https://email.{}.amazonaws.com/", config.region))?,
        };

        Ok(Some(Self::new(
            client,
            endpoint,
            config.region.clone(),
            AwsCredentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: None,
            },
            config.from.clone(),
            Duration::from_secs(config.timeout_seconds),
        )))
    }

    /// Form body for a single-recipient HTML message
    fn send_email_form(&self, to: &str, subject: &str, html_body: &str) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "SendEmail")
            .append_pair("Version", SES_API_VERSION)
            .append_pair("Source", &self.from)
            .append_pair("Destination.ToAddresses.member.1", to)
            .append_pair("Message.Subject.Data", subject)
            .append_pair("Message.Subject.Charset", "UTF-8")
            .append_pair("Message.Body.Html.Data", html_body)
            .append_pair("Message.Body.Html.Charset", "UTF-8")
            .finish()
    }
}

#[async_trait]
impl EmailSender for SesMailer {
    async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> Result<String, EmailError> {
        let body = self.send_email_form(to, subject, html_body);

        let signed = sigv4::sign_request(
            "POST",
            &self.endpoint,
            &[("content-type", FORM_CONTENT_TYPE)],
            body.as_bytes(),
            &self.credentials,
            &self.region,
            "ses",
            chrono::Utc::now(),
        );

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", FORM_CONTENT_TYPE)
            .timeout(self.timeout);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(EmailError::Upstream { status, body: text });
        }

        let message_id = extract_message_id(&text).ok_or(EmailError::MissingMessageId)?;
        tracing::info!(message_id = %message_id, "Email sent");
        Ok(message_id)
    }
}

/// Pull `<MessageId>` out of a `SendEmailResponse` document
fn extract_message_id(xml: &str) -> Option<String> {
    let start = xml.find("<MessageId>")? + "<MessageId>".len();
    let end = start + xml[start..].find("</MessageId>")?;
    let id = xml[start..end].trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_string_contains, header, header_exists, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const SEND_EMAIL_RESPONSE: &str = r#"<SendEmailResponse xmlns="http://ses.amazonaws.com/doc/2010-12-01/">
  <SendEmailResult>
    <MessageId>000001271b15238a-fd3ae762-2563-11df-8cd4-6d4e828a9ae8-000000</MessageId>
  </SendEmailResult>
  <ResponseMetadata>
    <RequestId>fd3ae762-2563-11df-8cd4-6d4e828a9ae8</RequestId>
  </ResponseMetadata>
</SendEmailResponse>"#;

    fn create_test_config(endpoint: Option<String>) -> EmailConfig {
        EmailConfig {
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            secret_access_key: Some("secret".to_string()),
            region: "us-east-1".to_string(),
            from: "info@aerapass.com".to_string(),
            endpoint,
            timeout_seconds: 5,
        }
    }

    #[tokio::test]
    async fn test_send_email_posts_signed_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("content-type", FORM_CONTENT_TYPE))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(body_string_contains("Action=SendEmail"))
            .and(body_string_contains("Source=info%40aerapass.com"))
            .and(body_string_contains("Destination.ToAddresses.member.1=user%40example.com"))
            .and(body_string_contains("Message.Body.Html.Data=%3Cp%3EHi%3C%2Fp%3E"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SEND_EMAIL_RESPONSE))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = SesMailer::from_config(Client::new(), &create_test_config(Some(server.uri())))
            .unwrap()
            .unwrap();
        let message_id = mailer
            .send_email("user@example.com", "Welcome", "<p>Hi</p>")
            .await
            .unwrap();

        assert_eq!(
            message_id,
            "000001271b15238a-fd3ae762-2563-11df-8cd4-6d4e828a9ae8-000000"
        );
    }

    #[tokio::test]
    async fn test_send_email_maps_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("<ErrorResponse>MessageRejected</ErrorResponse>"),
            )
            .mount(&server)
            .await;

        let mailer = SesMailer::from_config(Client::new(), &create_test_config(Some(server.uri())))
            .unwrap()
            .unwrap();
        match mailer.send_email("user@example.com", "Welcome", "<p>Hi</p>").await {
            Err(EmailError::Upstream { status, body }) => {
                assert_eq!(status.as_u16(), 400);
                assert!(body.contains("MessageRejected"));
            }
            other => panic!("Expected upstream error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_without_credentials() {
        let mut config = create_test_config(None);
        config.secret_access_key = None;
        assert!(SesMailer::from_config(Client::new(), &config).unwrap().is_none());
    }

    #[test]
    fn test_default_endpoint_uses_region() {
        let mut config = create_test_config(None);
        config.region = "eu-west-1".to_string();

        let mailer = SesMailer::from_config(Client::new(), &config).unwrap().unwrap();
        assert_eq!(mailer.endpoint.as_str(), "https://email.eu-west-1.amazonaws.com/");
    }

    #[test]
    fn test_extract_message_id() {
        assert_eq!(
            extract_message_id(SEND_EMAIL_RESPONSE).as_deref(),
            Some("000001271b15238a-fd3ae762-2563-11df-8cd4-6d4e828a9ae8-000000")
        );
        assert!(extract_message_id("<SendEmailResponse/>").is_none());
        assert!(extract_message_id("<MessageId> </MessageId>").is_none());
    }
}
