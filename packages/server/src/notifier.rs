//! Change notifications delivered through the Telegram bot.

use async_trait::async_trait;
use page_watch::{Notifier, NotifierError};
use telegram::{TelegramError, TelegramService};

pub struct TelegramNotifier {
    service: TelegramService,
}

impl TelegramNotifier {
    pub fn new(service: TelegramService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), NotifierError> {
        match self.service.send_message(channel_id, text).await {
            Ok(_) => Ok(()),
            Err(TelegramError::Api { code, description }) => {
                Err(NotifierError::Rejected(format!("{}: {}", code, description)))
            }
            Err(e) => Err(NotifierError::Transport(Box::new(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use telegram::TelegramOptions;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(TelegramService::new(
            TelegramOptions::new("TOKEN").with_api_base(server.uri()),
        ))
    }

    #[tokio::test]
    async fn delivered_message_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 1, "chat": {"id": 42}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).send("42", "🔔 home changed!").await.unwrap();
    }

    #[tokio::test]
    async fn api_refusal_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "error_code": 403,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let err = notifier(&server).send("42", "hi").await.unwrap_err();
        assert!(matches!(err, NotifierError::Rejected(ref reason) if reason.contains("blocked")));
    }
}
