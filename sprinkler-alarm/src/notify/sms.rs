//! SMS delivery through a Twilio-compatible REST gateway.
//!
//! One `POST .../Messages.json` per recipient, form encoded, with HTTP basic
//! auth. A request timeout bounds how long a hung gateway can hold up the
//! poll loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Transport, TransportError};
use crate::config::SmsConfig;
use crate::escalation::Contact;
use crate::tracing::prelude::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The parts of the gateway's reply worth logging.
#[derive(Debug, Default, Deserialize)]
struct GatewayReply {
    sid: Option<String>,
    status: Option<serde_json::Value>,
    message: Option<String>,
}

pub struct SmsTransport {
    client: Client,
    config: SmsConfig,
}

impl SmsTransport {
    pub fn new(config: SmsConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    async fn send_one(&self, message: &str, to: &Contact) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from.as_str()),
                ("Body", message),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let reply: GatewayReply = serde_json::from_str(&body).unwrap_or_default();

        if !status.is_success() {
            return Err(TransportError::Rejected {
                recipient: to.to_string(),
                status: status.as_u16(),
                detail: reply.message.unwrap_or(body),
            });
        }

        debug!(
            to = %to,
            sid = reply.sid.as_deref().unwrap_or("?"),
            status = ?reply.status,
            "SMS accepted by gateway"
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for SmsTransport {
    async fn send(&self, message: &str, recipients: &[Contact]) -> Result<(), TransportError> {
        let mut failed = 0;
        for to in recipients {
            if let Err(e) = self.send_one(message, to).await {
                warn!(to = %to, error = %e, "SMS not sent");
                failed += 1;
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(TransportError::Partial {
                failed,
                total: recipients.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// Read one HTTP/1.1 request (headers plus Content-Length body).
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve `replies` in order, one connection each, capturing requests.
    async fn gateway(replies: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let captured = Arc::clone(&requests);
        tokio::spawn(async move {
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                captured.lock().push(request);
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (base, requests)
    }

    fn transport(api_base: String) -> SmsTransport {
        SmsTransport::new(SmsConfig {
            account_sid: "AC0001".into(),
            auth_token: "token".into(),
            from: "+15550009999".into(),
            api_base,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_one_form_per_recipient() {
        let ok = r#"{"sid":"SM1","status":"queued"}"#;
        let (base, requests) = gateway(vec![(201, ok), (201, ok)]).await;

        transport(base)
            .send(
                "ALARM: fire sprinkler -- FIRST text: 07:00:00",
                &[Contact::new("+15550001111"), Contact::new("+15550002222")],
            )
            .await
            .unwrap();

        let requests = requests.lock().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("POST /2010-04-01/Accounts/AC0001/Messages.json"));
        // base64("AC0001:token")
        assert!(requests[0].contains("QUMwMDAxOnRva2Vu"));
        assert!(requests[0].contains("To=%2B15550001111"));
        assert!(requests[0].contains("From=%2B15550009999"));
        assert!(requests[1].contains("To=%2B15550002222"));
    }

    #[tokio::test]
    async fn rejected_recipient_does_not_stop_the_rest() {
        let (base, requests) = gateway(vec![
            (400, r#"{"code":21211,"message":"Invalid 'To' Phone Number","status":400}"#),
            (201, r#"{"sid":"SM2","status":"queued"}"#),
        ])
        .await;

        let result = transport(base)
            .send("msg", &[Contact::new("bogus"), Contact::new("+15550002222")])
            .await;

        assert!(matches!(
            result,
            Err(TransportError::Partial {
                failed: 1,
                total: 2
            })
        ));
        assert_eq!(requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_gateway_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = transport(base)
            .send("msg", &[Contact::new("+15550001111")])
            .await;
        assert!(result.is_err());
    }
}
