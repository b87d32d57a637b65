use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use super::{NotificationKind, Notifier, Recipient};

/// Booking notifications as SMS through the Twilio Messages API.
pub struct TwilioSmsNotifier {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsNotifier {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

pub fn render_sms(kind: NotificationKind, payload: &Value) -> String {
    let field = |key: &str| payload[key].as_str().unwrap_or("?").to_string();
    let (code, date, time) = (field("confirmation_code"), field("date"), field("start_time"));

    match kind {
        NotificationKind::BookingCreated => {
            format!("Booking received for {date} at {time}. Your code is {code}.")
        }
        NotificationKind::BookingConfirmed => {
            format!("Your wash on {date} at {time} is confirmed. Code: {code}.")
        }
        NotificationKind::BookingCancelled => {
            format!("Your booking {code} on {date} at {time} has been cancelled.")
        }
        NotificationKind::BookingNoShow => {
            format!("We missed you on {date} at {time}. Booking {code} was marked as a no-show.")
        }
    }
}

#[async_trait]
impl Notifier for TwilioSmsNotifier {
    async fn send(&self, kind: NotificationKind, recipient: &Recipient, payload: &Value) -> anyhow::Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let body = render_sms(kind, payload);

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", recipient.phone.as_str()),
                ("From", self.from_number.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await
            .context("failed to send Twilio SMS")?
            .error_for_status()
            .context("Twilio API returned error")?;

        Ok(())
    }
}
