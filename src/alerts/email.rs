use async_trait::async_trait;

use crate::alerts::smtp::{SmtpClient, SmtpSettings};
use crate::alerts::{ChannelError, EmailSender};

/// Email channel delivering one message per SMTP session
pub struct EmailChannel {
    client: SmtpClient,
    from: String,
}

impl EmailChannel {
    pub fn new(settings: SmtpSettings) -> Self {
        let from = settings.from_address.clone();
        Self {
            client: SmtpClient::new(settings),
            from,
        }
    }
}

#[async_trait]
impl EmailSender for EmailChannel {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError> {
        let mut session = self.client.connect().await?;
        session.send_mail(&self.from, to, subject, body).await?;
        session.quit().await?;
        Ok(())
    }
}
