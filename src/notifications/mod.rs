//! Outbound email for circulation notices.
//!
//! SMTP settings come from the config file; whether notices are sent at
//! all is the librarians' call via the system settings toggle.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send an overdue notice for one loan.
    pub async fn send_overdue_notice(
        &self,
        to_email: &str,
        reader_name: &str,
        book_title: &str,
        due_date: &str,
        fine: f64,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping overdue notice to {}", to_email);
            return Ok(());
        }

        let subject = format!("Overdue: {}", book_title);
        let text_body = render_overdue_text(reader_name, book_title, due_date, fine);
        let html_body = render_overdue_html(reader_name, book_title, due_date, fine);

        self.send_email(to_email, &subject, &html_body, &text_body).await
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            transport = transport.credentials(Credentials::new(
                username.clone(),
                password.clone(),
            ));
        }

        transport.build().send(email).await?;

        tracing::info!(to = to_email, subject = subject, "Sent notification email");
        Ok(())
    }
}

fn render_overdue_text(reader_name: &str, book_title: &str, due_date: &str, fine: f64) -> String {
    format!(
        "Hello {},\n\n\
         \"{}\" was due back on {}. Your fine so far is {:.2} and grows daily \
         until the book is returned.\n\n\
         Please return it at your earliest convenience.\n",
        reader_name, book_title, due_date, fine
    )
}

fn render_overdue_html(reader_name: &str, book_title: &str, due_date: &str, fine: f64) -> String {
    format!(
        "<p>Hello {},</p>\
         <p><strong>{}</strong> was due back on <strong>{}</strong>. \
         Your fine so far is <strong>{:.2}</strong> and grows daily until the \
         book is returned.</p>\
         <p>Please return it at your earliest convenience.</p>",
        reader_name, book_title, due_date, fine
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_overdue_bodies() {
        let text = render_overdue_text("Ada", "Dune", "2025-03-01", 2.5);
        assert!(text.contains("Ada"));
        assert!(text.contains("Dune"));
        assert!(text.contains("2.50"));

        let html = render_overdue_html("Ada", "Dune", "2025-03-01", 2.5);
        assert!(html.contains("<strong>Dune</strong>"));
    }

    #[test]
    fn test_disabled_without_config() {
        let mailer = Mailer::new(EmailConfig::default());
        assert!(!mailer.is_enabled());
    }
}
