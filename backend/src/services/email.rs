use crate::config::SmtpConfig;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

impl EmailService {
    pub async fn new(
        smtp_config: &SmtpConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    pub async fn send_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        template: &EmailTemplate,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let message = self
            .message_builder(to_email, to_name, &template.subject)?
            .multipart(Self::alternative_body(template))?;

        self.deliver(message, to_email).await
    }

    /// Send an email with a PDF attached (quotations and invoices).
    pub async fn send_email_with_pdf(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        template: &EmailTemplate,
        pdf_filename: &str,
        pdf_bytes: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let attachment = Attachment::new(pdf_filename.to_string())
            .body(pdf_bytes, ContentType::parse("application/pdf")?);

        let message = self
            .message_builder(to_email, to_name, &template.subject)?
            .multipart(
                MultiPart::mixed()
                    .multipart(Self::alternative_body(template))
                    .singlepart(attachment),
            )?;

        self.deliver(message, to_email).await
    }

    fn message_builder(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
    ) -> Result<lettre::message::MessageBuilder, Box<dyn std::error::Error + Send + Sync>> {
        let from = format!("{} <{}>", self.from_name, self.from_email).parse::<Mailbox>()?;

        let to = if let Some(name) = to_name {
            format!("{} <{}>", name, to_email).parse::<Mailbox>()?
        } else {
            to_email.parse::<Mailbox>()?
        };

        Ok(Message::builder().from(from).to(to).subject(subject))
    }

    fn alternative_body(template: &EmailTemplate) -> MultiPart {
        let text = template
            .text_body
            .clone()
            .unwrap_or_else(|| template.subject.clone());

        MultiPart::alternative()
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(template.html_body.clone()),
            )
    }

    async fn deliver(
        &self,
        message: Message,
        to_email: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(Box::new(e))
            }
        }
    }
}

fn wrap_html(title: &str, inner: &str) -> String {
    format!(
        r#"<html>
<head>
<style>
    body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
    .container {{ max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
    .header {{ background: #1d3557; color: white; padding: 20px; text-align: center; }}
    .content {{ padding: 30px; }}
    .footer {{ background: #f8fafc; padding: 20px; text-align: center; color: #666; }}
    .btn {{ display: inline-block; background: #1d3557; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; margin: 10px 0; }}
    .code {{ font-size: 32px; letter-spacing: 8px; font-weight: bold; text-align: center; padding: 15px; background: #f8fafc; border-radius: 6px; }}
</style>
</head>
<body>
    <div class="container">
        <div class="header"><h1>{}</h1></div>
        <div class="content">{}</div>
        <div class="footer"><p>This is an automated message. Please do not reply directly to this email.</p></div>
    </div>
</body>
</html>"#,
        title, inner
    )
}

/// Signup verification code
pub fn otp_template(otp: &str) -> EmailTemplate {
    EmailTemplate {
        subject: "Your verification code".to_string(),
        html_body: wrap_html(
            "Verify your email",
            &format!(
                "<p>Use this code to finish creating your company account:</p>\
                 <div class=\"code\">{}</div>\
                 <p>The code expires in 5 minutes.</p>",
                otp
            ),
        ),
        text_body: Some(format!(
            "Your verification code is {}. It expires in 5 minutes.",
            otp
        )),
    }
}

/// Employee account confirmation link
pub fn employee_invite_template(
    employee_name: &str,
    company_name: &str,
    confirm_url: &str,
) -> EmailTemplate {
    EmailTemplate {
        subject: format!("You have been added to {}", company_name),
        html_body: wrap_html(
            "Welcome aboard",
            &format!(
                "<p>Hello {},</p>\
                 <p>{} has created a crew account for you. Confirm your account to choose a password and get started.</p>\
                 <a href=\"{}\" class=\"btn\">Confirm my account</a>",
                employee_name, company_name, confirm_url
            ),
        ),
        text_body: Some(format!(
            "Hello {},\n\n{} has created a crew account for you.\nConfirm your account here: {}",
            employee_name, company_name, confirm_url
        )),
    }
}

/// Quotation delivery with signing link; the PDF rides along as an attachment
pub fn quotation_template(
    customer_name: &str,
    company_name: &str,
    quote_number: i32,
    link: &str,
    expires_at: &str,
) -> EmailTemplate {
    EmailTemplate {
        subject: format!("Quotation #{} from {}", quote_number, company_name),
        html_body: wrap_html(
            &format!("Quotation #{}", quote_number),
            &format!(
                "<p>Hello {},</p>\
                 <p>{} has prepared a moving quotation for you. The full document is attached, and you can review and sign it online:</p>\
                 <a href=\"{}\" class=\"btn\">Review and sign</a>\
                 <p>This quotation is valid until {}.</p>",
                customer_name, company_name, link, expires_at
            ),
        ),
        text_body: Some(format!(
            "Hello {},\n\n{} has prepared quotation #{} for you.\nReview and sign it here: {}\n\nValid until {}.",
            customer_name, company_name, quote_number, link, expires_at
        )),
    }
}

/// Reminder for a quotation that is still awaiting a signature
pub fn quotation_reminder_template(
    customer_name: &str,
    company_name: &str,
    quote_number: i32,
    link: &str,
) -> EmailTemplate {
    EmailTemplate {
        subject: format!("Reminder: quotation #{} is awaiting your signature", quote_number),
        html_body: wrap_html(
            &format!("Quotation #{}", quote_number),
            &format!(
                "<p>Hello {},</p>\
                 <p>A friendly reminder that your quotation from {} is still awaiting your signature.</p>\
                 <a href=\"{}\" class=\"btn\">Review and sign</a>",
                customer_name, company_name, link
            ),
        ),
        text_body: Some(format!(
            "Hello {},\n\nYour quotation #{} from {} is still awaiting your signature.\nSign it here: {}",
            customer_name, quote_number, company_name, link
        )),
    }
}

/// Signed copy sent to the customer after e-signature
pub fn signed_copy_template(
    customer_name: &str,
    company_name: &str,
    quote_number: i32,
) -> EmailTemplate {
    EmailTemplate {
        subject: format!("Your signed quotation #{}", quote_number),
        html_body: wrap_html(
            "Quotation signed",
            &format!(
                "<p>Hello {},</p>\
                 <p>Thank you. Your signed copy of quotation #{} from {} is attached for your records.</p>",
                customer_name, quote_number, company_name
            ),
        ),
        text_body: Some(format!(
            "Hello {},\n\nYour signed copy of quotation #{} from {} is attached.",
            customer_name, quote_number, company_name
        )),
    }
}

/// Invoice delivery with the PDF attached
pub fn invoice_template(
    customer_name: &str,
    company_name: &str,
    invoice_number: i32,
    total: &str,
) -> EmailTemplate {
    EmailTemplate {
        subject: format!("Invoice #{} from {}", invoice_number, company_name),
        html_body: wrap_html(
            &format!("Invoice #{}", invoice_number),
            &format!(
                "<p>Hello {},</p>\
                 <p>Your invoice from {} is attached.</p>\
                 <p><strong>Amount due: {}</strong></p>",
                customer_name, company_name, total
            ),
        ),
        text_body: Some(format!(
            "Hello {},\n\nInvoice #{} from {} is attached.\nAmount due: {}",
            customer_name, invoice_number, company_name, total
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_template_contains_code() {
        let t = otp_template("4821");
        assert!(t.html_body.contains("4821"));
        assert!(t.text_body.unwrap().contains("4821"));
    }

    #[test]
    fn test_quotation_template_contains_link() {
        let t = quotation_template(
            "Marie Tremblay",
            "Demenagement Nord",
            1001,
            "https://app.example.com/public/quotations/tok",
            "2026-09-15",
        );
        assert!(t.subject.contains("1001"));
        assert!(t.html_body.contains("public/quotations/tok"));
    }
}
