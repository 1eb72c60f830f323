//! Transactional email bodies.

#[derive(Debug, Clone)]
pub struct Email {
    pub subject: String,
    pub html: String,
    /// Plain-text rendition, used for logging when SMTP is off.
    pub text: String,
}

pub fn otp_email(otp: &str, ttl_minutes: i64) -> Email {
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: auto; padding: 20px; text-align: center;">
  <h2 style="color: #4CAF50;">OTP Verification</h2>
  <p>Use the following code to verify your email. It is valid for <strong>{ttl_minutes} minutes</strong>. Do not share it with anyone.</p>
  <div style="display: inline-block; padding: 15px; font-size: 24px; font-weight: bold; letter-spacing: 6px; border: 2px dashed #4CAF50;">{otp}</div>
  <p style="font-size: 14px; color: #999;">If you didn't request this, please ignore this email.</p>
</div>"#
    );
    Email {
        subject: "Your JobLoop verification code".into(),
        html,
        text: format!("Your OTP is: {otp} (valid for {ttl_minutes} minutes)"),
    }
}

pub fn verified_email() -> Email {
    Email {
        subject: "Email verified".into(),
        html: r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: auto; padding: 20px; text-align: center;">
  <h2 style="color: #2196F3;">Verification Successful</h2>
  <p>Your email has been verified. You can now access all features.</p>
</div>"#
            .into(),
        text: "Your email has been verified.".into(),
    }
}

pub fn reset_email(link: &str, ttl_minutes: i64) -> Email {
    let html = format!(
        r#"<h1>Reset Your Password</h1>
<p>Click on the following link to reset your password:</p>
<a href="{link}">Reset Password</a>
<p>The link will expire in {ttl_minutes} minutes.</p>
<p>If you didn't request a password reset, please ignore this email.</p>"#
    );
    Email {
        subject: "Reset Password".into(),
        html,
        text: format!("Reset your password: {link}"),
    }
}

pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!("{}/reset-password/{}", frontend_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_email_contains_code() {
        let email = otp_email("482913", 5);
        assert!(email.html.contains("482913"));
        assert!(email.text.contains("482913"));
        assert!(email.html.contains("5 minutes"));
    }

    #[test]
    fn reset_link_has_single_slash() {
        assert_eq!(
            reset_link("http://localhost:5173/", "abc"),
            "http://localhost:5173/reset-password/abc"
        );
    }
}
