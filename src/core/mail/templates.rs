//! Plain-text bodies for the account lifecycle emails

const APP_NAME: &str = "Auth Flow";

/// Greeting used when the user gave no name
const DEFAULT_GREETING_NAME: &str = "there";

/// Rendered subject and body of one email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// Settings shared by every template
#[derive(Debug, Clone)]
pub struct MailTemplates {
    /// Base URL of the web client, used to build links
    pub frontend_url: Option<String>,
    pub verification_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

impl MailTemplates {
    pub fn new(
        frontend_url: Option<String>,
        verification_ttl_minutes: i64,
        reset_ttl_minutes: i64,
    ) -> Self {
        Self {
            frontend_url: frontend_url.map(|url| url.trim_end_matches('/').to_string()),
            verification_ttl_minutes,
            reset_ttl_minutes,
        }
    }

    fn link(&self, path: &str, token: &str) -> Option<String> {
        self.frontend_url
            .as_ref()
            .map(|base| format!("{base}/{path}?token={token}"))
    }

    /// Email carrying a 4-digit verification code
    pub fn verification(&self, token: &str, name: Option<&str>) -> EmailContent {
        let mut body = format!(
            "Hi {},\n\
            \n\
            Thanks for signing up to {APP_NAME}. Your verification code is:\n\
            \n\
            {token}\n\
            \n\
            This code will expire in {} minutes.\n",
            name.unwrap_or(DEFAULT_GREETING_NAME),
            self.verification_ttl_minutes,
        );

        if let Some(link) = self.link("verify-email", token) {
            body.push_str(&format!("\nYou can also verify by opening:\n{link}\n"));
        }

        body.push_str(&format!(
            "\nIf you did not create an account, you can ignore this email.\n\n{APP_NAME}"
        ));

        EmailContent {
            subject: "Verify your email".to_string(),
            body,
        }
    }

    /// Email carrying a password reset token
    pub fn reset_password(&self, token: &str, name: Option<&str>) -> EmailContent {
        let mut body = format!(
            "Hi {},\n\
            \n\
            A password reset was requested for your {APP_NAME} account.\n\
            Use the following token to choose a new password:\n\
            \n\
            {token}\n\
            \n\
            This token will expire in {} minutes.\n",
            name.unwrap_or(DEFAULT_GREETING_NAME),
            self.reset_ttl_minutes,
        );

        if let Some(link) = self.link("reset-password", token) {
            body.push_str(&format!("\nOr open:\n{link}\n"));
        }

        body.push_str(&format!(
            "\nIf you did not request this reset, ignore this email. Your password \
            stays unchanged.\n\n{APP_NAME}"
        ));

        EmailContent {
            subject: "Reset your password".to_string(),
            body,
        }
    }
}
