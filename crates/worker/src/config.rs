use xbuddy_core::draw::DEFAULT_MAX_ATTEMPTS;
use xbuddy_events::{DispatcherConfig, EmailConfig};

/// Base URL of the participant-facing frontend.
pub const DEFAULT_FRONTEND_URL: &str = "https://xbuddy.smartxdev.com";

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local runs. Without `SMTP_HOST`,
/// notifications are written to the log instead of being sent.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Used to build each participant's page link.
    pub frontend_url: String,
    /// Attempt budget for the assignment engine.
    pub draw_max_attempts: u32,
    pub dispatcher: DispatcherConfig,
    /// `None` when SMTP is not configured.
    pub email: Option<EmailConfig>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default                        |
    /// |---------------------|--------------------------------|
    /// | `FRONTEND_URL`      | `https://xbuddy.smartxdev.com` |
    /// | `DRAW_MAX_ATTEMPTS` | `100`                          |
    ///
    /// Dispatcher and SMTP variables are documented on
    /// [`DispatcherConfig::from_env`] and [`EmailConfig::from_env`].
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let frontend_url = var("FRONTEND_URL")
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());

        let draw_max_attempts = var("DRAW_MAX_ATTEMPTS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        Self {
            frontend_url,
            draw_max_attempts,
            dispatcher: DispatcherConfig::from_vars(&var),
            email: EmailConfig::from_vars(&var),
        }
    }
}
