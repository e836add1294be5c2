//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Stripe secret API key (optional).
    pub stripe_secret_key: Option<String>,

    /// Stripe webhook signing secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL (default: `<https://api.stripe.com/v1>`).
    pub stripe_api_base: String,

    /// Supabase project URL (optional; in-memory storage without it).
    pub supabase_url: Option<String>,

    /// Supabase anonymous key, used for remote session checks.
    pub supabase_anon_key: Option<String>,

    /// Supabase service-role key, used for table access.
    pub supabase_service_role_key: Option<String>,

    /// Supabase JWT secret. When set, bearer tokens are verified locally.
    pub supabase_jwt_secret: Option<String>,

    /// Public application URL for checkout and portal redirects.
    pub app_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Maximum age of a webhook signature timestamp, in seconds.
    pub webhook_tolerance_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    #[serde(alias = "api_key")]
    secret_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// Supabase secrets file structure.
#[derive(Debug, Deserialize)]
struct SupabaseSecrets {
    url: String,
    #[serde(default)]
    anon_key: Option<String>,
    service_role_key: String,
    #[serde(default)]
    jwt_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let (stripe_secret_key, stripe_webhook_secret) = load_stripe_secrets();
        let supabase = load_supabase_secrets();

        Self {
            listen_addr: env_var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_base: env_var("STRIPE_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com/v1".into()),
            supabase_url: supabase.url,
            supabase_anon_key: supabase.anon_key,
            supabase_service_role_key: supabase.service_role_key,
            supabase_jwt_secret: supabase.jwt_secret,
            app_url: env_any(&["APP_URL", "NEXT_PUBLIC_APP_URL"])
                .unwrap_or_else(|| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            cors_origins: env_var("CORS_ORIGINS")
                .unwrap_or_else(|| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_var("MAX_BODY_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: env_var("REQUEST_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            webhook_tolerance_seconds: env_var("WEBHOOK_TOLERANCE_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }

    /// Whether table storage is configured.
    #[must_use]
    pub fn has_supabase(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_service_role_key.is_some()
    }

    /// Where checkout sends the customer after paying.
    #[must_use]
    pub fn checkout_success_url(&self) -> String {
        format!("{}/dashboard?payment=success", self.app_url)
    }

    /// Where checkout sends the customer after backing out.
    #[must_use]
    pub fn checkout_cancel_url(&self) -> String {
        format!("{}/pricing?payment=cancelled", self.app_url)
    }

    /// Where the billing portal returns the customer.
    #[must_use]
    pub fn portal_return_url(&self) -> String {
        format!("{}/dashboard/billing", self.app_url)
    }
}

/// Non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// First non-empty variable among `names`.
fn env_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env_var(name))
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.secret_key), secrets.webhook_secret);
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        env_var("STRIPE_SECRET_KEY"),
        env_var("STRIPE_WEBHOOK_SECRET"),
    )
}

#[derive(Debug, Default)]
struct SupabaseSettings {
    url: Option<String>,
    anon_key: Option<String>,
    service_role_key: Option<String>,
    jwt_secret: Option<String>,
}

/// Load Supabase secrets from file or environment.
fn load_supabase_secrets() -> SupabaseSettings {
    let secret_paths = [".secrets/supabase.json", "../.secrets/supabase.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<SupabaseSecrets>(path) {
            tracing::info!(path = %path, "Loaded Supabase secrets from file");
            return SupabaseSettings {
                url: Some(secrets.url),
                anon_key: secrets.anon_key,
                service_role_key: Some(secrets.service_role_key),
                jwt_secret: secrets.jwt_secret,
            };
        }
    }

    tracing::debug!("Supabase secrets file not found, using environment variables");
    SupabaseSettings {
        url: env_any(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]),
        anon_key: env_any(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]),
        service_role_key: env_var("SUPABASE_SERVICE_ROLE_KEY"),
        jwt_secret: env_var("SUPABASE_JWT_SECRET"),
    }
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: "https://api.stripe.com/v1".into(),
            supabase_url: None,
            supabase_anon_key: None,
            supabase_service_role_key: None,
            supabase_jwt_secret: None,
            app_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            webhook_tolerance_seconds: 300,
        }
    }
}
