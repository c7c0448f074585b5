//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::CookieSettings;
use crate::db::{Database, NewUser, Role, StoreError, UserDirectory};
use crate::jwt::{
    ACCESS_TOKEN_DURATION_SECS, DEFAULT_ISSUER, MAX_TOKEN_DURATION_SECS,
    REFRESH_TOKEN_DURATION_SECS, TokenLifetimes,
};
use crate::keys::{KeyMaterial, MIN_REFRESH_SECRET_LENGTH, generate_rsa_pem};
use crate::password::PasswordHasher;
use crate::rate_limit::RateLimits;
use clap::Parser;
use tracing::{error, info};

const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
const REFRESH_SECRET_ENV: &str = "REFRESH_TOKEN_SECRET";
const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "warden",
    about = "Credential and access control service for multi-tenant applications"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5501")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "warden.db")]
    pub database: String,

    /// Path to the PEM encoded RSA private key. Prefer the PRIVATE_KEY env var
    #[arg(long)]
    pub private_key_file: Option<String>,

    /// Path to the PEM encoded RSA public key. Derived from the private key if omitted
    #[arg(long)]
    pub public_key_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the REFRESH_TOKEN_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Issuer claim put in and required of every token
    #[arg(long, default_value = DEFAULT_ISSUER)]
    pub issuer: String,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = ACCESS_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(
        long,
        default_value_t = REFRESH_TOKEN_DURATION_SECS,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_DURATION_SECS)
    )]
    pub refresh_ttl_secs: u64,

    /// Domain attribute for auth cookies (host-only if omitted)
    #[arg(long)]
    pub cookie_domain: Option<String>,

    /// Set the Secure flag on auth cookies (use behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Use the first X-Forwarded-For entry as client IP for rate limiting. Only behind a trusted proxy
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Login attempts allowed per client IP in a burst (refills one per second)
    #[arg(long, default_value_t = RateLimits::default().login_burst)]
    pub login_burst: u32,

    /// Registrations allowed per client IP per minute
    #[arg(long, default_value_t = RateLimits::default().register_per_minute)]
    pub register_per_minute: u32,

    /// Create an admin user with this email on startup. Password from ADMIN_PASSWORD env var
    #[arg(long)]
    pub create_admin: Option<String>,

    /// Print a freshly generated RSA key pair and exit
    #[arg(long)]
    pub print_keypair: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Read a secret from an environment variable, else from a file.
///
/// The environment variable is cleared after reading.
fn load_secret(env_name: &str, file: Option<&str>) -> Option<String> {
    if let Ok(secret) = std::env::var(env_name) {
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_name) };
        return Some(secret);
    }

    let path = file?;
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            error!(path = %path, error = %e, "Failed to read secret file");
            None
        }
    }
}

/// Load the signing keys and refresh secret.
/// Returns None and logs an error if anything is missing or invalid.
pub fn load_key_material(args: &Args) -> Option<KeyMaterial> {
    let Some(private_pem) = load_secret(PRIVATE_KEY_ENV, args.private_key_file.as_deref()) else {
        error!(
            "Private key is required. Set PRIVATE_KEY environment variable (recommended) or use --private-key-file"
        );
        return None;
    };

    let public_pem = match &args.public_key_file {
        Some(path) => match std::fs::read(path) {
            Ok(pem) => Some(pem),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read public key file");
                return None;
            }
        },
        None => None,
    };

    let Some(refresh_secret) =
        load_secret(REFRESH_SECRET_ENV, args.refresh_secret_file.as_deref())
    else {
        error!(
            "Refresh token secret is required. Set REFRESH_TOKEN_SECRET environment variable (recommended) or use --refresh-secret-file"
        );
        return None;
    };
    let refresh_secret = refresh_secret.trim();

    if refresh_secret.len() < MIN_REFRESH_SECRET_LENGTH {
        error!(
            "Refresh token secret is shorter than {} characters. Use a longer secret",
            MIN_REFRESH_SECRET_LENGTH
        );
        return None;
    }

    match KeyMaterial::from_pem(
        private_pem.trim().as_bytes(),
        public_pem.as_deref(),
        refresh_secret.as_bytes(),
    ) {
        Ok(keys) => Some(keys),
        Err(e) => {
            error!(error = %e, "Invalid key material");
            None
        }
    }
}

/// Handle the --print-keypair flag.
pub fn print_keypair() -> bool {
    match generate_rsa_pem(2048) {
        Ok((private_pem, public_pem)) => {
            println!("{}", String::from_utf8_lossy(&private_pem));
            println!("{}", String::from_utf8_lossy(&public_pem));
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to generate key pair");
            false
        }
    }
}

/// Handle the --create-admin flag: create an admin unless the email is taken.
pub async fn handle_create_admin(db: &Database, email: &str) -> bool {
    let Some(password) = load_secret(ADMIN_PASSWORD_ENV, None) else {
        error!("ADMIN_PASSWORD environment variable is required with --create-admin");
        return false;
    };

    let password_hash = match PasswordHasher::default().hash(&password).await {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash admin password");
            return false;
        }
    };

    let admin = NewUser {
        first_name: String::new(),
        last_name: String::new(),
        email: email.trim().to_string(),
        password_hash,
        role: Role::Admin,
        tenant_id: None,
    };

    match db.users().create_user(&admin).await {
        Ok(user) => {
            info!(user_id = user.id, "Admin user created");
            true
        }
        Err(StoreError::DuplicateEmail) => {
            info!("Admin email already registered, skipping");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, keys: KeyMaterial) -> ServerConfig {
    ServerConfig {
        db,
        keys,
        issuer: args.issuer.clone(),
        lifetimes: TokenLifetimes {
            access_secs: args.access_ttl_secs,
            refresh_secs: args.refresh_ttl_secs,
        },
        cookies: CookieSettings {
            domain: args.cookie_domain.clone(),
            secure: args.secure_cookies,
        },
        rate_limits: RateLimits {
            login_burst: args.login_burst,
            register_per_minute: args.register_per_minute,
        },
        trust_forwarded_for: args.trust_forwarded_for,
        passwords: PasswordHasher::default(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
