//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1).
//!
//! Plurk's API only speaks OAuth1, so every request carries an
//! `Authorization: OAuth ...` header signed with the consumer secret and,
//! after the handshake, the access token secret. The handshake itself lives
//! in [`crate::client::authenticate`]; this module holds the credential
//! types, the signer and the verifier prompt seam.

use std::io::{BufRead, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use url::{Position, Url};

use crate::error::{PlurkError, Result};

/// RFC 3986 unreserved characters stay literal, everything else is encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const CONSUMER_KEY_VAR: &str = "CONSUMER_KEY";
pub const CONSUMER_SECRET_VAR: &str = "CONSUMER_SECRET";

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// Application credentials issued by Plurk.
#[derive(Clone)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl ConsumerCredentials {
    /// Read `CONSUMER_KEY` / `CONSUMER_SECRET` from the process environment.
    ///
    /// # Errors
    /// Returns [`PlurkError::MissingCredential`] naming the first absent var.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Self::from_env`] with an injectable lookup.
    ///
    /// # Errors
    /// Returns [`PlurkError::MissingCredential`] for absent or blank values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fetch = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(PlurkError::MissingCredential { var })
        };
        Ok(Self {
            key: fetch(CONSUMER_KEY_VAR)?,
            secret: fetch(CONSUMER_SECRET_VAR)?,
        })
    }
}

/// A request token or access token with its secret.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenPair {
    /// Parse a form-encoded token endpoint response.
    ///
    /// # Errors
    /// Returns [`PlurkError::AuthFailed`] if either field is missing.
    pub fn from_form(stage: &'static str, body: &str) -> Result<Self> {
        let mut token = None;
        let mut secret = None;
        for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
            match key.as_ref() {
                "oauth_token" => token = Some(value.into_owned()),
                "oauth_token_secret" => secret = Some(value.into_owned()),
                _ => {}
            }
        }
        match (token, secret) {
            (Some(token), Some(secret)) => Ok(Self { token, secret }),
            _ => Err(PlurkError::auth_failed(
                stage,
                "response did not contain oauth_token and oauth_token_secret",
            )),
        }
    }
}

/// Supplies the verifier code for an authorization URL.
///
/// The interactive implementation prints the URL and reads a line from
/// stdin; tests and scripted runs plug in their own.
pub trait VerifierPrompt {
    /// Return the verifier the user received after visiting `authorization_url`.
    ///
    /// # Errors
    /// Returns an error if no verifier can be obtained.
    fn verifier(&mut self, authorization_url: &Url) -> Result<String>;
}

/// Prompts on stdout and reads the verifier from stdin.
#[derive(Debug, Default)]
pub struct StdinVerifier;

impl VerifierPrompt for StdinVerifier {
    fn verifier(&mut self, authorization_url: &Url) -> Result<String> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "Please go here and authorize: {authorization_url}")?;
        write!(stdout, "Enter the verification code provided by Plurk: ")?;
        stdout.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let code = line.trim();
        if code.is_empty() {
            return Err(PlurkError::auth_failed("authorize", "no verifier code entered"));
        }
        Ok(code.to_string())
    }
}

/// Per-request protocol parameters.
#[derive(Debug, Clone)]
pub struct OAuthParams {
    pub nonce: String,
    pub timestamp: i64,
    pub callback: Option<String>,
    pub verifier: Option<String>,
}

impl OAuthParams {
    /// Fresh random nonce and the current time.
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn fresh() -> Result<Self> {
        let mut bytes = [0u8; 16];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| PlurkError::auth_failed("sign", "system random generator failed"))?;
        let nonce = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Ok(Self::fixed(nonce, chrono::Utc::now().timestamp()))
    }

    /// Deterministic parameters, for reproducible signatures.
    #[must_use]
    pub const fn fixed(nonce: String, timestamp: i64) -> Self {
        Self {
            nonce,
            timestamp,
            callback: None,
            verifier: None,
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: impl Into<String>) -> Self {
        self.verifier = Some(verifier.into());
        self
    }
}

/// Signs requests for one consumer and, optionally, one token.
#[derive(Debug, Clone, Copy)]
pub struct OAuthSigner<'a> {
    consumer: &'a ConsumerCredentials,
    token: Option<&'a TokenPair>,
}

impl<'a> OAuthSigner<'a> {
    #[must_use]
    pub const fn new(consumer: &'a ConsumerCredentials, token: Option<&'a TokenPair>) -> Self {
        Self { consumer, token }
    }

    fn protocol_params(&self, params: &OAuthParams) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("oauth_consumer_key", self.consumer.key.clone()),
            ("oauth_nonce", params.nonce.clone()),
            ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp", params.timestamp.to_string()),
            ("oauth_version", OAUTH_VERSION.to_string()),
        ];
        if let Some(token) = self.token {
            out.push(("oauth_token", token.token.clone()));
        }
        if let Some(callback) = &params.callback {
            out.push(("oauth_callback", callback.clone()));
        }
        if let Some(verifier) = &params.verifier {
            out.push(("oauth_verifier", verifier.clone()));
        }
        out
    }

    /// The signature base string for `method` on `url` (query included).
    #[must_use]
    pub fn base_string(&self, method: &str, url: &Url, params: &OAuthParams) -> String {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (encode(&k), encode(&v)))
            .chain(
                self.protocol_params(params)
                    .into_iter()
                    .map(|(k, v)| (encode(k), encode(&v))),
            )
            .collect();
        pairs.sort();

        let normalized = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            encode(&url[..Position::AfterPath]),
            encode(&normalized)
        )
    }

    /// Base64 HMAC-SHA1 of the base string.
    #[must_use]
    pub fn signature(&self, method: &str, url: &Url, params: &OAuthParams) -> String {
        let token_secret = self.token.map_or("", |t| t.secret.as_str());
        let signing_key = format!("{}&{}", encode(&self.consumer.secret), encode(token_secret));
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
        let tag = hmac::sign(&key, self.base_string(method, url, params).as_bytes());
        BASE64.encode(tag.as_ref())
    }

    /// Full `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self, method: &str, url: &Url, params: &OAuthParams) -> String {
        let signature = self.signature(method, url, params);
        let mut fields = self.protocol_params(params);
        fields.push(("oauth_signature", signature));
        fields.sort_by(|a, b| a.0.cmp(b.0));

        let rendered = fields
            .iter()
            .map(|(k, v)| format!("{k}=\"{}\"", encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {rendered}")
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}
