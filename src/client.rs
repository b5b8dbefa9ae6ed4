//! Authenticated HTTP client for the Plurk API.
//!
//! [`authenticate`] runs the three-legged OAuth1 handshake once and yields a
//! [`Session`]; every later call is a signed blocking GET returning JSON.
//! Failures are not retried: a non-2xx status becomes [`PlurkError::Http`]
//! and an undecodable body becomes [`PlurkError::MalformedPayload`].

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::config::ApiConfig;
use crate::date_parser::format_offset;
use crate::error::{PlurkError, Result};
use crate::model::{OwnProfile, ReplyPage, TimelinePage};
use crate::oauth::{ConsumerCredentials, OAuthParams, OAuthSigner, TokenPair, VerifierPrompt};
use crate::sync::PlurkApi;

pub const REQUEST_TOKEN_PATH: &str = "/OAuth/request_token";
pub const AUTHORIZE_PATH: &str = "/OAuth/authorize";
pub const ACCESS_TOKEN_PATH: &str = "/OAuth/access_token";
pub const TIMELINE_PATH: &str = "/APP/Timeline/getPlurks";
pub const RESPONSES_PATH: &str = "/APP/Responses/get";
pub const OWN_PROFILE_PATH: &str = "/APP/Profile/getOwnProfile";

/// Error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 512;

/// An authenticated API session.
pub struct Session {
    http: Client,
    base_url: Url,
    consumer: ConsumerCredentials,
    access: TokenPair,
    page_size: u32,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("consumer", &self.consumer)
            .field("access", &self.access)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Run the OAuth1 handshake and return a ready session.
///
/// 1. request token with `oauth_callback=oob`
/// 2. authorization URL handed to `prompt`, which returns the verifier
/// 3. access token exchange with `oauth_verifier`
///
/// # Errors
/// Returns [`PlurkError::AuthFailed`] when a token endpoint rejects the
/// request or answers without tokens, and [`PlurkError::Transport`] on
/// network failure.
pub fn authenticate(
    api: &ApiConfig,
    consumer: ConsumerCredentials,
    prompt: &mut dyn VerifierPrompt,
) -> Result<Session> {
    let http = build_http_client(api)?;
    let base_url = parse_base_url(&api.base_url)?;

    let request_token = fetch_token(
        &http,
        &base_url,
        "request token",
        REQUEST_TOKEN_PATH,
        &OAuthSigner::new(&consumer, None),
        &OAuthParams::fresh()?.with_callback("oob"),
    )?;
    debug!(token = %request_token.token, "Obtained request token");

    let mut authorize_url = endpoint(&base_url, AUTHORIZE_PATH)?;
    authorize_url
        .query_pairs_mut()
        .append_pair("oauth_token", &request_token.token);

    let verifier = prompt.verifier(&authorize_url)?;
    let verifier = verifier.trim();
    if verifier.is_empty() {
        return Err(PlurkError::auth_failed("authorize", "empty verifier"));
    }

    let access = fetch_token(
        &http,
        &base_url,
        "access token",
        ACCESS_TOKEN_PATH,
        &OAuthSigner::new(&consumer, Some(&request_token)),
        &OAuthParams::fresh()?.with_verifier(verifier),
    )?;
    info!("Authorized against {}", base_url);

    Ok(Session {
        http,
        base_url,
        consumer,
        access,
        page_size: api.page_size,
    })
}

impl Session {
    /// Build a session from an access token obtained earlier.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn with_access_token(
        api: &ApiConfig,
        consumer: ConsumerCredentials,
        access: TokenPair,
    ) -> Result<Self> {
        Ok(Self {
            http: build_http_client(api)?,
            base_url: parse_base_url(&api.base_url)?,
            consumer,
            access,
            page_size: api.page_size,
        })
    }

    #[must_use]
    pub const fn access_token(&self) -> &TokenPair {
        &self.access
    }

    /// One page of the timeline, strictly older than `before` when given.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or a payload
    /// that does not decode (including unparseable `posted` values).
    pub fn fetch_timeline_page(&self, before: Option<f64>) -> Result<TimelinePage> {
        let mut query = vec![
            ("minimal_data", "1".to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(cursor) = before {
            query.push(("offset", format_offset(cursor)?));
        }
        self.get_json(TIMELINE_PATH, &query)
    }

    /// Every response of one plurk. The endpoint is not paginated.
    ///
    /// # Errors
    /// Same failure modes as [`Self::fetch_timeline_page`].
    pub fn fetch_replies(&self, plurk_id: i64) -> Result<ReplyPage> {
        self.get_json(
            RESPONSES_PATH,
            &[
                ("minimal_data", "1".to_string()),
                ("plurk_id", plurk_id.to_string()),
            ],
        )
    }

    /// The authenticated user's profile. Used to validate the session.
    ///
    /// # Errors
    /// Same failure modes as [`Self::fetch_timeline_page`].
    pub fn fetch_own_profile(&self) -> Result<OwnProfile> {
        self.get_json(OWN_PROFILE_PATH, &[])
    }

    /// Signed GET of `path` with `query`, decoded as JSON.
    ///
    /// # Errors
    /// Returns [`PlurkError::Http`] for non-2xx responses and
    /// [`PlurkError::MalformedPayload`] when the body does not decode as `T`.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut url = endpoint(&self.base_url, path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        let header = OAuthSigner::new(&self.consumer, Some(&self.access)).authorization_header(
            "GET",
            &url,
            &OAuthParams::fresh()?,
        );

        debug!(endpoint = path, url = %url, "GET");
        let response = self.http.get(url).header(AUTHORIZATION, header).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(PlurkError::Http {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| PlurkError::malformed(path, e.to_string()))
    }
}

impl PlurkApi for Session {
    fn timeline_page(&self, before: Option<f64>) -> Result<TimelinePage> {
        self.fetch_timeline_page(before)
    }

    fn replies(&self, plurk_id: i64) -> Result<ReplyPage> {
        self.fetch_replies(plurk_id)
    }
}

fn build_http_client(api: &ApiConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(api.timeout_secs))
        .user_agent(api.user_agent.clone())
        .build()?)
}

fn parse_base_url(raw: &str) -> Result<Url> {
    Url::parse(raw)
        .map_err(|e| PlurkError::invalid_argument(format!("invalid API base URL '{raw}': {e}")))
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| PlurkError::invalid_argument(format!("invalid endpoint '{path}': {e}")))
}

fn fetch_token(
    http: &Client,
    base: &Url,
    stage: &'static str,
    path: &str,
    signer: &OAuthSigner<'_>,
    params: &OAuthParams,
) -> Result<TokenPair> {
    let url = endpoint(base, path)?;
    let header = signer.authorization_header("GET", &url, params);

    let response = http.get(url).header(AUTHORIZATION, header).send()?;
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(PlurkError::auth_failed(
            stage,
            format!("HTTP {}: {}", status.as_u16(), truncate_body(&body)),
        ));
    }
    TokenPair::from_form(stage, &body)
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
