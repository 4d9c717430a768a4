//! Command-line OAuth consumer for exercising a provider by hand
//!
//! Walks the three-legged handshake against a running provider:
//! requests temporary credentials, waits for the verifier the approval
//! step produced, exchanges it for token credentials and makes one signed
//! call to `/oauth/verify`.

use anyhow::{Context, Result, bail};
use clap::Parser;
use oauth1::OAuthRequest;
use oauth1::constants::HMAC_SHA1;
use oauth1::encoding::encode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oauth-test-consumer", version, about = "Run an OAuth 1.0a handshake against a provider")]
struct Cli {
    /// Public base URL of the provider
    #[arg(long, env = "OAUTH_BASE_URL", default_value = "http://127.0.0.1:8080")]
    base_url: String,

    #[arg(long, env = "OAUTH_CONSUMER_KEY")]
    consumer_key: String,

    /// Consumer secret as issued to the client
    #[arg(long, env = "OAUTH_CONSUMER_SECRET", hide_env_values = true)]
    consumer_secret: String,
}

struct Client {
    http: reqwest::Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
}

impl Client {
    /// Signed GET of `path_and_query`, parsed as JSON.
    async fn signed_get(
        &self,
        path_and_query: &str,
        token: Option<(&str, &str)>,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{path_and_query}", self.base_url);
        let mut request = OAuthRequest::for_client(
            "GET",
            &url,
            &self.consumer_key,
            token.map(|(key, _)| key),
            HMAC_SHA1,
        )
        .with_context(|| format!("cannot build a request for {url}"))?;
        request
            .sign_hmac_sha1(&self.consumer_secret, token.map(|(_, secret)| secret))
            .context("failed to sign request")?;
        debug!(url = %url, "sending signed request");

        let response = self
            .http
            .get(request.to_url())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        let body = response.text().await.context("failed to read response body")?;
        if !status.is_success() {
            bail!("{url} returned {status}: {body}");
        }
        serde_json::from_str(&body).with_context(|| format!("{url} returned invalid JSON: {body}"))
    }
}

fn field<'a>(json: &'a serde_json::Value, name: &str) -> Result<&'a str> {
    json[name]
        .as_str()
        .with_context(|| format!("response has no {name}: {json}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client {
        http: reqwest::Client::new(),
        base_url: cli.base_url.trim_end_matches('/').to_owned(),
        consumer_key: cli.consumer_key,
        consumer_secret: cli.consumer_secret,
    };

    let temporary = client
        .signed_get("/oauth/initiate?format=json&oauth_callback=oob", None)
        .await?;
    let request_key = field(&temporary, "key")?;
    let request_secret = field(&temporary, "secret")?;

    println!("Request token: {request_key}");
    println!(
        "Approve it through the admin listener, for example:\n  \
         curl -X POST http://127.0.0.1:9090/admin/authorize -H 'content-type: application/json' \
         -d '{{\"consumer_key\":\"{}\",\"oauth_token\":\"{request_key}\",\"user_id\":1}}'",
        client.consumer_key
    );
    println!("Then paste the oauth_verifier from the returned callback URL:");

    let mut verifier = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut verifier)
        .await
        .context("failed to read verifier from stdin")?;
    let verifier = verifier.trim();
    if verifier.is_empty() {
        bail!("no verifier entered");
    }

    let token = client
        .signed_get(
            &format!(
                "/oauth/token?format=json&oauth_verifier={}",
                encode(verifier)
            ),
            Some((request_key, request_secret)),
        )
        .await?;
    let access_key = field(&token, "key")?;
    let access_secret = field(&token, "secret")?;
    println!("Access token: {access_key}");

    let caller = client
        .signed_get("/oauth/verify", Some((access_key, access_secret)))
        .await?;
    println!("{}", serde_json::to_string_pretty(&caller)?);
    Ok(())
}
