//! Timesheet CLI
//!
//! Small command-line driver for the Timesheet SDK:
//! 1. Generates PKCE pairs and authorization URLs
//! 2. Runs the browser login flow against a loopback callback
//! 3. Discovers OAuth metadata for an issuer
//! 4. Sends authenticated GETs through `ApiClient`
//!
//! Command output goes to stdout as JSON; logs go to stderr.

mod callback;
mod config;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timesheet_auth::{
    AuthorizationUrlParams, CodeChallengeMethod, DiscoveryOptions, OAuth2Auth, OAuth2CodeParams,
    OAuth21Auth, OAuth21CodeParams, OAuthContext, OAuthEndpoints, discover_oauth,
};
use timesheet_client::ApiClient;

use crate::callback::CallbackListener;
use crate::config::{AuthMethod, Config, LogFormat};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

const USAGE: &str = "usage: timesheet [--config PATH] <command>

commands:
  pkce [plain|S256]           generate a PKCE verifier/challenge pair
  authorize-url [--state S]   print the authorization URL for the configured client
  login                       run the browser login flow and print the tokens
  discover <issuer>           fetch OAuth metadata for an issuer
  get <path>                  send an authenticated GET and print the JSON body";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Pkce(CodeChallengeMethod),
    AuthorizeUrl { state: Option<String> },
    Login,
    Discover(String),
    Get(String),
}

/// Arguments after the program name: optional `--config PATH`, then the command.
#[derive(Debug, PartialEq, Eq)]
struct Args {
    config_path: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut rest: Vec<&str> = args.iter().map(String::as_str).collect();

    let config_path = match rest.iter().position(|a| *a == "--config") {
        Some(i) => {
            let path = rest
                .get(i + 1)
                .map(|s| s.to_string())
                .context("--config needs a path")?;
            rest.drain(i..=i + 1);
            Some(path)
        }
        None => None,
    };

    let command = match rest.as_slice() {
        ["pkce"] => Command::Pkce(CodeChallengeMethod::S256),
        ["pkce", method] => Command::Pkce(method.parse()?),
        ["authorize-url"] => Command::AuthorizeUrl { state: None },
        ["authorize-url", "--state", state] => Command::AuthorizeUrl {
            state: Some(state.to_string()),
        },
        ["login"] => Command::Login,
        ["discover", issuer] => Command::Discover(issuer.to_string()),
        ["get", path] => Command::Get(path.to_string()),
        _ => bail!("{USAGE}"),
    };

    Ok(Args {
        config_path,
        command,
    })
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&argv)?;

    // `pkce` and `discover` need no configuration
    match &args.command {
        Command::Pkce(method) => {
            init_tracing(LogFormat::Text);
            let pair = OAuth21Auth::generate_pkce(*method)?;
            return print_json(&serde_json::to_value(pair)?);
        }
        Command::Discover(issuer) => {
            init_tracing(LogFormat::Text);
            info!(issuer = %issuer, "discovering OAuth metadata");
            let result = discover_oauth(issuer, Some(DiscoveryOptions::default()), None)
                .await
                .with_context(|| format!("discovery failed for {issuer}"))?;
            return print_json(&serde_json::to_value(result)?);
        }
        _ => {}
    }

    let config_path = Config::resolve_path(args.config_path.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    init_tracing(config.api.log_format);

    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        method = ?config.auth.method,
        "configuration loaded"
    );

    let ctx = OAuthContext::default().with_endpoints(endpoints(&config).await?);

    match args.command {
        Command::AuthorizeUrl { state } => authorize_url(&config, &ctx, state),
        Command::Login => login(&config, &ctx).await,
        Command::Get(path) => get(&config, &ctx, &path).await,
        Command::Pkce(_) | Command::Discover(_) => Ok(()),
    }
}

/// Fixed service endpoints, or the issuer's discovered ones when configured.
async fn endpoints(config: &Config) -> Result<OAuthEndpoints> {
    let Some(issuer) = config.auth.issuer.as_deref() else {
        return Ok(OAuthEndpoints::default());
    };
    let discovered = discover_oauth(issuer, None, None)
        .await
        .with_context(|| format!("discovery failed for {issuer}"))?;
    if config.auth.method == AuthMethod::OAuth21
        && !discovered.supports_pkce(CodeChallengeMethod::S256)
    {
        warn!(issuer = %issuer, "issuer does not advertise S256 PKCE support");
    }
    Ok(discovered.endpoints())
}

fn authorize_url(config: &Config, ctx: &OAuthContext, state: Option<String>) -> Result<()> {
    let (client_id, redirect_uri) = config.authorization_client()?;
    match config.auth.method {
        AuthMethod::OAuth2 => {
            let url = OAuth2Auth::build_authorization_url(
                &ctx.endpoints,
                client_id,
                redirect_uri,
                state.as_deref(),
            )?;
            print_json(&json!({ "authorization_url": url }))
        }
        AuthMethod::OAuth21 => {
            let pkce = OAuth21Auth::generate_pkce(CodeChallengeMethod::S256)?;
            let params = AuthorizationUrlParams {
                state,
                scope: config.auth.scope.clone(),
                resource: config.auth.resource.clone(),
                ..AuthorizationUrlParams::new(client_id, redirect_uri, &pkce)
            };
            let url = OAuth21Auth::build_authorization_url(&ctx.endpoints, &params)?;
            print_json(&json!({
                "authorization_url": url,
                "code_verifier": pkce.code_verifier,
            }))
        }
        AuthMethod::ApiKey => bail!("authorize-url needs auth.method = \"oauth2\" or \"oauth21\""),
    }
}

async fn login(config: &Config, ctx: &OAuthContext) -> Result<()> {
    let (client_id, redirect_uri) = config.authorization_client()?;
    let state = uuid::Uuid::new_v4().simple().to_string();
    let listener = CallbackListener::bind(redirect_uri).await?;

    let tokens = match config.auth.method {
        AuthMethod::OAuth2 => {
            let url = OAuth2Auth::build_authorization_url(
                &ctx.endpoints,
                client_id,
                redirect_uri,
                Some(&state),
            )?;
            eprintln!("Open this URL to authorize:\n\n  {url}\n");
            let code = await_code(listener, &state).await?;
            let auth = OAuth2Auth::from_authorization_code(
                ctx,
                OAuth2CodeParams {
                    code,
                    redirect_uri: redirect_uri.to_string(),
                    client_id: client_id.to_string(),
                    client_secret: config.auth.client_secret.clone(),
                },
            )
            .await?;
            token_json(auth.access_token(), auth.refresh_token(), auth.token_expiry())
        }
        AuthMethod::OAuth21 => {
            let pkce = OAuth21Auth::generate_pkce(CodeChallengeMethod::S256)?;
            let params = AuthorizationUrlParams {
                state: Some(state.clone()),
                scope: config.auth.scope.clone(),
                resource: config.auth.resource.clone(),
                ..AuthorizationUrlParams::new(client_id, redirect_uri, &pkce)
            };
            let url = OAuth21Auth::build_authorization_url(&ctx.endpoints, &params)?;
            eprintln!("Open this URL to authorize:\n\n  {url}\n");
            let code = await_code(listener, &state).await?;
            let auth = OAuth21Auth::from_authorization_code(
                ctx,
                OAuth21CodeParams {
                    code,
                    redirect_uri: redirect_uri.to_string(),
                    client_id: client_id.to_string(),
                    client_secret: config.auth.client_secret.clone(),
                    code_verifier: pkce.code_verifier,
                    resource: config.auth.resource.clone(),
                },
            )
            .await?;
            token_json(auth.access_token(), auth.refresh_token(), auth.token_expiry())
        }
        AuthMethod::ApiKey => bail!("login needs auth.method = \"oauth2\" or \"oauth21\""),
    };

    info!("login complete");
    print_json(&tokens)
}

async fn await_code(listener: CallbackListener, expected_state: &str) -> Result<String> {
    let params = listener.wait(LOGIN_TIMEOUT).await?;
    if params.state.as_deref() != Some(expected_state) {
        bail!("callback state does not match the authorization request");
    }
    Ok(params.code)
}

fn token_json(
    access_token: Option<String>,
    refresh_token: Option<String>,
    expiry: Option<std::time::SystemTime>,
) -> serde_json::Value {
    let expires_at = expiry
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "expires_at": expires_at,
    })
}

async fn get(config: &Config, ctx: &OAuthContext, path: &str) -> Result<()> {
    let client = ApiClient::builder()
        .base_url(config.api.base_url.as_str())
        .shared_authentication(config.authentication(ctx)?)
        .retry_config(config.retry.clone())
        .timeout(config.timeout())
        .build()?;

    let body: serde_json::Value = client
        .get(path)
        .await
        .with_context(|| format!("GET {path} failed"))?;
    print_json(&body)
}
