//! One-shot loopback listener for the OAuth redirect
//!
//! Binds the host/port of the configured `redirect_uri`, serves its path, and
//! resolves with the first callback's query parameters.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use axum::Router;
use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error};
use url::Url;

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

type CallbackResult = std::result::Result<CallbackParams, String>;

pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Bind the address named by `redirect_uri`. Only `http` loopback URIs
    /// are accepted.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .with_context(|| format!("invalid redirect_uri {redirect_uri}"))?;
        if url.scheme() != "http" {
            bail!("redirect_uri must use http for a local callback, got {redirect_uri}");
        }
        let host = match url.host_str() {
            Some("localhost") => "127.0.0.1",
            Some(host @ ("127.0.0.1" | "[::1]")) => host,
            _ => bail!("redirect_uri must point at localhost, got {redirect_uri}"),
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind callback listener on {addr}"))?;

        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the first callback arrives or `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams> {
        let (tx, rx) = oneshot::channel::<CallbackResult>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let handler = move |Query(params): Query<HashMap<String, String>>| {
            let tx = tx.clone();
            async move {
                let outcome = parse_callback(params);
                let page = match &outcome {
                    Ok(_) => SUCCESS_HTML,
                    Err(_) => FAILURE_HTML,
                };
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(outcome);
                }
                Html(page)
            }
        };

        let app = Router::new().route(&self.path, get(handler));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %e, "callback listener failed");
            }
        });

        let received = tokio::time::timeout(timeout, rx).await;
        let _ = shutdown_tx.send(());
        let _ = server.await;

        let outcome = received
            .map_err(|_| anyhow!("timed out after {}s waiting for the authorization callback", timeout.as_secs()))?
            .map_err(|_| anyhow!("callback listener closed unexpectedly"))?;
        debug!("authorization callback received");
        outcome.map_err(|e| anyhow!(e))
    }
}

fn parse_callback(mut params: HashMap<String, String>) -> CallbackResult {
    if let Some(error) = params.remove("error") {
        return Err(match params.remove("error_description") {
            Some(description) => format!("authorization denied: {error}: {description}"),
            None => format!("authorization denied: {error}"),
        });
    }
    let code = params
        .remove("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| "callback is missing the code parameter".to_string())?;
    Ok(CallbackParams {
        code,
        state: params.remove("state"),
    })
}

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization complete</title></head>
<body>
    <h1>Authorization complete</h1>
    <p>You can close this window and return to your terminal.</p>
</body>
</html>"#;

const FAILURE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization failed</title></head>
<body>
    <h1>Authorization failed</h1>
    <p>Check your terminal for details.</p>
</body>
</html>"#;
