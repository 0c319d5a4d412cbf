use crate::error::{authorization_error, RelayResult};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};
use tracing::{debug, warn};
use url::Url;

/// Code and state delivered by the browser redirect
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// What a single request to the loopback listener amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The redirect carried an authorization code
    Code(CallbackParams),
    /// Google redirected back with an error (e.g. the user denied access)
    Denied(String),
    /// Unrelated request such as `/favicon.ico`
    Ignored,
}

/// Interpret the request target of an incoming callback request
pub fn parse_callback(target: &str) -> CallbackOutcome {
    let url = match Url::parse("http://localhost").and_then(|base| base.join(target)) {
        Ok(url) => url,
        Err(_) => return CallbackOutcome::Ignored,
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    match (code, error) {
        (_, Some(error)) => CallbackOutcome::Denied(error),
        (Some(code), None) if !code.is_empty() => CallbackOutcome::Code(CallbackParams { code, state }),
        _ => CallbackOutcome::Ignored,
    }
}

/// Loopback HTTP listener receiving the OAuth redirect
pub struct CallbackListener {
    server: Server,
    port: u16,
}

impl CallbackListener {
    /// Bind on 127.0.0.1; fails when the port is already taken
    pub fn bind(port: u16) -> RelayResult<Self> {
        let server = Server::http(("127.0.0.1", port)).map_err(|e| {
            authorization_error(&format!(
                "Failed to start callback listener on port {}: {}",
                port, e
            ))
        })?;

        debug!("Callback listener bound on port {}", port);
        Ok(Self { server, port })
    }

    /// Block until the redirect arrives or the timeout passes
    pub fn wait(self, timeout: Duration) -> RelayResult<CallbackParams> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out(timeout));
            }

            let request = match self.server.recv_timeout(remaining) {
                Ok(Some(request)) => request,
                Ok(None) => return Err(self.timed_out(timeout)),
                Err(e) => {
                    return Err(authorization_error(&format!(
                        "Callback listener failed: {}",
                        e
                    )))
                }
            };

            match parse_callback(request.url()) {
                CallbackOutcome::Code(params) => {
                    let response = Response::from_string(
                        "Authorization successful! You can close this window.",
                    );
                    if let Err(e) = request.respond(response) {
                        warn!("Failed to answer the authorization callback: {}", e);
                    }
                    return Ok(params);
                }
                CallbackOutcome::Denied(error) => {
                    let response = Response::from_string(
                        "Authorization failed. You can close this window.",
                    )
                    .with_status_code(400);
                    if let Err(e) = request.respond(response) {
                        warn!("Failed to answer the authorization callback: {}", e);
                    }
                    return Err(authorization_error(&format!(
                        "Authorization denied: {}",
                        error
                    )));
                }
                CallbackOutcome::Ignored => {
                    debug!("Ignoring request to {} on callback listener", request.url());
                    let _ = request.respond(Response::empty(404));
                }
            }
        }
    }

    fn timed_out(&self, timeout: Duration) -> crate::error::Error {
        authorization_error(&format!(
            "No authorization callback on port {} within {} seconds",
            self.port,
            timeout.as_secs()
        ))
    }
}
