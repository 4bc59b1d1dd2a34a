// ── Host transport ──
//
// Newline-delimited JSON over a loopback TCP socket, announced through a
// stdout handshake line. One request at a time per connection; the host
// guarantees no concurrent invocations on the same state. Configure is
// the single lifecycle boundary -- every other operation requires it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleetform_aws::Session;
use fleetform_config::ProviderConfig;
use fleetform_core::{Diagnostic, Diagnostics, OpError, Provider};

pub const HANDSHAKE_PREFIX: &str = "FLEETFORM_PROVIDER";
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Op {
    Configure,
    Validate,
    Create,
    Read,
    Update,
    Delete,
    Import,
    Stop,
}

#[derive(Debug, Deserialize)]
struct HostRequest {
    #[serde(default)]
    id: u64,
    op: Op,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    config: Option<JsonValue>,
    #[serde(default)]
    plan: Option<JsonValue>,
    #[serde(default)]
    state: Option<JsonValue>,
    #[serde(default)]
    import_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HostResponse {
    id: u64,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<JsonValue>,
    #[serde(skip_serializing_if = "Diagnostics::is_empty")]
    diagnostics: Diagnostics,
}

impl HostResponse {
    fn ok(id: u64, state: Option<JsonValue>) -> Self {
        Self {
            id,
            status: "ok",
            state,
            diagnostics: Diagnostics::new(),
        }
    }

    fn gone(id: u64) -> Self {
        Self {
            id,
            status: "gone",
            state: None,
            diagnostics: Diagnostics::new(),
        }
    }

    fn cancelled(id: u64) -> Self {
        Self {
            id,
            status: "cancelled",
            state: None,
            diagnostics: Diagnostics::new(),
        }
    }

    fn error(id: u64, diagnostics: Diagnostics) -> Self {
        Self {
            id,
            status: "error",
            state: None,
            diagnostics,
        }
    }
}

/// The handshake line the host parses off stdout.
pub fn handshake_line(addr: &std::net::SocketAddr) -> String {
    format!("{HANDSHAKE_PREFIX}|{PROTOCOL_VERSION}|{addr}")
}

pub struct Server {
    provider: Option<Provider>,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            provider: None,
            cancel,
        }
    }

    /// Accept host connections until the token fires. Connections are
    /// served one at a time; the configured provider survives reconnects.
    pub async fn run(mut self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let stream = tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted?.0,
            };

            debug!("host connected");
            if self.serve_connection(stream).await? {
                return Ok(());
            }
        }
    }

    /// Returns true when the host asked the provider to stop.
    async fn serve_connection(&mut self, stream: TcpStream) -> std::io::Result<bool> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            let line = tokio::select! {
                () = self.cancel.cancelled() => return Ok(true),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("host disconnected");
                return Ok(false);
            };
            if line.trim().is_empty() {
                continue;
            }

            let request: HostRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "discarding malformed request line");
                    let response = HostResponse::error(
                        0,
                        Diagnostic::error("malformed request")
                            .with_detail(e.to_string())
                            .into(),
                    );
                    write_response(&mut write_half, &response).await?;
                    continue;
                }
            };

            let stop = matches!(request.op, Op::Stop);
            let response = self.dispatch(request).await;
            write_response(&mut write_half, &response).await?;

            if stop {
                info!("stop requested by host");
                return Ok(true);
            }
        }
    }

    async fn dispatch(&mut self, request: HostRequest) -> HostResponse {
        let id = request.id;
        match request.op {
            Op::Stop => HostResponse::ok(id, None),
            Op::Configure => self.configure(id, request.config.unwrap_or_default()).await,
            op => {
                let Some(ref provider) = self.provider else {
                    return HostResponse::error(
                        id,
                        Diagnostic::error("provider is not configured")
                            .with_detail("send a configure request before any resource operation")
                            .into(),
                    );
                };

                let Some(resource) = request
                    .resource_type
                    .as_deref()
                    .and_then(|t| provider.resource(t))
                else {
                    return HostResponse::error(
                        id,
                        Diagnostic::error("unknown resource type")
                            .with_detail(format!("got {:?}", request.resource_type))
                            .into(),
                    );
                };

                let ctx = provider.context(self.cancel.clone());
                let result = match op {
                    Op::Validate => {
                        let diags = resource.validate(&request.plan.unwrap_or_default());
                        return if diags.has_errors() {
                            HostResponse::error(id, diags)
                        } else {
                            HostResponse::ok(id, None)
                        };
                    }
                    Op::Create => resource
                        .create(&ctx, request.plan.unwrap_or_default())
                        .await
                        .map(Some),
                    Op::Read => resource.read(&ctx, request.state.unwrap_or_default()).await,
                    Op::Update => {
                        resource
                            .update(
                                &ctx,
                                request.plan.unwrap_or_default(),
                                request.state.unwrap_or_default(),
                            )
                            .await
                    }
                    Op::Delete => resource
                        .delete(&ctx, request.state.unwrap_or_default())
                        .await
                        .map(|()| None),
                    Op::Import => resource
                        .import_state(request.import_id.as_deref().unwrap_or_default())
                        .map(Some),
                    Op::Configure | Op::Stop => unreachable!("handled above"),
                };

                match result {
                    Ok(Some(state)) => HostResponse::ok(id, Some(state)),
                    Ok(None) => HostResponse::gone(id),
                    Err(OpError::Cancelled) => HostResponse::cancelled(id),
                    Err(OpError::Failed(diags)) => HostResponse::error(id, diags),
                }
            }
        }
    }

    async fn configure(&mut self, id: u64, config: JsonValue) -> HostResponse {
        let config: ProviderConfig = match serde_json::from_value(config) {
            Ok(config) => config,
            Err(e) => {
                return HostResponse::error(
                    id,
                    Diagnostic::error("malformed provider configuration")
                        .with_detail(e.to_string())
                        .into(),
                );
            }
        };

        let settings = match config.into_session_settings() {
            Ok(settings) => settings,
            Err(diags) => return HostResponse::error(id, diags),
        };

        let session = Session::connect(settings).await;
        self.provider = Some(Provider::new(session));
        info!("provider configured");
        HostResponse::ok(id, None)
    }
}

async fn write_response(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    response: &HostResponse,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(response).unwrap_or_else(|_| b"{}".to_vec());
    payload.push(b'\n');
    write_half.write_all(&payload).await
}
