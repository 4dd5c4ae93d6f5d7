//! HTTP client for the Mesos v1 scheduler API.
//!
//! [`MesosClient::new`] returns the client and a [`MesosDriver`]. The
//! client keeps one long-lived SUBSCRIBE connection, decodes its RecordIO
//! stream into [`ClusterEvent`]s and resubscribes with backoff when the
//! stream breaks. The driver queues calls; a background task posts them
//! one by one on short-lived connections, tagged with the current
//! `Mesos-Stream-Id`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use fsgrid_core::{SchedulerConfig, TaskStatus};
use fsgrid_scheduler::{ClusterEvent, SchedulerDriver, TaskInfo};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, LOCATION, USER_AGENT};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{MesosError, MesosResult};
use crate::recordio::RecordIoDecoder;
use crate::wire::{Call, Event, FrameworkInfo};

pub const SCHEDULER_PATH: &str = "/api/v1/scheduler";
pub const STREAM_ID_HEADER: &str = "Mesos-Stream-Id";
pub const DEFAULT_MASTER_PORT: u16 = 5050;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);
/// Heartbeats missed before the subscription is considered dead.
const MISSED_HEARTBEATS: u32 = 3;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ── Configuration ──────────────────────────────────────────────────

/// Master address, `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse `host`, `host:port` or `http://host:port[/path]`.
    pub fn parse(s: &str) -> MesosResult<Self> {
        let s = s.trim();
        let rest = match s.split_once("://") {
            Some(("http", rest)) => rest,
            Some((scheme, _)) => {
                return Err(MesosError::InvalidMaster(format!(
                    "{scheme}:// masters are not supported, use host:port"
                )));
            }
            None => s,
        };
        Self::parse_authority(rest.trim_start_matches("//"), s)
    }

    /// Leader address from a redirect's `Location`, e.g.
    /// `//10.0.0.2:5050/api/v1/scheduler`.
    pub fn from_location(location: &str) -> MesosResult<Self> {
        let rest = match location.split_once("://") {
            Some((_, rest)) => rest,
            None => location.trim_start_matches("//"),
        };
        Self::parse_authority(rest, location)
    }

    fn parse_authority(rest: &str, original: &str) -> MesosResult<Self> {
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| MesosError::InvalidMaster(original.to_string()))?;
                (host, port)
            }
            None => (authority, DEFAULT_MASTER_PORT),
        };
        if host.is_empty() {
            return Err(MesosError::InvalidMaster(original.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct MesosConfig {
    pub master: Endpoint,
    pub framework: FrameworkInfo,
    /// Framework id from a previous run, to fail over into.
    pub framework_id: Option<String>,
    /// `(principal, secret)` for HTTP basic authentication.
    pub credentials: Option<(String, String)>,
}

impl MesosConfig {
    pub fn from_scheduler(config: &SchedulerConfig, framework_id: Option<String>) -> MesosResult<Self> {
        let master = config
            .master
            .as_deref()
            .ok_or_else(|| MesosError::InvalidMaster("master is not set".into()))?;

        let credentials = match (&config.principal, &config.secret) {
            (Some(principal), Some(secret)) => Some((principal.clone(), secret.clone())),
            _ => None,
        };

        Ok(Self {
            master: Endpoint::parse(master)?,
            framework: FrameworkInfo {
                user: config.user.clone().unwrap_or_default(),
                name: config.framework_name.clone(),
                role: config.framework_role.clone(),
                failover_timeout_secs: config.framework_timeout.ms() as f64 / 1000.0,
                principal: config.principal.clone(),
            },
            framework_id,
            credentials,
        })
    }

    fn authorization(&self) -> Option<String> {
        self.credentials.as_ref().map(|(principal, secret)| {
            format!("Basic {}", STANDARD.encode(format!("{principal}:{secret}")))
        })
    }
}

// ── Session ────────────────────────────────────────────────────────

#[derive(Debug)]
struct Session {
    endpoint: Endpoint,
    stream_id: Option<String>,
    framework_id: Option<String>,
}

/// Connection facts shared by the subscription and the call poster.
#[derive(Debug, Clone)]
struct SharedSession(Arc<Mutex<Session>>);

impl SharedSession {
    fn with<T>(&self, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut session = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut session)
    }

    fn endpoint(&self) -> Endpoint {
        self.with(|s| s.endpoint.clone())
    }
}

// ── Driver ─────────────────────────────────────────────────────────

/// [`SchedulerDriver`] that queues calls for the client to post.
#[derive(Debug, Clone)]
pub struct MesosDriver {
    calls: mpsc::UnboundedSender<Call>,
}

impl MesosDriver {
    fn send(&self, call: Call) {
        let kind = call.kind();
        if self.calls.send(call).is_err() {
            warn!(call = kind, "mesos client stopped, dropping call");
        }
    }
}

impl SchedulerDriver for MesosDriver {
    fn decline_offer(&self, offer_id: &str) {
        self.send(Call::Decline {
            offer_id: offer_id.to_string(),
        });
    }

    fn launch_task(&self, offer_id: &str, task: TaskInfo) {
        self.send(Call::Launch {
            offer_id: offer_id.to_string(),
            task,
        });
    }

    fn kill_task(&self, task_id: &str) {
        self.send(Call::Kill {
            task_id: task_id.to_string(),
        });
    }

    fn reconcile_tasks(&self, tasks: &[TaskStatus]) {
        self.send(Call::Reconcile {
            tasks: tasks.to_vec(),
        });
    }

    fn stop(&self) {
        self.send(Call::Teardown);
    }
}

// ── Client ─────────────────────────────────────────────────────────

pub struct MesosClient {
    config: MesosConfig,
    session: SharedSession,
    calls: mpsc::UnboundedReceiver<Call>,
}

/// How a subscription attempt ended without an error.
enum SubscriptionEnd {
    /// The master closed the stream.
    StreamClosed,
    /// Nobody listens to events any more.
    EventsClosed,
}

impl MesosClient {
    pub fn new(config: MesosConfig) -> (Self, MesosDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = SharedSession(Arc::new(Mutex::new(Session {
            endpoint: config.master.clone(),
            stream_id: None,
            framework_id: config.framework_id.clone(),
        })));

        let client = Self {
            config,
            session,
            calls: rx,
        };
        (client, MesosDriver { calls: tx })
    }

    /// Subscribe and post calls until `shutdown` flips, the framework is
    /// torn down, or the event receiver goes away. Calls queued before
    /// that are flushed while the subscription is still up.
    pub async fn run(
        self,
        events: mpsc::Sender<ClusterEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> MesosResult<()> {
        let MesosClient {
            config,
            session,
            calls,
        } = self;
        let auth = config.authorization();

        let (stopped_tx, mut stopped) = watch::channel(false);
        let mut poster = tokio::spawn(post_calls(calls, session.clone(), auth.clone(), stopped_tx));

        let subscriber = Subscriber {
            config,
            session,
            auth,
            events,
        };
        let mut subscription = tokio::spawn(subscriber.run());

        tokio::select! {
            _ = shutdown.wait_for(|s| *s) => info!("mesos client shutting down"),
            torn_down = stopped.wait_for(|s| *s) => match torn_down {
                Ok(_) => info!("framework torn down"),
                Err(_) => info!("driver dropped, mesos client stopping"),
            },
            _ = &mut subscription => info!("event receiver gone, mesos client stopping"),
        }

        if tokio::time::timeout(FLUSH_TIMEOUT, &mut poster).await.is_err() {
            warn!("pending mesos calls not flushed");
            poster.abort();
        }
        subscription.abort();
        Ok(())
    }
}

struct Subscriber {
    config: MesosConfig,
    session: SharedSession,
    auth: Option<String>,
    events: mpsc::Sender<ClusterEvent>,
}

impl Subscriber {
    async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;
        let mut registered = false;

        loop {
            let mut subscribed = false;
            let result = self.subscribe(&mut registered, &mut subscribed).await;
            self.session.with(|s| s.stream_id = None);

            match result {
                Ok(SubscriptionEnd::EventsClosed) => return,
                Ok(SubscriptionEnd::StreamClosed) => warn!("subscription closed by master"),
                Err(e) => warn!(error = %e, "subscription failed"),
            }

            if subscribed {
                backoff = INITIAL_BACKOFF;
                if self.events.send(ClusterEvent::Disconnected).await.is_err() {
                    return;
                }
            }

            debug!(?backoff, "resubscribing");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn subscribe(&self, registered: &mut bool, subscribed: &mut bool) -> MesosResult<SubscriptionEnd> {
        let endpoint = self.session.endpoint();
        let framework_id = self.session.with(|s| s.framework_id.clone());
        let call = Call::Subscribe(self.config.framework.clone()).to_json(framework_id.as_deref());

        info!(master = %endpoint.authority(), framework = ?framework_id, "subscribing");
        let response = post(&endpoint, &call, None, self.auth.as_deref()).await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::TEMPORARY_REDIRECT => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| MesosError::Protocol("redirect without location".into()))?;
                let leader = Endpoint::from_location(location)?;
                info!(leader = %leader.authority(), "redirected to leading master");
                self.session.with(|s| s.endpoint = leader);
                return Ok(SubscriptionEnd::StreamClosed);
            }
            status => return Err(error_status(status, response).await),
        }

        let stream_id = response
            .headers()
            .get(STREAM_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| MesosError::Protocol(format!("response without {STREAM_ID_HEADER}")))?;
        self.session.with(|s| s.stream_id = Some(stream_id.clone()));

        let mut body = response.into_body();
        let mut decoder = RecordIoDecoder::new();
        let mut heartbeat = DEFAULT_HEARTBEAT;

        loop {
            let timeout = heartbeat * MISSED_HEARTBEATS;
            let frame = match tokio::time::timeout(timeout, body.frame()).await {
                Err(_) => return Err(MesosError::HeartbeatTimeout(timeout)),
                Ok(None) => return Ok(SubscriptionEnd::StreamClosed),
                Ok(Some(frame)) => frame.map_err(|e| MesosError::Http(e.to_string()))?,
            };
            let Ok(data) = frame.into_data() else {
                continue;
            };

            decoder.push(&data);
            while let Some(record) = decoder.next_record()? {
                let event = Event::decode(&record)?;
                if let Some(subscribed_event) = &event.subscribed {
                    if let Some(secs) = subscribed_event.heartbeat_interval_seconds {
                        heartbeat = Duration::from_secs_f64(secs.max(1.0));
                    }
                    let id = subscribed_event.framework_id.value.clone();
                    info!(framework = %id, stream = %stream_id, "subscribed");
                    self.session.with(|s| s.framework_id = Some(id));
                    *subscribed = true;
                }

                let Some(event) = event.into_cluster_event(!*registered)? else {
                    continue;
                };
                if matches!(event, ClusterEvent::Registered { .. }) {
                    *registered = true;
                }

                let ack = match &event {
                    ClusterEvent::Status(status) => acknowledgement(status),
                    _ => None,
                };
                if self.events.send(event).await.is_err() {
                    return Ok(SubscriptionEnd::EventsClosed);
                }
                if let Some(ack) = ack {
                    self.acknowledge(&endpoint, &stream_id, ack).await;
                }
            }
        }
    }

    async fn acknowledge(&self, endpoint: &Endpoint, stream_id: &str, ack: Call) {
        let framework_id = self.session.with(|s| s.framework_id.clone());
        let body = ack.to_json(framework_id.as_deref());
        if let Err(e) = post_call(endpoint, &body, stream_id, self.auth.as_deref()).await {
            warn!(error = %e, "status acknowledgement failed");
        }
    }
}

fn acknowledgement(status: &TaskStatus) -> Option<Call> {
    let (Some(agent_id), Some(uuid)) = (&status.slave_id, &status.uuid) else {
        return None;
    };
    Some(Call::Acknowledge {
        agent_id: agent_id.clone(),
        task_id: status.task_id.clone(),
        uuid: uuid.clone(),
    })
}

async fn post_calls(
    mut calls: mpsc::UnboundedReceiver<Call>,
    session: SharedSession,
    auth: Option<String>,
    stopped: watch::Sender<bool>,
) {
    while let Some(call) = calls.recv().await {
        let (endpoint, stream_id, framework_id) =
            session.with(|s| (s.endpoint.clone(), s.stream_id.clone(), s.framework_id.clone()));

        match stream_id {
            Some(stream_id) => {
                let body = call.to_json(framework_id.as_deref());
                match post_call(&endpoint, &body, &stream_id, auth.as_deref()).await {
                    Ok(()) => debug!(call = call.kind(), "call posted"),
                    Err(e) => warn!(call = call.kind(), error = %e, "call failed"),
                }
            }
            None => warn!(call = call.kind(), "not subscribed, dropping call"),
        }

        if matches!(call, Call::Teardown) {
            let _ = stopped.send(true);
            return;
        }
    }
}

// ── HTTP ───────────────────────────────────────────────────────────

async fn post_call(endpoint: &Endpoint, body: &Value, stream_id: &str, auth: Option<&str>) -> MesosResult<()> {
    let response = post(endpoint, body, Some(stream_id), auth).await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(error_status(status, response).await)
}

async fn post(
    endpoint: &Endpoint,
    body: &Value,
    stream_id: Option<&str>,
    auth: Option<&str>,
) -> MesosResult<Response<Incoming>> {
    let addr = endpoint.authority();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| MesosError::Connect {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| MesosError::Connect {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "mesos connection closed");
        }
    });

    let mut request = Request::builder()
        .method(Method::POST)
        .uri(SCHEDULER_PATH)
        .header(HOST, &addr)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, "fsgrid/0.1");
    if let Some(stream_id) = stream_id {
        request = request.header(STREAM_ID_HEADER, stream_id);
    }
    if let Some(auth) = auth {
        request = request.header(AUTHORIZATION, auth);
    }

    let request = request
        .body(Full::new(Bytes::from(serde_json::to_vec(body)?)))
        .map_err(|e| MesosError::Http(e.to_string()))?;

    sender
        .send_request(request)
        .await
        .map_err(|e| MesosError::Http(e.to_string()))
}

async fn error_status(status: StatusCode, response: Response<Incoming>) -> MesosError {
    let body = match response.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(_) => String::new(),
    };
    MesosError::Status {
        status: status.as_u16(),
        body,
    }
}
