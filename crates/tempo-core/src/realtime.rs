use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A row-level change emitted by the subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
}

/// Websocket subscription to the backend's change feed for one table,
/// optionally scoped to an owner. Polling interleaves heartbeats so the
/// channel stays alive between events.
pub struct RealtimeFeed {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    topic: Option<String>,
    next_ref: u64,
    last_heartbeat: Instant,
}

impl RealtimeFeed {
    #[instrument(skip(anon_key))]
    pub fn connect(base_url: &str, anon_key: &str) -> anyhow::Result<Self> {
        let ws_base = websocket_url(base_url);
        let url = format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0");

        let (socket, _response) =
            tungstenite::connect(url.as_str()).context("failed connecting to realtime endpoint")?;
        info!(endpoint = %ws_base, "connected realtime feed");

        Ok(Self {
            socket,
            topic: None,
            next_ref: 0,
            last_heartbeat: Instant::now(),
        })
    }

    /// Join the channel for `table`, optionally filtered to rows owned by
    /// `owner`.
    #[instrument(skip(self))]
    pub fn subscribe(&mut self, table: &str, owner: Option<Uuid>) -> anyhow::Result<()> {
        let topic = format!("realtime:public:{table}");
        let mut change_filter = json!({
            "event": "*",
            "schema": "public",
            "table": table,
        });
        if let Some(owner) = owner {
            change_filter["filter"] = json!(format!("user_id=eq.{owner}"));
        }

        let join = json!({
            "topic": topic,
            "event": "phx_join",
            "payload": { "config": { "postgres_changes": [change_filter] } },
            "ref": self.take_ref(),
        });
        self.send(&join)?;
        self.topic = Some(topic);
        debug!(table, "joined realtime channel");
        Ok(())
    }

    /// Wait up to `timeout` for the next change event. `Ok(None)` means the
    /// window elapsed quietly.
    #[instrument(skip(self))]
    pub fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<ChangeEvent>> {
        self.heartbeat_if_due()?;
        self.set_read_timeout(timeout)?;

        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(parse_change_event(text.as_str())),
            Ok(Message::Ping(payload)) => {
                self.socket
                    .send(Message::Pong(payload))
                    .context("failed answering ping")?;
                Ok(None)
            }
            Ok(Message::Close(_)) => Err(anyhow!("realtime channel closed by the server")),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(err) => Err(err).context("failed reading from realtime channel"),
        }
    }

    /// Leave the channel and close the socket.
    #[instrument(skip(self))]
    pub fn close(mut self) {
        if let Some(topic) = self.topic.take() {
            let leave = json!({
                "topic": topic,
                "event": "phx_leave",
                "payload": {},
                "ref": self.take_ref(),
            });
            if let Err(err) = self.send(&leave) {
                warn!(error = %err, "failed leaving realtime channel");
            }
        }
        if let Err(err) = self.socket.close(None) {
            debug!(error = %err, "realtime socket close");
        }
    }

    fn heartbeat_if_due(&mut self) -> anyhow::Result<()> {
        if self.last_heartbeat.elapsed() < HEARTBEAT_INTERVAL {
            return Ok(());
        }
        let heartbeat = json!({
            "topic": "phoenix",
            "event": "heartbeat",
            "payload": {},
            "ref": self.take_ref(),
        });
        self.send(&heartbeat)?;
        self.last_heartbeat = Instant::now();
        Ok(())
    }

    fn send(&mut self, value: &Value) -> anyhow::Result<()> {
        self.socket
            .send(Message::text(value.to_string()))
            .context("failed sending realtime message")
    }

    fn take_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> anyhow::Result<()> {
        let stream = match self.socket.get_ref() {
            MaybeTlsStream::Plain(stream) => stream,
            MaybeTlsStream::Rustls(tls) => tls.get_ref(),
            _ => return Ok(()),
        };
        stream
            .set_read_timeout(Some(timeout))
            .context("failed setting realtime read timeout")
    }
}

fn websocket_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("wss://{trimmed}")
    }
}

fn parse_change_event(raw: &str) -> Option<ChangeEvent> {
    let value: Value = serde_json::from_str(raw).ok()?;
    if value.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }

    let data = value.get("payload")?.get("data")?;
    let kind = ChangeKind::parse(data.get("type")?.as_str()?)?;
    let table = data.get("table")?.as_str()?.to_string();
    Some(ChangeEvent { table, kind })
}

/// Coalesces bursts of change notifications: the refetch fires once per
/// quiet window instead of once per event.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    pending: u32,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            pending: 0,
        }
    }

    /// Record an event at `now`; the window restarts.
    pub fn note(&mut self, now: Instant) {
        self.pending += 1;
        self.deadline = Some(now + self.window);
    }

    /// True once the quiet window has elapsed; resets the pending batch.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending = 0;
                true
            }
            _ => false,
        }
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{ChangeEvent, ChangeKind, Debouncer, parse_change_event, websocket_url};

    #[test]
    fn burst_of_events_triggers_a_single_refetch() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        let t0 = Instant::now();

        debouncer.note(t0);
        debouncer.note(t0 + Duration::from_millis(100));
        debouncer.note(t0 + Duration::from_millis(200));
        assert_eq!(debouncer.pending(), 3);

        // Still inside the window measured from the last event.
        assert!(!debouncer.ready(t0 + Duration::from_millis(600)));
        assert!(debouncer.ready(t0 + Duration::from_millis(700)));

        // The batch was consumed; nothing further fires.
        assert!(!debouncer.ready(t0 + Duration::from_secs(5)));
        assert_eq!(debouncer.pending(), 0);
    }

    #[test]
    fn quiet_debouncer_never_fires() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        assert!(!debouncer.ready(Instant::now() + Duration::from_secs(60)));
    }

    #[test]
    fn change_events_parse_from_channel_payloads() {
        let raw = r#"{
            "topic": "realtime:public:tasks",
            "event": "postgres_changes",
            "payload": { "data": { "type": "UPDATE", "table": "tasks" } },
            "ref": null
        }"#;
        assert_eq!(
            parse_change_event(raw),
            Some(ChangeEvent {
                table: "tasks".to_string(),
                kind: ChangeKind::Update,
            })
        );

        let ack = r#"{"topic":"realtime:public:tasks","event":"phx_reply","payload":{},"ref":"1"}"#;
        assert_eq!(parse_change_event(ack), None);
        assert_eq!(parse_change_event("not json"), None);
    }

    #[test]
    fn websocket_urls_swap_schemes() {
        assert_eq!(
            websocket_url("https://proj.supabase.co/"),
            "wss://proj.supabase.co"
        );
        assert_eq!(websocket_url("http://localhost:54321"), "ws://localhost:54321");
    }
}
