use crate::app::events::{Event, PlayerEvent};
use anyhow::Context;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};

const CONNECT_ATTEMPTS: u32 = 100;
const CONNECT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct MpvOptions {
    pub audio_device: Option<String>,
    pub volume: u8,
    /// Let mpv's ytdl hook open embed pages.
    pub ytdl: bool,
    pub log_file: Option<PathBuf>,
}

/// Command line for an idle mpv window listening on `socket`.
fn mpv_args(opts: &MpvOptions, socket: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["--idle=yes", "--force-window=yes", "--input-terminal=no", "--really-quiet"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push(format!("--ytdl={}", if opts.ytdl { "yes" } else { "no" }));
    args.push(format!("--volume={}", opts.volume.min(100)));
    if let Some(dev) = opts.audio_device.as_deref().filter(|d| !d.is_empty()) {
        args.push(format!("--audio-device={dev}"));
    }
    if let Some(p) = &opts.log_file {
        args.push(format!("--log-file={}", p.display()));
    }
    args.push(format!("--input-ipc-server={}", socket.display()));
    args
}

/// A running mpv process driven over its JSON IPC socket.
#[derive(Debug)]
pub struct MpvHandle {
    child: Child,
    socket: PathBuf,
    ipc: Mutex<WriteHalf<UnixStream>>,
    next_request: AtomicU64,
}

impl MpvHandle {
    pub async fn spawn(event_tx: mpsc::Sender<Event>, opts: &MpvOptions) -> anyhow::Result<Self> {
        let socket = std::env::temp_dir().join(format!("reelpick-mpv-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&socket);

        let child = Command::new("mpv")
            .args(mpv_args(opts, &socket))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("spawn mpv")?;

        let stream = connect(&socket).await?;
        let (reader, writer) = tokio::io::split(stream);
        tokio::spawn(forward_events(reader, event_tx));

        let handle = Self {
            child,
            socket,
            ipc: Mutex::new(writer),
            next_request: AtomicU64::new(1),
        };
        handle.command(&[json!("request_log_messages"), json!("warn")]).await?;
        handle.command(&[json!("observe_property"), json!(1), json!("time-pos")]).await?;
        handle.command(&[json!("observe_property"), json!(2), json!("duration")]).await?;
        Ok(handle)
    }

    /// Replace whatever is playing with `url`.
    pub async fn load_url(&self, url: &str) -> anyhow::Result<()> {
        self.command(&[json!("loadfile"), json!(url), json!("replace")]).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.command(&[json!("stop")]).await
    }

    /// Every request is tagged so failures come back as replies with an `error`.
    async fn command(&self, args: &[Value]) -> anyhow::Result<()> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let mut line = serde_json::to_vec(&json!({"command": args, "request_id": request_id}))
            .context("encode mpv command")?;
        line.push(b'\n');

        let mut ipc = self.ipc.lock().await;
        ipc.write_all(&line).await.context("write mpv ipc")?;
        ipc.flush().await.context("flush mpv ipc")
    }
}

impl Drop for MpvHandle {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        let _ = std::fs::remove_file(&self.socket);
    }
}

/// mpv creates the socket a moment after it starts.
async fn connect(socket: &Path) -> anyhow::Result<UnixStream> {
    let mut attempt = 0;
    loop {
        match UnixStream::connect(socket).await {
            Ok(s) => return Ok(s),
            Err(e) if attempt + 1 >= CONNECT_ATTEMPTS => {
                return Err(e).with_context(|| format!("connect to mpv ipc {}", socket.display()));
            }
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
        }
    }
}

async fn forward_events(reader: ReadHalf<UnixStream>, event_tx: mpsc::Sender<Event>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(pe) = serde_json::from_str::<Value>(&line)
            .ok()
            .as_ref()
            .and_then(map_mpv_event)
        else {
            continue;
        };
        if event_tx.send(Event::Player(pe)).await.is_err() {
            break;
        }
    }
}

fn map_mpv_event(v: &Value) -> Option<PlayerEvent> {
    // Replies: {"request_id": n, "error": "..."}
    if v.get("request_id").is_some() {
        let err = v.get("error")?.as_str()?;
        return (err != "success").then(|| PlayerEvent::Warning(format!("mpv ipc error: {err}")));
    }

    match v.get("event")?.as_str()? {
        "file-loaded" => Some(PlayerEvent::Started),
        "property-change" => {
            let seconds = v.get("data")?.as_f64()?;
            match v.get("name")?.as_str()? {
                "time-pos" => Some(PlayerEvent::Position { seconds }),
                "duration" => Some(PlayerEvent::Duration { seconds }),
                _ => None,
            }
        }
        // reason=error is the only runtime failure; stop/quit/redirect are ours.
        "end-file" => match v.get("reason").and_then(Value::as_str).unwrap_or("") {
            "error" => {
                let err = v
                    .get("file_error")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                Some(PlayerEvent::Failed(err.to_string()))
            }
            "eof" => Some(PlayerEvent::Ended),
            _ => None,
        },
        "log-message" => {
            let level = v.get("level").and_then(Value::as_str).unwrap_or("info");
            let text = v.get("text").and_then(Value::as_str).unwrap_or("").trim();
            matches!(level, "warn" | "error")
                .then_some(text)
                .filter(|t| !t.is_empty())
                .map(|t| PlayerEvent::Warning(format!("mpv {level}: {t}")))
        }
        _ => None,
    }
}
