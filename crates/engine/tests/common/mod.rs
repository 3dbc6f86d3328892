//! Scripted platform and transport shared by the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fuelwatch_core::{EngineConfig, Result, UplinkError, UplinkEvent};
use fuelwatch_engine::UplinkEngine;
use fuelwatch_uplink::{PlatformKind, ProcessPlatform, UplinkTransport};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PID: u32 = 27182;
pub const PORT: u16 = 42137;
pub const TOKEN: &str = "c0ffee00-1234-5678-9abc-def012345678";

/// Process table and socket listing handed back verbatim.
#[derive(Clone, Default)]
pub struct ScriptedPlatform {
    processes: Arc<Mutex<Option<String>>>,
}

impl ScriptedPlatform {
    /// Platform on which the language server is running.
    pub fn running() -> Self {
        let platform = Self::default();
        platform.set_running(true);
        platform
    }

    pub fn set_running(&self, running: bool) {
        *self.processes.lock().unwrap() = running.then(|| {
            format!(
                "  {} /opt/ls/language_server_linux_x64 --enable_lsp --csrf_token {}\n",
                PID, TOKEN
            )
        });
    }
}

#[async_trait]
impl ProcessPlatform for ScriptedPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Linux
    }

    async fn list_candidate_processes(&self) -> Result<String> {
        self.processes
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| UplinkError::Discovery("ps exited with status 1".to_string()))
    }

    async fn list_listening_ports(&self, pid: u32) -> Result<String> {
        Ok(format!(
            "LISTEN 0 4096 127.0.0.1:{} 0.0.0.0:* users:((\"language_server\",pid={},fd=21))\n\
             LISTEN 0 4096 127.0.0.1:{} 0.0.0.0:* users:((\"language_server\",pid={},fd=22))\n",
            PORT - 1,
            pid,
            PORT,
            pid
        ))
    }
}

/// Canned answer to one status fetch.
#[derive(Clone)]
pub enum Reply {
    Status(Value),
    Fail(&'static str),
    Slow(Value, Duration),
    Panic,
}

/// Answers probes on [`PORT`] only and replays queued fetch replies.
#[derive(Clone)]
pub struct ScriptedTransport {
    live_ports: Arc<Mutex<HashSet<u16>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Arc<Mutex<Reply>>,
    fetches: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn answering(fallback: Reply) -> Self {
        Self {
            live_ports: Arc::new(Mutex::new([PORT].into_iter().collect())),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(fallback)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue replies consumed before the fallback.
    pub fn push(&self, replies: impl IntoIterator<Item = Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    pub fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock().unwrap() = reply;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UplinkTransport for ScriptedTransport {
    async fn probe(&self, port: u16, token: &str) -> bool {
        token == TOKEN && self.live_ports.lock().unwrap().contains(&port)
    }

    async fn fetch_status(&self, _port: u16, token: &str) -> Result<Value> {
        assert_eq!(token, TOKEN);
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let reply = {
            let queued = self.replies.lock().unwrap().pop_front();
            queued.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
        };

        match reply {
            Reply::Status(value) => Ok(value),
            Reply::Fail(message) => Err(UplinkError::Transport(message.to_string())),
            Reply::Slow(value, delay) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Reply::Panic => panic!("transport exploded"),
        }
    }
}

/// `GetUserStatus` body reporting `models` as `(label, remainingFraction)`.
pub fn status(models: &[(&str, f64)]) -> Value {
    let configs: Vec<Value> = models
        .iter()
        .map(|(label, fraction)| {
            json!({
                "label": label,
                "quotaInfo": { "remainingFraction": fraction, "resetTime": "2026-10-20T00:00:00Z" }
            })
        })
        .collect();
    json!({ "userStatus": { "cascadeModelConfigData": { "clientModelConfigs": configs } } })
}

pub fn healthy_status() -> Value {
    status(&[("Gemini 3 Pro", 0.9), ("Claude Sonnet 4.5", 0.1), ("GPT-OSS 120B", 0.5)])
}

pub type TestEngine = UplinkEngine<ScriptedPlatform, ScriptedTransport>;

pub fn engine(platform: &ScriptedPlatform, transport: &ScriptedTransport) -> TestEngine {
    UplinkEngine::new(platform.clone(), transport.clone(), &EngineConfig::default())
}

/// Records every event published on the engine's bus as JSON.
pub struct Recorder {
    events: Arc<Mutex<Vec<Value>>>,
    _subscription: fuelwatch_core::Subscription,
}

impl Recorder {
    pub fn attach(engine: &TestEngine) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = engine.subscribe(move |event: &UplinkEvent| {
            sink.lock().unwrap().push(serde_json::to_value(event).unwrap());
        });
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Payloads of `error` events whose diagnostic kind is `kind`.
    pub fn errors(&self, kind: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event["type"] == "error" && event["payload"]["kind"] == kind)
            .map(|event| event["payload"].clone())
            .collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.types().iter().filter(|t| t.as_str() == event_type).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
