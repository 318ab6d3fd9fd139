//! Scripted in-process transport for unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use axum::http::StatusCode;

use crate::error::ErrorKind;
use crate::registry::ServiceDescriptor;
use crate::transport::{CallFailure, GatewayRequest, Payload, Transport};

/// What a scripted backend does with one call.
#[derive(Debug, Clone)]
pub enum Behaviour {
    Reply {
        status: u16,
        body: Bytes,
        delay: Duration,
    },
    Refuse {
        delay: Duration,
    },
    Hang,
}

impl Behaviour {
    pub fn ok(body: &'static str) -> Self {
        Self::Reply {
            status: 200,
            body: Bytes::from_static(body.as_bytes()),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Reply {
            status,
            body: Bytes::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn refuse() -> Self {
        Self::Refuse {
            delay: Duration::ZERO,
        }
    }

    pub fn after(self, wait: Duration) -> Self {
        match self {
            Self::Reply { status, body, .. } => Self::Reply {
                status,
                body,
                delay: wait,
            },
            Self::Refuse { .. } => Self::Refuse { delay: wait },
            Self::Hang => Self::Hang,
        }
    }

    async fn play(self) -> Result<Payload, CallFailure> {
        match self {
            Self::Reply {
                status,
                body,
                delay,
            } => {
                tokio::time::sleep(delay).await;
                let code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
                if code.is_client_error() || code.is_server_error() {
                    Err(CallFailure::from_status(code))
                } else {
                    Ok(Payload::new(status, body))
                }
            }
            Self::Refuse { delay } => {
                tokio::time::sleep(delay).await;
                Err(CallFailure::new(ErrorKind::Connection))
            }
            Self::Hang => std::future::pending().await,
        }
    }
}

/// Transport whose backends follow per-service scripts.
///
/// Each script is a queue; behaviours are consumed front to back and the
/// last one repeats forever. Services without a script answer `200 ok`.
#[derive(Default)]
pub struct ScriptedTransport {
    sends: DashMap<String, VecDeque<Behaviour>>,
    probes: DashMap<String, VecDeque<Behaviour>>,
    metadata: DashMap<String, serde_json::Value>,
    send_calls: DashMap<String, usize>,
    health_calls: DashMap<String, usize>,
    metadata_calls: DashMap<String, usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_send(&self, service_id: &str, script: Vec<Behaviour>) {
        self.sends.insert(service_id.to_string(), script.into());
    }

    pub fn on_health(&self, service_id: &str, script: Vec<Behaviour>) {
        self.probes.insert(service_id.to_string(), script.into());
    }

    pub fn on_metadata(&self, service_id: &str, document: serde_json::Value) {
        self.metadata.insert(service_id.to_string(), document);
    }

    pub fn send_calls(&self, service_id: &str) -> usize {
        self.send_calls.get(service_id).map(|c| *c).unwrap_or(0)
    }

    pub fn health_calls(&self, service_id: &str) -> usize {
        self.health_calls.get(service_id).map(|c| *c).unwrap_or(0)
    }

    pub fn metadata_calls(&self, service_id: &str) -> usize {
        self.metadata_calls.get(service_id).map(|c| *c).unwrap_or(0)
    }

    fn next(scripts: &DashMap<String, VecDeque<Behaviour>>, service_id: &str) -> Behaviour {
        match scripts.get_mut(service_id) {
            Some(mut script) if script.len() > 1 => {
                script.pop_front().unwrap_or_else(|| Behaviour::ok("ok"))
            }
            Some(script) => script.front().cloned().unwrap_or_else(|| Behaviour::ok("ok")),
            None => Behaviour::ok("ok"),
        }
    }

    fn count(counter: &DashMap<String, usize>, service_id: &str) {
        *counter.entry(service_id.to_string()).or_insert(0) += 1;
    }
}

impl Transport for ScriptedTransport {
    fn probe<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        _path: &'a str,
    ) -> BoxFuture<'a, Result<(), ErrorKind>> {
        Self::count(&self.health_calls, &service.id);
        let behaviour = Self::next(&self.probes, &service.id);
        async move { behaviour.play().await.map(|_| ()).map_err(|f| f.kind) }.boxed()
    }

    fn send<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        _request: &'a GatewayRequest,
    ) -> BoxFuture<'a, Result<Payload, CallFailure>> {
        Self::count(&self.send_calls, &service.id);
        let behaviour = Self::next(&self.sends, &service.id);
        behaviour.play().boxed()
    }

    fn fetch_json<'a>(
        &'a self,
        service: &'a ServiceDescriptor,
        _path: &'a str,
    ) -> BoxFuture<'a, Result<serde_json::Value, ErrorKind>> {
        Self::count(&self.metadata_calls, &service.id);
        let document = self.metadata.get(&service.id).map(|d| d.value().clone());
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            document.ok_or(ErrorKind::Client)
        }
        .boxed()
    }
}
