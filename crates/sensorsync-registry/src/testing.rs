//! Test utilities for registry consumers
//!
//! [`ScriptedRegistry`] is an in-memory [`RegistryTransport`] that records
//! every request and answers from a script. With an empty script it behaves
//! like a healthy registry: POST returns a fresh `{uuid, token}`, PUT echoes
//! the device id.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{RegistryError, RegistryResult};
use crate::transport::{RegistryMethod, RegistryRequest, RegistryResponse, RegistryTransport};

/// Scripted outcome for one request
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with a status and body
    Respond { status: u16, body: String },
    /// Fail at the transport level
    Fail(String),
    /// Never answer
    Hang,
}

impl Script {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Script::Respond {
            status,
            body: body.into(),
        }
    }
}

/// In-memory registry transport driven by a script
#[derive(Debug, Default)]
pub struct ScriptedRegistry {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RegistryRequest>>,
    latency: Mutex<Duration>,
    next_id: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next unscripted request
    pub fn push(&self, script: Script) {
        self.script.lock().push_back(script);
    }

    /// Delay every answer by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RegistryRequest> {
        self.requests.lock().clone()
    }

    /// Number of device creation requests received
    pub fn create_calls(&self) -> usize {
        self.count(RegistryMethod::Post)
    }

    /// Number of device update requests received
    pub fn update_calls(&self) -> usize {
        self.count(RegistryMethod::Put)
    }

    fn count(&self, method: RegistryMethod) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn default_answer(&self, request: &RegistryRequest) -> Script {
        match request.method {
            RegistryMethod::Post => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                Script::json(
                    201,
                    format!(r#"{{"uuid":"device-{}","token":"token-{}"}}"#, n, n),
                )
            }
            RegistryMethod::Put => {
                let id = request.segments.last().map(String::as_str).unwrap_or_default();
                Script::json(200, format!(r#"{{"uuid":"{}"}}"#, id))
            }
        }
    }
}

#[async_trait]
impl RegistryTransport for ScriptedRegistry {
    async fn execute(&self, request: RegistryRequest) -> RegistryResult<RegistryResponse> {
        self.requests.lock().push(request.clone());
        let scripted = self.script.lock().pop_front();
        let script = scripted.unwrap_or_else(|| self.default_answer(&request));

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match script {
            Script::Respond { status, body } => Ok(RegistryResponse { status, body }),
            Script::Fail(reason) => Err(RegistryError::Transport(reason)),
            Script::Hang => std::future::pending().await,
        }
    }
}
