use facegate_core::{ErrorKind, VerificationService, VerifyError};
use serde_json::Value;
use zbus::interface;

pub const BUS_NAME: &str = "org.facegate.Gate1";
pub const OBJECT_PATH: &str = "/org/facegate/Gate1";

/// D-Bus interface for the facegate daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
///
/// Payloads and results are JSON strings carrying the same shapes as the
/// HTTP API.
pub struct GateService {
    service: VerificationService,
}

impl GateService {
    pub fn new(service: VerificationService) -> Self {
        Self { service }
    }

    async fn run<T, F>(&self, f: F) -> zbus::fdo::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(VerificationService) -> Result<T, VerifyError> + Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || f(service))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("worker: {e}")))?
            .map_err(to_fdo)
    }
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Verify a descriptor (JSON array, or `{"descriptor": [...]}`) against the target identity.
    async fn verify(&self, descriptor_json: &str) -> zbus::fdo::Result<String> {
        let raw = parse_payload(descriptor_json)?;
        tracing::info!("verify requested");
        let decision = self.run(move |svc| svc.verify(&raw)).await?;
        serde_json::to_string(&decision).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Enroll a reference descriptor for the target identity. Returns the row id.
    async fn enroll(&self, descriptor_json: &str) -> zbus::fdo::Result<i64> {
        let raw = parse_payload(descriptor_json)?;
        tracing::info!("enroll requested");
        self.run(move |svc| svc.enroll(&raw)).await
    }

    /// List stored identity rows as JSON.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let identities = self.run(|svc| svc.list_identities()).await?;
        serde_json::to_string(&identities).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(crate::api::status_json(&self.service).to_string())
    }
}

/// Register the interface on the session bus. The returned connection must be kept alive.
pub async fn serve(service: VerificationService) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, GateService::new(service))?
        .build()
        .await
}

/// Accept either a bare descriptor array or an object with a `descriptor` field.
fn parse_payload(text: &str) -> zbus::fdo::Result<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid JSON: {e}")))?;
    Ok(match value {
        Value::Object(mut map) => map.remove("descriptor").unwrap_or(Value::Null),
        other => other,
    })
}

fn to_fdo(err: VerifyError) -> zbus::fdo::Error {
    match err.kind() {
        ErrorKind::Client => zbus::fdo::Error::InvalidArgs(err.to_string()),
        ErrorKind::Retry | ErrorKind::Server => {
            tracing::error!(error = %err, "request failed");
            zbus::fdo::Error::Failed(err.to_string())
        }
    }
}
