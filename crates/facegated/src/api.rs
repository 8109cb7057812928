//! HTTP JSON API.
//!
//! `POST /api/verify-face` takes `{"descriptor": [...128 numbers]}` and
//! answers with the decision object. Malformed input is a 400 and storage
//! failure a 500, so neither can be mistaken for a negative match.

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use facegate_core::{ErrorKind, VerificationService, VerifyError};
use serde_json::{json, Value};

const INVALID_DESCRIPTOR: &str = "descriptor must be an array of exactly 128 finite numbers";

pub struct RestApi;

impl RestApi {
    /// Bind the listener. The returned server starts serving once awaited.
    pub fn bind(service: VerificationService, addr: &str) -> std::io::Result<Server> {
        let data = web::Data::new(service);
        let server =
            HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
                .disable_signals()
                .bind(addr)?
                .run();
        tracing::info!(addr, "HTTP API listening");
        Ok(server)
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/verify-face", web::post().to(verify_face))
        .route("/api/enroll", web::post().to(enroll))
        .route("/api/identities", web::get().to(list_identities))
        .route("/api/status", web::get().to(status));
}

/// Pull `descriptor` out of a request body, or the 400 response to send instead.
fn descriptor_field(body: &[u8]) -> Result<Value, HttpResponse> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|_| HttpResponse::BadRequest().json(json!({ "error": "Invalid JSON" })))?;
    Ok(parsed.get("descriptor").cloned().unwrap_or(Value::Null))
}

fn error_response(err: &VerifyError) -> HttpResponse {
    let body = match err {
        VerifyError::InvalidDescriptor(e) => json!({
            "error": INVALID_DESCRIPTOR,
            "detail": e.to_string(),
        }),
        VerifyError::StoreUnavailable(load) => json!({
            "error": "Failed to load identities",
            "detail": load.fallback.to_string(),
            "rpcError": load.primary.as_ref().map(|e| e.to_string()),
        }),
        VerifyError::Store(e) => json!({
            "error": "Storage error",
            "detail": e.to_string(),
        }),
        VerifyError::NoFaceDetected => json!({ "error": "No face detected" }),
        VerifyError::Extraction(e) => json!({
            "error": "Extraction failed",
            "detail": e.to_string(),
        }),
    };

    match err.kind() {
        ErrorKind::Client => HttpResponse::BadRequest().json(body),
        ErrorKind::Retry => HttpResponse::UnprocessableEntity().json(body),
        ErrorKind::Server => {
            tracing::error!(error = %err, "request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

async fn verify_face(
    service: web::Data<VerificationService>,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let descriptor = match descriptor_field(&body) {
        Ok(v) => v,
        Err(resp) => return Ok(resp),
    };

    let service = service.into_inner();
    let result = web::block(move || service.verify(&descriptor)).await?;
    Ok(match result {
        Ok(decision) => HttpResponse::Ok().json(decision),
        Err(e) => error_response(&e),
    })
}

async fn enroll(
    service: web::Data<VerificationService>,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let descriptor = match descriptor_field(&body) {
        Ok(v) => v,
        Err(resp) => return Ok(resp),
    };

    let service = service.into_inner();
    let result = web::block(move || service.enroll(&descriptor)).await?;
    Ok(match result {
        Ok(id) => HttpResponse::Ok().json(json!({ "id": id })),
        Err(e) => error_response(&e),
    })
}

async fn list_identities(service: web::Data<VerificationService>) -> ActixResult<HttpResponse> {
    let service = service.into_inner();
    let result = web::block(move || service.list_identities()).await?;
    Ok(match result {
        Ok(identities) => HttpResponse::Ok().json(json!({ "identities": identities })),
        Err(e) => error_response(&e),
    })
}

async fn status(service: web::Data<VerificationService>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(status_json(&service)))
}

pub fn status_json(service: &VerificationService) -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "identity": service.identity(),
        "policy": service.policy_config(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use facegate_core::store::PathState;
    use facegate_core::{MemoryStore, PolicyConfig, StoredEmbedding, DESCRIPTOR_DIM};
    use std::sync::Arc;

    const TARGET: &str = "Vishmish";

    fn vector(s: f64) -> Vec<f64> {
        let mut v = vec![0.0; DESCRIPTOR_DIM];
        v[0] = s;
        v[1] = (1.0 - s * s).sqrt();
        v
    }

    fn service(store: Arc<MemoryStore>) -> VerificationService {
        VerificationService::new(store, TARGET, PolicyConfig::default())
    }

    async fn post(store: Arc<MemoryStore>, uri: &str, payload: String) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(store)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header(("content-type", "application/json"))
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }

    fn verify_body(s: f64) -> String {
        json!({ "descriptor": vector(s) }).to_string()
    }

    #[actix_web::test]
    async fn test_bind_reports_unusable_address() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let svc = service(Arc::new(MemoryStore::new()));
        assert!(RestApi::bind(svc.clone(), &addr).is_err());
        assert!(RestApi::bind(svc, "not an address").is_err());
    }

    #[actix_web::test]
    async fn test_invalid_json_is_bad_request() {
        let (status, body) = post(
            Arc::new(MemoryStore::new()),
            "/api/verify-face",
            "{oops".into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON");
    }

    #[actix_web::test]
    async fn test_bad_descriptor_is_bad_request() {
        for payload in [
            json!({ "descriptor": [1.0, 2.0] }),
            json!({ "descriptor": "[]" }),
            json!({ "other": 1 }),
            json!([1.0, 2.0]),
        ] {
            let (status, body) =
                post(Arc::new(MemoryStore::new()), "/api/verify-face", payload.to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
            assert_eq!(body["error"], INVALID_DESCRIPTOR);
        }
    }

    #[actix_web::test]
    async fn test_no_references_response() {
        let (status, body) =
            post(Arc::new(MemoryStore::new()), "/api/verify-face", verify_body(1.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "match": false,
                "bestSimilarity": -1.0,
                "matchCount": 0,
                "comparedWith": 0,
                "reason": "no_valid_references",
            })
        );
    }

    #[actix_web::test]
    async fn test_match_response() {
        let store = Arc::new(MemoryStore::new());
        store.push(TARGET, StoredEmbedding::Native(json!(vector(0.97))));
        store.push(TARGET, StoredEmbedding::Text(json!(vector(0.95)).to_string()));
        store.push("Intruder", StoredEmbedding::Native(json!(vector(1.0))));

        let (status, body) = post(store, "/api/verify-face", verify_body(1.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match"], true);
        assert_eq!(body["matchCount"], 2);
        assert_eq!(body["comparedWith"], 2);
        assert_eq!(body["threshold"], 0.88);
        assert_eq!(body["bestMin"], 0.92);
        assert!(body.get("reason").is_none());
    }

    #[actix_web::test]
    async fn test_storage_failure_is_server_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_prejoined(PathState::Failing("rpc missing".into()));
        store.set_table(PathState::Failing("permission denied".into()));

        let (status, body) = post(store, "/api/verify-face", verify_body(1.0)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to load identities");
        assert!(body["detail"].as_str().unwrap().contains("permission denied"));
        assert!(body["rpcError"].as_str().unwrap().contains("rpc missing"));
    }

    #[actix_web::test]
    async fn test_enroll_and_list() {
        let store = Arc::new(MemoryStore::new());
        let (status, body) = post(store.clone(), "/api/enroll", verify_body(1.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service(store)))
                .configure(configure),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/identities").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            json!({ "identities": [{ "id": 1, "name": TARGET, "valid": true }] })
        );

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["identity"], TARGET);
        assert_eq!(body["policy"]["minReferences"], 2);
    }
}
