//! Publishing and status handlers
//!
//! Thin HTTP front for the dispatcher: lets other services push
//! notifications to connected clients and inspect who is connected.
use crate::error::{AppError, Result};
use crate::models::{ClientIdentity, Notification};
use crate::sse::{DispatchReport, Publisher, Supervisor};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to publish a notification
///
/// A string `data` is sent verbatim, any other JSON value is serialized.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublishPayload {
    pub id: Option<String>,
    pub event: Option<String>,
    pub retry: Option<u32>,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<String>,
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceStatus {
    pub identity: ClientIdentity,
    pub state: &'static str,
    pub received: u64,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserStatus {
    pub user_id: String,
    pub connected: bool,
    pub connection_count: usize,
    pub devices: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize)]
pub struct ClientList {
    pub count: usize,
    pub users: usize,
    pub clients: Vec<ClientIdentity>,
}

impl PublishPayload {
    /// `id` and `event` are written on a single wire line, so line breaks
    /// in them are rejected
    pub fn into_notification(self) -> Result<Notification> {
        for (field, value) in [("id", &self.id), ("event", &self.event)] {
            if value.as_deref().is_some_and(|v| v.contains(['\r', '\n'])) {
                return Err(AppError::BadRequest(format!(
                    "{} must not contain line breaks",
                    field
                )));
            }
        }

        let data = match self.data {
            serde_json::Value::String(text) => text,
            value => serde_json::to_string(&value)?,
        };

        Ok(Notification {
            id: self.id,
            event: self.event,
            data,
            retry: self.retry,
        })
    }
}

/// Send to one device, or to every device of the user
///
/// POST /api/v1/sse/notify/{user_id}?device_id=
pub async fn notify_user(
    path: web::Path<String>,
    query: web::Query<DeviceQuery>,
    publisher: web::Data<Publisher>,
    payload: web::Json<PublishPayload>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let ready = publisher.prepared(payload.into_inner().into_notification()?);

    let report: DispatchReport = match query.into_inner().device_id {
        Some(device_id) => ready.send_to_device(user_id, device_id).await,
        None => ready.send_to_user_devices(user_id).await,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(report)))
}

/// Send to every connected client
///
/// POST /api/v1/sse/broadcast
pub async fn broadcast(
    publisher: web::Data<Publisher>,
    payload: web::Json<PublishPayload>,
) -> Result<HttpResponse> {
    let report = publisher
        .prepared(payload.into_inner().into_notification()?)
        .send_to_all()
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(report)))
}

/// Connection status for a user
///
/// GET /api/v1/sse/status/{user_id}
pub async fn user_status(
    path: web::Path<String>,
    supervisor: web::Data<Supervisor>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    let registry = supervisor.registry();
    let connection_count = registry.user_connection_count(&user_id).await;

    let mut devices = Vec::with_capacity(connection_count);
    for identity in registry.list_by_user(&user_id).await {
        // Skip streams that closed since the listing
        if let Some(connection) = registry.get(&identity).await {
            devices.push(DeviceStatus {
                state: connection.state().as_str(),
                received: connection.received_count(),
                connected_at: connection.created_at(),
                identity,
            });
        }
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(UserStatus {
        user_id,
        connected: connection_count > 0,
        connection_count,
        devices,
    })))
}

/// Every connected identity
///
/// GET /api/v1/sse/clients
pub async fn list_clients(supervisor: web::Data<Supervisor>) -> Result<HttpResponse> {
    let registry = supervisor.registry();
    let clients = registry.list().await;
    let users = registry.connected_user_ids().await.len();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(ClientList {
        count: clients.len(),
        users,
        clients,
    })))
}

/// Register publishing routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/sse")
            .route("/notify/{user_id}", web::post().to(notify_user))
            .route("/broadcast", web::post().to(broadcast))
            .route("/status/{user_id}", web::get().to(user_status))
            .route("/clients", web::get().to(list_clients)),
    );
}
