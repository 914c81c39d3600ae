//! Event stream endpoint
//!
//! Opens a `text/event-stream` response and hands its write side to the
//! supervisor. The response body is fed by a bounded channel; when the client
//! goes away actix drops the body, the channel closes, and the connection's
//! cancellation token fires.
use crate::error::{AppError, Result};
use crate::models::ClientIdentity;
use crate::sse::{ChannelSink, Supervisor};
use actix_web::http::{header, Version};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
}

impl ConnectQuery {
    /// Anonymous clients get a random user id
    pub fn into_identity(self) -> ClientIdentity {
        let user_id = self
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        ClientIdentity::new(user_id, self.device_id.filter(|id| !id.is_empty()))
    }
}

/// Open an event stream
///
/// GET {connection_path}?user_id=&device_id=
pub async fn connect(
    req: HttpRequest,
    query: web::Query<ConnectQuery>,
    supervisor: web::Data<Supervisor>,
) -> Result<HttpResponse> {
    if supervisor.is_shutting_down() {
        return Err(AppError::ShuttingDown);
    }

    let identity = query.into_inner().into_identity();
    let (tx, rx) = mpsc::channel(supervisor.config().channel_capacity.max(1));
    let liveness = tx.clone();

    actix_web::rt::spawn(serve(
        supervisor.get_ref().clone(),
        identity,
        ChannelSink::new(tx),
        liveness,
    ));

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(web::Bytes::from(frame)), rx))
    });

    let mut response = HttpResponse::Ok();
    response
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"));

    if req.version() == Version::HTTP_11 {
        response.keep_alive();
    }

    Ok(response.streaming(body))
}

/// Run the supervisor until the stream ends, translating a dropped response
/// body into cancellation
async fn serve(
    supervisor: Supervisor,
    identity: ClientIdentity,
    sink: ChannelSink,
    liveness: mpsc::Sender<String>,
) {
    let cancel = CancellationToken::new();
    let listen = supervisor.listen(identity, Box::new(sink), cancel.clone());
    tokio::pin!(listen);

    tokio::select! {
        _ = &mut listen => {}
        _ = liveness.closed() => {
            cancel.cancel();
            listen.await;
        }
    }
}

/// Register the stream endpoint at `connection_path`
pub fn register_routes(cfg: &mut web::ServiceConfig, connection_path: &str) {
    cfg.route(connection_path, web::get().to(connect));
}
