use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::engine::lifecycle::{self, PositionReport};
use crate::models::partner::PartnerRole;
use crate::models::qr::QrId;
use crate::models::tracking::TrackingView;
use crate::state::AppState;

pub mod pb {
    tonic::include_proto!("tracking");
}

use pb::tracking_service_server::TrackingService;
use pb::{
    Coordinates, DeliveredMarker, Destination, GetTrackingRequest, PartnerPosition,
    RecordPositionRequest, StoppedMarker, TrackingSnapshot, WatchTrackingRequest,
};

const WATCH_BUFFER: usize = 16;

pub struct GrpcTrackingService {
    state: Arc<AppState>,
}

impl GrpcTrackingService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

fn coordinates_to_proto(c: &crate::models::tracking::Coordinates) -> Coordinates {
    Coordinates {
        latitude: c.latitude,
        longitude: c.longitude,
    }
}

pub fn view_to_proto(view: &TrackingView) -> TrackingSnapshot {
    TrackingSnapshot {
        qr_id: view.qr_id.to_string(),
        destination: Some(Destination {
            name: view.destination.name.clone(),
            address: view.destination.address.clone(),
            coordinates: Some(coordinates_to_proto(&view.destination.coordinates)),
        }),
        delivery_partner: view.delivery_partner.as_ref().map(|p| PartnerPosition {
            name: p.name.clone(),
            email: p.email.clone(),
            role: p.role.as_str().to_string(),
            coordinates: p.coordinates.as_ref().map(coordinates_to_proto),
            status: p.status.clone().unwrap_or_default(),
            last_updated: p.last_updated.to_rfc3339(),
            distance_km: p.distance_km,
        }),
        status: view.status.as_str().to_string(),
        qr_status: view.qr_status.as_str().to_string(),
        delivered: view.delivered.as_ref().map(|marker| DeliveredMarker {
            partner_name: marker.partner_name.clone(),
            completed_at: marker.completed_at.to_rfc3339(),
        }),
        stopped: view.stopped.as_ref().map(|marker| StoppedMarker {
            stopped_by: marker.stopped_by.clone(),
            reason: marker.reason.as_str().to_string(),
            stopped_at: marker.stopped_at.to_rfc3339(),
        }),
    }
}

/// Sends `current`, then every later view of the same code, and returns once
/// a terminal view has gone out or the watcher hangs up.
async fn relay_views(
    mut current: TrackingView,
    mut events: broadcast::Receiver<TrackingView>,
    tx: mpsc::Sender<Result<TrackingSnapshot, Status>>,
) {
    loop {
        if tx.send(Ok(view_to_proto(&current))).await.is_err() {
            return;
        }
        if current.qr_status.is_terminal() {
            return;
        }

        current = loop {
            match events.recv().await {
                Ok(view) if view.qr_id == current.qr_id => break view,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(qr_id = %current.qr_id, skipped, "tracking watcher lagged behind");
                }
                Err(RecvError::Closed) => return,
            }
        };
    }
}

fn parse_qr_id(raw: &str) -> Result<QrId, Status> {
    QrId::parse(raw).map_err(Status::from)
}

fn parse_role(raw: &str) -> Result<Option<PartnerRole>, Status> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    PartnerRole::parse(raw).map(Some).ok_or_else(|| {
        Status::invalid_argument(format!(
            "unknown role: {raw}, expected Regular/Captain/Pilot/Tc"
        ))
    })
}

#[tonic::async_trait]
impl TrackingService for GrpcTrackingService {
    async fn get_tracking(
        &self,
        request: Request<GetTrackingRequest>,
    ) -> Result<Response<TrackingSnapshot>, Status> {
        let qr_id = parse_qr_id(&request.into_inner().qr_id)?;
        let view = lifecycle::tracking_view(&self.state, &qr_id)?;

        Ok(Response::new(view_to_proto(&view)))
    }

    async fn record_position(
        &self,
        request: Request<RecordPositionRequest>,
    ) -> Result<Response<TrackingSnapshot>, Status> {
        let req = request.into_inner();
        let qr_id = parse_qr_id(&req.qr_id)?;

        let report = PositionReport {
            partner_email: req.partner_email,
            partner_name: Some(req.partner_name),
            role: parse_role(&req.role)?,
            role_only: req.role_only,
            latitude: req.coordinates.as_ref().map(|c| c.latitude),
            longitude: req.coordinates.as_ref().map(|c| c.longitude),
        };

        let view = lifecycle::record_position(&self.state, &qr_id, report)?;
        Ok(Response::new(view_to_proto(&view)))
    }

    type WatchTrackingStream =
        Pin<Box<dyn Stream<Item = Result<TrackingSnapshot, Status>> + Send>>;

    async fn watch_tracking(
        &self,
        request: Request<WatchTrackingRequest>,
    ) -> Result<Response<Self::WatchTrackingStream>, Status> {
        let qr_id = parse_qr_id(&request.into_inner().qr_id)?;

        // Subscribe before the snapshot so no update between the two is lost.
        let events = self.state.tracking_events_tx.subscribe();
        let current = lifecycle::tracking_view(&self.state, &qr_id)?;

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        tokio::spawn(relay_views(current, events, tx));

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream)))
    }
}
