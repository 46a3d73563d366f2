//! Request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::error::{Error, Result};
use crate::models::{
    IpVersion, Network, PeerNetwork, PeerRequest, PeerSession, PortObject,
};

use super::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "peerctl"}))
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    session: PeerSession,
    ip4: Option<String>,
    ip6: Option<String>,
}

/// All sessions for a network, with resolved session addresses
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(asn): Path<u32>,
) -> Result<Json<Value>> {
    let net = require_net(&state, asn).await?;
    let sessions = PeerSession::for_net(&state.db, net.id).await?;

    let mut views = Vec::with_capacity(sessions.len());
    for session in sessions {
        let peer_port = crate::models::PeerPort::by_id(&state.db, session.peer_port_id).await?;
        let info = peer_port.port_info(&state.db).await?;
        let ip4 = info.ipaddr(&state.resolver, crate::models::IpVersion::V4).await?;
        let ip6 = info.ipaddr(&state.resolver, crate::models::IpVersion::V6).await?;
        views.push(SessionView { session, ip4, ip6 });
    }

    Ok(Json(json!({"data": views})))
}

/// All peering requests for a network, each with its locations
pub async fn list_requests(
    State(state): State<AppState>,
    Path(asn): Path<u32>,
) -> Result<Json<Value>> {
    let net = require_net(&state, asn).await?;
    let requests = PeerRequest::for_net(&state.db, net.id).await?;

    let mut data = Vec::with_capacity(requests.len());
    for request in requests {
        let locations = request.locations(&state.db).await?;
        data.push(json!({
            "request": request,
            "locations": locations,
        }));
    }

    Ok(Json(json!({"data": data})))
}

#[derive(Debug, Deserialize, Default)]
pub struct ProgressBody {
    #[serde(default)]
    pub user: Option<String>,
    /// Exchange ref ids to leave out of the fan-out
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Run one email-workflow step toward a peer
pub async fn request_peering(
    State(state): State<AppState>,
    Path((asn, peer_asn)): Path<(u32, u32)>,
    body: Option<Json<ProgressBody>>,
) -> Result<Json<Value>> {
    let net = Network::get_or_create(&state.db, asn).await?;
    let body = body.map(|b| b.0).unwrap_or_default();
    let user = body.user.unwrap_or_else(|| "api".to_string());

    let outcome = state
        .email_workflow()
        .progress(&net, peer_asn, &user, &body.exclude)
        .await?;

    Ok(Json(json!({
        "step": format!("{:?}", outcome.step),
        "sessions": outcome.sessions,
        "request": outcome.request,
    })))
}

/// Enqueue the autopeer task for a pair. At most one task per pair is in
/// flight; a duplicate is rejected rather than queued.
pub async fn autopeer(
    State(state): State<AppState>,
    Path((asn, peer_asn)): Path<(u32, u32)>,
    body: Option<Json<ProgressBody>>,
) -> Result<(StatusCode, Json<Value>)> {
    let net = Network::get_or_create(&state.db, asn).await?;
    let user = body
        .and_then(|b| b.0.user)
        .unwrap_or_else(|| "api".to_string());

    if state.config.autopeer.url_for(peer_asn).is_none() {
        return Err(Error::Validation(format!(
            "AS{peer_asn} has no registered autopeer endpoint"
        )));
    }

    let guard = state.tasks.try_acquire(asn, peer_asn)?;
    let workflow = state.autopeer_workflow();

    tokio::spawn(async move {
        let _guard = guard;
        if let Err(err) = workflow.run(&net, peer_asn, &user).await {
            error!(net = asn, peer = peer_asn, error = %err, "autopeer task failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"status": "queued", "net": asn, "peer": peer_asn})),
    ))
}

/// Exchanges the network is present at, as composite ref ids
pub async fn list_exchanges(
    State(state): State<AppState>,
    Path(asn): Path<u32>,
) -> Result<Json<Value>> {
    let net = require_net(&state, asn).await?;
    let presence = net.exchange_presence(&state.resolver).await?;
    let data: Vec<String> = presence.iter().map(|r| r.to_string()).collect();

    Ok(Json(json!({"data": data})))
}

/// Per-peer settings as seen by the configuration renderers
pub async fn peer_detail(
    State(state): State<AppState>,
    Path((asn, peer_asn)): Path<(u32, u32)>,
) -> Result<Json<Value>> {
    let net = require_net(&state, asn).await?;
    let peer = require_net(&state, peer_asn).await?;
    let peer_net = PeerNetwork::get(&state.db, net.id, peer.id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("peer AS{peer_asn}")))?;

    let prefixes4 = peer_net
        .info_prefixes(&state.db, &state.resolver, IpVersion::V4)
        .await?;
    let prefixes6 = peer_net
        .info_prefixes(&state.db, &state.resolver, IpVersion::V6)
        .await?;

    Ok(Json(json!({
        "peer_asn": peer_asn,
        "md5_set": peer_net.md5.as_deref().map(|m| !m.is_empty()).unwrap_or(false),
        "info_prefixes4": prefixes4,
        "info_prefixes6": prefixes6,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct PeerSettingsBody {
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub info_prefixes4: Option<u32>,
    #[serde(default)]
    pub info_prefixes6: Option<u32>,
}

/// Update per-peer settings (md5 secret, prefix-count overrides)
pub async fn update_peer(
    State(state): State<AppState>,
    Path((asn, peer_asn)): Path<(u32, u32)>,
    Json(body): Json<PeerSettingsBody>,
) -> Result<Json<Value>> {
    let net = Network::get_or_create(&state.db, asn).await?;
    let peer = Network::get_or_create(&state.db, peer_asn).await?;
    let mut peer_net = PeerNetwork::get_or_create(&state.db, &net, &peer).await?;

    if let Some(md5) = &body.md5 {
        peer_net.set_md5(&state.db, md5).await?;
    }
    if let Some(value) = body.info_prefixes4 {
        peer_net.set_info_prefixes(&state.db, value, IpVersion::V4).await?;
    }
    if let Some(value) = body.info_prefixes6 {
        peer_net.set_info_prefixes(&state.db, value, IpVersion::V6).await?;
    }

    Ok(Json(json!({
        "peer_asn": peer_asn,
        "md5_set": peer_net.md5.as_deref().map(|m| !m.is_empty()).unwrap_or(false),
        "info_prefixes4": peer_net.info_prefixes4,
        "info_prefixes6": peer_net.info_prefixes6,
    })))
}

/// Networks available to peer with at one of our ports
pub async fn available_peers(
    State(state): State<AppState>,
    Path((asn, port)): Path<(u32, i64)>,
) -> Result<Json<Value>> {
    let net = require_net(&state, asn).await?;
    let port = PortObject::by_port(&state.db, &state.resolver, port)
        .await?
        .ok_or_else(|| Error::NotFound(format!("port for AS{}", net.asn)))?;

    if port.info.net_id != net.id {
        return Err(Error::NotFound(format!("port for AS{}", net.asn)));
    }

    let peers = port.get_available_peers(&state.db, &state.resolver).await?;

    Ok(Json(json!({
        "device": port.device_id(),
        "data": peers,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SessionMetaBody {
    pub version: u8,
    pub meta: Value,
}

/// Attach exchange-member metadata to a session for one address family
pub async fn set_session_meta(
    State(state): State<AppState>,
    Path((asn, session_id)): Path<(u32, i64)>,
    Json(body): Json<SessionMetaBody>,
) -> Result<Json<Value>> {
    let net = require_net(&state, asn).await?;
    let version = IpVersion::from_int(body.version)?;

    let mut session = PeerSession::by_id(&state.db, session_id).await?;
    let peer_port = crate::models::PeerPort::by_id(&state.db, session.peer_port_id).await?;
    let peer_net = peer_port.peer_net(&state.db).await?;
    if peer_net.net_id != net.id {
        return Err(Error::NotFound(format!("session {session_id}")));
    }

    session.set_meta(&state.db, version, body.meta).await?;

    Ok(Json(json!({
        "id": session.id,
        "meta": session.meta(version)?,
    })))
}

async fn require_net(state: &AppState, asn: u32) -> Result<Network> {
    Network::by_asn(&state.db, asn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("AS{asn}")))
}
