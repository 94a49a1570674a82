//! Callback Handlers
//!
//! URL verification (GET) and event delivery (POST). Each request runs the
//! pipeline `Resolving → Verifying → Decrypting → Classifying → Relaying →
//! Acknowledging`; a failure at any stage jumps straight to acknowledging with
//! the status that stage maps to.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use wx_crypto::PayloadCodec;

use super::classify::{self, ClassificationResult};
use super::error::{plain_text, CallbackError};
use super::relay::{RelayError, RelayOutcome};
use super::xml::{self, DecryptedEvent};
use crate::api::AppState;
use crate::connections::Connection;

/// Characters of an undecryptable body kept in the audit record.
const BODY_PREVIEW_CHARS: usize = 200;

/// Query string sent by the platform on every callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub msg_signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    pub echostr: Option<String>,
}

/// Signature parameters, all present and non-empty.
#[derive(Debug, Clone, Copy)]
struct SignedParams<'a> {
    signature: &'a str,
    timestamp: &'a str,
    nonce: &'a str,
}

impl CallbackQuery {
    fn signed(&self) -> Option<SignedParams<'_>> {
        Some(SignedParams {
            signature: non_empty(&self.msg_signature)?,
            timestamp: non_empty(&self.timestamp)?,
            nonce: non_empty(&self.nonce)?,
        })
    }

    fn echostr(&self) -> Option<&str> {
        non_empty(&self.echostr)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Pipeline stage, recorded with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolving,
    Verifying,
    Decrypting,
    Classifying,
    Relaying,
    Acknowledging,
}

/// Readiness message for a GET without verification parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub message: String,
    pub corp_id: String,
    pub agent_id: String,
}

/// GET /{corp_id}/{agent_id}
///
/// Answers the platform's URL verification handshake with the decrypted echostr.
#[instrument(skip(state))]
pub async fn verify_url(
    State(state): State<AppState>,
    Path((corp_id, agent_id)): Path<(String, String)>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let (Some(params), Some(echostr)) = (query.signed(), query.echostr()) else {
        return Json(ReadinessResponse {
            message: format!(
                "Ready to receive WeCom events (CorpID: {corp_id}, AgentID: {agent_id}). \
                 POST to deliver messages, or GET with verification parameters to verify the URL."
            ),
            corp_id,
            agent_id,
        })
        .into_response();
    };

    let connection =
        match resolve_connection(&state, &corp_id, &agent_id, "api_verification").await {
            Ok(connection) => connection,
            Err(e) => return e.into_verification_response(),
        };

    match verify_echostr(&connection, params, echostr) {
        Ok(plaintext) => {
            info!(connection_id = %connection.id, "Callback URL verified");
            state
                .audit
                .success(
                    Some(connection.id),
                    "api_verification",
                    format!("URL verification succeeded ({corp_id}/{agent_id})"),
                    json!({
                        "corpId": corp_id,
                        "agentId": agent_id,
                        "timestamp": params.timestamp,
                        "nonce": params.nonce,
                    }),
                )
                .await;
            plain_text(StatusCode::OK, plaintext)
        }
        Err((stage, e)) => {
            warn!(connection_id = %connection.id, error = %e, "Callback URL verification failed");
            state
                .audit
                .error(
                    Some(connection.id),
                    "api_verification",
                    format!("URL verification failed ({corp_id}/{agent_id}): {e}"),
                    json!({
                        "corpId": corp_id,
                        "agentId": agent_id,
                        "stage": stage,
                        "error": e.to_string(),
                    }),
                )
                .await;
            e.into_verification_response()
        }
    }
}

fn verify_echostr(
    connection: &Connection,
    params: SignedParams<'_>,
    echostr: &str,
) -> Result<String, (Stage, CallbackError)> {
    if !wx_crypto::verify(
        &connection.token,
        params.timestamp,
        params.nonce,
        echostr,
        params.signature,
    ) {
        return Err((Stage::Verifying, CallbackError::SignatureMismatch));
    }

    PayloadCodec::new(&connection.encoding_aes_key, &connection.corp_id)
        .and_then(|codec| codec.decrypt(echostr))
        .map_err(|e| (Stage::Decrypting, CallbackError::from(e)))
}

/// POST /{corp_id}/{agent_id}
///
/// Receives an encrypted event. Once the payload is authenticated and
/// decrypted the platform is always answered with `200 success`.
#[instrument(skip(state, body), fields(body_len = body.len()))]
pub async fn receive_event(
    State(state): State<AppState>,
    Path((corp_id, agent_id)): Path<(String, String)>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<Response, CallbackError> {
    let Some(params) = query.signed() else {
        warn!("Callback missing signature parameters");
        state
            .audit
            .error(
                None,
                "api_call",
                format!("Missing callback parameters ({corp_id}/{agent_id})"),
                json!({
                    "corpId": corp_id,
                    "agentId": agent_id,
                    "msgSignature": non_empty(&query.msg_signature).is_some(),
                    "timestamp": non_empty(&query.timestamp).is_some(),
                    "nonce": non_empty(&query.nonce).is_some(),
                }),
            )
            .await;
        return Err(CallbackError::MissingParameters);
    };

    let connection = resolve_connection(&state, &corp_id, &agent_id, "api_call").await?;

    let event = match open_envelope(&connection, params, &body) {
        Ok(event) => event,
        Err((stage, e)) => {
            let event_type = match e {
                CallbackError::XmlParse(_) => "message_parsing",
                _ => "message_decryption",
            };
            if e.is_acknowledged() {
                info!(connection_id = %connection.id, stage = ?stage, error = %e, "Callback acknowledged without relay");
            } else {
                warn!(connection_id = %connection.id, stage = ?stage, error = %e, "Callback rejected");
            }
            state
                .audit
                .error(
                    Some(connection.id),
                    event_type,
                    format!("{e} ({corp_id}/{agent_id})"),
                    json!({
                        "corpId": corp_id,
                        "agentId": agent_id,
                        "stage": stage,
                        "error": e.to_string(),
                        "encryptedBody": preview(&body),
                    }),
                )
                .await;
            return Err(e);
        }
    };

    process_event(&state, &connection, &event).await?;
    Ok(acknowledge())
}

/// Extract, verify and decrypt the envelope, then parse the plaintext event.
fn open_envelope(
    connection: &Connection,
    params: SignedParams<'_>,
    body: &str,
) -> Result<DecryptedEvent, (Stage, CallbackError)> {
    let encrypted =
        xml::extract_encrypt(body).map_err(|e| (Stage::Decrypting, CallbackError::InvalidEnvelope(e)))?;

    if !wx_crypto::verify(
        &connection.token,
        params.timestamp,
        params.nonce,
        &encrypted,
        params.signature,
    ) {
        return Err((Stage::Verifying, CallbackError::SignatureMismatch));
    }

    let decrypted = PayloadCodec::new(&connection.encoding_aes_key, &connection.corp_id)
        .and_then(|codec| codec.decrypt(&encrypted))
        .map_err(|e| (Stage::Decrypting, CallbackError::from(e)))?;

    DecryptedEvent::from_xml(&decrypted, body)
        .map_err(|e| (Stage::Classifying, CallbackError::XmlParse(e)))
}

/// Classify, audit and relay an authenticated event.
async fn process_event(
    state: &AppState,
    connection: &Connection,
    event: &DecryptedEvent,
) -> Result<(), CallbackError> {
    let result = classify::classify(event);
    let event_type = classify::audit_event_type(event);
    let (corp_id, agent_id) = (&connection.corp_id, &connection.agent_id);

    debug!(connection_id = %connection.id, action = %result.action, "Event classified");
    state
        .audit
        .processing(
            Some(connection.id),
            &event_type,
            format!(
                "Received WeCom message ({corp_id}/{agent_id}): {}",
                classify::describe(event)
            ),
            json!({
                "corpId": corp_id,
                "agentId": agent_id,
                "event": event,
                "processResult": result,
            }),
        )
        .await;

    let relay_url = connection.relay_url();
    let outcome = state
        .relay
        .relay(relay_url, &connection.summary(), event, &result)
        .await;

    match outcome {
        Ok(RelayOutcome::Skipped) => {
            state
                .audit
                .success(
                    Some(connection.id),
                    "message_processing",
                    format!("Message processed ({corp_id}/{agent_id}): {event_type}, no relay configured"),
                    processed_metadata(connection, &result),
                )
                .await;
            state
                .audit
                .info(
                    Some(connection.id),
                    "relay_webhook",
                    format!("No relay URL configured ({corp_id}/{agent_id}), skipping relay"),
                    json!({ "corpId": corp_id, "agentId": agent_id }),
                )
                .await;
            Ok(())
        }
        Ok(RelayOutcome::Delivered {
            status,
            response,
            latency_ms,
        }) => {
            info!(connection_id = %connection.id, status, latency_ms, "Event relayed");
            state
                .audit
                .success(
                    Some(connection.id),
                    "relay_webhook",
                    format!("Relay delivered ({corp_id}/{agent_id}): {event_type}"),
                    json!({
                        "corpId": corp_id,
                        "agentId": agent_id,
                        "relayUrl": relay_url,
                        "status": status,
                        "latencyMs": latency_ms,
                        "response": response,
                        "processResult": result,
                    }),
                )
                .await;
            Ok(())
        }
        Err(e) => {
            let downstream_status = match &e {
                RelayError::Status { status, .. } => Some(*status),
                _ => None,
            };
            let err = CallbackError::from(e);
            error!(connection_id = %connection.id, error = %err, "Relay delivery failed");
            state
                .audit
                .error(
                    Some(connection.id),
                    "relay_webhook",
                    format!("{err} ({corp_id}/{agent_id})"),
                    json!({
                        "corpId": corp_id,
                        "agentId": agent_id,
                        "relayUrl": relay_url,
                        "stage": Stage::Relaying,
                        "status": downstream_status,
                        "error": err.to_string(),
                    }),
                )
                .await;
            Err(err)
        }
    }
}

fn processed_metadata(connection: &Connection, result: &ClassificationResult) -> serde_json::Value {
    json!({
        "corpId": connection.corp_id,
        "agentId": connection.agent_id,
        "processResult": result,
    })
}

/// Look up the connection for a callback path, auditing a miss.
async fn resolve_connection(
    state: &AppState,
    corp_id: &str,
    agent_id: &str,
    event_type: &str,
) -> Result<Connection, CallbackError> {
    match state.connections.find_by_corp_and_agent(corp_id, agent_id).await {
        Ok(Some(connection)) => Ok(connection),
        Ok(None) => {
            warn!("No connection registered for callback");
            state
                .audit
                .error(
                    None,
                    event_type,
                    format!("No connection registered for CorpID {corp_id}, AgentID {agent_id}"),
                    json!({
                        "corpId": corp_id,
                        "agentId": agent_id,
                        "stage": Stage::Resolving,
                    }),
                )
                .await;
            Err(CallbackError::ConnectionNotFound)
        }
        Err(e) => {
            error!(error = %e, "Failed to resolve connection");
            Err(e.into())
        }
    }
}

fn acknowledge() -> Response {
    debug!(stage = ?Stage::Acknowledging, "Acknowledging callback");
    plain_text(StatusCode::OK, "success")
}

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    if preview.len() < body.len() {
        preview.push_str("...");
    }
    preview
}
