//! Inbound webhook adapter — Twilio form POST in, TwiML out.
//!
//! The raw sender address crosses into derived forms right here, at the
//! edge; the engine only ever sees the contact handle and sealed phone.
//! Storage failures become a generic retry-safe reply (SMS semantics
//! already give us retry), never a 5xx the provider would give up on.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tracing::error;

use crate::crypto::PhoneVault;
use crate::engine::{Engine, prompts};

/// Shared state for the SMS routes.
#[derive(Clone)]
pub struct SmsRouteState {
    pub engine: Arc<Engine>,
    pub vault: Arc<PhoneVault>,
}

/// Twilio's inbound message webhook payload (the fields we use).
#[derive(Debug, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

/// POST /sms
///
/// Handles one inbound message and answers with TwiML. An empty engine
/// reply produces an empty `<Response/>` (no outbound message).
async fn incoming_sms(
    State(state): State<SmsRouteState>,
    Form(form): Form<SmsForm>,
) -> impl IntoResponse {
    let contact = state.vault.contact(&form.from);
    let reply = match state
        .engine
        .handle_message(&contact, form.body.trim())
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "Engine failed to handle inbound message");
            prompts::TEMPORARY_FAILURE.to_string()
        }
    };

    (
        [(header::CONTENT_TYPE, "application/xml")],
        twiml_reply(&reply),
    )
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

/// Build the SMS webhook routes.
pub fn sms_routes(state: SmsRouteState) -> Router {
    Router::new()
        .route("/sms", post(incoming_sms))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Render a reply as TwiML. Empty reply means "send nothing".
fn twiml_reply(reply: &str) -> String {
    if reply.is_empty() {
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response/>".to_string()
    } else {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            xml_escape(reply)
        )
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
