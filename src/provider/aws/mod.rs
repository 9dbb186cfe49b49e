//! Contact-center REST provider
//!
//! Implements `ChatService` against the initiation endpoint (SigV4-signed)
//! and the participant endpoint (bearer-token authenticated).

pub mod sigv4;

use crate::config::{AwsCredentials, ChatConfig};
use crate::error::{ChatError, Result};
use crate::provider::ChatService;
use crate::types::{
    ChatContact, ConnectionDescriptor, ConnectionToken, CreateParticipantConnectionRequest,
    CreateParticipantConnectionResponse, DisconnectParticipantRequest, ParticipantDetails,
    ParticipantToken, SendMessageRequest, ServiceErrorBody, StartChatContactRequest,
    StartChatContactResponse,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

const SIGNING_SERVICE: &str = "connect";
const BEARER_HEADER: &str = "X-Amz-Bearer";

/// Chat service backed by the contact-center REST API
pub struct AwsChatService {
    client: reqwest::Client,
    credentials: AwsCredentials,
    region: String,
    connect_endpoint: String,
    participant_endpoint: String,
}

impl AwsChatService {
    /// Build a client from configuration, resolving credentials up front
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let credentials = config.credentials.resolve()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            credentials,
            region: config.region.clone(),
            connect_endpoint: config.connect_endpoint(),
            participant_endpoint: config.participant_endpoint(),
        })
    }

    async fn participant_call<B: Serialize, R: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        bearer: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{}", self.participant_endpoint, path);
        tracing::debug!(operation, url = %url, "Participant service call");

        let response = self
            .client
            .post(&url)
            .header(BEARER_HEADER, bearer)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(operation, e))?;

        read_response(operation, response).await
    }
}

#[async_trait]
impl ChatService for AwsChatService {
    async fn start_chat_contact(
        &self,
        instance_id: &str,
        contact_flow_id: &str,
        display_name: &str,
    ) -> Result<ChatContact> {
        const OPERATION: &str = "StartChatContact";
        const PATH: &str = "/contact/chat";

        let request = StartChatContactRequest {
            instance_id: instance_id.to_string(),
            contact_flow_id: contact_flow_id.to_string(),
            participant_details: ParticipantDetails {
                display_name: display_name.to_string(),
            },
            client_token: uuid::Uuid::new_v4().to_string(),
        };
        let body = serde_json::to_vec(&request)?;

        let host = host_of(&self.connect_endpoint)?;
        let signed = sigv4::sign(
            &sigv4::SignableRequest {
                method: "PUT",
                path: PATH,
                query: "",
                headers: vec![
                    ("host".to_string(), host),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
                body: &body,
            },
            &sigv4::SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: SIGNING_SERVICE,
                time: chrono::Utc::now(),
            },
        );

        let url = format!("{}{}", self.connect_endpoint, PATH);
        tracing::debug!(operation = OPERATION, url = %url, "Initiation service call");

        let mut builder = self
            .client
            .put(&url)
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in signed {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_send_error(OPERATION, e))?;
        let parsed: StartChatContactResponse = read_response(OPERATION, response).await?;

        tracing::info!(
            contact_id = ?parsed.contact_id,
            participant_id = ?parsed.participant_id,
            "Chat contact started"
        );
        Ok(parsed.into())
    }

    async fn create_participant_connection(
        &self,
        participant_token: &ParticipantToken,
    ) -> Result<ConnectionDescriptor> {
        let response: CreateParticipantConnectionResponse = self
            .participant_call(
                "CreateParticipantConnection",
                "/participant/connection",
                participant_token.expose(),
                &CreateParticipantConnectionRequest::default(),
            )
            .await?;
        Ok(response.into())
    }

    async fn send_message(
        &self,
        connection_token: &ConnectionToken,
        content_type: &str,
        content: &str,
    ) -> Result<()> {
        let request = SendMessageRequest {
            content_type: content_type.to_string(),
            content: content.to_string(),
            client_token: uuid::Uuid::new_v4().to_string(),
        };
        let _: serde_json::Value = self
            .participant_call(
                "SendMessage",
                "/participant/message",
                connection_token.expose(),
                &request,
            )
            .await?;
        Ok(())
    }

    async fn disconnect_participant(&self, connection_token: &ConnectionToken) -> Result<()> {
        let request = DisconnectParticipantRequest {
            client_token: uuid::Uuid::new_v4().to_string(),
        };
        let _: serde_json::Value = self
            .participant_call(
                "DisconnectParticipant",
                "/participant/disconnect",
                connection_token.expose(),
                &request,
            )
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "aws"
    }
}

fn map_send_error(operation: &str, e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(format!("{} request timed out", operation))
    } else {
        ChatError::Http(e)
    }
}

/// Turn a service response into a typed body or a `ChatError::Service`
async fn read_response<R: DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<R> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ServiceErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(text);
        return Err(ChatError::Service {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
    Ok(serde_json::from_str(body)?)
}

/// Extract `host[:port]` from a base URL
fn host_of(endpoint: &str) -> Result<String> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| ChatError::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ChatError::Config(format!("endpoint '{}' has no host", endpoint)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
