//! Write forwarding: a thin HTTP client that hands a mutation to the current master.
//!
//! `Forwarder` never listens on a socket (the REST endpoint it posts to is out of scope for this
//! crate). It exists purely to turn the master's HTTP response (or lack of one) back into the same
//! [`RegistryError`] vocabulary a local call would have produced, so a caller sees identical
//! semantics regardless of which node it happened to reach.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::elector::Identity;
use crate::error::{ForwardingError, RegistryError};
use crate::model::SchemaId;

pub struct Forwarder {
    client: reqwest::Client,
}

impl Default for Forwarder {
    fn default() -> Self {
        Forwarder {
            client: reqwest::Client::new(),
        }
    }
}

impl Forwarder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `POST /subjects/{subject}/versions` on the master, returning the id it assigned.
    #[tracing::instrument(skip(self, schema_text, headers))]
    pub async fn forward_register(
        &self,
        master: &Identity,
        subject: &str,
        schema_text: &str,
        headers: &[(String, String)],
    ) -> Result<SchemaId, RegistryError> {
        #[derive(Deserialize)]
        struct RegisterResponse {
            id: SchemaId,
        }

        let url = format!(
            "http://{}:{}/subjects/{}/versions",
            master.host, master.port, subject
        );
        let response = self.send(&url, schema_text, headers).await?;
        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|err| ForwardingError::Network(err.into()))?;
        Ok(body.id)
    }

    async fn send(
        &self,
        url: &str,
        schema_text: &str,
        headers: &[(String, String)],
    ) -> Result<reqwest::Response, RegistryError> {
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "schema": schema_text }));
        let request = headers.iter().fold(request, |req, (k, v)| req.header(k, v));

        let response = request
            .send()
            .await
            .map_err(|err| ForwardingError::Network(err.into()))?;
        into_success(response).await
    }
}

/// Maps a non-2xx master response onto the error vocabulary the local path would have used.
async fn into_success(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::CONFLICT => Err(RegistryError::IncompatibleSchema),
        StatusCode::UNPROCESSABLE_ENTITY => Err(RegistryError::InvalidSchema),
        other => {
            let body = response.text().await.unwrap_or_default();
            Err(ForwardingError::UnexpectedStatus {
                status: other.as_u16(),
                body,
            }
            .into())
        }
    }
}
