//! Gmail REST backend
//!
//! Thin `reqwest` client over `users.messages.list`, `users.messages.get`
//! (`format=full`) and `users.messages.attachments.get`, authenticated with a
//! bearer token from the configured [`CredentialSource`].

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::GmailConfig;
use crate::credentials::{self, CredentialSource};
use crate::errors::{AppError, AppResult};
use crate::provider::{MailProvider, MailQuery, ProviderMessage};

/// Gmail API client for the `me` user
pub struct GmailProvider {
    client: Client,
    api_base: String,
    credentials: Arc<dyn CredentialSource>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    #[serde(default)]
    data: String,
}

impl GmailProvider {
    pub fn new(config: &GmailConfig) -> Self {
        Self::with_credentials(config.api_base.clone(), credentials::from_config(config))
    }

    pub fn with_credentials(
        api_base: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            credentials,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/gmail/v1/users/me/messages", self.api_base)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let token = self.credentials.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose_secret())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(format!("gmail resource not found: {url}")));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Unauthorized(format!(
                    "gmail rejected the credential ({status})"
                )));
            }
            _ => return Err(AppError::Upstream(format!("gmail returned {status}"))),
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid gmail response: {e}")))
    }
}

impl MailProvider for GmailProvider {
    async fn list_message_ids(
        &self,
        query: &MailQuery,
        max_results: usize,
    ) -> AppResult<Vec<String>> {
        let q = query.to_gmail_query();
        debug!(query = %q, max_results, "gmail messages.list");
        let list: ListResponse = self
            .get_json(
                &self.messages_url(),
                &[("q", q), ("maxResults", max_results.to_string())],
            )
            .await?;
        Ok(list
            .messages
            .into_iter()
            .take(max_results)
            .map(|m| m.id)
            .collect())
    }

    async fn get_message(&self, id: &str) -> AppResult<ProviderMessage> {
        let url = format!("{}/{}", self.messages_url(), urlencoding::encode(id));
        self.get_json(&url, &[("format", "full".to_owned())]).await
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> AppResult<String> {
        let url = format!(
            "{}/{}/attachments/{}",
            self.messages_url(),
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        );
        let att: AttachmentResponse = self.get_json(&url, &[]).await?;
        Ok(att.data)
    }
}
