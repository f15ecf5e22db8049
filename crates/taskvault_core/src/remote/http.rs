//! `reqwest` implementation of the task gateway.

use crate::auth::Credentials;
use crate::config::{normalize_base_url, ConfigError, CoreConfig};
use crate::logging::sanitize_message;
use crate::model::profile::UserProfile;
use crate::model::task::{ServerId, Task};
use crate::remote::gateway::{NewTask, RemoteTask, TaskGateway, TaskPatch};
use crate::remote::{RemoteError, RemoteResult};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// REST client for the `tasks/` collection.
pub struct HttpTaskGateway {
    client: Client,
    base_url: String,
    credentials: Arc<dyn Credentials>,
}

impl HttpTaskGateway {
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        credentials: Arc<dyn Credentials>,
    ) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(base_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn from_config(
        config: &CoreConfig,
        credentials: Arc<dyn Credentials>,
    ) -> Result<Self, ConfigError> {
        Self::new(&config.api_base_url, config.request_timeout, credentials)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RemoteResult<RequestBuilder> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(RemoteError::Unauthorized)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("event=remote_request module=remote method={method} path={path}");
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            sanitize_message(&body, MAX_ERROR_BODY_CHARS),
        ))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl TaskGateway for HttpTaskGateway {
    async fn list(&self) -> RemoteResult<Vec<Task>> {
        let request = self.request(Method::GET, "tasks/")?;
        let tasks: Vec<RemoteTask> = self.send_json(request).await?;
        Ok(tasks.into_iter().map(Task::from).collect())
    }

    async fn create(&self, task: &NewTask) -> RemoteResult<Task> {
        let request = self.request(Method::POST, "tasks/")?.json(task);
        let created: RemoteTask = self.send_json(request).await?;
        Ok(created.into())
    }

    async fn update(&self, id: ServerId, patch: &TaskPatch) -> RemoteResult<Task> {
        let request = self
            .request(Method::PATCH, &format!("tasks/{id}/update/"))?
            .json(patch);
        let updated: RemoteTask = self.send_json(request).await?;
        Ok(updated.into())
    }

    async fn delete(&self, id: ServerId) -> RemoteResult<()> {
        let request = self.request(Method::DELETE, &format!("tasks/{id}/"))?;
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_profile(&self) -> RemoteResult<UserProfile> {
        let request = self.request(Method::GET, "user/")?;
        self.send_json(request).await
    }
}
