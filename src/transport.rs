use crate::{
    api::{HealthResponse, HttpReply, CLASSIFY_PATH, HEALTH_PATH, IMAGE_FIELD},
    error::TransportError,
    guard::CandidateImage,
};
use reqwest::{multipart, Body, Client, Url};
use std::{future::Future, time::Duration};
use tracing::{debug, info, warn};

pub const DEFAULT_ORIGIN: &str = "http://localhost:5500";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub origin: Url,
    /// Network level timeout, none by default.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(origin: &str) -> anyhow::Result<Self> {
        Ok(Self {
            origin: Url::parse(origin)?,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn classify_url(&self) -> anyhow::Result<Url> {
        Ok(self.origin.join(CLASSIFY_PATH)?)
    }

    pub fn health_url(&self) -> anyhow::Result<Url> {
        Ok(self.origin.join(HEALTH_PATH)?)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid url"),
            timeout: None,
        }
    }
}

/// Delivers one image to the classification endpoint and hands back the raw reply.
pub trait Transport: Send + Sync + 'static {
    fn classify(
        &self,
        image: &CandidateImage,
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send;

    /// Where requests go, used in connectivity messages.
    fn endpoint(&self) -> String;
}

pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
    classify_url: Url,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            classify_url: config.classify_url()?,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn health(&self) -> anyhow::Result<HealthResponse> {
        let url = self.config.health_url()?;
        let response = self.client.get(url).send().await?;
        let health = response.json::<HealthResponse>().await?;
        Ok(health)
    }

    fn image_part(image: &CandidateImage) -> multipart::Part {
        let part = || {
            multipart::Part::stream_with_length(
                Body::from(image.data.clone()),
                image.data.len() as u64,
            )
                .file_name(image.name.clone())
        };
        match part().mime_str(&image.media_type) {
            Ok(part) => part,
            Err(e) => {
                warn!(
                    "Declared media type {:?} is not a valid mime type: {}",
                    image.media_type, e
                );
                part()
            }
        }
    }
}

impl Transport for HttpTransport {
    async fn classify(&self, image: &CandidateImage) -> Result<HttpReply, TransportError> {
        let form = multipart::Form::new().part(IMAGE_FIELD, Self::image_part(image));

        info!(
            "Sending {} ({:.2} KB) to {}",
            image.name,
            image.size_in_kb(),
            self.classify_url
        );

        let transport_error = |status: Option<u16>| {
            move |e: reqwest::Error| TransportError {
                endpoint: self.endpoint(),
                reason: e.to_string(),
                status,
            }
        };

        let response = self
            .client
            .post(self.classify_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error(None))?;

        let status = response.status().as_u16();
        debug!("Response status: {}", status);
        let body = response
            .bytes()
            .await
            .map_err(transport_error(Some(status)))?;

        Ok(HttpReply { status, body })
    }

    fn endpoint(&self) -> String {
        self.config.origin.as_str().trim_end_matches('/').to_string()
    }
}
