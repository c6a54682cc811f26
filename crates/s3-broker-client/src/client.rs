//! S3 REST implementation of [`ObjectStorage`]

use crate::{
    sigv4::{canonical_query_string, sha256_hex, uri_encode, SigV4Signer, SigningRequest},
    types::*,
    xml, ClientError, Config, ObjectStorage, Result, DEFAULT_REGION,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use reqwest::{header, Client, Method, Response};
use tracing::{debug, instrument, warn};
use url::Url;

/// S3 client speaking the REST API with path-style addressing
pub struct S3Client {
    config: Config,
    http: Client,
    base: Url,
    signer: Option<SigV4Signer>,
}

impl S3Client {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let base = Url::parse(config.base_url())
            .map_err(|e| ClientError::Config(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
        if base.host_str().is_none() {
            return Err(ClientError::Config(format!(
                "endpoint has no host: {}",
                config.endpoint
            )));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(ClientError::Http)?;

        let signer = config
            .credentials
            .clone()
            .map(|credentials| SigV4Signer::new(credentials, config.region.clone()));

        Ok(Self {
            config,
            http,
            base,
            signer,
        })
    }

    /// Create an anonymous client for an endpoint
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(Config::new(endpoint))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Helper Methods ====================

    fn host(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    async fn request(
        &self,
        method: Method,
        bucket: &str,
        query: &[(String, String)],
        headers: Vec<(&str, String)>,
        body: Option<Bytes>,
    ) -> Result<Response> {
        let path = format!("{}/{}", self.base.path().trim_end_matches('/'), bucket);
        let query_string = canonical_query_string(query);
        let host = self.host();

        let mut url = format!("{}://{}{}", self.base.scheme(), host, uri_encode(&path, false));
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        let payload_sha256 = sha256_hex(body.as_deref().unwrap_or_default());

        let mut req = self.http.request(method.clone(), &url);

        if let Some(signer) = &self.signer {
            let signing = SigningRequest {
                method: method.as_str(),
                host: &host,
                path: &path,
                query,
                headers: &headers,
                payload_sha256: &payload_sha256,
            };
            for (name, value) in signer.sign(&signing, Utc::now())? {
                req = req.header(name, value);
            }
        }

        for (name, value) in headers {
            req = req.header(name, value);
        }

        if let Some(data) = body {
            req = req.body(data);
        }

        debug!("Sending {} request to {}", method, url);
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::from_s3_xml(&text, status.as_u16()));
        }

        Ok(response)
    }
}

#[async_trait]
impl ObjectStorage for S3Client {
    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        let mut query = vec![
            ("encoding-type".to_string(), xml::URL_ENCODING.to_string()),
            ("max-keys".to_string(), max_keys.to_string()),
        ];
        if let Some(marker) = marker {
            query.push(("marker".to_string(), marker.to_string()));
        }

        let response = self.request(Method::GET, bucket, &query, Vec::new(), None).await?;
        let text = response.text().await?;
        xml::parse_object_page(&text)
    }

    #[instrument(skip(self, objects), fields(count = objects.len()))]
    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<()> {
        if objects.is_empty() {
            return Ok(());
        }

        let body = xml::delete_request(objects)?;
        let content_md5 = STANDARD.encode(Md5::digest(body.as_bytes()));
        let headers = vec![
            ("content-md5", content_md5),
            ("content-type", "application/xml".to_string()),
        ];
        let query = vec![("delete".to_string(), String::new())];

        let response = self
            .request(Method::POST, bucket, &query, headers, Some(Bytes::from(body)))
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let errors = xml::parse_delete_errors(&text)?;
        match errors.first() {
            None => Ok(()),
            Some(first) => {
                warn!(
                    failed = errors.len(),
                    key = %first.key,
                    code = %first.code,
                    "Batch delete left objects behind"
                );
                Err(ClientError::s3(status, first.code.clone(), first.message.clone()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionPage> {
        let mut query = vec![
            ("versions".to_string(), String::new()),
            ("encoding-type".to_string(), xml::URL_ENCODING.to_string()),
        ];
        if let Some(marker) = key_marker {
            query.push(("key-marker".to_string(), marker.to_string()));
        }
        if let Some(marker) = version_id_marker {
            query.push(("version-id-marker".to_string(), marker.to_string()));
        }

        let response = self.request(Method::GET, bucket, &query, Vec::new(), None).await?;
        let text = response.text().await?;
        xml::parse_version_page(&text)
    }

    #[instrument(skip(self))]
    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        let query = vec![("location".to_string(), String::new())];
        let response = self.request(Method::GET, bucket, &query, Vec::new(), None).await?;
        let text = response.text().await?;
        xml::parse_location(&text)
    }

    #[instrument(skip(self))]
    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        // us-east-1 rejects an explicit location constraint
        let body = if self.config.region.is_empty() || self.config.region == DEFAULT_REGION {
            None
        } else {
            Some(Bytes::from(xml::create_bucket_configuration(&self.config.region)?))
        };

        let response = self.request(Method::PUT, bucket, &[], Vec::new(), body).await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("/{}", bucket));

        Ok(location)
    }

    #[instrument(skip(self, policy))]
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        let query = vec![("policy".to_string(), String::new())];
        let headers = vec![("content-type", "application/json".to_string())];
        self.request(
            Method::PUT,
            bucket,
            &query,
            headers,
            Some(Bytes::copy_from_slice(policy.as_bytes())),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.request(Method::DELETE, bucket, &[], Vec::new(), None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_endpoint() {
        let err = S3Client::with_endpoint("not a url").err().unwrap();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_host_keeps_explicit_port() {
        let client = S3Client::with_endpoint("http://127.0.0.1:9000/").unwrap();
        assert_eq!(client.host(), "127.0.0.1:9000");

        let client = S3Client::with_endpoint("https://s3.amazonaws.com").unwrap();
        assert_eq!(client.host(), "s3.amazonaws.com");
    }
}
