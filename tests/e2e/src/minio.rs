//! MinIO container management for e2e tests

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client as S3Client;
use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use s3_consistency::config::StorageConfig;
use s3_consistency::storage::s3::S3Store;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MINIO_IMAGE: &str = "minio/minio:latest";
const MINIO_CONTAINER_NAME: &str = "s3-consistency-e2e-minio";
const MINIO_REGION: &str = "us-east-1";
const DEFAULT_ACCESS_KEY: &str = "minioadmin";
const DEFAULT_SECRET_KEY: &str = "minioadmin";
const DEFAULT_PORT: u16 = 9000;
const READY_ATTEMPTS: u32 = 30;

/// A MinIO server, either a container we manage or an external endpoint.
///
/// The container is left running after the tests so later runs reuse it.
pub struct MinioContainer {
    endpoint: String,
    access_key: String,
    secret_key: String,
    s3_client: S3Client,
}

impl MinioContainer {
    /// Start or connect to a MinIO container
    ///
    /// Environment variables:
    /// - `MINIO_ENDPOINT`: Use existing MinIO at this endpoint (for CI)
    /// - `MINIO_ACCESS_KEY`: Access key (default: minioadmin)
    /// - `MINIO_SECRET_KEY`: Secret key (default: minioadmin)
    pub async fn start() -> Result<Self> {
        let access_key =
            env::var("MINIO_ACCESS_KEY").unwrap_or_else(|_| DEFAULT_ACCESS_KEY.to_string());
        let secret_key =
            env::var("MINIO_SECRET_KEY").unwrap_or_else(|_| DEFAULT_SECRET_KEY.to_string());

        if let Ok(endpoint) = env::var("MINIO_ENDPOINT") {
            info!("Using existing MinIO at {}", endpoint);
            let s3_client = Self::create_s3_client(&endpoint, &access_key, &secret_key);
            Self::wait_for_minio(&s3_client).await?;

            return Ok(Self {
                endpoint,
                access_key,
                secret_key,
                s3_client,
            });
        }

        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker. Is Docker running?")?;

        if !Self::reuse_container(&docker).await? {
            Self::create_container(&docker, &access_key, &secret_key).await?;
        }

        let endpoint = format!("http://localhost:{}", DEFAULT_PORT);
        let s3_client = Self::create_s3_client(&endpoint, &access_key, &secret_key);
        Self::wait_for_minio(&s3_client).await?;

        Ok(Self {
            endpoint,
            access_key,
            secret_key,
            s3_client,
        })
    }

    /// Reuse a container left behind by an earlier run, starting it if stopped
    async fn reuse_container(docker: &Docker) -> Result<bool> {
        let containers = docker
            .list_containers::<String>(None)
            .await
            .context("Failed to list containers")?;

        let existing = containers.iter().find(|c| {
            c.names
                .as_ref()
                .map(|names| names.iter().any(|n| n.contains(MINIO_CONTAINER_NAME)))
                .unwrap_or(false)
        });

        let Some(container) = existing else {
            return Ok(false);
        };

        let id = container.id.clone().unwrap_or_default();
        info!("Found existing MinIO container: {}", id);

        let inspect = docker.inspect_container(&id, None).await?;
        let running = inspect
            .state
            .as_ref()
            .and_then(|s| s.running)
            .unwrap_or(false);
        if !running {
            info!("Starting stopped MinIO container");
            docker
                .start_container(&id, None::<StartContainerOptions<String>>)
                .await?;
        }

        Ok(true)
    }

    async fn create_container(docker: &Docker, access_key: &str, secret_key: &str) -> Result<()> {
        info!("Pulling MinIO image...");
        let mut stream = docker.create_image(
            Some(CreateImageOptions {
                from_image: MINIO_IMAGE,
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                warn!("Image pull warning: {}", e);
            }
        }

        info!("Creating MinIO container...");
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            "9000/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(DEFAULT_PORT.to_string()),
            }]),
        );

        let env_user = format!("MINIO_ROOT_USER={}", access_key);
        let env_pass = format!("MINIO_ROOT_PASSWORD={}", secret_key);
        let config = Config {
            image: Some(MINIO_IMAGE),
            env: Some(vec![env_user.as_str(), env_pass.as_str()]),
            cmd: Some(vec!["server", "/data"]),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: MINIO_CONTAINER_NAME,
                    platform: None,
                }),
                config,
            )
            .await
            .context("Failed to create MinIO container")?;

        docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start MinIO container")?;

        info!("MinIO container started: {}", container.id);
        Ok(())
    }

    fn create_s3_client(endpoint: &str, access_key: &str, secret_key: &str) -> S3Client {
        let credentials = Credentials::new(access_key, secret_key, None, None, "e2e");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(MINIO_REGION))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        S3Client::from_conf(config)
    }

    async fn wait_for_minio(client: &S3Client) -> Result<()> {
        info!("Waiting for MinIO to be ready...");
        let mut attempts = 0;

        loop {
            match client.list_buckets().send().await {
                Ok(_) => {
                    info!("MinIO is ready");
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= READY_ATTEMPTS {
                        return Err(anyhow::anyhow!(
                            "MinIO failed to become ready after {} attempts: {}",
                            READY_ATTEMPTS,
                            e
                        ));
                    }
                    debug!("MinIO not ready yet (attempt {}): {}", attempts, e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Create a uniquely named bucket
    pub async fn create_test_bucket(&self) -> Result<TestBucket> {
        let bucket_name = format!("consistency-{}", Uuid::new_v4());

        self.s3_client
            .create_bucket()
            .bucket(&bucket_name)
            .send()
            .await
            .context("Failed to create test bucket")?;

        info!("Created test bucket: {}", bucket_name);

        Ok(TestBucket {
            name: bucket_name,
            s3_client: self.s3_client.clone(),
        })
    }

    /// Storage settings pointing the crate's S3 client at this server
    pub fn storage_config(&self, bucket: &str) -> StorageConfig {
        StorageConfig {
            bucket: bucket.to_string(),
            region: Some(MINIO_REGION.to_string()),
            endpoint: Some(self.endpoint.clone()),
            force_path_style: true,
            profile: None,
            access_key: Some(self.access_key.clone()),
            secret_key: Some(self.secret_key.clone()),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// A client with its own connection pool, for use on another runtime
    pub fn new_client(&self) -> S3Client {
        Self::create_s3_client(&self.endpoint, &self.access_key, &self.secret_key)
    }
}

/// A bucket owned by one harness, verified with the raw SDK client
pub struct TestBucket {
    pub name: String,
    s3_client: S3Client,
}

impl TestBucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The same bucket accessed through `client`
    pub fn with_client(&self, client: S3Client) -> TestBucket {
        TestBucket {
            name: self.name.clone(),
            s3_client: client,
        }
    }

    /// The crate's store implementation over this bucket
    pub fn store(&self) -> S3Store {
        S3Store::from_client(self.s3_client.clone(), self.name.clone())
    }

    /// List keys under `prefix`, bypassing the crate under test
    pub async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self.s3_client.list_objects_v2().bucket(&self.name);

            if let Some(p) = prefix {
                request = request.prefix(p);
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await?;

            for obj in response.contents.unwrap_or_default() {
                if let Some(key) = obj.key {
                    objects.push(key);
                }
            }

            if response.is_truncated.unwrap_or(false) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// Check if an object exists
    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        match self
            .s3_client
            .head_object()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every object under `prefix`
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let objects = self.list_objects(Some(prefix)).await?;
        for key in &objects {
            self.s3_client
                .delete_object()
                .bucket(&self.name)
                .key(key)
                .send()
                .await
                .context("Failed to delete object")?;
        }
        Ok(objects.len())
    }

    /// Delete all objects and the bucket
    pub async fn cleanup(self) -> Result<()> {
        info!("Cleaning up test bucket: {}", self.name);

        self.delete_prefix("").await?;

        self.s3_client
            .delete_bucket()
            .bucket(&self.name)
            .send()
            .await
            .context("Failed to delete bucket")?;

        Ok(())
    }
}
