//! Collaborator wiring for one process run

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use signing_key_renewal::prelude::*;
use signing_key_renewal::store::{AwsSecretsManagerConfig, AwsSecretsManagerStore};

/// Dispatcher plus whatever local mode needs to prepare the store
pub struct Runtime {
    pub dispatcher: Dispatcher,
    local: Option<LocalServices>,
}

struct LocalServices {
    store: Arc<InMemorySecretStore>,
    adapter: SecretStoreAdapter,
    client: CredentialClient,
    ttl_minutes: u32,
}

impl Runtime {
    /// Wire real services, or in-memory ones when `local` is set
    pub async fn build(config: &RenewalConfig, local: bool) -> anyhow::Result<Self> {
        let policy = config.policy()?;

        let (adapter, client, local) = if local {
            tracing::info!(mode = "local", "Using in-memory store and mock issuer");
            let store = Arc::new(InMemorySecretStore::new());
            let adapter = SecretStoreAdapter::new(store.clone(), config.kms_key_arn.clone());
            let client = CredentialClient::new(Arc::new(MockIssuer::new()));
            let services = LocalServices {
                store,
                adapter: adapter.clone(),
                client: client.clone(),
                ttl_minutes: policy.ttl_minutes(),
            };
            (adapter, client, Some(services))
        } else {
            let (adapter, client) = remote(config).await?;
            (adapter, client, None)
        };

        let sink: Arc<dyn MetricsSink> = if config.export_metrics {
            Arc::new(EmfSink::stdout(config.metrics_namespace.clone()))
        } else {
            Arc::new(TracingSink)
        };
        let reporter = OutcomeReporter::new(vec![sink], config.export_metrics);

        let dispatcher = Dispatcher::new(
            RenewalWorkflow::new(adapter.clone(), client.clone(), policy),
            RotationWorkflow::new(adapter, client, policy).with_mode(config.unchanged_key_mode),
            reporter,
            config.signing_key_secret_id.clone(),
        )
        .with_timeout(config.invocation_timeout());

        Ok(Self { dispatcher, local })
    }

    /// In local mode, make the store look like a rotation is underway
    ///
    /// Seeds a current key when the secret is empty, enables rotation and
    /// registers the request token as the pending version.
    pub async fn prepare(&self, invocation: &Invocation, now: DateTime<Utc>) -> anyhow::Result<()> {
        let (Some(local), Invocation::Rotation(request)) = (&self.local, invocation) else {
            return Ok(());
        };
        let secret_id = request.secret_id.as_str();

        if local.adapter.get_current_version(secret_id).await?.is_none() {
            let record = local.client.issue_signing_key(local.ttl_minutes, now).await?;
            local.adapter.put_current(secret_id, &record).await?;
        }
        local.store.enable_rotation(secret_id)?;

        let known = local
            .adapter
            .describe(secret_id)
            .await?
            .stages_of(&request.request_token)
            .is_some();
        if !known {
            local.store.begin_rotation(secret_id, &request.request_token)?;
        }

        tracing::debug!(
            secret_id,
            request_token = %request.request_token,
            "Prepared local store for rotation"
        );
        Ok(())
    }
}

async fn remote(config: &RenewalConfig) -> anyhow::Result<(SecretStoreAdapter, CredentialClient)> {
    config.validate_remote()?;

    let store = AwsSecretsManagerStore::new(AwsSecretsManagerConfig {
        region: config.secrets_manager_region.clone(),
        endpoint_url: config.secrets_manager_endpoint_url.clone(),
        ..AwsSecretsManagerConfig::default()
    })
    .await?;
    let adapter = SecretStoreAdapter::new(Arc::new(store), config.kms_key_arn.clone());

    let auth_secret = config
        .auth_token_secret_id
        .as_deref()
        .context("auth_token_secret_id is required")?;
    let auth_token = adapter
        .read_auth_token(auth_secret, config.auth_token_secret_key_name.as_deref())
        .await
        .context("failed to load the issuer auth token")?;

    let issuer = HttpSigningKeyIssuer::new(HttpIssuerConfig {
        endpoint: config.issuer_url()?,
        auth_token,
        timeout: config.issuer_timeout(),
    })?;

    Ok((adapter, CredentialClient::new(Arc::new(issuer))))
}
