// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP control plane client for Proxmox VE clusters.
//!
//! Talks to the node API over HTTPS with API token authentication.
//! Every response arrives wrapped in a `data` envelope; mutating calls
//! answer with the UPID of the task the node spawned.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::traits::*;

/// Connection settings for one cluster endpoint.
#[derive(Debug, Clone)]
pub struct ProxmoxClientConfig {
    /// Host name or address of the cluster API endpoint.
    pub host: String,
    /// API token id in `user@realm!tokenid` form.
    pub token_id: String,
    /// Secret belonging to the token id.
    pub token_secret: String,
    /// Accept self-signed certificates. Common on lab clusters.
    pub insecure_tls: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ProxmoxClientConfig {
    /// Settings with the default timeout and strict TLS.
    pub fn new(
        host: impl Into<String>,
        token_id: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            token_id: token_id.into(),
            token_secret: token_secret.into(),
            insecure_tls: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Control plane implementation backed by the Proxmox VE HTTP API.
pub struct ProxmoxClient {
    http: reqwest::Client,
    base_url: Url,
    auth_header: String,
}

impl ProxmoxClient {
    /// Create a client for the given cluster endpoint.
    pub fn new(config: ProxmoxClientConfig) -> Result<Self> {
        let base_url = Url::parse(&format!("https://{}:8006/api2/json/", config.host))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        let auth_header = format!("PVEAPIToken={}={}", config.token_id, config.token_secret);

        Ok(Self {
            http,
            base_url,
            auth_header,
        })
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    async fn request(
        &self,
        method: Method,
        path: &str,
        params: Option<&[(String, String)]>,
    ) -> Result<Value> {
        let url = self.base_url.join(path)?;
        debug!(method = %method, path, "Cluster API request");

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, &self.auth_header);
        if let Some(params) = params {
            request = request.form(params);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ControlPlaneError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ControlPlaneError::UnexpectedResponse(e.to_string()))?;

        // The API wraps every payload in a "data" envelope.
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        self.request(Method::POST, path, Some(params)).await
    }

    async fn put(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        self.request(Method::PUT, path, Some(params)).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None).await
    }

    fn task_ref(&self, node: &str, data: Value) -> Result<TaskRef> {
        let upid = data.as_str().ok_or_else(|| {
            ControlPlaneError::UnexpectedResponse(format!("expected UPID string, got {data}"))
        })?;
        Ok(TaskRef {
            node: node.to_string(),
            upid: upid.to_string(),
        })
    }
}

/// Flatten a JSON object into form parameters.
///
/// Strings are passed through unquoted; numbers and booleans use their
/// JSON rendering; nulls are dropped. Nested values are rejected because
/// the node API only takes scalar parameters.
fn form_params(params: &Value) -> Result<Vec<(String, String)>> {
    let object = params.as_object().ok_or_else(|| {
        ControlPlaneError::InvalidRequest("creation parameters must be a JSON object".to_string())
    })?;

    let mut pairs = Vec::with_capacity(object.len());
    for (key, value) in object {
        match value {
            Value::Null => {}
            Value::String(s) => pairs.push((key.clone(), s.clone())),
            Value::Bool(_) | Value::Number(_) => pairs.push((key.clone(), value.to_string())),
            Value::Array(_) | Value::Object(_) => {
                return Err(ControlPlaneError::InvalidRequest(format!(
                    "parameter '{key}' must be a scalar"
                )));
            }
        }
    }
    Ok(pairs)
}

#[async_trait]
impl ControlPlane for ProxmoxClient {
    async fn read_nodes(&self) -> Result<Vec<NodeInfo>> {
        let data = self.get("nodes").await?;
        decode(data)
    }

    async fn read_cluster_vms(&self) -> Result<Vec<ClusterVm>> {
        let data = self.get("cluster/resources?type=vm").await?;
        decode(data)
    }

    async fn read_vm_config(&self, node: &str, vmid: i64) -> Result<Value> {
        self.get(&format!("nodes/{node}/qemu/{vmid}/config")).await
    }

    async fn read_task_status(&self, task: &TaskRef) -> Result<RemoteTaskStatus> {
        let data = self
            .get(&format!(
                "nodes/{}/tasks/{}/status",
                task.node,
                urlencoding::encode(&task.upid)
            ))
            .await?;
        decode(data)
    }

    async fn read_metrics_series(
        &self,
        node: &str,
        vmid: i64,
        timeframe: MetricTimeframe,
    ) -> Result<Vec<MetricSample>> {
        let data = self
            .get(&format!(
                "nodes/{node}/qemu/{vmid}/rrddata?timeframe={}",
                timeframe.as_str()
            ))
            .await?;
        decode(data)
    }

    async fn read_backups(&self, node: &str, storage: &str) -> Result<Vec<BackupInfo>> {
        let data = self
            .get(&format!(
                "nodes/{node}/storage/{storage}/content?content=backup"
            ))
            .await?;
        decode(data)
    }

    async fn read_snapshots(&self, node: &str, vmid: i64) -> Result<Vec<SnapshotInfo>> {
        let data = self
            .get(&format!("nodes/{node}/qemu/{vmid}/snapshot"))
            .await?;
        decode(data)
    }

    async fn read_firewall_rules(&self, node: &str, vmid: i64) -> Result<Vec<FirewallRule>> {
        let data = self
            .get(&format!("nodes/{node}/qemu/{vmid}/firewall/rules"))
            .await?;
        decode(data)
    }

    async fn read_guest_agent(&self, node: &str, vmid: i64, query: AgentQuery) -> Result<Value> {
        self.get(&format!(
            "nodes/{node}/qemu/{vmid}/agent/{}",
            query.endpoint()
        ))
        .await
    }

    #[instrument(skip(self, params))]
    async fn submit_create(&self, node: &str, params: &Value) -> Result<TaskRef> {
        let pairs = form_params(params)?;
        let data = self.post(&format!("nodes/{node}/qemu"), &pairs).await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_clone(
        &self,
        node: &str,
        template_vmid: i64,
        new_vmid: i64,
        name: &str,
        full: bool,
    ) -> Result<TaskRef> {
        let params = vec![
            ("newid".to_string(), new_vmid.to_string()),
            ("name".to_string(), name.to_string()),
            ("full".to_string(), if full { "1" } else { "0" }.to_string()),
        ];
        let data = self
            .post(&format!("nodes/{node}/qemu/{template_vmid}/clone"), &params)
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self, update))]
    async fn write_vm_config(
        &self,
        node: &str,
        vmid: i64,
        update: &VmConfigUpdate,
    ) -> Result<TaskRef> {
        let data = self
            .post(&format!("nodes/{node}/qemu/{vmid}/config"), &update.params())
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_resize(
        &self,
        node: &str,
        vmid: i64,
        disk: &str,
        size: &str,
    ) -> Result<TaskRef> {
        let params = vec![
            ("disk".to_string(), disk.to_string()),
            ("size".to_string(), size.to_string()),
        ];
        let data = self
            .put(&format!("nodes/{node}/qemu/{vmid}/resize"), &params)
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_migrate(
        &self,
        source_node: &str,
        vmid: i64,
        target_node: &str,
    ) -> Result<TaskRef> {
        let params = vec![
            ("target".to_string(), target_node.to_string()),
            ("online".to_string(), "1".to_string()),
            ("with-local-disks".to_string(), "1".to_string()),
        ];
        let data = self
            .post(&format!("nodes/{source_node}/qemu/{vmid}/migrate"), &params)
            .await?;
        self.task_ref(source_node, data)
    }

    #[instrument(skip(self))]
    async fn submit_power(&self, node: &str, vmid: i64, action: PowerAction) -> Result<TaskRef> {
        let data = self
            .post(
                &format!("nodes/{node}/qemu/{vmid}/status/{}", action.as_str()),
                &[],
            )
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_delete(&self, node: &str, vmid: i64) -> Result<TaskRef> {
        let data = self
            .delete(&format!("nodes/{node}/qemu/{vmid}?purge=1"))
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_backup(&self, node: &str, vmid: i64, storage: &str) -> Result<TaskRef> {
        let params = vec![
            ("vmid".to_string(), vmid.to_string()),
            ("storage".to_string(), storage.to_string()),
            ("mode".to_string(), "snapshot".to_string()),
            ("compress".to_string(), "zstd".to_string()),
        ];
        let data = self.post(&format!("nodes/{node}/vzdump"), &params).await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_restore(
        &self,
        node: &str,
        vmid: i64,
        volid: &str,
        storage: &str,
    ) -> Result<TaskRef> {
        let params = vec![
            ("vmid".to_string(), vmid.to_string()),
            ("archive".to_string(), volid.to_string()),
            ("storage".to_string(), storage.to_string()),
            ("force".to_string(), "1".to_string()),
        ];
        let data = self.post(&format!("nodes/{node}/qemu"), &params).await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn delete_backup(&self, node: &str, storage: &str, volid: &str) -> Result<TaskRef> {
        let data = self
            .delete(&format!(
                "nodes/{node}/storage/{storage}/content/{}",
                urlencoding::encode(volid)
            ))
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_snapshot(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef> {
        let params = vec![("snapname".to_string(), name.to_string())];
        let data = self
            .post(&format!("nodes/{node}/qemu/{vmid}/snapshot"), &params)
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn submit_rollback(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef> {
        let data = self
            .post(
                &format!(
                    "nodes/{node}/qemu/{vmid}/snapshot/{}/rollback",
                    urlencoding::encode(name)
                ),
                &[],
            )
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn delete_snapshot(&self, node: &str, vmid: i64, name: &str) -> Result<TaskRef> {
        let data = self
            .delete(&format!(
                "nodes/{node}/qemu/{vmid}/snapshot/{}",
                urlencoding::encode(name)
            ))
            .await?;
        self.task_ref(node, data)
    }

    #[instrument(skip(self))]
    async fn convert_to_template(&self, node: &str, vmid: i64) -> Result<TaskRef> {
        let data = self
            .post(&format!("nodes/{node}/qemu/{vmid}/template"), &[])
            .await?;
        self.task_ref(node, data)
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ControlPlaneError::UnexpectedResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_form_params_flattens_scalars() {
        let params = json!({
            "vmid": 105,
            "name": "vm-105",
            "cores": 2,
            "onboot": true,
            "description": null,
        });

        let mut pairs = form_params(&params).expect("params");
        pairs.sort();

        assert_eq!(
            pairs,
            vec![
                ("cores".to_string(), "2".to_string()),
                ("name".to_string(), "vm-105".to_string()),
                ("onboot".to_string(), "true".to_string()),
                ("vmid".to_string(), "105".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_params_rejects_non_objects() {
        let err = form_params(&json!([1, 2, 3])).expect_err("must fail");
        assert!(matches!(err, ControlPlaneError::InvalidRequest(_)));
    }

    #[test]
    fn test_form_params_rejects_nested_values() {
        let err = form_params(&json!({"net0": {"model": "virtio"}})).expect_err("must fail");
        assert!(matches!(err, ControlPlaneError::InvalidRequest(_)));
    }

    #[test]
    fn test_client_config_defaults() {
        let config =
            ProxmoxClientConfig::new("pve.example.com", "engine@pve!orchestrator", "s3cr3t");

        assert!(!config.insecure_tls);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_client_builds_from_config() {
        let client = ProxmoxClient::new(ProxmoxClientConfig::new(
            "pve.example.com",
            "engine@pve!orchestrator",
            "s3cr3t",
        ))
        .expect("client");

        assert_eq!(
            client.base_url.as_str(),
            "https://pve.example.com:8006/api2/json/"
        );
        assert_eq!(
            client.auth_header,
            "PVEAPIToken=engine@pve!orchestrator=s3cr3t"
        );
    }
}
