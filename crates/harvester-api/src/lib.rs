//! Typed Rust client for the Harvester REST API.
//!
//! Covers the subset needed to drive machines: login, virtual machines
//! (get, create, update, delete, start, stop, restart), virtual machine
//! instances (get), images (get) and key pairs (get).

mod types;

pub use types::*;

const API_PREFIX: &str = "/v1/harvester";
const LOGIN_PATH: &str = "/v3-public/localProviders/local?action=login";

const VM_RESOURCE: &str = "kubevirt.io.virtualmachines";
const VMI_RESOURCE: &str = "kubevirt.io.virtualmachineinstances";
const IMAGE_RESOURCE: &str = "harvesterhci.io.virtualmachineimages";
const KEYPAIR_RESOURCE: &str = "harvesterhci.io.keypairs";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("harvester api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("harvester api {endpoint}: not found")]
    NotFound { endpoint: &'static str, body: String },

    #[error("harvester api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

impl Error {
    /// Whether the requested resource does not exist on the cluster.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Harvester REST API, authenticated with a session token.
#[derive(Clone)]
pub struct HarvesterClient {
    endpoint: String,
    token: String,
    http: reqwest::Client,
}

impl HarvesterClient {
    /// Log in with local-provider credentials and keep the returned token.
    ///
    /// `endpoint` is the cluster base URL, e.g. `https://10.0.0.10:443`.
    /// Harvester ships self-signed certificates by default, hence
    /// `insecure_skip_verify`.
    pub async fn login(
        endpoint: impl Into<String>,
        username: &str,
        password: &str,
        insecure_skip_verify: bool,
    ) -> Result<Self> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()?;

        let resp = http
            .post(format!("{endpoint}{LOGIN_PATH}"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
                response_type: "token".into(),
            })
            .send()
            .await?;

        let login: LoginResponse = Self::check(resp, "login").await?.json().await?;
        tracing::debug!(endpoint = %endpoint, "harvester: logged in");

        Ok(Self {
            endpoint,
            token: login.token,
            http,
        })
    }

    #[cfg(test)]
    fn with_token(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn collection_url(&self, resource: &str) -> String {
        format!("{}{API_PREFIX}/{resource}", self.endpoint)
    }

    fn url(&self, resource: &str, namespace: &str, name: &str) -> String {
        format!("{}{API_PREFIX}/{resource}/{namespace}/{name}", self.endpoint)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::NotFound { endpoint, body });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    async fn action(&self, namespace: &str, name: &str, action: &str, endpoint: &'static str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(VM_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .query(&[("action", action)])
            .send()
            .await?;

        Self::check(resp, endpoint).await?;
        Ok(())
    }

    // ── Virtual machines ─────────────────────────────────────────────

    pub async fn get_vm(&self, namespace: &str, name: &str) -> Result<VirtualMachine> {
        let resp = self
            .http
            .get(self.url(VM_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, "get virtual machine")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn create_vm(&self, vm: &VirtualMachine) -> Result<VirtualMachine> {
        let resp = self
            .http
            .post(self.collection_url(VM_RESOURCE))
            .header("Authorization", self.auth())
            .json(vm)
            .send()
            .await?;

        Self::check(resp, "create virtual machine")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn update_vm(
        &self,
        namespace: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine> {
        let resp = self
            .http
            .put(self.url(VM_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .json(vm)
            .send()
            .await?;

        Self::check(resp, "update virtual machine")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Delete a VM together with the listed volumes.
    pub async fn delete_vm(&self, namespace: &str, name: &str, removed_disks: &[String]) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(VM_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .query(&[("removedDisks", removed_disks.join(","))])
            .send()
            .await?;

        Self::check(resp, "delete virtual machine").await?;
        Ok(())
    }

    pub async fn start_vm(&self, namespace: &str, name: &str) -> Result<()> {
        self.action(namespace, name, "start", "start virtual machine").await
    }

    pub async fn stop_vm(&self, namespace: &str, name: &str) -> Result<()> {
        self.action(namespace, name, "stop", "stop virtual machine").await
    }

    pub async fn restart_vm(&self, namespace: &str, name: &str) -> Result<()> {
        self.action(namespace, name, "restart", "restart virtual machine").await
    }

    // ── Virtual machine instances ────────────────────────────────────

    pub async fn get_vmi(&self, namespace: &str, name: &str) -> Result<VirtualMachineInstance> {
        let resp = self
            .http
            .get(self.url(VMI_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, "get virtual machine instance")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Images & key pairs ───────────────────────────────────────────

    pub async fn get_image(&self, namespace: &str, name: &str) -> Result<VirtualMachineImage> {
        let resp = self
            .http
            .get(self.url(IMAGE_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, "get image")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn get_keypair(&self, namespace: &str, name: &str) -> Result<KeyPair> {
        let resp = self
            .http
            .get(self.url(KEYPAIR_RESOURCE, namespace, name))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check(resp, "get key pair")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }
}
