use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use harvester_api::HarvesterClient;
use harvester_driver::{CreateFlags, HarvesterDriver, MachineConfig, MachineDriver, MachineStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Context {
    store: MachineStore,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(storage_path: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            store: MachineStore::new(storage_path),
            cancel,
        }
    }

    async fn connect(&self, config: MachineConfig) -> Result<HarvesterDriver<HarvesterClient>> {
        let client = HarvesterClient::login(
            config.endpoint(),
            &config.username,
            &config.password,
            config.insecure_skip_verify,
        )
        .await
        .with_context(|| format!("logging in to {}", config.endpoint()))?;

        Ok(HarvesterDriver::with_cancellation(
            config,
            client,
            self.store.clone(),
            self.cancel.clone(),
        ))
    }

    async fn open(&self, name: &str) -> Result<HarvesterDriver<HarvesterClient>> {
        let config = self.store.load(name).await?;
        self.connect(config).await
    }

    pub async fn create(&self, name: &str, flags: CreateFlags) -> Result<()> {
        if self.store.exists(name) {
            bail!(harvester_driver::Error::MachineExists(name.to_string()));
        }

        let config = MachineConfig::from_flags(name, flags)?;
        self.store.save(&config).await?;

        let mut driver = self.connect(config).await?;
        let result = driver.create().await;

        // keep whatever was resolved so `rm` can clean up after a failure
        self.store.save(driver.config()).await?;
        result.with_context(|| format!("creating machine {name}"))?;

        let ip = driver.config().ip_address.clone().unwrap_or_default();
        info!(machine = %name, ip = %ip, "machine created");
        println!("{ip}");
        Ok(())
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        self.open(name).await?.start().await?;
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        self.open(name).await?.stop().await?;
        Ok(())
    }

    pub async fn restart(&self, name: &str) -> Result<()> {
        self.open(name).await?.restart().await?;
        Ok(())
    }

    pub async fn kill(&self, name: &str) -> Result<()> {
        self.open(name).await?.kill().await?;
        Ok(())
    }

    pub async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let removed = match self.open(name).await {
            Ok(driver) => driver.remove().await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match removed {
            Ok(()) => {}
            Err(e) if force => warn!(machine = %name, error = %e, "removing local state anyway"),
            Err(e) => return Err(e.context(format!("removing machine {name}"))),
        }

        self.store.remove(name).await?;
        info!(machine = %name, "machine removed");
        Ok(())
    }

    pub async fn state(&self, name: &str) -> Result<()> {
        let state = self.open(name).await?.get_state().await?;
        println!("{state}");
        Ok(())
    }

    pub async fn ip(&self, name: &str) -> Result<()> {
        println!("{}", self.open(name).await?.get_ip().await?);
        Ok(())
    }

    pub async fn url(&self, name: &str) -> Result<()> {
        println!("{}", self.open(name).await?.get_url().await?);
        Ok(())
    }

    pub async fn ssh_hostname(&self, name: &str) -> Result<()> {
        println!("{}", self.open(name).await?.get_ssh_hostname().await?);
        Ok(())
    }

    pub async fn list(&self) -> Result<()> {
        for name in self.store.list().await? {
            let config = self.store.load(&name).await?;
            println!(
                "{}\t{}\t{}\t{}",
                name,
                config.endpoint(),
                config.namespace,
                config.ip_address.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }
}
