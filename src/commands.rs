// Command flows: select, refresh and config

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::{
    DeviceAuthorizationDriver, FileTokenStore, HttpOidcClient, SystemBrowser, SystemClock,
    TokenLifecycleManager,
};
use crate::config::{expand_tilde, Command, Config, ConfigAction};
use crate::credentials_file::write_profile;
use crate::profiles::{to_yaml, ConfigStore, Profile, SsoConfig};
use crate::prompt::{numbered, Prompt};
use crate::sso::SsoPortalClient;
use crate::usage::{LastUsage, UsageCache};

pub const DEFAULT_CONFIG_NAME: &str = "default";

fn names_or_default(names: &[String]) -> Vec<String> {
    if names.is_empty() {
        vec![DEFAULT_CONFIG_NAME.to_string()]
    } else {
        names.to_vec()
    }
}

/// Authenticated portal access for one configuration
struct Session {
    portal: SsoPortalClient,
    access_token: String,
}

/// Credential profile the flow writes to
struct Target {
    profile: String,
    region: String,
}

pub struct App<'a> {
    config: &'a Config,
    prompt: &'a dyn Prompt,
    cancel: CancellationToken,
    configs: ConfigStore,
    usage: UsageCache,
}

impl<'a> App<'a> {
    pub fn new(config: &'a Config, prompt: &'a dyn Prompt, cancel: CancellationToken) -> Self {
        let paths = &config.paths;
        Self {
            config,
            prompt,
            cancel,
            configs: ConfigStore::new(paths.internal_dir.clone(), paths.config_file.clone()),
            usage: UsageCache::new(paths.usage_file.clone()),
        }
    }

    /// Run the parsed command
    pub async fn run(&self) -> Result<()> {
        match &self.config.command {
            Command::Select { config_name } => {
                self.select(config_name.as_deref().unwrap_or(DEFAULT_CONFIG_NAME))
                    .await
            }
            Command::Refresh { config_names } => {
                self.refresh(&names_or_default(config_names)).await
            }
            Command::Config {
                action,
                config_names,
            } => match action {
                None => self.configure(&names_or_default(config_names)),
                Some(ConfigAction::Get) => {
                    print!("{}", to_yaml(&self.configs.read()?)?);
                    Ok(())
                }
                Some(ConfigAction::Export { file }) => {
                    let target = expand_tilde(file);
                    self.configs.export(&target)?;
                    println!("Configuration exported to {}", target.display());
                    Ok(())
                }
                Some(ConfigAction::Import { file }) => {
                    self.configs.import(&expand_tilde(file))?;
                    println!("Configuration imported from {}", file);
                    Ok(())
                }
                Some(ConfigAction::Remove { config_names }) => {
                    self.configs.remove(&names_or_default(config_names))
                }
            },
        }
    }

    /// Pick account and role on the portal and write their credentials
    pub async fn select(&self, config_name: &str) -> Result<()> {
        let sso = self.sso_config(config_name)?;
        let target = self.choose_profile(config_name, &sso)?;
        let session = self.session(config_name, &sso).await?;

        let usage = self.choose_account_and_role(config_name, &session).await?;
        self.apply(config_name, &session, usage, &target).await
    }

    /// Renew the last used credentials of every named configuration.
    /// Failures are collected and reported together.
    pub async fn refresh(&self, config_names: &[String]) -> Result<()> {
        let mut failures = Vec::new();

        for name in config_names {
            if self.cancel.is_cancelled() {
                failures.push(format!("{}: cancelled", name));
                continue;
            }
            if let Err(e) = self.refresh_one(name).await {
                tracing::error!("Refreshing '{}' failed: {:#}", name, e);
                failures.push(format!("{}: {:#}", name, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Refresh failed for {} configuration(s):\n{}",
                failures.len(),
                failures.join("\n")
            )
        }
    }

    async fn refresh_one(&self, config_name: &str) -> Result<()> {
        let sso = self.sso_config(config_name)?;
        let target = self.choose_profile(config_name, &sso)?;
        let mut recent: Vec<LastUsage> = self
            .usage
            .recent(config_name)
            .into_iter()
            .take(sso.last_used_accounts_count.max(1))
            .collect();

        let session = self.session(config_name, &sso).await?;

        let usage = match recent.len() {
            0 => {
                tracing::info!(
                    "No account used yet with '{}', selecting one",
                    config_name
                );
                self.choose_account_and_role(config_name, &session).await?
            }
            1 => recent.remove(0),
            _ => {
                let items: Vec<String> = recent
                    .iter()
                    .enumerate()
                    .map(|(i, usage)| usage.label(i))
                    .collect();
                let index = self
                    .prompt
                    .select("Select one of the last used accounts", &items)?;
                recent.swap_remove(index)
            }
        };

        self.apply(config_name, &session, usage, &target).await
    }

    /// Interactive create/edit of the named configurations
    pub fn configure(&self, config_names: &[String]) -> Result<()> {
        let mut configs = self.configs.read_or_default();

        for name in config_names {
            println!("Configuring '{}'", name);
            let current = configs
                .get(name)
                .cloned()
                .unwrap_or_else(|| SsoConfig::new("", ""));
            let edited = self.ask_config(name, &current)?;
            configs.insert(name.clone(), edited);
        }

        self.configs.write(&configs)?;
        println!("Configuration saved to {}", self.configs.path().display());
        Ok(())
    }

    fn ask_config(&self, name: &str, current: &SsoConfig) -> Result<SsoConfig> {
        let id = self
            .prompt
            .input("Start URL Id (https://<Id>.awsapps.com/start)", &current.id)?;
        anyhow::ensure!(!id.is_empty(), "Start URL Id cannot be empty");

        let sso_region = self.prompt.input("SSO Region", &current.sso_region)?;
        anyhow::ensure!(!sso_region.is_empty(), "SSO Region cannot be empty");

        let count = self.prompt.input(
            "How many last used accounts should be offered on refresh",
            &current.last_used_accounts_count.to_string(),
        )?;
        let last_used_accounts_count: usize = count
            .parse()
            .with_context(|| format!("Not a number: {}", count))?;

        let mut profiles = BTreeMap::new();
        loop {
            let default_profile = if profiles.is_empty() { "default" } else { "" };
            let profile = self.prompt.input("Profile name", default_profile)?;
            anyhow::ensure!(!profile.is_empty(), "Profile name cannot be empty");

            let default_region = current
                .profiles
                .get(&profile)
                .map(|p| p.region.clone())
                .unwrap_or_default();
            let region = self
                .prompt
                .input(&format!("Region for profile '{}'", profile), &default_region)?;
            anyhow::ensure!(
                !region.is_empty(),
                "Profile '{}' of configuration '{}' needs a region",
                profile,
                name
            );
            profiles.insert(profile, Profile { region });

            if !self
                .prompt
                .confirm("Do you wish to add another profile to this config?", false)?
            {
                break;
            }
        }

        Ok(SsoConfig {
            id,
            profiles,
            last_used_accounts_count,
            sso_region,
        })
    }

    /// Stored configuration, created interactively when missing
    fn sso_config(&self, config_name: &str) -> Result<SsoConfig> {
        if let Some(config) = self.configs.read_or_default().remove(config_name) {
            return Ok(config);
        }

        println!("No configuration named '{}' yet, let's create it", config_name);
        self.configure(&[config_name.to_string()])?;
        self.configs
            .read()?
            .remove(config_name)
            .with_context(|| format!("Configuration '{}' was not saved", config_name))
    }

    fn choose_profile(&self, config_name: &str, sso: &SsoConfig) -> Result<Target> {
        let names: Vec<&String> = sso.profiles.keys().collect();
        let profile = match names.as_slice() {
            [] => anyhow::bail!("Configuration '{}' has no profiles", config_name),
            [only] => (*only).clone(),
            _ => {
                let items = numbered(names.iter().map(|name| name.to_string()));
                let index = self.prompt.select("Select a profile", &items)?;
                names[index].clone()
            }
        };

        let region = sso.profiles[&profile].region.trim().to_string();
        anyhow::ensure!(
            !region.is_empty(),
            "Profile '{}' of configuration '{}' has no region",
            profile,
            config_name
        );

        Ok(Target { profile, region })
    }

    fn lifecycle_manager(&self, sso: &SsoConfig) -> Result<TokenLifecycleManager> {
        let oidc = match &self.config.oidc_endpoint {
            Some(endpoint) => HttpOidcClient::with_endpoint(endpoint.clone())?,
            None => HttpOidcClient::new(&sso.sso_region)?,
        };
        let driver = DeviceAuthorizationDriver::new(
            Arc::new(oidc),
            Arc::new(SystemBrowser),
            Arc::new(SystemClock),
            self.config.driver_options(),
        );
        let store = FileTokenStore::new(self.config.paths.token_store_file.clone());

        Ok(TokenLifecycleManager::new(driver, Arc::new(store)))
    }

    async fn session(&self, config_name: &str, sso: &SsoConfig) -> Result<Session> {
        let record = self
            .lifecycle_manager(sso)?
            .ensure_valid_credentials(config_name, &sso.start_url(), &self.cancel)
            .await?;

        let portal = match &self.config.portal_endpoint {
            Some(endpoint) => SsoPortalClient::with_endpoint(endpoint.clone())?,
            None => SsoPortalClient::new(&sso.sso_region)?,
        };

        Ok(Session {
            portal,
            access_token: record.access_token,
        })
    }

    async fn choose_account_and_role(
        &self,
        config_name: &str,
        session: &Session,
    ) -> Result<LastUsage> {
        let accounts = session.portal.list_accounts(&session.access_token).await?;
        anyhow::ensure!(
            !accounts.is_empty(),
            "No AWS accounts are assigned through configuration '{}'",
            config_name
        );

        let items = numbered(
            accounts
                .iter()
                .map(|a| format!("{} {}", a.account_name, a.account_id)),
        );
        let account = &accounts[self.prompt.select("Select an account", &items)?];

        let roles = session
            .portal
            .list_account_roles(&session.access_token, &account.account_id)
            .await?;
        let role = match roles.as_slice() {
            [] => anyhow::bail!("No roles available in account {}", account.account_name),
            [only] => {
                tracing::info!("Using the only available role {}", only.role_name);
                only
            }
            _ => {
                let items = numbered(roles.iter().map(|r| r.role_name.clone()));
                &roles[self.prompt.select("Select a role", &items)?]
            }
        };

        Ok(LastUsage {
            account_id: account.account_id.clone(),
            account_name: account.account_name.clone(),
            role: role.role_name.clone(),
        })
    }

    /// Fetch role credentials, write them and remember the combination
    async fn apply(
        &self,
        config_name: &str,
        session: &Session,
        usage: LastUsage,
        target: &Target,
    ) -> Result<()> {
        let credentials = session
            .portal
            .get_role_credentials(&session.access_token, &usage.account_id, &usage.role)
            .await?
            .into_profile(&target.region)?;

        write_profile(&self.config.paths.credentials_file, &target.profile, &credentials)?;

        tracing::info!(
            "Credentials for {} ({}) as {} written to profile [{}], valid until {}",
            usage.account_name,
            usage.account_id,
            usage.role,
            target.profile,
            credentials.expiration.to_rfc3339()
        );

        self.usage.record(config_name, usage)
    }
}
