//! Per-entity credential provisioning.
//!
//! No credential, no launch: every failure surfaces as
//! [`OssCrsError::Provisioning`] for the entity concerned, and the caller
//! decides whether that aborts the whole run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use osscrs_common::error::{OssCrsError, Result};
use osscrs_common::types::Budget;

use crate::gateway::{BudgetGateway, KeyRequest};

/// What an entity is entitled to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityGrant {
    /// Entity name; also the credential file name.
    pub name: String,
    /// Total budget across every worker.
    pub budget: Budget,
    /// Models the key may call.
    pub models: Vec<String>,
    /// Requests per minute.
    pub rpm_limit: Option<u32>,
}

/// Where keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// Ask the gateway for a fresh, budget-limited key per entity.
    Generate,
    /// Hand every entity the same pre-issued key; budgets are enforced by
    /// whoever issued it.
    External(String),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "Generate"),
            Self::External(_) => write!(f, "External(<redacted>)"),
        }
    }
}

/// A key persisted for one entity.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisionedCredential {
    /// Entity name.
    pub entity_name: String,
    /// The key itself.
    pub key: String,
    /// Budget the key was issued for.
    pub budget: Budget,
    /// Models the key may call.
    pub models: Vec<String>,
    /// File holding the key.
    pub path: PathBuf,
}

impl fmt::Debug for ProvisionedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedCredential")
            .field("entity_name", &self.entity_name)
            .field("key", &"<redacted>")
            .field("budget", &self.budget)
            .field("models", &self.models)
            .field("path", &self.path)
            .finish()
    }
}

/// Requests and persists credentials.
pub struct Provisioner<'a> {
    gateway: &'a dyn BudgetGateway,
    credential_dir: PathBuf,
    budget_duration: String,
    key_source: KeySource,
    alias_prefix: String,
}

impl fmt::Debug for Provisioner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("credential_dir", &self.credential_dir)
            .field("budget_duration", &self.budget_duration)
            .field("key_source", &self.key_source)
            .finish_non_exhaustive()
    }
}

impl<'a> Provisioner<'a> {
    /// Creates a provisioner writing into `credential_dir`. Key aliases are
    /// `<alias_prefix>-<entity>`.
    pub fn new(
        gateway: &'a dyn BudgetGateway,
        credential_dir: impl Into<PathBuf>,
        budget_duration: impl Into<String>,
        key_source: KeySource,
        alias_prefix: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            credential_dir: credential_dir.into(),
            budget_duration: budget_duration.into(),
            key_source,
            alias_prefix: alias_prefix.into(),
        }
    }

    /// Finds the declared models the gateway does not serve.
    ///
    /// Maps each missing model to the entities that declared it. The gateway
    /// is asked once, and only if some grant declares a model.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Gateway`] if the model list cannot be fetched.
    pub fn unavailable_models(
        &self,
        grants: &[EntityGrant],
    ) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let mut required: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for grant in grants {
            for model in &grant.models {
                let _ = required
                    .entry(model.clone())
                    .or_default()
                    .insert(grant.name.clone());
            }
        }
        if required.is_empty() {
            return Ok(required);
        }

        let served: BTreeSet<String> = self.gateway.models()?.into_iter().collect();
        required.retain(|model, _| !served.contains(model));
        if !required.is_empty() {
            tracing::warn!(
                missing = ?required.keys().collect::<Vec<_>>(),
                "declared models are not served by the gateway"
            );
        }
        Ok(required)
    }

    /// Provisions one entity.
    ///
    /// Returns `Ok(None)` for entities with no models.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Provisioning`] if a generated key would carry a
    /// zero budget, the gateway is unhealthy or refuses the key, or the key
    /// cannot be persisted.
    pub fn provision(&self, grant: &EntityGrant) -> Result<Option<ProvisionedCredential>> {
        if grant.models.is_empty() {
            tracing::info!(entity = %grant.name, "no models declared, skipping credential");
            return Ok(None);
        }
        if grant.budget.is_zero() && matches!(self.key_source, KeySource::Generate) {
            return Err(OssCrsError::Provisioning {
                entity: grant.name.clone(),
                message: "declares models but resolved to a zero budget".into(),
            });
        }

        let failed = |e: OssCrsError| OssCrsError::Provisioning {
            entity: grant.name.clone(),
            message: e.to_string(),
        };

        self.gateway.health().map_err(failed)?;
        let key = match &self.key_source {
            KeySource::External(key) => key.clone(),
            KeySource::Generate => {
                let request = KeyRequest {
                    models: grant.models.clone(),
                    max_budget: grant.budget.as_dollars(),
                    budget_duration: self.budget_duration.clone(),
                    key_alias: format!("{}-{}", self.alias_prefix, grant.name),
                    user_id: grant.name.clone(),
                    rpm_limit: grant.rpm_limit,
                };
                self.gateway.generate_key(&request).map_err(failed)?
            }
        };

        let path = persist_key(&self.credential_dir, &grant.name, &key).map_err(failed)?;
        tracing::info!(
            entity = %grant.name,
            budget = %grant.budget,
            path = %path.display(),
            "credential provisioned"
        );
        Ok(Some(ProvisionedCredential {
            entity_name: grant.name.clone(),
            key,
            budget: grant.budget,
            models: grant.models.clone(),
            path,
        }))
    }
}

/// Builds the error reporting every model in `missing` at once.
#[must_use]
pub fn unavailable_models_error(missing: &BTreeMap<String, BTreeSet<String>>) -> OssCrsError {
    OssCrsError::UnavailableModels {
        missing: missing
            .iter()
            .map(|(model, entities)| {
                let entities: Vec<&str> = entities.iter().map(String::as_str).collect();
                format!("{model} (required by {})", entities.join(", "))
            })
            .collect(),
    }
}

/// Writes `key` to `<dir>/<entity>` with mode 0600.
///
/// The key goes to a temporary file first and is renamed into place, so a
/// reader never sees a partial key.
///
/// # Errors
///
/// Returns [`OssCrsError::Io`] if the directory or file cannot be written.
pub fn persist_key(dir: &Path, entity: &str, key: &str) -> Result<PathBuf> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| OssCrsError::Io { path, source: e }
    };

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(io_err(dir))?;

    let target = dir.join(entity);
    let staging = dir.join(format!(".{entity}.tmp"));
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&staging)
        .map_err(io_err(&staging))?;
    file.write_all(key.as_bytes()).map_err(io_err(&staging))?;
    file.sync_all().map_err(io_err(&staging))?;
    drop(file);
    std::fs::rename(&staging, &target).map_err(io_err(&target))?;
    Ok(target)
}
