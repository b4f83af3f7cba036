//! Operator configuration assembled from the environment.
//!
//! Everything the background tasks, controllers and webhooks need to know
//! about "where" lives here and is passed down explicitly.

use std::{collections::BTreeSet, env, time::Duration};

use crate::error::{Error, Result};

pub const DEFAULT_SERVICES_NAMESPACE: &str = "ibm-common-services";
pub const KUBE_PUBLIC: &str = "kube-public";
pub const LEGACY_OPERATORS_NAMESPACE: &str = "openshift-operators";

pub const COMMON_SERVICE_NAME: &str = "common-service";
pub const CS_MAPS_CONFIGMAP: &str = "common-service-maps";
pub const CS_MAPS_KEY: &str = "common-service-maps.yaml";
pub const NAMESPACE_SCOPE_CONFIGMAP: &str = "namespace-scope";
pub const CPP_CONFIGMAP: &str = "ibm-cpp-config";
pub const STATUS_CONFIGMAP: &str = "ibm-common-services-status";

pub const DEFAULT_CATALOG_NAME: &str = "opencloud-operators";
pub const DEFAULT_CATALOG_NAMESPACE: &str = "openshift-marketplace";

pub const WEBHOOK_IMAGE_ENV: &str = "IBM_COMMON_SERVICE_WEBHOOK_IMAGE";
pub const SECRETSHARE_IMAGE_ENV: &str = "IBM_SECRETSHARE_OPERATOR_IMAGE";
pub const DEFAULT_WEBHOOK_IMAGE: &str = "icr.io/cpopen/common-service-webhook:latest";
pub const DEFAULT_SECRETSHARE_IMAGE: &str = "icr.io/cpopen/ibm-secretshare-operator:latest";

const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Images {
    pub webhook: String,
    pub secretshare: String,
}

impl Default for Images {
    fn default() -> Self {
        Images {
            webhook: DEFAULT_WEBHOOK_IMAGE.into(),
            secretshare: DEFAULT_SECRETSHARE_IMAGE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    pub webhooks: bool,
    pub cert_manager_cr: bool,
    pub deprecated_cleanup: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features {
            webhooks: true,
            cert_manager_cr: true,
            deprecated_cleanup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace this operator is deployed into.
    pub operator_namespace: String,
    /// Namespace the common services are installed into.
    pub services_namespace: String,
    /// Namespaces the operator watches; empty means cluster-wide.
    pub watch_namespaces: BTreeSet<String>,
    pub catalog_name: String,
    pub catalog_namespace: String,
    pub images: Images,
    pub features: Features,
    pub bootstrap_timeout: Duration,
}

impl OperatorConfig {
    pub fn new(operator_namespace: impl Into<String>) -> Self {
        OperatorConfig {
            operator_namespace: operator_namespace.into(),
            services_namespace: DEFAULT_SERVICES_NAMESPACE.into(),
            watch_namespaces: BTreeSet::new(),
            catalog_name: DEFAULT_CATALOG_NAME.into(),
            catalog_namespace: DEFAULT_CATALOG_NAMESPACE.into(),
            images: Images::default(),
            features: Features::default(),
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let operator_namespace = lookup("OPERATOR_NAMESPACE")
            .or_else(|| lookup("POD_NAMESPACE"))
            .filter(|ns| !ns.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("neither OPERATOR_NAMESPACE nor POD_NAMESPACE is set".into())
            })?;

        let mut cfg = OperatorConfig::new(operator_namespace.trim());
        cfg.watch_namespaces = lookup("WATCH_NAMESPACE")
            .map(|v| split_namespaces(&v))
            .unwrap_or_default();

        if let Some(name) = lookup("CATALOG_NAME").filter(|v| !v.is_empty()) {
            cfg.catalog_name = name;
        }
        if let Some(ns) = lookup("CATALOG_NAMESPACE").filter(|v| !v.is_empty()) {
            cfg.catalog_namespace = ns;
        }
        if let Some(image) = lookup(WEBHOOK_IMAGE_ENV).filter(|v| !v.is_empty()) {
            cfg.images.webhook = image;
        }
        if let Some(image) = lookup(SECRETSHARE_IMAGE_ENV).filter(|v| !v.is_empty()) {
            cfg.images.secretshare = image;
        }

        cfg.features.webhooks = flag(&lookup, "ENABLE_WEBHOOKS", true)?;
        cfg.features.cert_manager_cr = flag(&lookup, "ENABLE_CERT_MANAGER_CR", true)?;
        cfg.features.deprecated_cleanup = flag(&lookup, "ENABLE_DEPRECATED_CLEANUP", true)?;

        if let Some(secs) = lookup("BOOTSTRAP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::Config(format!("BOOTSTRAP_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            cfg.bootstrap_timeout = Duration::from_secs(secs);
        }

        Ok(cfg)
    }

    /// Whether `ns` is inside the watched set. An empty set watches everything.
    pub fn watches(&self, ns: &str) -> bool {
        self.watch_namespaces.is_empty() || self.watch_namespaces.contains(ns)
    }
}

pub fn split_namespaces(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(Error::Config(format!("{key} is not a boolean: {other}"))),
        },
    }
}
