//! Embedded manifests and the text substitution that targets them.

pub mod assets;

use kube::api::DynamicObject;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    config::OperatorConfig,
    error::{Error, Result},
};

/// Stand-in for the services namespace inside embedded manifests.
pub const NAMESPACE_PLACEHOLDER: &str = "placeholder";
pub const OPERATOR_NAMESPACE_PLACEHOLDER: &str = "{{ OPERATOR_NAMESPACE }}";
pub const WEBHOOK_IMAGE_PLACEHOLDER: &str = "{{ WEBHOOK_IMAGE }}";
pub const SECRETSHARE_IMAGE_PLACEHOLDER: &str = "{{ SECRETSHARE_IMAGE }}";
pub const CATALOG_NAME_PLACEHOLDER: &str = "{{ CATALOG_NAME }}";
pub const CATALOG_NAMESPACE_PLACEHOLDER: &str = "{{ CATALOG_NAMESPACE }}";

pub const VERSION_ANNOTATION: &str = "version";

/// Replaces every occurrence of `placeholder` with `namespace`.
pub fn namespacelize(text: &str, placeholder: &str, namespace: &str) -> String {
    text.replace(placeholder, namespace)
}

/// Fills every placeholder this operator knows about from `cfg`.
///
/// Longer placeholders go first so `placeholder` never eats part of another.
pub fn render(template: &str, cfg: &OperatorConfig) -> String {
    let text = template
        .replace(OPERATOR_NAMESPACE_PLACEHOLDER, &cfg.operator_namespace)
        .replace(WEBHOOK_IMAGE_PLACEHOLDER, &cfg.images.webhook)
        .replace(SECRETSHARE_IMAGE_PLACEHOLDER, &cfg.images.secretshare)
        .replace(CATALOG_NAME_PLACEHOLDER, &cfg.catalog_name)
        .replace(CATALOG_NAMESPACE_PLACEHOLDER, &cfg.catalog_namespace);
    namespacelize(&text, NAMESPACE_PLACEHOLDER, &cfg.services_namespace)
}

/// Decodes a (possibly multi-document) YAML or JSON manifest into objects.
/// Empty documents are skipped; every object needs apiVersion, kind and a name.
pub fn decode(text: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(doc)?;
        if value.is_null() {
            continue;
        }

        for field in ["apiVersion", "kind"] {
            if value.get(field).and_then(Value::as_str).is_none() {
                return Err(Error::InvalidManifest(format!("document without {field}")));
            }
        }
        if value.pointer("/metadata/name").and_then(Value::as_str).is_none() {
            return Err(Error::InvalidManifest(format!(
                "{} without metadata.name",
                value["kind"].as_str().unwrap_or_default()
            )));
        }

        objects.push(serde_json::from_value(value)?);
    }
    Ok(objects)
}

/// The `version` annotation as an integer. Missing or unparseable is 0.
pub fn object_version(obj: &DynamicObject) -> u64 {
    obj.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(VERSION_ANNOTATION))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespacelize_replaces_every_occurrence() {
        let text = "metadata:\n  namespace: placeholder\nsubjects:\n- namespace: placeholder\n";
        let out = namespacelize(text, NAMESPACE_PLACEHOLDER, "ibm-common-services");
        assert!(!out.contains(NAMESPACE_PLACEHOLDER));
        assert_eq!(out.matches("ibm-common-services").count(), 2);
    }

    #[test]
    fn namespacelize_twice_is_stable_without_leftover_placeholder() {
        let text = "namespace: placeholder";
        let once = namespacelize(text, NAMESPACE_PLACEHOLDER, "cs");
        let twice = namespacelize(&once, NAMESPACE_PLACEHOLDER, "cs");
        assert_eq!(once, twice);

        // A replacement that reintroduces the placeholder keeps changing.
        let once = namespacelize(text, NAMESPACE_PLACEHOLDER, "placeholder-ns");
        assert!(once.contains(NAMESPACE_PLACEHOLDER));
        let twice = namespacelize(&once, NAMESPACE_PLACEHOLDER, "placeholder-ns");
        assert_ne!(once, twice);
    }

    #[test]
    fn render_fills_images_and_catalog() {
        let mut cfg = OperatorConfig::new("cs-op");
        cfg.images.webhook = "quay.io/x/webhook:9".into();
        let out = render(
            "image: {{ WEBHOOK_IMAGE }}\nsource: {{ CATALOG_NAME }}\nns: placeholder\nop: {{ OPERATOR_NAMESPACE }}",
            &cfg,
        );
        assert_eq!(
            out,
            "image: quay.io/x/webhook:9\nsource: opencloud-operators\nns: ibm-common-services\nop: cs-op"
        );
    }

    #[test]
    fn decode_splits_documents_and_skips_empty_ones() {
        let objs = decode(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: a
  annotations:
    version: "3"
---
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: b
"#,
        )
        .unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(object_version(&objs[0]), 3);
        assert_eq!(object_version(&objs[1]), 0);
        assert_eq!(objs[1].types.as_ref().unwrap().kind, "ServiceAccount");
    }

    #[test]
    fn decode_rejects_nameless_objects() {
        let err = decode("apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n").unwrap_err();
        assert!(matches!(err, Error::InvalidManifest(_)));
    }

    #[test]
    fn every_embedded_manifest_decodes() {
        let cfg = OperatorConfig::new("cs-op");
        for (name, text) in assets::ALL {
            let objs = decode(&render(text, &cfg)).unwrap_or_else(|e| panic!("{name}: {e}"));
            assert!(!objs.is_empty(), "{name} is empty");
        }
    }
}
