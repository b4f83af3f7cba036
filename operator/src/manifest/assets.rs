//! Manifests applied during bootstrap and by the background tasks.
//!
//! `placeholder` is the services namespace; the `{{ ... }}` markers are filled
//! by [`super::render`]. Bump the `version` annotation to roll out a change
//! over an existing object.

pub const RBAC: &str = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: ibm-common-service-webhook
  namespace: placeholder
  annotations:
    version: "1"
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: ibm-common-service-webhook
  namespace: placeholder
  annotations:
    version: "1"
rules:
- apiGroups: [""]
  resources: ["configmaps", "secrets", "services"]
  verbs: ["get", "list", "watch", "create", "update", "patch"]
- apiGroups: ["operator.ibm.com"]
  resources: ["podpresets"]
  verbs: ["get", "list", "watch"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: ibm-common-service-webhook
  namespace: placeholder
  annotations:
    version: "1"
subjects:
- kind: ServiceAccount
  name: ibm-common-service-webhook
  namespace: placeholder
roleRef:
  kind: Role
  name: ibm-common-service-webhook
  apiGroup: rbac.authorization.k8s.io
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: secretshare
  namespace: placeholder
  annotations:
    version: "1"
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: secretshare-placeholder
  annotations:
    version: "1"
rules:
- apiGroups: [""]
  resources: ["configmaps", "secrets", "namespaces"]
  verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
- apiGroups: ["ibmcpcs.ibm.com"]
  resources: ["secretshares", "secretshares/status"]
  verbs: ["get", "list", "watch", "update", "patch"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: secretshare-placeholder
  annotations:
    version: "1"
subjects:
- kind: ServiceAccount
  name: secretshare
  namespace: placeholder
roleRef:
  kind: ClusterRole
  name: secretshare-placeholder
  apiGroup: rbac.authorization.k8s.io
"#;

pub const OPERATOR_GROUP: &str = r#"
apiVersion: operators.coreos.com/v1
kind: OperatorGroup
metadata:
  name: common-service
  namespace: placeholder
  annotations:
    version: "1"
spec:
  targetNamespaces:
  - placeholder
"#;

pub const NAMESPACE_SCOPE_SUBSCRIPTION: &str = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: Subscription
metadata:
  name: ibm-namespace-scope-operator
  namespace: placeholder
  annotations:
    version: "1"
spec:
  channel: v3
  installPlanApproval: Automatic
  name: ibm-namespace-scope-operator
  source: {{ CATALOG_NAME }}
  sourceNamespace: {{ CATALOG_NAMESPACE }}
"#;

pub const NAMESPACE_SCOPE_CR: &str = r#"
apiVersion: operator.ibm.com/v1
kind: NamespaceScope
metadata:
  name: common-service
  namespace: placeholder
  annotations:
    version: "1"
spec:
  configmapName: namespace-scope
  namespaceMembers:
  - placeholder
  restartLabels:
  - intent=projected
"#;

pub const NAMESPACE_SCOPE_CONFIGMAP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: namespace-scope
  namespace: placeholder
  annotations:
    version: "0"
    operator.ibm.com/cs-schema-version: cp3
data:
  namespaces: placeholder
"#;

pub const ODLM_SUBSCRIPTION: &str = r#"
apiVersion: operators.coreos.com/v1alpha1
kind: Subscription
metadata:
  name: operand-deployment-lifecycle-manager-app
  namespace: placeholder
  annotations:
    version: "1"
spec:
  channel: v3
  installPlanApproval: Automatic
  name: ibm-odlm
  source: {{ CATALOG_NAME }}
  sourceNamespace: {{ CATALOG_NAMESPACE }}
"#;

pub const WEBHOOK_DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: ibm-common-service-webhook
  namespace: placeholder
  labels:
    app.kubernetes.io/managed-by: ibm-common-service-operator
  annotations:
    version: "1"
spec:
  replicas: 1
  selector:
    matchLabels:
      name: ibm-common-service-webhook
  template:
    metadata:
      labels:
        name: ibm-common-service-webhook
    spec:
      serviceAccountName: ibm-common-service-webhook
      containers:
      - name: ibm-common-service-webhook
        image: {{ WEBHOOK_IMAGE }}
        imagePullPolicy: IfNotPresent
        env:
        - name: WATCH_NAMESPACE
          value: ""
        - name: OPERATOR_NAMESPACE
          value: placeholder
        resources:
          limits:
            cpu: 200m
            memory: 256Mi
          requests:
            cpu: 100m
            memory: 100Mi
---
apiVersion: v1
kind: Service
metadata:
  name: ibm-common-service-webhook
  namespace: placeholder
  annotations:
    version: "1"
spec:
  selector:
    name: ibm-common-service-webhook
  ports:
  - port: 443
    targetPort: 8443
"#;

pub const SECRETSHARE_DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: secretshare
  namespace: placeholder
  labels:
    app.kubernetes.io/managed-by: ibm-common-service-operator
  annotations:
    version: "1"
spec:
  replicas: 1
  selector:
    matchLabels:
      name: secretshare
  template:
    metadata:
      labels:
        name: secretshare
    spec:
      serviceAccountName: secretshare
      containers:
      - name: secretshare
        image: {{ SECRETSHARE_IMAGE }}
        imagePullPolicy: IfNotPresent
        env:
        - name: OPERATOR_NAMESPACE
          value: placeholder
        resources:
          limits:
            cpu: 500m
            memory: 512Mi
          requests:
            cpu: 200m
            memory: 200Mi
"#;

pub const OPERAND_REGISTRY: &str = r#"
apiVersion: operator.ibm.com/v1alpha1
kind: OperandRegistry
metadata:
  name: common-service
  namespace: placeholder
  annotations:
    version: "1"
spec:
  operators:
  - name: ibm-iam-operator
    namespace: placeholder
    channel: v3
    packageName: ibm-iam-operator
    sourceName: {{ CATALOG_NAME }}
    sourceNamespace: {{ CATALOG_NAMESPACE }}
    scope: public
  - name: ibm-cert-manager-operator
    namespace: placeholder
    channel: v3
    packageName: ibm-cert-manager-operator
    sourceName: {{ CATALOG_NAME }}
    sourceNamespace: {{ CATALOG_NAMESPACE }}
    scope: public
  - name: ibm-management-ingress-operator
    namespace: placeholder
    channel: v3
    packageName: ibm-management-ingress-operator-app
    sourceName: {{ CATALOG_NAME }}
    sourceNamespace: {{ CATALOG_NAMESPACE }}
    scope: public
  - name: ibm-licensing-operator
    namespace: placeholder
    channel: v3
    packageName: ibm-licensing-operator-app
    sourceName: {{ CATALOG_NAME }}
    sourceNamespace: {{ CATALOG_NAMESPACE }}
    scope: public
"#;

pub const OPERAND_CONFIG: &str = r#"
apiVersion: operator.ibm.com/v1alpha1
kind: OperandConfig
metadata:
  name: common-service
  namespace: placeholder
  annotations:
    version: "1"
spec:
  services:
  - name: ibm-iam-operator
    spec:
      authentication:
        replicas: 1
      pap:
        replicas: 1
      policycontroller: {}
  - name: ibm-cert-manager-operator
    spec:
      certManager: {}
      issuer: {}
      certificate: {}
  - name: ibm-management-ingress-operator
    spec:
      managementIngress: {}
  - name: ibm-licensing-operator
    spec:
      IBMLicensing:
        datasource: datacollector
"#;

pub const COMMON_SERVICE_CR: &str = r#"
apiVersion: operator.ibm.com/v3
kind: CommonService
metadata:
  name: common-service
  namespace: {{ OPERATOR_NAMESPACE }}
  annotations:
    version: "0"
spec:
  size: starterset
  servicesNamespace: placeholder
"#;

pub const CERT_MANAGER_CRS: &str = r#"
apiVersion: cert-manager.io/v1
kind: Issuer
metadata:
  name: cs-ss-issuer
  namespace: placeholder
  annotations:
    version: "1"
spec:
  selfSigned: {}
---
apiVersion: cert-manager.io/v1
kind: Certificate
metadata:
  name: cs-ca-certificate
  namespace: placeholder
  annotations:
    version: "1"
spec:
  secretName: cs-ca-certificate-secret
  secretTemplate:
    labels:
      ibm-cert-manager-operator/refresh-ca-chain: "true"
  issuerRef:
    name: cs-ss-issuer
    kind: Issuer
  commonName: cs-ca-certificate
  isCA: true
  duration: 17520h0m0s
  renewBefore: 720h0m0s
---
apiVersion: cert-manager.io/v1
kind: Issuer
metadata:
  name: cs-ca-issuer
  namespace: placeholder
  annotations:
    version: "1"
spec:
  ca:
    secretName: cs-ca-certificate-secret
"#;

/// Every embedded manifest, for sanity checks.
pub const ALL: &[(&str, &str)] = &[
    ("rbac", RBAC),
    ("operator-group", OPERATOR_GROUP),
    ("namespace-scope-subscription", NAMESPACE_SCOPE_SUBSCRIPTION),
    ("namespace-scope-cr", NAMESPACE_SCOPE_CR),
    ("namespace-scope-configmap", NAMESPACE_SCOPE_CONFIGMAP),
    ("odlm-subscription", ODLM_SUBSCRIPTION),
    ("webhook-deployment", WEBHOOK_DEPLOYMENT),
    ("secretshare-deployment", SECRETSHARE_DEPLOYMENT),
    ("operand-registry", OPERAND_REGISTRY),
    ("operand-config", OPERAND_CONFIG),
    ("common-service-cr", COMMON_SERVICE_CR),
    ("cert-manager-crs", CERT_MANAGER_CRS),
];
