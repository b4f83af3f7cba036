pub mod cert_manager;
pub mod common_service;
pub mod namespace_scope;
pub mod olm;
pub mod operand_request;

pub use cert_manager::{Certificate, CertificateSpec, CertificateStatus, Issuer, IssuerSpec};
pub use common_service::{
    BedrockOperator, CommonService, CommonServiceSpec, CommonServiceStatus, Condition,
    ConfigStatus,
};
pub use namespace_scope::{NamespaceScope, NamespaceScopeSpec};
pub use olm::{
    ClusterServiceVersion, OperatorGroup, OperatorGroupSpec, Subscription, SubscriptionSpec,
    SubscriptionStatus,
};
pub use operand_request::{OperandRequest, OperandRequestSpec, Request};
