use async_trait::async_trait;

use crate::domain::ExportParams;

/// Boundary hook invoked before a job is admitted (§1 "Payment/wallet
/// debiting ... a boundary hook invoked before a job is admitted"). Wallet
/// and quota logic live outside this crate; `submit` calls whatever
/// implementation the binary wires up and maps a rejection to `402`.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    async fn check(&self, owner: &str, params: &ExportParams) -> Result<(), String>;
}

/// Default gate for deployments with no external admission system: every
/// submission is admitted.
pub struct AllowAll;

#[async_trait]
impl AdmissionGate for AllowAll {
    async fn check(&self, _owner: &str, _params: &ExportParams) -> Result<(), String> {
        Ok(())
    }
}
