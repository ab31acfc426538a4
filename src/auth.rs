//! Per-resource capability check for included resources.

use crate::context::AppContext;
use crate::resource::Resource;
use async_trait::async_trait;

/// Asked once per candidate included resource, with action `"get"`. A false
/// answer excludes the resource from the response without raising; primary
/// data authorization is a collaborator concern enforced upstream.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn can_access_resource(
        &self,
        resource: &Resource,
        action: &str,
        ctx: &AppContext,
    ) -> bool;
}

/// Default gate: everything is visible.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn can_access_resource(&self, _: &Resource, _: &str, _: &AppContext) -> bool {
        true
    }
}
