//! Extension point for concrete `SiteClient` adapters (spec §9 "Polymorphic
//! site adapter"). Per-OJ implementations (HDU, SCU, contest variants, ...)
//! are external collaborators (spec §1) and are not part of this crate;
//! this registry is how a deployment wires them in without the core ever
//! depending on a concrete variant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use vjudge_common::{JudgeError, JudgeResult, SiteClient, SiteClientFactory};

type Constructor =
    Arc<dyn Fn(&str, Option<(&str, &str)>) -> JudgeResult<Box<dyn SiteClient>> + Send + Sync>;

/// A `SiteClientFactory` backed by a name -> constructor map, populated by
/// whatever adapter crates a deployment links in.
#[derive(Clone, Default)]
pub struct RegistryClientFactory {
    constructors: HashMap<String, Constructor>,
}

impl RegistryClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `oj_name`. The constructor receives an
    /// optional `(username, password)`; it must log in eagerly and surface
    /// `LoginError` when credentials are present and rejected (spec §6.2).
    pub fn register(
        &mut self,
        oj_name: impl Into<String>,
        ctor: impl Fn(&str, Option<(&str, &str)>) -> JudgeResult<Box<dyn SiteClient>>
            + Send
            + Sync
            + 'static,
    ) {
        self.constructors.insert(oj_name.into(), Arc::new(ctor));
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

#[async_trait]
impl SiteClientFactory for RegistryClientFactory {
    async fn authenticated(
        &self,
        oj_name: &str,
        username: &str,
        password: &str,
    ) -> JudgeResult<Box<dyn SiteClient>> {
        let ctor = self.constructors.get(oj_name).ok_or_else(|| {
            JudgeError::JudgeException(format!("no SiteClient adapter registered for {oj_name}"))
        })?;
        ctor(oj_name, Some((username, password)))
    }

    async fn anonymous(&self, oj_name: &str) -> JudgeResult<Box<dyn SiteClient>> {
        let ctor = self.constructors.get(oj_name).ok_or_else(|| {
            JudgeError::JudgeException(format!("no SiteClient adapter registered for {oj_name}"))
        })?;
        ctor(oj_name, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_oj_yields_judge_exception() {
        let factory = RegistryClientFactory::new();
        let result = factory.authenticated("hdu", "u", "p").await;
        assert!(matches!(result, Err(JudgeError::JudgeException(_))));
    }

    #[tokio::test]
    async fn registered_constructor_is_invoked() {
        let mut factory = RegistryClientFactory::new();
        factory.register("hdu", |_name, creds| {
            assert!(creds.is_some());
            let mut mock = vjudge_common::MockSiteClient::new();
            mock.expect_get_name().return_const("hdu".to_string());
            Ok(Box::new(mock) as Box<dyn SiteClient>)
        });

        let client = factory.authenticated("hdu", "u", "p").await.unwrap();
        assert_eq!(client.get_name(), "hdu");
    }
}
