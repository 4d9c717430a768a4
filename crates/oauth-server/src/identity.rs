//! Mapping local accounts to central (farm-wide) accounts
//!
//! Acceptances are keyed by central user id. How a local account maps to
//! a central one is decided once at startup: either the local directory
//! is the central one ([`IdentityResolver::Direct`]) or an external lookup
//! is consulted ([`IdentityResolver::Delegated`]).

use std::collections::HashMap;
use std::sync::Arc;

use oauth1::BoxFuture;
use serde::{Deserialize, Serialize};

/// A local account as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub blocked: bool,
    /// Name suppressed from public view
    #[serde(default)]
    pub hidden: bool,
    /// May see names of hidden accounts
    #[serde(default)]
    pub can_view_hidden: bool,
}

/// Who a resolved user name will be shown to.
#[derive(Debug, Clone, Copy)]
pub enum Audience<'a> {
    Public,
    User(&'a User),
    /// Internal use, no visibility filtering
    Raw,
}

impl Audience<'_> {
    fn can_view_hidden(&self) -> bool {
        match self {
            Audience::Public => false,
            Audience::User(user) => user.can_view_hidden,
            Audience::Raw => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralUserName {
    Name(String),
    Hidden,
    NotFound,
}

/// Local account directory.
pub trait UserDirectory: Send + Sync {
    fn user_by_id(&self, id: u64) -> BoxFuture<'_, Option<User>>;
}

/// External central-account service.
pub trait CentralIdLookup: Send + Sync {
    /// Central id of an attached local account.
    fn central_id<'a>(
        &'a self,
        user: &'a User,
        central_wiki: &'a str,
    ) -> BoxFuture<'a, Option<u64>>;

    /// Name of a central account and whether it is hidden.
    fn central_name<'a>(
        &'a self,
        central_id: u64,
        central_wiki: &'a str,
    ) -> BoxFuture<'a, Option<(String, bool)>>;

    /// Local account attached to a central account.
    fn local_user<'a>(
        &'a self,
        central_id: u64,
        central_wiki: &'a str,
    ) -> BoxFuture<'a, Option<User>>;
}

#[derive(Clone)]
pub enum IdentityResolver {
    /// Local ids are central ids.
    Direct(Arc<dyn UserDirectory>),
    /// Central ids come from an external lookup against `central_wiki`.
    Delegated {
        lookup: Arc<dyn CentralIdLookup>,
        central_wiki: String,
    },
}

impl IdentityResolver {
    pub async fn central_id_from_local_user(&self, user: &User) -> Option<u64> {
        match self {
            IdentityResolver::Direct(_) => Some(user.id).filter(|id| *id != 0),
            IdentityResolver::Delegated {
                lookup,
                central_wiki,
            } => lookup.central_id(user, central_wiki).await,
        }
    }

    pub async fn central_user_name_from_id(
        &self,
        central_id: u64,
        audience: Audience<'_>,
    ) -> CentralUserName {
        let found = match self {
            IdentityResolver::Direct(directory) => directory
                .user_by_id(central_id)
                .await
                .map(|u| (u.name, u.hidden)),
            IdentityResolver::Delegated {
                lookup,
                central_wiki,
            } => lookup.central_name(central_id, central_wiki).await,
        };
        match found {
            None => CentralUserName::NotFound,
            Some((_, true)) if !audience.can_view_hidden() => CentralUserName::Hidden,
            Some((name, _)) => CentralUserName::Name(name),
        }
    }

    pub async fn local_user_from_central_id(&self, central_id: u64) -> Option<User> {
        match self {
            IdentityResolver::Direct(directory) => directory.user_by_id(central_id).await,
            IdentityResolver::Delegated {
                lookup,
                central_wiki,
            } => lookup.local_user(central_id, central_wiki).await,
        }
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityResolver::Direct(_) => f.write_str("Direct"),
            IdentityResolver::Delegated { central_wiki, .. } => f
                .debug_struct("Delegated")
                .field("central_wiki", central_wiki)
                .finish(),
        }
    }
}

/// Fixed account directory loaded from configuration.
#[derive(Debug, Default)]
pub struct StaticUsers {
    users: HashMap<u64, User>,
}

impl StaticUsers {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn get(&self, id: u64) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticUsers {
    fn user_by_id(&self, id: u64) -> BoxFuture<'_, Option<User>> {
        Box::pin(async move { self.users.get(&id).cloned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;

    fn direct() -> IdentityResolver {
        let mut hidden = user(2, "Hidden");
        hidden.hidden = true;
        IdentityResolver::Direct(Arc::new(StaticUsers::new([user(1, "Alice"), hidden])))
    }

    /// Central ids are local ids shifted by 1000; only even local ids are attached.
    struct OffsetLookup;

    impl CentralIdLookup for OffsetLookup {
        fn central_id<'a>(
            &'a self,
            user: &'a User,
            central_wiki: &'a str,
        ) -> BoxFuture<'a, Option<u64>> {
            Box::pin(async move {
                assert_eq!(central_wiki, "metawiki");
                (user.id % 2 == 0).then_some(user.id + 1000)
            })
        }

        fn central_name<'a>(
            &'a self,
            central_id: u64,
            _central_wiki: &'a str,
        ) -> BoxFuture<'a, Option<(String, bool)>> {
            Box::pin(async move { Some((format!("Global{central_id}"), false)) })
        }

        fn local_user<'a>(
            &'a self,
            central_id: u64,
            _central_wiki: &'a str,
        ) -> BoxFuture<'a, Option<User>> {
            Box::pin(async move {
                central_id
                    .checked_sub(1000)
                    .map(|id| user(id, &format!("Local{id}")))
            })
        }
    }

    fn delegated() -> IdentityResolver {
        IdentityResolver::Delegated {
            lookup: Arc::new(OffsetLookup),
            central_wiki: "metawiki".into(),
        }
    }

    #[tokio::test]
    async fn direct_uses_local_ids() {
        let resolver = direct();
        assert_eq!(resolver.central_id_from_local_user(&user(1, "Alice")).await, Some(1));
        assert_eq!(resolver.central_id_from_local_user(&user(0, "Anon")).await, None);
        assert_eq!(
            resolver.local_user_from_central_id(1).await.map(|u| u.name),
            Some("Alice".into())
        );
        assert!(resolver.local_user_from_central_id(9).await.is_none());
    }

    #[tokio::test]
    async fn hidden_names_respect_audience() {
        let resolver = direct();
        let viewer = user(5, "Viewer");
        let mut oversighter = user(6, "Oversighter");
        oversighter.can_view_hidden = true;

        assert_eq!(
            resolver.central_user_name_from_id(2, Audience::User(&viewer)).await,
            CentralUserName::Hidden
        );
        assert_eq!(
            resolver.central_user_name_from_id(2, Audience::Public).await,
            CentralUserName::Hidden
        );
        assert_eq!(
            resolver
                .central_user_name_from_id(2, Audience::User(&oversighter))
                .await,
            CentralUserName::Name("Hidden".into())
        );
        assert_eq!(
            resolver.central_user_name_from_id(1, Audience::Public).await,
            CentralUserName::Name("Alice".into())
        );
        assert_eq!(
            resolver.central_user_name_from_id(42, Audience::Raw).await,
            CentralUserName::NotFound
        );
    }

    #[tokio::test]
    async fn delegated_forwards_to_lookup() {
        let resolver = delegated();
        assert_eq!(resolver.central_id_from_local_user(&user(4, "Even")).await, Some(1004));
        assert_eq!(resolver.central_id_from_local_user(&user(3, "Odd")).await, None);
        assert_eq!(
            resolver.central_user_name_from_id(1004, Audience::Public).await,
            CentralUserName::Name("Global1004".into())
        );
        assert_eq!(
            resolver.local_user_from_central_id(1004).await.map(|u| u.id),
            Some(4)
        );
    }
}
