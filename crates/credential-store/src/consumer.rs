//! Registered consumer applications

use std::fmt;

use common::Secret;
use oauth1::ConsumerCredentials;
use serde::{Deserialize, Serialize};

use crate::restrictions::Restrictions;

/// Wildcard marker for "every wiki in the farm".
pub const ALL_WIKIS: &str = "*";

/// Site a consumer or acceptance applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WikiScope {
    All,
    Wiki(String),
}

impl WikiScope {
    pub fn is_all(&self) -> bool {
        matches!(self, WikiScope::All)
    }

    pub fn as_str(&self) -> &str {
        match self {
            WikiScope::All => ALL_WIKIS,
            WikiScope::Wiki(id) => id,
        }
    }
}

impl From<String> for WikiScope {
    fn from(value: String) -> Self {
        if value == ALL_WIKIS {
            WikiScope::All
        } else {
            WikiScope::Wiki(value)
        }
    }
}

impl From<&str> for WikiScope {
    fn from(value: &str) -> Self {
        WikiScope::from(value.to_owned())
    }
}

impl From<WikiScope> for String {
    fn from(value: WikiScope) -> Self {
        match value {
            WikiScope::All => ALL_WIKIS.to_owned(),
            WikiScope::Wiki(id) => id,
        }
    }
}

impl fmt::Display for WikiScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Proposed,
    Approved,
    Rejected,
    Expired,
    Disabled,
    Suppressed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Proposed => "proposed",
            Stage::Approved => "approved",
            Stage::Rejected => "rejected",
            Stage::Expired => "expired",
            Stage::Disabled => "disabled",
            Stage::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered third-party application.
///
/// `user_id` is the central id of the owning account. Timestamps are unix
/// seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub id: u64,
    pub consumer_key: String,
    pub name: String,
    pub user_id: u64,
    pub version: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub description: String,
    pub callback_url: String,
    #[serde(default)]
    pub callback_is_prefix: bool,
    #[serde(default)]
    pub owner_only: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsa_key: Option<String>,
    pub wiki: WikiScope,
    #[serde(default)]
    pub grants: Vec<String>,
    #[serde(default)]
    pub restrictions: Restrictions,
    pub stage: Stage,
    pub stage_timestamp: u64,
    pub registered: u64,
}

impl Consumer {
    /// Whether the consumer has anything to verify signatures against.
    pub fn has_key_material(&self) -> bool {
        self.shared_secret().is_some() || self.rsa_public_key().is_some()
    }

    /// Whether the account with `central_id` may authorize this consumer.
    ///
    /// Approved consumers are usable by anyone. Proposed and expired ones
    /// only by their owner, so they can be tested before approval.
    pub fn is_usable_by(&self, central_id: Option<u64>) -> bool {
        match self.stage {
            Stage::Approved => true,
            Stage::Proposed | Stage::Expired => central_id == Some(self.user_id),
            Stage::Rejected | Stage::Disabled | Stage::Suppressed => false,
        }
    }
}

impl ConsumerCredentials for Consumer {
    fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    fn shared_secret(&self) -> Option<&str> {
        self.secret_key
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| s.expose_str())
    }

    fn rsa_public_key(&self) -> Option<&str> {
        self.rsa_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
pub(crate) fn test_consumer(id: u64, key: &str) -> Consumer {
    Consumer {
        id,
        consumer_key: key.to_owned(),
        name: format!("Consumer {id}"),
        user_id: 100,
        version: "1.0".into(),
        email: "owner@example.org".into(),
        description: String::new(),
        callback_url: "https://app.example.org/callback".into(),
        callback_is_prefix: false,
        owner_only: false,
        deleted: false,
        secret_key: Some(Secret::from("consumer-secret")),
        rsa_key: None,
        wiki: WikiScope::All,
        grants: vec!["basic".into()],
        restrictions: Restrictions::default(),
        stage: Stage::Approved,
        stage_timestamp: 0,
        registered: 0,
    }
}
