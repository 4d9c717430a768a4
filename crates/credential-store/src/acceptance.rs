//! Grant records binding a user, a consumer and a wiki scope

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::consumer::WikiScope;

/// A user's acceptance of a consumer on one wiki scope.
///
/// `id` is zero until the record is first saved. The access token pair is
/// the credential the consumer signs API calls with; `grants` and `wiki`
/// snapshot the consumer's values at acceptance (or last update) time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acceptance {
    #[serde(default)]
    pub id: u64,
    pub wiki: WikiScope,
    pub user_id: u64,
    pub consumer_id: u64,
    pub access_token: String,
    pub access_secret: Secret<String>,
    #[serde(default)]
    pub grants: Vec<String>,
    pub accepted: u64,
}

impl Acceptance {
    /// Whether `self` and `other` occupy the same (user, consumer, wiki) slot.
    pub fn same_slot(&self, other: &Acceptance) -> bool {
        self.user_id == other.user_id
            && self.consumer_id == other.consumer_id
            && self.wiki == other.wiki
    }
}
