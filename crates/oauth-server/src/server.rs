//! Protocol engine
//!
//! `Server` wraps the generic [`OAuthServer`] and adds the provider policy:
//! owner-only and key-material checks, source-IP restrictions, callback
//! validation, keyed secrets and the authorize step that links a request
//! token to an acceptance.
//!
//! Check order matters. Eligibility runs before the signature is checked
//! so an ineligible consumer is refused the same way whatever it signed.

use std::sync::Arc;

use common::Secret;
use credential_store::{Acceptance, Consumer, CredentialStore};
use oauth1::constants::{
    OUT_OF_BAND, PARAM_CALLBACK, PARAM_CALLBACK_CONFIRMED, PARAM_TOKEN, PARAM_TOKEN_SECRET,
    PARAM_VERIFIER,
};
use oauth1::{DataStore, OAuthRequest, OAuthServer, Token, TokenKind, keys, now_secs};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::authorization::current_authorization;
use crate::callback::{callback_url, check_callback};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::identity::{Audience, CentralUserName, IdentityResolver, User};
use crate::signature::{SecretTransform, signature_methods};

/// Token credentials handed to a client by a handshake step.
///
/// `secret` is already transformed; it is the value the client signs with.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredentials {
    pub key: String,
    pub secret: Secret<String>,
    #[serde(
        rename = "oauth_callback_confirmed",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub callback_confirmed: bool,
}

impl IssuedCredentials {
    /// `application/x-www-form-urlencoded` response body.
    pub fn to_form(&self) -> String {
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair(PARAM_TOKEN, &self.key)
            .append_pair(PARAM_TOKEN_SECRET, self.secret.expose_str());
        if self.callback_confirmed {
            form.append_pair(PARAM_CALLBACK_CONFIRMED, "true");
        }
        form.finish()
    }
}

pub struct Server<S: CredentialStore> {
    oauth: OAuthServer<S>,
    config: ServerConfig,
    transform: SecretTransform,
    identity: IdentityResolver,
}

impl<S: CredentialStore> Server<S> {
    pub fn new(store: Arc<S>, identity: IdentityResolver, config: ServerConfig) -> Self {
        let transform = SecretTransform::new(config.secret_key.clone());
        let oauth = OAuthServer::new(
            store,
            signature_methods(transform.clone()),
            config.timestamp_threshold,
        );
        Self {
            oauth,
            config,
            transform,
            identity,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.oauth.store()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// Issue a request token (temporary credentials).
    pub async fn fetch_request_token(&self, request: &OAuthRequest) -> Result<IssuedCredentials> {
        self.oauth.get_version(request)?;
        let consumer = self.oauth.get_consumer(request).await?;
        check_handshake_eligibility(&consumer)?;
        check_source_ip(&consumer, request)?;
        self.oauth.check_signature(request, &consumer, None).await?;

        let callback = request.get_parameter(PARAM_CALLBACK);
        check_callback(&consumer, callback)?;

        let token = self
            .store()
            .new_request_token(&consumer, callback.unwrap_or(OUT_OF_BAND))
            .await?;
        info!(consumer_key = %consumer.consumer_key, "issued request token");
        self.issue(&token, true)
    }

    /// Exchange an authorized request token for its access token.
    pub async fn fetch_access_token(&self, request: &OAuthRequest) -> Result<IssuedCredentials> {
        self.oauth.get_version(request)?;
        let consumer = self.oauth.get_consumer(request).await?;
        check_handshake_eligibility(&consumer)?;
        check_source_ip(&consumer, request)?;

        let request_token = self
            .oauth
            .get_token(request, &consumer, TokenKind::Request)
            .await?;
        if request_token.secret.is_empty() {
            warn!(consumer_key = %consumer.consumer_key, "request token has an empty secret");
            return Err(Error::CorruptToken);
        }
        self.oauth
            .check_signature(request, &consumer, Some(&request_token))
            .await?;

        let verifier = request.get_parameter(PARAM_VERIFIER);
        let access_token = self
            .store()
            .new_access_token(&request_token, &consumer, verifier)
            .await?;
        info!(consumer_key = %consumer.consumer_key, "issued access token");
        self.issue(&access_token, false)
    }

    /// Authenticate a signed API call.
    pub async fn verify_request(&self, request: &OAuthRequest) -> Result<(Consumer, Token)> {
        let (consumer, token) = self.oauth.verify_request(request).await?;
        if consumer.deleted {
            return Err(Error::UnknownConsumer);
        }
        check_source_ip(&consumer, request)?;

        let acceptance = self
            .store()
            .lookup_acceptance_by_token(consumer.id, &token.key)
            .await?
            .ok_or(Error::TokenNotFound(TokenKind::Access))?;
        if !consumer.is_usable_by(Some(acceptance.user_id)) {
            warn!(
                consumer_key = %consumer.consumer_key,
                stage = %consumer.stage,
                "signed call for a consumer that is no longer usable"
            );
            return Err(Error::IneligibleConsumerUse {
                owner_contact: self.owner_contact(&consumer, Audience::Public).await,
            });
        }
        Ok((consumer, token))
    }

    /// Record that `user` approved `consumer_key` for the given request token.
    ///
    /// Returns the URL to redirect the user to. With `update` the existing
    /// acceptance is refreshed with the consumer's current wiki and grants,
    /// keeping its access token.
    pub async fn authorize(
        &self,
        consumer_key: &str,
        request_token_key: &str,
        user: &User,
        update: bool,
    ) -> Result<String> {
        if user.locked {
            return Err(Error::AccountLocked);
        }
        if user.blocked && self.config.block_disables_login {
            return Err(Error::AccountBlocked);
        }

        let consumer = self
            .store()
            .lookup_consumer(consumer_key)
            .await?
            .filter(|c| !c.deleted)
            .ok_or(Error::UnknownConsumer)?;

        let central_id = self.identity.central_id_from_local_user(user).await;
        if !consumer.is_usable_by(central_id) {
            return Err(Error::IneligibleConsumerUse {
                owner_contact: self.owner_contact(&consumer, Audience::User(user)).await,
            });
        }
        if consumer.owner_only {
            return Err(Error::OwnerOnlyConsumer);
        }

        let mut request_token = self
            .store()
            .lookup_token(&consumer, TokenKind::Request, request_token_key)
            .await?
            .ok_or(Error::InvalidRequestToken)?;
        let verifier = keys::generate_verifier();
        request_token.add_verifier(verifier.clone());

        let central_id = central_id.ok_or_else(|| Error::IdentityResolutionFailed {
            consumer_name: consumer.name.clone(),
        })?;
        let current =
            current_authorization(self.store().as_ref(), central_id, &consumer, &self.config.current_wiki)
                .await?;

        // Unsaved records carry their access token already; the store writes
        // them together with the request token or not at all.
        let (access_token, to_save, action) = match (current, update) {
            (Some(mut existing), true) => {
                existing.wiki = consumer.wiki.clone();
                existing.grants = consumer.grants.clone();
                (existing.access_token.clone(), Some(existing), "updated authorization")
            }
            (None, true) => return Err(Error::UpdateWithoutExistingAcceptance),
            (None, false) => {
                let (access_token, access_secret) = keys::generate_token_pair();
                let fresh = Acceptance {
                    id: 0,
                    wiki: consumer.wiki.clone(),
                    user_id: central_id,
                    consumer_id: consumer.id,
                    access_token: access_token.clone(),
                    access_secret: Secret::new(access_secret),
                    grants: consumer.grants.clone(),
                    accepted: now_secs(),
                };
                (access_token, Some(fresh), "created authorization")
            }
            (Some(existing), false) => {
                debug!(
                    consumer_key = %consumer.consumer_key,
                    acceptance_id = existing.id,
                    "reusing authorization"
                );
                (existing.access_token, None, "reused authorization")
            }
        };

        request_token.add_access_key(access_token);
        let (stored, saved) = self
            .store()
            .commit_authorization(&request_token, &consumer, to_save)
            .await?;
        if let Some(saved) = saved {
            info!(
                consumer_key = %consumer.consumer_key,
                acceptance_id = saved.id,
                "{action}"
            );
        }
        callback_url(&consumer, &stored, &verifier)
    }

    /// Acceptance governing `user`'s use of `consumer` on `wiki`.
    pub async fn get_current_authorization(
        &self,
        user: &User,
        consumer: &Consumer,
        wiki: &str,
    ) -> Result<Option<Acceptance>> {
        let central_id = self
            .identity
            .central_id_from_local_user(user)
            .await
            .ok_or_else(|| Error::IdentityResolutionFailed {
                consumer_name: consumer.name.clone(),
            })?;
        current_authorization(self.store().as_ref(), central_id, consumer, wiki).await
    }

    /// Consumer key a live request token belongs to.
    pub async fn consumer_key_for(&self, request_token_key: &str) -> Result<Option<String>> {
        Ok(self
            .store()
            .consumer_key_for_request_token(request_token_key)
            .await?)
    }

    fn issue(&self, token: &Token, callback_confirmed: bool) -> Result<IssuedCredentials> {
        Ok(IssuedCredentials {
            key: token.key.clone(),
            secret: Secret::new(self.transform.apply(token.secret.expose_str())?),
            callback_confirmed,
        })
    }

    /// Talk page link of the consumer's owner, as `audience` may see it.
    async fn owner_contact(&self, consumer: &Consumer, audience: Audience<'_>) -> String {
        match self
            .identity
            .central_user_name_from_id(consumer.user_id, audience)
            .await
        {
            CentralUserName::Name(name) => self.config.user_talk_url(&name),
            CentralUserName::Hidden => "(username removed)".into(),
            CentralUserName::NotFound => "(unknown user)".into(),
        }
    }
}

/// Owner-only and key-material checks shared by both handshake steps.
fn check_handshake_eligibility(consumer: &Consumer) -> Result<()> {
    if consumer.owner_only {
        return Err(Error::OwnerOnlyConsumer);
    }
    if !consumer.has_key_material() {
        return Err(Error::ConsumerHasNoKeyMaterial);
    }
    Ok(())
}

fn check_source_ip(consumer: &Consumer, request: &OAuthRequest) -> Result<()> {
    let ip = request.source_ip();
    if !consumer.restrictions.allows(ip) {
        warn!(consumer_key = %consumer.consumer_key, %ip, "source address not allowed");
        return Err(Error::SourceIpNotAllowed(ip));
    }
    Ok(())
}
