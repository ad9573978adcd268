//! Credential store: identities, password credentials and social links.
//!
//! The in-memory implementation is an actor. One task owns all maps and
//! applies commands in arrival order, so each "check uniqueness, then insert"
//! runs as a single step and two racing writers can never both pass the check.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::types::{Credential, Identity, OAuthProvider, SocialLink};

const COMMAND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Email,
    ProviderIdentity,
    IdentityId,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Email => f.write_str("email already in use"),
            ConflictKind::ProviderIdentity => f.write_str("provider identity already linked"),
            ConflictKind::IdentityId => f.write_str("identity id already exists"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(ConflictKind),
    #[error("credential store unavailable")]
    Unavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence port consumed by the auth service.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Identity for an email plus its local credential, if it has one.
    async fn find_by_email(&self, email: &str) -> StoreResult<(Identity, Option<Credential>)>;

    async fn find_by_provider_identity(
        &self,
        provider: OAuthProvider,
        subject: &str,
    ) -> StoreResult<Identity>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Identity>;

    /// Insert an identity with a local credential. Conflict when the email exists.
    async fn create_local(&self, identity: Identity, credential: Credential) -> StoreResult<()>;

    /// Insert an identity together with its first social link. Conflict when
    /// the `(provider, subject)` pair or the email is already present.
    async fn create_from_social(&self, identity: Identity, link: SocialLink)
        -> StoreResult<Identity>;

    /// Attach a social link to an existing identity.
    async fn link_social(&self, link: SocialLink) -> StoreResult<Identity>;

    async fn update(&self, identity: Identity) -> StoreResult<()>;

    /// Replace the identity's local credential.
    async fn replace_credential(&self, credential: Credential) -> StoreResult<()>;
}

type Reply<T> = oneshot::Sender<StoreResult<T>>;

enum Command {
    FindByEmail {
        email: String,
        reply: Reply<(Identity, Option<Credential>)>,
    },
    FindByProvider {
        provider: OAuthProvider,
        subject: String,
        reply: Reply<Identity>,
    },
    FindById {
        id: Uuid,
        reply: Reply<Identity>,
    },
    CreateLocal {
        identity: Identity,
        credential: Credential,
        reply: Reply<()>,
    },
    CreateFromSocial {
        identity: Identity,
        link: SocialLink,
        reply: Reply<Identity>,
    },
    LinkSocial {
        link: SocialLink,
        reply: Reply<Identity>,
    },
    Update {
        identity: Identity,
        reply: Reply<()>,
    },
    ReplaceCredential {
        credential: Credential,
        reply: Reply<()>,
    },
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Default)]
struct StoreState {
    identities: HashMap<Uuid, Identity>,
    by_email: HashMap<String, Uuid>,
    credentials: HashMap<Uuid, Credential>,
    links: HashMap<(OAuthProvider, String), Uuid>,
}

impl StoreState {
    fn handle(&mut self, command: Command) {
        // A dropped receiver means the caller went away; nothing to do.
        match command {
            Command::FindByEmail { email, reply } => {
                let _ = reply.send(self.find_by_email(&email));
            }
            Command::FindByProvider {
                provider,
                subject,
                reply,
            } => {
                let result = self
                    .links
                    .get(&(provider, subject))
                    .and_then(|id| self.identities.get(id))
                    .cloned()
                    .ok_or(StoreError::NotFound);
                let _ = reply.send(result);
            }
            Command::FindById { id, reply } => {
                let result = self.identities.get(&id).cloned().ok_or(StoreError::NotFound);
                let _ = reply.send(result);
            }
            Command::CreateLocal {
                identity,
                credential,
                reply,
            } => {
                let _ = reply.send(self.create_local(identity, credential));
            }
            Command::CreateFromSocial {
                identity,
                link,
                reply,
            } => {
                let _ = reply.send(self.create_from_social(identity, link));
            }
            Command::LinkSocial { link, reply } => {
                let _ = reply.send(self.link_social(link));
            }
            Command::Update { identity, reply } => {
                let _ = reply.send(self.update(identity));
            }
            Command::ReplaceCredential { credential, reply } => {
                let result = if self.identities.contains_key(&credential.identity_id) {
                    self.credentials.insert(credential.identity_id, credential);
                    Ok(())
                } else {
                    Err(StoreError::NotFound)
                };
                let _ = reply.send(result);
            }
        }
    }

    fn find_by_email(&self, email: &str) -> StoreResult<(Identity, Option<Credential>)> {
        let id = self.by_email.get(&email_key(email)).ok_or(StoreError::NotFound)?;
        let identity = self.identities.get(id).cloned().ok_or(StoreError::NotFound)?;
        Ok((identity, self.credentials.get(id).cloned()))
    }

    fn check_new_identity(&self, identity: &Identity) -> StoreResult<()> {
        if self.identities.contains_key(&identity.id) {
            return Err(StoreError::Conflict(ConflictKind::IdentityId));
        }
        if self.by_email.contains_key(&email_key(&identity.email)) {
            return Err(StoreError::Conflict(ConflictKind::Email));
        }
        Ok(())
    }

    fn insert_identity(&mut self, identity: Identity) {
        self.by_email.insert(email_key(&identity.email), identity.id);
        self.identities.insert(identity.id, identity);
    }

    fn create_local(&mut self, identity: Identity, credential: Credential) -> StoreResult<()> {
        self.check_new_identity(&identity)?;
        self.credentials.insert(identity.id, credential);
        self.insert_identity(identity);
        Ok(())
    }

    fn create_from_social(&mut self, identity: Identity, link: SocialLink) -> StoreResult<Identity> {
        let key = (link.provider, link.subject.clone());
        if self.links.contains_key(&key) {
            return Err(StoreError::Conflict(ConflictKind::ProviderIdentity));
        }
        self.check_new_identity(&identity)?;
        self.links.insert(key, identity.id);
        self.insert_identity(identity.clone());
        Ok(identity)
    }

    fn link_social(&mut self, link: SocialLink) -> StoreResult<Identity> {
        let identity = self
            .identities
            .get(&link.identity_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let key = (link.provider, link.subject);
        match self.links.get(&key) {
            Some(owner) if *owner == identity.id => Ok(identity),
            Some(_) => Err(StoreError::Conflict(ConflictKind::ProviderIdentity)),
            None => {
                self.links.insert(key, identity.id);
                Ok(identity)
            }
        }
    }

    fn update(&mut self, identity: Identity) -> StoreResult<()> {
        let previous = self
            .identities
            .get(&identity.id)
            .ok_or(StoreError::NotFound)?;
        let old_key = email_key(&previous.email);
        let new_key = email_key(&identity.email);

        if old_key != new_key {
            if self.by_email.contains_key(&new_key) {
                return Err(StoreError::Conflict(ConflictKind::Email));
            }
            self.by_email.remove(&old_key);
            self.by_email.insert(new_key, identity.id);
        }
        self.identities.insert(identity.id, identity);
        Ok(())
    }
}

async fn run(mut commands: mpsc::Receiver<Command>) {
    let mut state = StoreState::default();
    while let Some(command) = commands.recv().await {
        state.handle(command);
    }
    tracing::debug!("Credential store stopped: all handles dropped");
}

/// Handle to the in-memory store actor. Cheap to clone.
#[derive(Clone)]
pub struct InMemoryCredentialStore {
    sender: mpsc::Sender<Command>,
}

impl InMemoryCredentialStore {
    /// Start the owning task. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run(receiver));
        Self { sender }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> StoreResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| StoreError::Unavailable)?;
        response.await.map_err(|_| StoreError::Unavailable)?
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<(Identity, Option<Credential>)> {
        let email = email.to_string();
        self.request(|reply| Command::FindByEmail { email, reply }).await
    }

    async fn find_by_provider_identity(
        &self,
        provider: OAuthProvider,
        subject: &str,
    ) -> StoreResult<Identity> {
        let subject = subject.to_string();
        self.request(|reply| Command::FindByProvider {
            provider,
            subject,
            reply,
        })
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Identity> {
        self.request(|reply| Command::FindById { id, reply }).await
    }

    async fn create_local(&self, identity: Identity, credential: Credential) -> StoreResult<()> {
        self.request(|reply| Command::CreateLocal {
            identity,
            credential,
            reply,
        })
        .await
    }

    async fn create_from_social(
        &self,
        identity: Identity,
        link: SocialLink,
    ) -> StoreResult<Identity> {
        self.request(|reply| Command::CreateFromSocial {
            identity,
            link,
            reply,
        })
        .await
    }

    async fn link_social(&self, link: SocialLink) -> StoreResult<Identity> {
        self.request(|reply| Command::LinkSocial { link, reply }).await
    }

    async fn update(&self, identity: Identity) -> StoreResult<()> {
        self.request(|reply| Command::Update { identity, reply }).await
    }

    async fn replace_credential(&self, credential: Credential) -> StoreResult<()> {
        self.request(|reply| Command::ReplaceCredential { credential, reply })
            .await
    }
}
