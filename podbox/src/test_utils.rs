// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credentials, pipeline contexts and in-memory ticketing backends for tests.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use podbox_core::{Commitment, Credential, EmailClaim, Hash, PrivateKey, PublicKey, now};
use podbox_store::PodboxStore;

use crate::credential::{CredentialSubservice, SignatureVerifier};
use crate::pipeline::{
    LemonadeApi, LemonadeError, PipelineContext, PretixApi, PretixError,
    lemonade::{LemonadeConnection, LemonadeTicket, LemonadeTicketType},
    pretix::{
        PretixCheckin, PretixCheckinList, PretixConnection, PretixEvent, PretixEventSettings,
        PretixItem, PretixOrder,
    },
};

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Identity commitment derived from an email address.
pub fn commitment(email: &str) -> Commitment {
    Hash::new(email.to_lowercase())
}

/// Issuer of email credentials.
#[derive(Clone, Debug, Default)]
pub struct TestIssuer {
    private_key: PrivateKey,
}

impl TestIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    /// Signed claim over `email` and its [`commitment`].
    pub fn credential(&self, email: &str) -> Credential {
        let claim = EmailClaim::sign(email, commitment(email), now(), &self.private_key)
            .expect("sign email claim");
        Credential::Email(claim)
    }
}

/// Context trusting `issuer`, signing with a fresh key and without backend clients.
pub fn test_context<S: PodboxStore>(store: S, issuer: &TestIssuer) -> PipelineContext<S> {
    let credentials =
        CredentialSubservice::new(store.clone(), Arc::new(SignatureVerifier), Some(issuer.public_key()));
    PipelineContext {
        store,
        signing_key: PrivateKey::new(),
        credentials: Arc::new(credentials),
        pretix: None,
        lemonade: None,
    }
}

#[derive(Clone, Debug)]
pub struct MockPretixEvent {
    pub event: PretixEvent,
    pub settings: PretixEventSettings,
    pub items: Vec<PretixItem>,
    pub checkin_lists: Vec<PretixCheckinList>,
    pub orders: Vec<PretixOrder>,
}

/// Pushed check-in: event slug, check-in list and position secret.
pub type PretixPush = (String, u64, String);

/// Pretix organizer held in memory.
#[derive(Default)]
pub struct MockPretix {
    events: Mutex<HashMap<String, MockPretixEvent>>,
    unreachable: Mutex<HashSet<String>>,
    fail_pushes: AtomicBool,
    pushed: Mutex<Vec<PretixPush>>,
}

impl MockPretix {
    pub fn insert_event(&self, slug: &str, event: MockPretixEvent) {
        self.events
            .lock()
            .unwrap()
            .insert(slug.to_string(), event);
    }

    pub fn update_event(&self, slug: &str, f: impl FnOnce(&mut MockPretixEvent)) {
        let mut events = self.events.lock().unwrap();
        f(events.get_mut(slug).expect("event exists"));
    }

    /// Requests for `slug` fail with a transport error while set.
    pub fn set_unreachable(&self, slug: &str, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(slug.to_string());
        } else {
            set.remove(slug);
        }
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.fail_pushes.store(fail, Ordering::SeqCst);
    }

    pub fn pushed(&self) -> Vec<PretixPush> {
        self.pushed.lock().unwrap().clone()
    }

    fn event(&self, slug: &str) -> Result<MockPretixEvent, PretixError> {
        if self.unreachable.lock().unwrap().contains(slug) {
            return Err(PretixError::Transport(format!("{slug} is unreachable")));
        }
        self.events
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| PretixError::Status {
                status: 404,
                message: format!("unknown event {slug}"),
            })
    }
}

#[async_trait]
impl PretixApi for MockPretix {
    async fn fetch_event(
        &self,
        _connection: &PretixConnection,
        event: &str,
    ) -> Result<PretixEvent, PretixError> {
        Ok(self.event(event)?.event)
    }

    async fn fetch_settings(
        &self,
        _connection: &PretixConnection,
        event: &str,
    ) -> Result<PretixEventSettings, PretixError> {
        Ok(self.event(event)?.settings)
    }

    async fn fetch_items(
        &self,
        _connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixItem>, PretixError> {
        Ok(self.event(event)?.items)
    }

    async fn fetch_checkin_lists(
        &self,
        _connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixCheckinList>, PretixError> {
        Ok(self.event(event)?.checkin_lists)
    }

    async fn fetch_orders(
        &self,
        _connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixOrder>, PretixError> {
        Ok(self.event(event)?.orders)
    }

    async fn push_checkin(
        &self,
        _connection: &PretixConnection,
        event: &str,
        checkin_list: u64,
        secret: &str,
    ) -> Result<(), PretixError> {
        // Give concurrent check-ins the chance to interleave.
        tokio::task::yield_now().await;

        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(PretixError::Status {
                status: 500,
                message: "internal server error".into(),
            });
        }

        let mut events = self.events.lock().unwrap();
        let position = events
            .get_mut(event)
            .into_iter()
            .flat_map(|event| event.orders.iter_mut())
            .flat_map(|order| order.positions.iter_mut())
            .find(|position| position.secret == secret)
            .ok_or_else(|| PretixError::Status {
                status: 404,
                message: "unknown secret".into(),
            })?;
        if !position.checkins.is_empty() {
            return Err(PretixError::AlreadyRedeemed);
        }
        position.checkins.push(PretixCheckin {
            list: checkin_list,
            timestamp: now(),
        });

        self.pushed
            .lock()
            .unwrap()
            .push((event.to_string(), checkin_list, secret.to_string()));
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MockLemonadeEvent {
    pub ticket_types: Vec<LemonadeTicketType>,
    pub tickets: Vec<LemonadeTicket>,
}

/// Lemonade backend held in memory.
#[derive(Default)]
pub struct MockLemonade {
    events: Mutex<HashMap<String, MockLemonadeEvent>>,
    checked_in: Mutex<Vec<(String, String)>>,
}

impl MockLemonade {
    pub fn insert_event(&self, event: &str, data: MockLemonadeEvent) {
        self.events.lock().unwrap().insert(event.to_string(), data);
    }

    /// Event and user of every check-in received.
    pub fn checked_in(&self) -> Vec<(String, String)> {
        self.checked_in.lock().unwrap().clone()
    }

    fn event(&self, event: &str) -> Result<MockLemonadeEvent, LemonadeError> {
        self.events
            .lock()
            .unwrap()
            .get(event)
            .cloned()
            .ok_or_else(|| LemonadeError::Status {
                status: 404,
                message: format!("unknown event {event}"),
            })
    }
}

#[async_trait]
impl LemonadeApi for MockLemonade {
    async fn fetch_ticket_types(
        &self,
        _connection: &LemonadeConnection,
        event: &str,
    ) -> Result<Vec<LemonadeTicketType>, LemonadeError> {
        Ok(self.event(event)?.ticket_types)
    }

    async fn fetch_tickets(
        &self,
        _connection: &LemonadeConnection,
        event: &str,
    ) -> Result<Vec<LemonadeTicket>, LemonadeError> {
        Ok(self.event(event)?.tickets)
    }

    async fn checkin_user(
        &self,
        _connection: &LemonadeConnection,
        event: &str,
        user_id: &str,
    ) -> Result<(), LemonadeError> {
        tokio::task::yield_now().await;

        let mut events = self.events.lock().unwrap();
        let ticket = events
            .get_mut(event)
            .into_iter()
            .flat_map(|event| event.tickets.iter_mut())
            .find(|ticket| ticket.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| LemonadeError::UnknownUser(user_id.to_string()))?;
        ticket.checked_in_at = Some(now());

        self.checked_in
            .lock()
            .unwrap()
            .push((event.to_string(), user_id.to_string()));
        Ok(())
    }
}
