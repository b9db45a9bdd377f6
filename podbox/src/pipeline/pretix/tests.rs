// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use assert_matches::assert_matches;
use async_trait::async_trait;
use podbox_store::MemoryStore;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::checkin::{CheckinError, CheckinRequest};
use crate::config::{EventConfig, FeedOptions, PretixPipelineOptions, ProductConfig, TicketingOptions};
use crate::pipeline::{Pipeline, TicketAtom};
use crate::test_utils::{MockPretix, MockPretixEvent, TestIssuer, setup_logging, test_context};

use super::{
    PretixApi, PretixCheckinList, PretixConnection, PretixError, PretixEvent, PretixEventSettings,
    PretixItem, PretixOrder, PretixPipeline, PretixPosition,
};

const SLUG: &str = "pandacon";

fn position(id: u64, item: u64, email: Option<&str>, addon_to: Option<u64>) -> PretixPosition {
    PretixPosition {
        id,
        item,
        attendee_name: Some(format!("Attendee {id}")),
        attendee_email: email.map(str::to_string),
        secret: format!("s{id}"),
        addon_to,
        checkins: vec![],
    }
}

fn pretix_event() -> MockPretixEvent {
    MockPretixEvent {
        event: PretixEvent {
            slug: SLUG.into(),
            name: "Panda Con".into(),
        },
        settings: PretixEventSettings {
            attendee_emails_asked: true,
            attendee_emails_required: true,
        },
        items: vec![
            PretixItem {
                id: 1,
                name: "General".into(),
                admission: true,
            },
            PretixItem {
                id: 2,
                name: "Staff".into(),
                admission: true,
            },
            PretixItem {
                id: 3,
                name: "T-Shirt".into(),
                admission: false,
            },
        ],
        checkin_lists: vec![PretixCheckinList {
            id: 7,
            name: "Entrance".into(),
        }],
        orders: vec![
            PretixOrder {
                code: "A1".into(),
                status: "p".into(),
                email: Some("buyer@example.org".into()),
                positions: vec![
                    position(10, 1, Some("Panda@example.org"), None),
                    position(11, 1, None, Some(10)),
                    position(12, 3, None, Some(10)),
                ],
            },
            PretixOrder {
                code: "B2".into(),
                status: "n".into(),
                email: Some("pending@example.org".into()),
                positions: vec![position(20, 1, None, None)],
            },
            PretixOrder {
                code: "C3".into(),
                status: "p".into(),
                email: Some("door@example.org".into()),
                positions: vec![position(30, 2, None, None)],
            },
        ],
    }
}

struct Fixture {
    issuer: TestIssuer,
    api: Arc<MockPretix>,
    pipeline: PretixPipeline<MemoryStore>,
}

/// Holds back check-in pushes until a load has fetched the orders, once armed.
struct OrdersFirst {
    inner: Arc<MockPretix>,
    armed: AtomicBool,
    orders_fetched: Notify,
}

impl OrdersFirst {
    fn new(inner: Arc<MockPretix>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            orders_fetched: Notify::new(),
        }
    }

    fn arm(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }
}

#[async_trait]
impl PretixApi for OrdersFirst {
    async fn fetch_event(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<PretixEvent, PretixError> {
        self.inner.fetch_event(connection, event).await
    }

    async fn fetch_settings(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<PretixEventSettings, PretixError> {
        self.inner.fetch_settings(connection, event).await
    }

    async fn fetch_items(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixItem>, PretixError> {
        self.inner.fetch_items(connection, event).await
    }

    async fn fetch_checkin_lists(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixCheckinList>, PretixError> {
        self.inner.fetch_checkin_lists(connection, event).await
    }

    async fn fetch_orders(
        &self,
        connection: &PretixConnection,
        event: &str,
    ) -> Result<Vec<PretixOrder>, PretixError> {
        let orders = self.inner.fetch_orders(connection, event).await;
        if self.armed.load(Ordering::SeqCst) {
            self.orders_fetched.notify_one();
        }
        orders
    }

    async fn push_checkin(
        &self,
        connection: &PretixConnection,
        event: &str,
        checkin_list: u64,
        secret: &str,
    ) -> Result<(), PretixError> {
        if self.armed.load(Ordering::SeqCst) {
            self.orders_fetched.notified().await;
        }
        self.inner
            .push_checkin(connection, event, checkin_list, secret)
            .await
    }
}

impl Fixture {
    async fn new() -> Self {
        Self::wrapping(|api| api as Arc<dyn PretixApi>).await
    }

    /// Builds the pipeline on the client returned by `wrap`.
    async fn wrapping(wrap: impl FnOnce(Arc<MockPretix>) -> Arc<dyn PretixApi>) -> Self {
        setup_logging();

        let issuer = TestIssuer::new();
        let api = Arc::new(MockPretix::default());
        api.insert_event(SLUG, pretix_event());

        let options = PretixPipelineOptions {
            pretix_api_org_url: "https://pretix.example.org/api/v1/organizers/panda".into(),
            pretix_api_token: "token".into(),
            ticketing: TicketingOptions {
                events: vec![EventConfig {
                    id: Uuid::new_v4(),
                    name: "Panda Con".into(),
                    external_id: SLUG.into(),
                    products: vec![
                        ProductConfig {
                            id: Uuid::new_v4(),
                            name: "General".into(),
                            external_id: "1".into(),
                            is_super_user: false,
                        },
                        ProductConfig {
                            id: Uuid::new_v4(),
                            name: "Staff".into(),
                            external_id: "2".into(),
                            is_super_user: true,
                        },
                    ],
                }],
                feed_options: FeedOptions {
                    feed_id: "tickets".into(),
                    feed_display_name: "Tickets".into(),
                    feed_description: String::new(),
                    feed_folder: "Panda Con".into(),
                },
                semaphore_groups: vec![],
                manual_tickets: vec![],
                superuser_emails: vec![],
                auto_issuance: vec![],
                user_permissions: vec![],
            },
        };

        let pipeline = PretixPipeline::new(
            Uuid::new_v4(),
            options,
            wrap(api.clone()),
            test_context(MemoryStore::default(), &issuer),
        );
        pipeline.start().await.unwrap();

        Self {
            issuer,
            api,
            pipeline,
        }
    }

    async fn atom_of(&self, secret: &str) -> TicketAtom {
        self.pipeline
            .core()
            .atoms()
            .await
            .unwrap()
            .into_iter()
            .find(|atom| atom.external_id == secret)
            .unwrap()
    }

    async fn checkin_request(&self, secret: &str) -> CheckinRequest {
        CheckinRequest {
            credential: self.issuer.credential("door@example.org"),
            ticket_id: self.atom_of(secret).await.id,
        }
    }
}

#[tokio::test]
async fn paid_positions_become_atoms() {
    let fixture = Fixture::new().await;

    let summary = fixture.pipeline.load().await;
    assert!(summary.success, "{:?}", summary.error);
    assert_eq!(summary.atoms_loaded, 3);
    assert_eq!(summary.atoms_expected, 3);

    let ticket = fixture.atom_of("s10").await;
    assert_eq!(ticket.email.as_deref(), Some("panda@example.org"));
    assert!(ticket.parent_atom_id.is_none());

    // Add-ons carry the email of the position they were bought with.
    let addon = fixture.atom_of("s11").await;
    assert_eq!(addon.email.as_deref(), Some("panda@example.org"));
    assert_eq!(addon.parent_atom_id, Some(ticket.id));

    // Positions without their own email fall back to the order email.
    let staff = fixture.atom_of("s30").await;
    assert_eq!(staff.email.as_deref(), Some("door@example.org"));
}

#[tokio::test]
async fn misconfigured_event_fails_load() {
    let fixture = Fixture::new().await;
    fixture.api.update_event(SLUG, |event| {
        event.settings.attendee_emails_required = false;
        event.items[1].admission = false;
    });

    let summary = fixture.pipeline.load().await;
    assert!(!summary.success);
    let error = summary.error.unwrap();
    assert!(error.contains("must require attendee emails"));
    assert!(error.contains("'Staff'"));
    assert!(fixture.pipeline.core().atoms().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_event_keeps_previous_atoms() {
    let fixture = Fixture::new().await;
    assert!(fixture.pipeline.load().await.success);

    fixture.api.set_unreachable(SLUG, true);
    let summary = fixture.pipeline.load().await;
    assert!(summary.success);
    assert_eq!(summary.atoms_loaded, 3);
    assert!(
        summary
            .latest_logs
            .iter()
            .any(|log| log.message.contains("skipping event 'Panda Con'"))
    );
    assert_eq!(fixture.pipeline.core().atoms().await.unwrap().len(), 3);
}

#[tokio::test]
async fn checkins_are_pushed_to_pretix() {
    let fixture = Fixture::new().await;
    assert!(fixture.pipeline.load().await.success);

    let request = fixture.checkin_request("s10").await;
    assert!(fixture.pipeline.core().pre_check(&request).await.can_check_in);

    let response = fixture.pipeline.core().checkin(&request).await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(
        fixture.api.pushed(),
        vec![(SLUG.to_string(), 7, "s10".to_string())]
    );

    // The in-flight marker answers until the next load confirms the check-in.
    let response = fixture.pipeline.core().checkin(&request).await;
    assert_matches!(
        response.error,
        Some(CheckinError::AlreadyCheckedIn { checker: Some(ref checker), .. })
            if checker == "door@example.org"
    );
    assert_eq!(fixture.pipeline.core().pending().len(), 1);

    assert!(fixture.pipeline.load().await.success);
    assert!(fixture.pipeline.core().pending().is_empty());
    assert!(fixture.atom_of("s10").await.checked_in);

    let response = fixture.pipeline.core().checkin(&request).await;
    assert_matches!(response.error, Some(CheckinError::AlreadyCheckedIn { .. }));
    assert_eq!(fixture.api.pushed().len(), 1);
}

#[tokio::test]
async fn push_acknowledged_during_load_keeps_marker() {
    let mut gate = None;
    let fixture = Fixture::wrapping(|api| {
        let wrapped = Arc::new(OrdersFirst::new(api));
        gate = Some(wrapped.clone());
        wrapped as Arc<dyn PretixApi>
    })
    .await;
    let gate = gate.unwrap();
    assert!(fixture.pipeline.load().await.success);

    let request = fixture.checkin_request("s10").await;
    let core = fixture.pipeline.core();

    // The load reads the orders before pretix has redeemed the position.
    gate.arm(true);
    let (response, summary) = tokio::join!(core.checkin(&request), fixture.pipeline.load());
    gate.arm(false);
    assert!(response.success, "{:?}", response.error);
    assert!(summary.success, "{:?}", summary.error);
    assert!(!fixture.atom_of("s10").await.checked_in);
    assert_eq!(core.pending().len(), 1);

    let pre_check = core.pre_check(&request).await;
    assert!(!pre_check.can_check_in);
    assert_matches!(
        pre_check.error,
        Some(CheckinError::AlreadyCheckedIn { checker: Some(ref checker), .. })
            if checker == "door@example.org"
    );

    assert!(fixture.pipeline.load().await.success);
    assert!(fixture.atom_of("s10").await.checked_in);
    assert!(core.pending().is_empty());
    assert_eq!(fixture.api.pushed().len(), 1);
}

#[tokio::test]
async fn concurrent_checkins_push_once() {
    let fixture = Fixture::new().await;
    assert!(fixture.pipeline.load().await.success);

    let request = fixture.checkin_request("s11").await;
    let core = fixture.pipeline.core();
    let (first, second) = tokio::join!(core.checkin(&request), core.checkin(&request));

    assert_eq!([first.success, second.success].iter().filter(|s| **s).count(), 1);
    let failed = if first.success { second } else { first };
    assert_matches!(failed.error, Some(CheckinError::AlreadyCheckedIn { .. }));
    assert_eq!(fixture.api.pushed().len(), 1);
}

#[tokio::test]
async fn refused_push_releases_ticket() {
    let fixture = Fixture::new().await;
    assert!(fixture.pipeline.load().await.success);
    fixture.api.fail_pushes(true);

    let request = fixture.checkin_request("s10").await;
    let response = fixture.pipeline.core().checkin(&request).await;
    assert_eq!(response.error, Some(CheckinError::ServerError));
    assert!(fixture.pipeline.core().pending().is_empty());

    fixture.api.fail_pushes(false);
    assert!(fixture.pipeline.core().checkin(&request).await.success);
}

#[tokio::test]
async fn attendees_cannot_check_in() {
    let fixture = Fixture::new().await;
    assert!(fixture.pipeline.load().await.success);

    let request = CheckinRequest {
        credential: fixture.issuer.credential("panda@example.org"),
        ticket_id: fixture.atom_of("s30").await.id,
    };
    let response = fixture.pipeline.core().checkin(&request).await;
    assert_eq!(response.error, Some(CheckinError::NotSuperuser));
    assert!(fixture.api.pushed().is_empty());
}
