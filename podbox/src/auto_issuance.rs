// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-based granting of manual tickets.
use podbox_core::Timestamp;
use podbox_store::ManualTicket;
use uuid::Uuid;

use crate::config::{AutoIssuanceRule, UNKNOWN_ATTENDEE_NAME};

/// Ticket held by an attendee, as seen by the rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeldTicket {
    pub event_id: Uuid,
    pub product_id: Uuid,
    pub attendee_name: String,
}

impl From<&ManualTicket> for HeldTicket {
    fn from(ticket: &ManualTicket) -> Self {
        Self {
            event_id: ticket.event_id,
            product_id: ticket.product_id,
            attendee_name: ticket.attendee_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AutoIssuanceProvider {
    rules: Vec<AutoIssuanceRule>,
}

impl AutoIssuanceProvider {
    pub fn new(rules: Vec<AutoIssuanceRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the manual tickets `email` is missing according to the rules.
    ///
    /// `held` are the attendee's atom-backed and configured tickets, `granted` the manual tickets
    /// issued to them earlier. A rule grants up to `quantity` tickets of its product in total, so
    /// running this again with the returned tickets added to `granted` yields nothing.
    pub fn dispense(
        &self,
        email: &str,
        held: &[HeldTicket],
        granted: &[ManualTicket],
        now: Timestamp,
    ) -> Vec<ManualTicket> {
        let mut holdings: Vec<HeldTicket> = held.to_vec();
        holdings.extend(granted.iter().map(HeldTicket::from));
        let mut issued: Vec<ManualTicket> = Vec::new();

        for rule in &self.rules {
            let Some(matching) = holdings.iter().find(|ticket| {
                rule.member_criteria
                    .iter()
                    .any(|criterion| criterion.matches(ticket.event_id, ticket.product_id))
            }) else {
                continue;
            };

            let existing = granted
                .iter()
                .chain(issued.iter())
                .filter(|ticket| {
                    ticket.event_id == rule.event_id && ticket.product_id == rule.product_id
                })
                .count();
            if existing >= rule.quantity {
                continue;
            }

            let attendee_name = if matching.attendee_name.is_empty() {
                UNKNOWN_ATTENDEE_NAME.to_string()
            } else {
                matching.attendee_name.clone()
            };
            let new_tickets: Vec<ManualTicket> = (existing..rule.quantity)
                .map(|_| ManualTicket {
                    id: Uuid::new_v4(),
                    event_id: rule.event_id,
                    product_id: rule.product_id,
                    attendee_email: email.to_lowercase(),
                    attendee_name: attendee_name.clone(),
                    time_created: now,
                })
                .collect();

            holdings.extend(new_tickets.iter().map(HeldTicket::from));
            issued.extend(new_tickets);
        }

        issued
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{AutoIssuanceProvider, HeldTicket};
    use crate::config::{AutoIssuanceRule, MemberCriterion, UNKNOWN_ATTENDEE_NAME};

    #[test]
    fn grants_once_up_to_quantity() {
        let event_id = Uuid::new_v4();
        let attendee = Uuid::new_v4();
        let voucher = Uuid::new_v4();
        let provider = AutoIssuanceProvider::new(vec![AutoIssuanceRule {
            member_criteria: vec![MemberCriterion {
                event_id,
                product_id: Some(attendee),
            }],
            event_id,
            product_id: voucher,
            quantity: 2,
        }]);
        let held = vec![HeldTicket {
            event_id,
            product_id: attendee,
            attendee_name: "Panda".into(),
        }];

        let first = provider.dispense("Panda@example.org", &held, &[], 1);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|ticket| ticket.product_id == voucher));
        assert!(first.iter().all(|ticket| ticket.attendee_email == "panda@example.org"));
        assert!(first.iter().all(|ticket| ticket.attendee_name == "Panda"));
        assert_ne!(first[0].id, first[1].id);

        let second = provider.dispense("panda@example.org", &held, &first, 2);
        assert!(second.is_empty());

        // One of two vouchers already granted: only the missing one is added.
        let third = provider.dispense("panda@example.org", &held, &first[..1], 3);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn no_matching_ticket_no_grant() {
        let event_id = Uuid::new_v4();
        let provider = AutoIssuanceProvider::new(vec![AutoIssuanceRule {
            member_criteria: vec![MemberCriterion {
                event_id,
                product_id: None,
            }],
            event_id,
            product_id: Uuid::new_v4(),
            quantity: 1,
        }]);
        let held = vec![HeldTicket {
            event_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            attendee_name: "Panda".into(),
        }];

        assert!(provider.dispense("panda@example.org", &held, &[], 1).is_empty());
    }

    #[test]
    fn granted_tickets_satisfy_later_rules() {
        let event_id = Uuid::new_v4();
        let attendee = Uuid::new_v4();
        let voucher = Uuid::new_v4();
        let drink = Uuid::new_v4();
        let provider = AutoIssuanceProvider::new(vec![
            AutoIssuanceRule {
                member_criteria: vec![MemberCriterion {
                    event_id,
                    product_id: Some(attendee),
                }],
                event_id,
                product_id: voucher,
                quantity: 1,
            },
            AutoIssuanceRule {
                member_criteria: vec![MemberCriterion {
                    event_id,
                    product_id: Some(voucher),
                }],
                event_id,
                product_id: drink,
                quantity: 1,
            },
        ]);
        let held = vec![HeldTicket {
            event_id,
            product_id: attendee,
            attendee_name: String::new(),
        }];

        let issued = provider.dispense("panda@example.org", &held, &[], 1);
        assert_eq!(issued.len(), 2);
        assert_eq!(issued[1].product_id, drink);
        assert_eq!(issued[0].attendee_name, UNKNOWN_ATTENDEE_NAME);
    }
}
