// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

use crate::manual_tickets::{ManualTicket, ManualTicketStore};
use crate::write;

fn ticket(email: &str) -> ManualTicket {
    ManualTicket {
        id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        attendee_email: email.to_string(),
        attendee_name: "Panda".to_string(),
        time_created: 7,
    }
}

#[tokio::test]
async fn save_and_load() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let tickets = vec![
            ticket("Panda@example.org"),
            ticket("panda@example.org"),
            ticket("bamboo@example.org"),
        ];

        write(&store, async |store| {
            store.save_manual_tickets(pipeline_id, &tickets).await
        })
        .await
        .unwrap();

        // Saving the same tickets again does not duplicate them.
        write(&store, async |store| {
            store.save_manual_tickets(pipeline_id, &tickets[..1]).await
        })
        .await
        .unwrap();

        assert_eq!(store.load_manual_tickets(pipeline_id).await.unwrap().len(), 3);

        let found = store
            .load_manual_tickets_by_email(pipeline_id, "PANDA@example.org")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&tickets[0]));
        assert!(found.contains(&tickets[1]));

        assert!(
            store
                .load_manual_tickets(Uuid::new_v4())
                .await
                .unwrap()
                .is_empty()
        );
    });
}
