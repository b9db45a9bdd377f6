// SPDX-License-Identifier: MIT OR Apache-2.0

use uuid::Uuid;

use crate::checkins::{CheckinRecord, CheckinStore};
use crate::{StoreError, write};

#[tokio::test]
async fn second_checkin_is_rejected() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let ticket_id = Uuid::new_v4();
        let record = CheckinRecord {
            pipeline_id,
            ticket_id,
            checker_email: "door@example.org".to_string(),
            timestamp: 42,
        };

        write(&store, async |store| store.add_checkin(record.clone()).await)
            .await
            .unwrap();

        let result = write(&store, async |store| {
            store
                .add_checkin(CheckinRecord {
                    checker_email: "other@example.org".to_string(),
                    timestamp: 43,
                    ..record.clone()
                })
                .await
        })
        .await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));

        // The first check-in is the one which counts.
        assert_eq!(
            store.checkin(pipeline_id, ticket_id).await.unwrap(),
            Some(record.clone())
        );
        assert_eq!(store.checkins(pipeline_id).await.unwrap(), vec![record]);

        let deleted = write(&store, async |store| {
            store.delete_checkin(pipeline_id, ticket_id).await
        })
        .await
        .unwrap();
        assert!(deleted);
        assert!(store.checkin(pipeline_id, ticket_id).await.unwrap().is_none());
    });
}
