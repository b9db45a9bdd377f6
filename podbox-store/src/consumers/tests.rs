// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Hash;
use uuid::Uuid;

use crate::consumers::ConsumerStore;
use crate::write;

#[tokio::test]
async fn update_time_only_moves_on_change() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let commitment_1 = Hash::new(b"identity 1");
        let commitment_2 = Hash::new(b"identity 2");

        let created = write(&store, async |store| {
            store
                .save_consumer(pipeline_id, "Panda@example.org", commitment_1, 100)
                .await
        })
        .await
        .unwrap();
        assert!(created);

        // Same commitment, later timestamp: nothing changes.
        let changed = write(&store, async |store| {
            store
                .save_consumer(pipeline_id, "panda@example.org", commitment_1, 200)
                .await
        })
        .await
        .unwrap();
        assert!(!changed);

        let consumers = store.load_consumers(pipeline_id).await.unwrap();
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].email, "panda@example.org");
        assert_eq!(consumers[0].time_created, 100);
        assert_eq!(consumers[0].time_updated, 100);

        // New commitment moves the update time.
        let changed = write(&store, async |store| {
            store
                .save_consumer(pipeline_id, "panda@example.org", commitment_2, 300)
                .await
        })
        .await
        .unwrap();
        assert!(changed);

        let consumers = store.load_consumers(pipeline_id).await.unwrap();
        assert_eq!(consumers[0].commitment, commitment_2);
        assert_eq!(consumers[0].time_created, 100);
        assert_eq!(consumers[0].time_updated, 300);
    });
}

#[tokio::test]
async fn load_by_emails() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();

        write(&store, async |store| {
            let emails = [("a@example.org", 1u8), ("b@example.org", 2), ("c@example.org", 3)];
            for (email, seed) in emails {
                store
                    .save_consumer(pipeline_id, email, Hash::new([seed]), 1)
                    .await?;
            }
            // Same email, different pipeline.
            store
                .save_consumer(Uuid::new_v4(), "a@example.org", Hash::new([4]), 1)
                .await?;
            Ok(())
        })
        .await
        .unwrap();

        let consumers = store
            .load_consumers_by_emails(
                pipeline_id,
                &["C@example.org".to_string(), "a@example.org".to_string()],
            )
            .await
            .unwrap();
        let emails: Vec<&str> = consumers.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(emails, vec!["a@example.org", "c@example.org"]);

        assert!(
            store
                .load_consumers_by_emails(pipeline_id, &[])
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.load_consumers(pipeline_id).await.unwrap().len(), 3);
    });
}
