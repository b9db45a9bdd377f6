// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Hash;
use uuid::Uuid;

use crate::semaphore_history::SemaphoreHistoryStore;
use crate::write;

#[tokio::test]
async fn latest_and_historical_entries() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let root_1 = Hash::new(b"root 1");
        let root_2 = Hash::new(b"root 2");

        assert!(
            store
                .latest_history_entry(pipeline_id, group_id)
                .await
                .unwrap()
                .is_none()
        );

        let first = write(&store, async |store| {
            store
                .add_history_entry(pipeline_id, group_id, root_1, "{\"v\":1}", 10)
                .await
        })
        .await
        .unwrap();
        let second = write(&store, async |store| {
            store
                .add_history_entry(pipeline_id, group_id, root_2, "{\"v\":2}", 20)
                .await
        })
        .await
        .unwrap();
        assert!(second.sequence > first.sequence);

        let latest = store
            .latest_history_entry(pipeline_id, group_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest, second);

        let historical = store
            .history_entry_by_root(pipeline_id, group_id, &root_1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(historical.serialized_group, "{\"v\":1}");
        assert_eq!(historical.time_created, 10);

        assert!(
            store
                .history_entry_by_root(pipeline_id, group_id, &Hash::new(b"unknown"))
                .await
                .unwrap()
                .is_none()
        );
    });
}

#[tokio::test]
async fn delete_group_history() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let group_1 = Uuid::new_v4();
        let group_2 = Uuid::new_v4();

        write(&store, async |store| {
            store
                .add_history_entry(pipeline_id, group_1, Hash::new(b"a"), "a", 1)
                .await?;
            store
                .add_history_entry(pipeline_id, group_2, Hash::new(b"b"), "b", 1)
                .await?;
            Ok(())
        })
        .await
        .unwrap();

        let mut expected = vec![group_1, group_2];
        expected.sort();
        assert_eq!(
            store.history_group_ids(pipeline_id).await.unwrap(),
            expected
        );

        let deleted = write(&store, async |store| {
            store.delete_history(pipeline_id, group_1).await
        })
        .await
        .unwrap();
        assert!(deleted);

        assert_eq!(
            store.history_group_ids(pipeline_id).await.unwrap(),
            vec![group_2]
        );
        assert!(
            store
                .latest_history_entry(pipeline_id, group_1)
                .await
                .unwrap()
                .is_none()
        );
    });
}
