// SPDX-License-Identifier: MIT OR Apache-2.0

use podbox_core::Hash;

use crate::users::{UserRecord, UserStore};
use crate::{StoreError, write};

#[tokio::test]
async fn lookup_by_auth_key() {
    crate::assert_all_stores!(|store| async {
        let user = UserRecord {
            email: "Service@Example.org".to_string(),
            commitment: Hash::new(b"service identity"),
            auth_key: Some("secret".to_string()),
        };

        write(&store, async |store| store.save_user(user.clone()).await)
            .await
            .unwrap();

        let found = store.user_by_auth_key("secret").await.unwrap().unwrap();
        assert_eq!(found.email, "service@example.org");
        assert_eq!(found.commitment, user.commitment);
        assert!(store.user_by_auth_key("guess").await.unwrap().is_none());
        assert!(
            store
                .user_by_email("SERVICE@example.org")
                .await
                .unwrap()
                .is_some()
        );

        // Auth keys are unique across users.
        let result = write(&store, async |store| {
            store
                .save_user(UserRecord {
                    email: "other@example.org".to_string(),
                    commitment: Hash::new(b"other identity"),
                    auth_key: Some("secret".to_string()),
                })
                .await
        })
        .await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));

        // Rotating the key of the same user releases the old one.
        write(&store, async |store| {
            store
                .save_user(UserRecord {
                    auth_key: Some("rotated".to_string()),
                    ..user.clone()
                })
                .await
        })
        .await
        .unwrap();
        assert!(store.user_by_auth_key("secret").await.unwrap().is_none());
        assert!(store.user_by_auth_key("rotated").await.unwrap().is_some());
    });
}
