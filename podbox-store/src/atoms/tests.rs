// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::atoms::{Atom, AtomStore};
use crate::write;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct TestAtom {
    id: Uuid,
    email: Option<String>,
    product: String,
}

impl TestAtom {
    fn new(email: Option<&str>, product: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.map(str::to_string),
            product: product.to_string(),
        }
    }
}

impl Atom for TestAtom {
    fn id(&self) -> Uuid {
        self.id
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

#[tokio::test]
async fn replace_is_total() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let old = vec![
            TestAtom::new(Some("a@example.org"), "ga"),
            TestAtom::new(Some("b@example.org"), "ga"),
        ];
        let new = vec![TestAtom::new(Some("c@example.org"), "vip")];

        assert!(!store.has_loaded(pipeline_id).await.unwrap());

        write(&store, async |store| store.replace(pipeline_id, &old).await)
            .await
            .unwrap();
        assert!(store.has_loaded(pipeline_id).await.unwrap());
        assert_eq!(store.load::<TestAtom>(pipeline_id).await.unwrap().len(), 2);

        write(&store, async |store| store.replace(pipeline_id, &new).await)
            .await
            .unwrap();
        assert_eq!(store.load::<TestAtom>(pipeline_id).await.unwrap(), new);
        assert!(
            store
                .load_by_id::<TestAtom>(pipeline_id, old[0].id)
                .await
                .unwrap()
                .is_none()
        );
    });
}

#[tokio::test]
async fn load_by_email_ignores_case() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();
        let atoms = vec![
            TestAtom::new(Some("Alice@Example.org"), "ga"),
            TestAtom::new(Some("alice@example.org"), "vip"),
            TestAtom::new(Some("bob@example.org"), "ga"),
            TestAtom::new(None, "addon"),
        ];

        write(&store, async |store| store.save(pipeline_id, &atoms).await)
            .await
            .unwrap();

        let found = store
            .load_by_email::<TestAtom>(pipeline_id, "ALICE@example.ORG")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        // Email is kept as it came in, only the index is lower-cased.
        assert!(found.contains(&atoms[0]));

        let found = store
            .load_by_id::<TestAtom>(pipeline_id, atoms[3].id)
            .await
            .unwrap();
        assert_eq!(found, Some(atoms[3].clone()));

        // Atoms of other pipelines are not visible.
        assert!(
            store
                .load_by_email::<TestAtom>(Uuid::new_v4(), "bob@example.org")
                .await
                .unwrap()
                .is_empty()
        );
    });
}

#[tokio::test]
async fn empty_save_does_not_mark_loaded() {
    crate::assert_all_stores!(|store| async {
        let pipeline_id = Uuid::new_v4();

        write(&store, async |store| {
            store.replace::<TestAtom>(pipeline_id, &[]).await
        })
        .await
        .unwrap();
        assert!(!store.has_loaded(pipeline_id).await.unwrap());

        write(&store, async |store| store.mark_as_loaded(pipeline_id).await)
            .await
            .unwrap();
        assert!(store.has_loaded(pipeline_id).await.unwrap());

        // Clearing keeps the pipeline marked as loaded.
        write(&store, async |store| store.clear(pipeline_id).await)
            .await
            .unwrap();
        assert!(store.has_loaded(pipeline_id).await.unwrap());
        assert!(store.load::<TestAtom>(pipeline_id).await.unwrap().is_empty());
    });
}
