// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use assert_matches::assert_matches;
use podbox::test_utils::{MockPretix, TestIssuer, setup_logging};
use podbox::{
    FeedRequest, PcdAction, Pipeline, PipelineDefinition, PipelineError, PipelineKind, PodboxError,
};
use podbox_store::MemoryStore;
use uuid::Uuid;

fn csv_definition(id: Uuid) -> PipelineDefinition {
    let json = format!(
        r#"{{
            "id": "{id}",
            "type": "csv",
            "options": {{
                "csv": "title,body\nhello,world\ngoodbye,moon\n",
                "feedOptions": {{
                    "feedId": "messages",
                    "feedDisplayName": "Messages",
                    "feedFolder": "Messages"
                }}
            }}
        }}"#
    );
    PipelineDefinition::from_json(&json).unwrap()
}

fn pretix_definition(id: Uuid) -> PipelineDefinition {
    let json = format!(
        r#"{{
            "id": "{id}",
            "type": "pretix",
            "options": {{
                "pretixApiOrgUrl": "https://pretix.example.org/api/v1/organizers/panda",
                "pretixApiToken": "token",
                "events": [],
                "feedOptions": {{
                    "feedId": "tickets",
                    "feedDisplayName": "Tickets",
                    "feedFolder": "Tickets"
                }}
            }}
        }}"#
    );
    PipelineDefinition::from_json(&json).unwrap()
}

#[tokio::test]
async fn spreadsheet_pipeline_issues_messages() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let issuer = TestIssuer::new();
    let podbox = podbox::builder()
        .trusted_issuer(issuer.public_key())
        .spawn_with_store(MemoryStore::default());

    let id = Uuid::new_v4();
    let pipeline = podbox.spawn_pipeline(csv_definition(id)).await?;
    assert_eq!(pipeline.kind(), PipelineKind::Csv);

    let summary = podbox.load(id).await?;
    assert!(summary.success);
    assert_eq!(summary.atoms_loaded, 2);

    let response = pipeline.issue(&FeedRequest::anonymous()).await?;
    assert_eq!(response.actions.len(), 1);
    assert_matches!(
        &response.actions[0],
        PcdAction::ReplaceInFolder { folder, pcds } if folder == "Messages" && pcds.len() == 2
    );

    Ok(())
}

#[tokio::test]
async fn engine_on_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let url = format!(
        "sqlite://podbox{}?mode=memory&cache=private",
        Uuid::new_v4().simple()
    );
    let podbox = podbox::builder()
        .database_url(&url)
        .max_connections(1)
        .spawn()
        .await?;

    let id = Uuid::new_v4();
    podbox.spawn_pipeline(csv_definition(id)).await?;
    let summary = podbox.load(id).await?;
    assert!(summary.success, "{:?}", summary.error);
    assert_eq!(summary.atoms_loaded, 2);

    Ok(())
}

#[tokio::test]
async fn backend_pipelines_need_a_client() {
    let podbox = podbox::builder().spawn_with_store(MemoryStore::default());
    let result = podbox.spawn_pipeline(pretix_definition(Uuid::new_v4())).await;
    assert!(matches!(
        result,
        Err(PodboxError::Pipeline(PipelineError::MissingBackend(
            PipelineKind::Pretix
        )))
    ));

    let podbox = podbox::builder()
        .pretix_api(Arc::new(MockPretix::default()))
        .spawn_with_store(MemoryStore::default());
    let Ok(pipeline) = podbox.spawn_pipeline(pretix_definition(Uuid::new_v4())).await else {
        panic!("pipeline did not start");
    };
    assert_eq!(pipeline.kind(), PipelineKind::Pretix);
}

#[tokio::test]
async fn stopped_pipelines_are_removed() {
    let podbox = podbox::builder().spawn_with_store(MemoryStore::default());

    let id = Uuid::new_v4();
    let Ok(pipeline) = podbox.spawn_pipeline(csv_definition(id)).await else {
        panic!("pipeline did not start");
    };
    podbox.stop(id).unwrap();

    assert!(pipeline.is_stopped());
    assert!(podbox.pipeline(id).is_none());
    assert_matches!(podbox.load(id).await, Err(PodboxError::UnknownPipeline(_)));

    let summary = pipeline.load().await;
    assert!(!summary.success);
    assert_eq!(summary.error.as_deref(), Some("pipeline was stopped"));
}

#[tokio::test]
async fn respawning_replaces_pipeline() {
    let podbox = podbox::builder().spawn_with_store(MemoryStore::default());

    let id = Uuid::new_v4();
    let Ok(first) = podbox.spawn_pipeline(csv_definition(id)).await else {
        panic!("pipeline did not start");
    };
    let Ok(second) = podbox.spawn_pipeline(csv_definition(id)).await else {
        panic!("pipeline did not start");
    };

    assert!(first.is_stopped());
    assert!(!second.is_stopped());
    assert_eq!(podbox.pipelines().len(), 1);
    assert_eq!(podbox.load_all().await.len(), 1);
}
