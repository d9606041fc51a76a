use std::sync::Arc;

use feedback360::model::{NewCompetency, Scores};
use feedback360::store::{RetryingStore, SqliteStore, StoreError, SurveyStore};
use feedback360::submission::submit_feedback;
use tempfile::tempdir;

#[tokio::test]
async fn concurrent_feedback_from_two_handles_lands_atomically() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("survey.sqlite");

    let a: Arc<dyn SurveyStore> = Arc::new(RetryingStore::new(SqliteStore::new(&db_path).unwrap()));
    let b: Arc<dyn SurveyStore> = Arc::new(RetryingStore::new(SqliteStore::new(&db_path).unwrap()));

    let template = a.create_template("T", "").await.unwrap();
    let category = a.create_category(template.id, "Teamwork", 1).await.unwrap();
    let mut competencies = Vec::new();
    for i in 0..5 {
        let text = format!("Item {i}");
        let c = a
            .create_competency(category.id, NewCompetency::new(text.clone(), text, i))
            .await
            .unwrap();
        competencies.push(c.id);
    }
    let group = a.create_group("G", "Acme", template.id).await.unwrap();
    let participant = a
        .create_participant(group.id, "Ana", "ana@example.com")
        .await
        .unwrap();

    let mut evaluators = Vec::new();
    for i in 0..8 {
        let e = a
            .create_evaluator(participant.id, &format!("E{i}"), &format!("e{i}@example.com"))
            .await
            .unwrap();
        evaluators.push(e.id);
    }

    let mut handles = Vec::new();
    for (i, evaluator_id) in evaluators.iter().copied().enumerate() {
        let store = if i % 2 == 0 { a.clone() } else { b.clone() };
        let scores: Scores = competencies
            .iter()
            .map(|&c| (c, (i as i64 % 5) + 1))
            .collect();
        handles.push(tokio::spawn(async move {
            submit_feedback(store.as_ref(), participant.id, evaluator_id, &scores).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let responses = b.list_responses_by_participant(participant.id).await.unwrap();
    assert_eq!(responses.len(), evaluators.len() * competencies.len());
    for e in b.list_evaluators(participant.id).await.unwrap() {
        assert!(e.completed, "evaluator {} not marked completed", e.id);
    }
}

#[tokio::test]
async fn participant_sequence_and_cascade_delete() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("nested/dir/survey.sqlite")).unwrap();

    let template = store.create_template("T", "").await.unwrap();
    let category = store.create_category(template.id, "C", 1).await.unwrap();
    let competency = store
        .create_competency(category.id, NewCompetency::new("I", "They", 1))
        .await
        .unwrap();
    let group = store.create_group("G", "Acme", template.id).await.unwrap();
    let first = store
        .create_participant(group.id, "Ana", "ana@example.com")
        .await
        .unwrap();
    let second = store
        .create_participant(group.id, "Luis", "luis@example.com")
        .await
        .unwrap();
    assert_eq!((first.seq, second.seq), (1, 2));

    let scores: Scores = [(competency.id, 4)].into_iter().collect();
    store.replace_responses(first.id, None, &scores).await.unwrap();
    assert_eq!(store.list_responses_by_participant(first.id).await.unwrap().len(), 1);

    store.delete_group(group.id).await.unwrap();
    assert!(matches!(
        store.get_participant(first.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(store
        .list_responses_by_participant(first.id)
        .await
        .unwrap()
        .is_empty());
}
