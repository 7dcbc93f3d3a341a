//! Engine behaviour against the in-memory stores

use super::*;
use crate::auth::Actor;
use crate::errors::{AppError, Result};
use crate::store::memory::{InMemoryContentStore, InMemoryDirectory, InMemoryReferenceStore};
use crate::store::{ContentStore, Directory, Lecturer, ReferenceStore, Student, UserProfile};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct Fixture {
    engine: AchievementEngine,
    references: Arc<InMemoryReferenceStore>,
    contents: Arc<InMemoryContentStore>,
    directory: Arc<InMemoryDirectory>,
    admin: Actor,
    student: Actor,
    student_id: Uuid,
    other_student: Actor,
    other_student_id: Uuid,
    advisor: Actor,
    other_advisor: Actor,
    other_lecturer_id: Uuid,
}

async fn add_user(directory: &InMemoryDirectory, role_name: &str, full_name: &str) -> Actor {
    let id = Uuid::new_v4();
    directory
        .add_user(UserProfile {
            id,
            username: full_name.to_lowercase().replace(' ', "."),
            full_name: full_name.to_string(),
            email: format!("{}@campus.test", id.simple()),
            role_name: role_name.to_string(),
            is_active: true,
        })
        .await;
    Actor::new(id, role_name)
}

async fn add_lecturer(directory: &InMemoryDirectory, user: &Actor, number: &str) -> Uuid {
    let id = Uuid::new_v4();
    directory
        .add_lecturer(Lecturer {
            id,
            user_id: user.user_id,
            lecturer_number: number.to_string(),
            department: "Informatics".to_string(),
        })
        .await;
    id
}

async fn add_student(
    directory: &InMemoryDirectory,
    user: &Actor,
    number: &str,
    advisor: Option<Uuid>,
) -> Uuid {
    let id = Uuid::new_v4();
    directory
        .add_student(Student {
            id,
            user_id: user.user_id,
            student_number: number.to_string(),
            program_study: "Informatics".to_string(),
            academic_year: "2022".to_string(),
            advisor_id: advisor,
        })
        .await;
    id
}

async fn fixture() -> Fixture {
    let directory = Arc::new(InMemoryDirectory::new());
    let references = Arc::new(InMemoryReferenceStore::new(directory.clone()));
    let contents = Arc::new(InMemoryContentStore::new());

    let admin = add_user(&directory, "Admin", "Root Admin").await;
    let advisor = add_user(&directory, "Dosen Wali", "Budi Santoso").await;
    let other_advisor = add_user(&directory, "Lecturer", "Citra Dewi").await;
    let lecturer_id = add_lecturer(&directory, &advisor, "L-001").await;
    let other_lecturer_id = add_lecturer(&directory, &other_advisor, "L-002").await;

    let student = add_user(&directory, "Mahasiswa", "Sari Wulandari").await;
    let other_student = add_user(&directory, "Mahasiswa", "Andi Pratama").await;
    let student_id = add_student(&directory, &student, "S-001", Some(lecturer_id)).await;
    let other_student_id =
        add_student(&directory, &other_student, "S-002", Some(other_lecturer_id)).await;

    let engine = AchievementEngine::new(references.clone(), contents.clone(), directory.clone());

    Fixture {
        engine,
        references,
        contents,
        directory,
        admin,
        student,
        student_id,
        other_student,
        other_student_id,
        advisor,
        other_advisor,
        other_lecturer_id,
    }
}

fn payload(kind: &str, title: &str) -> CreateAchievement {
    CreateAchievement {
        reference_id: None,
        student_id: None,
        achievement_type: kind.to_string(),
        title: title.to_string(),
        description: "Regional round".to_string(),
        details: AchievementDetails {
            competition_name: Some("Hackathon".to_string()),
            ..Default::default()
        },
        tags: vec!["coding".to_string()],
        points: 10,
    }
}

async fn create_draft(f: &Fixture, actor: &Actor, title: &str) -> AchievementView {
    f.engine
        .create(actor, payload("competition", title))
        .await
        .unwrap()
}

async fn submitted(f: &Fixture) -> Uuid {
    let view = create_draft(f, &f.student, "Hackathon finalist").await;
    f.engine.submit(&f.student, view.reference.id).await.unwrap();
    view.reference.id
}

fn assert_denied<T: std::fmt::Debug>(result: Result<T>) {
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }), "expected denial, got {err:?}");
}

#[tokio::test]
async fn test_student_to_verified_scenario() {
    let f = fixture().await;

    let view = create_draft(&f, &f.student, "X").await;
    assert_eq!(view.reference.status(), AchievementStatus::Draft);
    assert_eq!(view.reference.student_id, f.student_id);
    assert_eq!(view.content.achievement_type, AchievementType::Competition);
    let id = view.reference.id;

    let reference = f.engine.submit(&f.student, id).await.unwrap();
    assert_eq!(reference.status(), AchievementStatus::Submitted);
    assert!(reference.state.submitted_at().is_some());

    let reference = f.engine.verify(&f.advisor, id).await.unwrap();
    assert_eq!(reference.status(), AchievementStatus::Verified);
    assert_eq!(reference.state.verified_by(), Some(f.advisor.user_id));
    assert!(reference.state.verified_at().is_some());

    let err = f
        .engine
        .update(&f.student, id, AchievementPatch {
            title: Some("Y".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::OnlyDraftMutable {
            current: AchievementStatus::Verified
        }
    ));
}

#[tokio::test]
async fn test_submit_twice_fails() {
    let f = fixture().await;
    let id = submitted(&f).await;

    let err = f.engine.submit(&f.student, id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            current: AchievementStatus::Submitted,
            required: AchievementStatus::Draft,
        }
    ));
}

#[tokio::test]
async fn test_verify_and_reject_are_exclusive() {
    let f = fixture().await;

    let verified = submitted(&f).await;
    f.engine.verify(&f.advisor, verified).await.unwrap();
    let err = f.engine.reject(&f.advisor, verified, "late").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    let rejected = submitted(&f).await;
    let reference = f.engine.reject(&f.advisor, rejected, "  no certificate  ").await.unwrap();
    assert_eq!(reference.state.rejection_note(), Some("no certificate"));
    let err = f.engine.verify(&f.advisor, rejected).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            current: AchievementStatus::Rejected,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reject_requires_note() {
    let f = fixture().await;
    let id = submitted(&f).await;

    let err = f.engine.reject(&f.advisor, id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let reference = f.references.get(id).await.unwrap().unwrap();
    assert_eq!(reference.status(), AchievementStatus::Submitted);
}

#[tokio::test]
async fn test_unknown_type_writes_nothing() {
    let f = fixture().await;

    let err = f
        .engine
        .create(&f.student, payload("sports", "Marathon"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(f.contents.create_count(), 0);
    assert_eq!(f.references.create_count(), 0);
    assert!(f.contents.is_empty().await);
}

#[tokio::test]
async fn test_failed_reference_write_compensates_once() {
    let f = fixture().await;
    f.references.fail_next_create();

    let err = f
        .engine
        .create(&f.student, payload("academic", "Dean's list"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Upstream { .. }));
    assert!(err.is_retryable());
    assert_eq!(f.contents.delete_attempts(), 1);
    assert!(f.contents.is_empty().await);
    assert!(f.references.is_empty().await);
}

#[tokio::test]
async fn test_failed_compensation_keeps_original_error() {
    let f = fixture().await;
    f.references.fail_next_create();
    f.contents.fail_deletes(true);

    let err = f
        .engine
        .create(&f.student, payload("academic", "Dean's list"))
        .await
        .unwrap_err();
    match err {
        AppError::Upstream { message } => assert_eq!(message, "reference store unavailable"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(f.contents.delete_attempts(), 1);
    // orphaned content stays behind
    assert_eq!(f.contents.len().await, 1);
    assert!(f.references.is_empty().await);
}

#[tokio::test]
async fn test_students_cannot_touch_each_other() {
    let f = fixture().await;
    let id = create_draft(&f, &f.student, "Mine").await.reference.id;

    assert_denied(f.engine.get(&f.other_student, id).await);
    assert_denied(f.engine.update(&f.other_student, id, AchievementPatch::default()).await);
    assert_denied(f.engine.submit(&f.other_student, id).await);
    assert_denied(f.engine.delete(&f.other_student, id).await);
    assert_denied(f.engine.history(&f.other_student, id).await);

    // own student can read it
    assert!(f.engine.get(&f.student, id).await.is_ok());
}

#[tokio::test]
async fn test_student_cannot_create_for_someone_else() {
    let f = fixture().await;
    let mut request = payload("competition", "Borrowed");
    request.student_id = Some(f.other_student_id);

    assert_denied(f.engine.create(&f.student, request).await);
    assert_eq!(f.contents.create_count(), 0);
}

#[tokio::test]
async fn test_advisor_limits() {
    let f = fixture().await;
    let id = create_draft(&f, &f.student, "Draft").await.reference.id;

    // advisor of the owner can read but not edit
    assert!(f.engine.get(&f.advisor, id).await.is_ok());
    assert_denied(f.engine.update(&f.advisor, id, AchievementPatch::default()).await);
    assert_denied(f.engine.submit(&f.advisor, id).await);
    assert_denied(f.engine.create(&f.advisor, payload("academic", "Nope")).await);

    // unrelated advisor sees nothing
    assert_denied(f.engine.get(&f.other_advisor, id).await);
}

#[tokio::test]
async fn test_advisor_reassignment_applies_immediately() {
    let f = fixture().await;
    let first = submitted(&f).await;
    let second = submitted(&f).await;

    assert_denied(f.engine.verify(&f.other_advisor, first).await);
    f.engine.verify(&f.advisor, first).await.unwrap();

    let student = f
        .engine
        .assign_advisor(&f.admin, f.student_id, Some(f.other_lecturer_id))
        .await
        .unwrap();
    assert_eq!(student.advisor_id, Some(f.other_lecturer_id));

    assert_denied(f.engine.verify(&f.advisor, second).await);
    let reference = f.engine.verify(&f.other_advisor, second).await.unwrap();
    assert_eq!(reference.state.verified_by(), Some(f.other_advisor.user_id));
}

#[tokio::test]
async fn test_only_admin_assigns_advisors() {
    let f = fixture().await;
    assert_denied(
        f.engine
            .assign_advisor(&f.advisor, f.student_id, Some(f.other_lecturer_id))
            .await,
    );

    let err = f
        .engine
        .assign_advisor(&f.admin, f.student_id, Some(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let err = f
        .engine
        .assign_advisor(&f.admin, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StudentNotFound { .. }));

    let cleared = f.engine.assign_advisor(&f.admin, f.student_id, None).await.unwrap();
    assert_eq!(cleared.advisor_id, None);
    assert!(!f.directory.is_advisor_of(f.other_lecturer_id, f.student_id).await.unwrap());
}

#[tokio::test]
async fn test_admin_lists_by_status() {
    let f = fixture().await;
    let a = submitted(&f).await;
    create_draft(&f, &f.student, "Still a draft").await;
    let other = create_draft(&f, &f.other_student, "Other's").await.reference.id;
    f.engine.submit(&f.other_student, other).await.unwrap();

    let page = f
        .engine
        .list_all(&f.admin, ListQuery {
            status: Some("submitted".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert!(page
        .items
        .iter()
        .all(|row| row.reference.status() == AchievementStatus::Submitted));
    let ids: Vec<_> = page.items.iter().map(|row| row.reference.id).collect();
    assert!(ids.contains(&a) && ids.contains(&other));
    assert!(page.items.iter().all(|row| row.student.is_some() && row.content.is_some()));
}

#[tokio::test]
async fn test_list_roles_and_filters() {
    let f = fixture().await;
    create_draft(&f, &f.student, "Robotics").await;
    create_draft(&f, &f.student, "Chess").await;
    create_draft(&f, &f.other_student, "Debate").await;

    assert_denied(f.engine.list_all(&f.student, ListQuery::default()).await);
    assert_denied(f.engine.list_mine(&f.advisor, ListQuery::default()).await);
    assert_denied(f.engine.list_for_advisees(&f.student, ListQuery::default()).await);

    let mine = f.engine.list_mine(&f.student, ListQuery::default()).await.unwrap();
    assert_eq!(mine.total, 2);

    let searched = f
        .engine
        .list_mine(&f.student, ListQuery {
            search: Some("robot".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(searched.total, 1);

    let advisees = f.engine.list_all(&f.advisor, ListQuery::default()).await.unwrap();
    assert_eq!(advisees.total, 2);
    assert!(advisees
        .items
        .iter()
        .all(|row| row.reference.student_id == f.student_id));

    let err = f
        .engine
        .list_mine(&f.student, ListQuery {
            status: Some("archived".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn test_pagination_clamps() {
    let f = fixture().await;
    for i in 0..3 {
        create_draft(&f, &f.student, &format!("Item {i}")).await;
    }

    let page = f
        .engine
        .list_mine(&f.student, ListQuery {
            page: Some(0),
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 2);

    let page = f
        .engine
        .list_mine(&f.student, ListQuery {
            limit: Some(1000),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.limit, 100);
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn test_out_of_range_page_is_empty() {
    let f = fixture().await;
    create_draft(&f, &f.student, "Only one").await;
    let far = ListQuery {
        page: Some(i64::MAX),
        limit: Some(100),
        ..Default::default()
    };

    let mine = f.engine.list_mine(&f.student, far.clone()).await.unwrap();
    assert!(mine.items.is_empty());
    assert_eq!(mine.total, 1);

    let all = f.engine.list_all(&f.admin, far).await.unwrap();
    assert!(all.items.is_empty());
    assert_eq!(all.total, 1);

    let searched = f
        .engine
        .search(&f.admin, ContentQuery {
            page: PageRequest::new(Some(i64::MAX), Some(100)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(searched.items.is_empty());
}

/// Serves one stale snapshot on the first `get`, then delegates
struct StaleReads {
    inner: Arc<InMemoryReferenceStore>,
    stale: Mutex<Option<AchievementReference>>,
}

#[async_trait]
impl ReferenceStore for StaleReads {
    async fn create(&self, reference: &AchievementReference) -> Result<()> {
        self.inner.create(reference).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>> {
        let stale = self.stale.lock().unwrap().take();
        match stale {
            Some(snapshot) => Ok(Some(snapshot)),
            None => self.inner.get(id).await,
        }
    }

    async fn get_by_content_id(&self, content_id: Uuid) -> Result<Option<AchievementReference>> {
        self.inner.get_by_content_id(content_id).await
    }

    async fn update(
        &self,
        reference: &AchievementReference,
        expected: AchievementStatus,
    ) -> Result<bool> {
        self.inner.update(reference, expected).await
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>> {
        self.inner.list_by_student(student_id, filter).await
    }

    async fn list_by_advisor(
        &self,
        lecturer_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>> {
        self.inner.list_by_advisor(lecturer_id, filter).await
    }

    async fn list_all(
        &self,
        filter: StatusFilter,
        page: PageRequest,
    ) -> Result<(Vec<AchievementReference>, u64)> {
        self.inner.list_all(filter, page).await
    }

    async fn is_owned_by(&self, id: Uuid, student_id: Uuid) -> Result<bool> {
        self.inner.is_owned_by(id, student_id).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_stale_read_cannot_overwrite_transition() {
    let f = fixture().await;
    let id = submitted(&f).await;
    let snapshot = f.references.get(id).await.unwrap().unwrap();

    f.engine.verify(&f.advisor, id).await.unwrap();

    let stale = Arc::new(StaleReads {
        inner: f.references.clone(),
        stale: Mutex::new(Some(snapshot)),
    });
    let lagging = AchievementEngine::new(stale, f.contents.clone(), f.directory.clone());

    let err = lagging.reject(&f.admin, id, "too late").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            current: AchievementStatus::Verified,
            required: AchievementStatus::Submitted,
        }
    ));

    let reference = f.references.get(id).await.unwrap().unwrap();
    assert_eq!(reference.status(), AchievementStatus::Verified);
    assert_eq!(reference.state.verified_by(), Some(f.advisor.user_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verify_succeeds_once() {
    let f = fixture().await;
    let id = submitted(&f).await;

    let tasks: Vec<_> = [f.admin.clone(), f.advisor.clone(), f.admin.clone(), f.advisor.clone()]
        .into_iter()
        .map(|actor| {
            let engine = f.engine.clone();
            tokio::spawn(async move { engine.verify(&actor, id).await })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(matches!(err, AppError::InvalidStateTransition { .. })),
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_soft_delete_keeps_content() {
    let f = fixture().await;
    let view = create_draft(&f, &f.student, "To delete").await;
    let id = view.reference.id;

    let reference = f.engine.delete(&f.student, id).await.unwrap();
    assert_eq!(reference.status(), AchievementStatus::Deleted);
    assert!(f.contents.get(view.content.id).await.unwrap().is_some());

    // gone for the owner, still there for admins
    assert_denied(f.engine.get(&f.student, id).await);
    let admin_view = f.engine.get(&f.admin, id).await.unwrap();
    assert_eq!(admin_view.reference.status(), AchievementStatus::Deleted);

    let mine = f.engine.list_mine(&f.student, ListQuery::default()).await.unwrap();
    assert_eq!(mine.total, 0);
    let asked = f
        .engine
        .list_mine(&f.student, ListQuery {
            status: Some("deleted".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(asked.total, 0);
    let as_admin = f
        .engine
        .list_for_student(&f.admin, f.student_id, ListQuery {
            status: Some("deleted".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(as_admin.total, 1);

    let err = f.engine.delete(&f.admin, id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_delete_requires_draft() {
    let f = fixture().await;
    let id = submitted(&f).await;
    let err = f.engine.delete(&f.student, id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            current: AchievementStatus::Submitted,
            required: AchievementStatus::Draft,
        }
    ));
}

#[tokio::test]
async fn test_missing_reference_by_role() {
    let f = fixture().await;
    let missing = Uuid::new_v4();

    let err = f.engine.get(&f.admin, missing).await.unwrap_err();
    assert!(matches!(err, AppError::AchievementNotFound { .. }));
    assert_denied(f.engine.get(&f.student, missing).await);
    assert_denied(f.engine.get(&f.advisor, missing).await);
}

#[tokio::test]
async fn test_missing_content_is_integrity_error() {
    let f = fixture().await;
    let view = create_draft(&f, &f.student, "Vanishing").await;
    f.contents.remove(view.content.id).await;

    let err = f.engine.get(&f.student, view.reference.id).await.unwrap_err();
    assert!(matches!(err, AppError::Integrity { .. }));
}

#[tokio::test]
async fn test_history_derives_events() {
    let f = fixture().await;
    let id = submitted(&f).await;
    f.engine.reject(&f.advisor, id, "Blurry certificate").await.unwrap();

    let events = f.engine.history(&f.student, id).await.unwrap();
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![HistoryKind::Created, HistoryKind::Submitted, HistoryKind::Rejected]
    );
    let review = &events[2];
    assert_eq!(review.actor_id, Some(f.advisor.user_id));
    assert_eq!(review.actor_name.as_deref(), Some("Budi Santoso"));
    assert_eq!(review.note.as_deref(), Some("Blurry certificate"));
    assert!(events.windows(2).all(|w| w[0].at <= w[1].at));
}

#[tokio::test]
async fn test_create_is_idempotent_by_reference_id() {
    let f = fixture().await;
    let reference_id = Uuid::new_v4();
    let mut request = payload("publication", "Paper");
    request.reference_id = Some(reference_id);

    let first = f.engine.create(&f.student, request.clone()).await.unwrap();
    let second = f.engine.create(&f.student, request.clone()).await.unwrap();
    assert_eq!(first.reference.id, reference_id);
    assert_eq!(second.reference, first.reference);
    assert_eq!(f.contents.create_count(), 1);

    let err = f.engine.create(&f.other_student, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(f.contents.create_count(), 1);
}

#[tokio::test]
async fn test_admin_create_needs_existing_student() {
    let f = fixture().await;

    let err = f
        .engine
        .create(&f.admin, payload("academic", "No target"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let mut request = payload("academic", "Ghost");
    request.student_id = Some(Uuid::new_v4());
    let err = f.engine.create(&f.admin, request).await.unwrap_err();
    assert!(matches!(err, AppError::StudentNotFound { .. }));

    let mut request = payload("academic", "On behalf");
    request.student_id = Some(f.other_student_id);
    let view = f.engine.create(&f.admin, request).await.unwrap();
    assert_eq!(view.reference.student_id, f.other_student_id);
    assert_eq!(view.content.student_id, f.other_student_id);
}

#[tokio::test]
async fn test_update_merges_sparsely() {
    let f = fixture().await;
    let view = create_draft(&f, &f.student, "Original").await;

    let updated = f
        .engine
        .update(&f.student, view.reference.id, AchievementPatch {
            title: Some(String::new()),
            points: Some(25),
            details: Some(AchievementDetails {
                rank: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.content.title, "Original");
    assert_eq!(updated.content.points, 25);
    assert_eq!(updated.content.details.rank, Some(1));
    assert_eq!(updated.content.details.competition_name.as_deref(), Some("Hackathon"));
    assert!(updated.reference.updated_at >= view.reference.updated_at);

    let stored = f.contents.get(view.content.id).await.unwrap().unwrap();
    assert_eq!(stored.points, 25);
}

#[tokio::test]
async fn test_attachments_follow_draft_rules() {
    let f = fixture().await;
    let view = create_draft(&f, &f.student, "With files").await;
    let id = view.reference.id;
    let attachment = Attachment {
        file_name: "certificate.pdf".to_string(),
        file_url: "/uploads/certificate.pdf".to_string(),
        file_type: "application/pdf".to_string(),
        uploaded_at: chrono::Utc::now(),
    };

    let content = f
        .engine
        .add_attachment(&f.student, id, attachment.clone())
        .await
        .unwrap();
    assert_eq!(content.attachments.len(), 1);

    // a second upload under the same name gets its own name
    let content = f
        .engine
        .add_attachment(&f.student, id, attachment.clone())
        .await
        .unwrap();
    let names: Vec<_> = content.attachments.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, ["certificate.pdf", "certificate-2.pdf"]);

    let content = f
        .engine
        .remove_attachment(&f.student, id, "certificate.pdf")
        .await
        .unwrap();
    assert_eq!(content.attachments.len(), 1);
    assert_eq!(content.attachments[0].file_name, "certificate-2.pdf");

    let err = f
        .engine
        .remove_attachment(&f.student, id, "unknown.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    assert_denied(f.engine.add_attachment(&f.other_student, id, attachment.clone()).await);

    f.engine.submit(&f.student, id).await.unwrap();
    let err = f.engine.add_attachment(&f.student, id, attachment).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::OnlyDraftMutable {
            current: AchievementStatus::Submitted
        }
    ));
    let err = f.engine.check_mutable(&f.student, id).await.unwrap_err();
    assert!(matches!(err, AppError::OnlyDraftMutable { .. }));
}

#[tokio::test]
async fn test_search_is_scoped_by_role() {
    let f = fixture().await;
    create_draft(&f, &f.student, "Robotics cup").await;
    create_draft(&f, &f.other_student, "Robotics league").await;

    // orphaned content is never returned
    f.contents
        .create(NewContent {
            student_id: f.student_id,
            achievement_type: AchievementType::Competition,
            title: "Robotics orphan".to_string(),
            description: String::new(),
            details: AchievementDetails::default(),
            tags: vec![],
            points: 0,
        })
        .await
        .unwrap();

    let query = ContentQuery {
        text: Some("robotics".to_string()),
        ..Default::default()
    };

    let admin = f.engine.search(&f.admin, query.clone()).await.unwrap();
    assert_eq!(admin.items.len(), 2);

    let student = f.engine.search(&f.student, query.clone()).await.unwrap();
    assert_eq!(student.items.len(), 1);
    assert_eq!(student.items[0].reference.student_id, f.student_id);

    let foreign = f
        .engine
        .search(&f.student, ContentQuery {
            student_ids: Some(vec![f.other_student_id]),
            ..query.clone()
        })
        .await
        .unwrap();
    assert!(foreign.items.is_empty());

    let advisor = f.engine.search(&f.other_advisor, query).await.unwrap();
    assert_eq!(advisor.items.len(), 1);
    assert_eq!(advisor.items[0].reference.student_id, f.other_student_id);
    assert!(advisor.items[0].student.is_some());
}

#[tokio::test]
async fn test_student_records_follow_read_access() {
    let f = fixture().await;
    let id = submitted(&f).await;
    create_draft(&f, &f.other_student, "Not theirs").await;

    for actor in [&f.student, &f.advisor, &f.admin] {
        let page = f
            .engine
            .list_for_student(actor, f.student_id, ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].reference.id, id);
        assert!(page.items[0].student.is_some());
    }

    assert_denied(
        f.engine
            .list_for_student(&f.other_student, f.student_id, ListQuery::default())
            .await,
    );
    assert_denied(
        f.engine
            .list_for_student(&f.other_advisor, f.student_id, ListQuery::default())
            .await,
    );

    // unknown students: detail for admins, a plain denial for everyone else
    let unknown = Uuid::new_v4();
    let err = f
        .engine
        .list_for_student(&f.admin, unknown, ListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StudentNotFound { .. }));
    assert_denied(
        f.engine
            .list_for_student(&f.advisor, unknown, ListQuery::default())
            .await,
    );

    // reassignment moves read access with it
    f.engine
        .assign_advisor(&f.admin, f.student_id, Some(f.other_lecturer_id))
        .await
        .unwrap();
    assert_denied(
        f.engine
            .list_for_student(&f.advisor, f.student_id, ListQuery::default())
            .await,
    );
    f.engine
        .list_for_student(&f.other_advisor, f.student_id, ListQuery::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_lecturer_advisees() {
    let f = fixture().await;
    let id = submitted(&f).await;
    f.engine.verify(&f.advisor, id).await.unwrap();
    create_draft(&f, &f.student, "Unverified").await;

    let lecturer_id = f
        .directory
        .lecturer_by_user_id(f.advisor.user_id)
        .await
        .unwrap()
        .unwrap()
        .id;

    let own = f
        .engine
        .advisees(&f.advisor, lecturer_id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(own.total, 1);
    assert_eq!(own.items[0].student.id, f.student_id);
    assert_eq!(own.items[0].student.full_name, "Sari Wulandari");
    assert_eq!(own.items[0].verified_achievements, 1);

    let by_admin = f
        .engine
        .advisees(&f.admin, f.other_lecturer_id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(by_admin.total, 1);
    assert_eq!(by_admin.items[0].student.id, f.other_student_id);
    assert_eq!(by_admin.items[0].verified_achievements, 0);

    assert_denied(
        f.engine
            .advisees(&f.advisor, f.other_lecturer_id, PageRequest::default())
            .await,
    );
    assert_denied(
        f.engine
            .advisees(&f.student, lecturer_id, PageRequest::default())
            .await,
    );

    let err = f
        .engine
        .advisees(&f.admin, Uuid::new_v4(), PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
}

#[tokio::test]
async fn test_other_roles_are_denied() {
    let f = fixture().await;
    let guest = add_user(&f.directory, "Guest", "Visitor").await;
    let id = create_draft(&f, &f.student, "Visible?").await.reference.id;

    assert_denied(f.engine.get(&guest, id).await);
    assert_denied(f.engine.create(&guest, payload("academic", "Nope")).await);
    assert_denied(f.engine.search(&guest, ContentQuery::default()).await);
    assert_denied(f.engine.list_all(&guest, ListQuery::default()).await);
}

#[tokio::test]
async fn test_ping_checks_both_stores() {
    let f = fixture().await;
    f.engine.ping().await.unwrap();
}
