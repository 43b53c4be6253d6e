//! Pull synchronizer tests.

mod common;

use chrono::{DateTime, Duration, Utc};
use study_core::ReviewStatus;
use study_sync::db::{ItemRepository, SyncRepository};
use study_sync::sync::{PullSynchronizer, PushSynchronizer};

use common::{fixtures, TestContext};

fn puller(ctx: &TestContext) -> PullSynchronizer {
    PullSynchronizer::new(ctx.client(), ctx.repository.clone(), common::sync_config())
}

async fn push_all(ctx: &TestContext) {
    PushSynchronizer::new(ctx.client(), ctx.repository.clone(), common::sync_config())
        .run(false)
        .await
        .unwrap();
}

fn days_since_epoch(at: DateTime<Utc>) -> i64 {
    at.signed_duration_since(DateTime::UNIX_EPOCH).num_days()
}

/// Test a review card's remote state lands in the local mirror.
#[tokio::test]
async fn test_pull_maps_review_state() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;

    let due_day = days_since_epoch(Utc::now()) + 3;
    {
        let mut fake = ctx.fake();
        let card = fake.card_for("bio-1");
        card.queue = 2;
        card.card_type = 2;
        card.interval = 10;
        card.factor = 2300;
        card.reps = 7;
        card.lapses = 2;
        card.due = due_day;
    }

    let report = puller(&ctx).run().await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unmapped, 0);
    assert_eq!(report.unmatched, 0);

    let repo = ctx.repo();
    let item = repo.get_item("bio-1").unwrap().unwrap();
    let state = &item.review;
    assert_eq!(state.status, ReviewStatus::Review);
    assert_eq!(state.interval_days, 10.0);
    assert!((state.ease_factor - 2.3).abs() < 1e-9);
    assert_eq!(state.review_count, 7);
    assert_eq!(state.lapses, 2);
    assert_eq!(state.stability, Some(10.0));
    assert_eq!(
        state.due_date,
        Some(DateTime::UNIX_EPOCH + Duration::days(due_day))
    );
    assert!(state.retrievability.is_some());
    assert!(repo.get_sync_state().unwrap().last_pull_at.is_some());
}

/// Test a fresh remote card keeps the item new.
#[tokio::test]
async fn test_pull_new_card() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;

    puller(&ctx).run().await.unwrap();

    let item = ctx.repo().get_item("bio-1").unwrap().unwrap();
    assert_eq!(item.review.status, ReviewStatus::New);
    assert_eq!(item.review.ease_factor, 2.5);
    assert_eq!(item.review.due_date, None);
}

/// Test a suspended card is mirrored as suspended.
#[tokio::test]
async fn test_pull_suspended_card() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;
    {
        let mut fake = ctx.fake();
        let card = fake.card_for("bio-1");
        card.queue = -1;
        card.card_type = 2;
        card.interval = 30;
        card.factor = 2500;
        card.reps = 4;
        card.due = days_since_epoch(Utc::now()) + 10;
    }

    puller(&ctx).run().await.unwrap();

    let item = ctx.repo().get_item("bio-1").unwrap().unwrap();
    assert_eq!(item.review.status, ReviewStatus::Suspended);
    assert!(item.review.due_date.is_some());
}

/// Test cards without a local item or without an identity are counted.
#[tokio::test]
async fn test_pull_counts_unmatched_and_unmapped() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;
    {
        let mut fake = ctx.fake();
        fixtures::remote_note(&mut fake, "ghost");
        let mut fields = fixtures::note_fields("");
        fields.remove("Identity");
        fake.add_note("Study::biology::cells", "StudySync", fields);
    }

    let report = puller(&ctx).run().await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.updated, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.unmapped, 1);
}

/// Test a pull never hides a local edit the remote has not received.
#[tokio::test]
async fn test_pull_keeps_pending_edit() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;
    fixtures::edit(&ctx.repo(), "bio-1", "Revised answer");
    {
        let mut fake = ctx.fake();
        let card = fake.card_for("bio-1");
        card.queue = 2;
        card.card_type = 2;
        card.interval = 5;
        card.factor = 2500;
        card.reps = 3;
        card.due = days_since_epoch(Utc::now()) + 5;
    }

    puller(&ctx).run().await.unwrap();

    let repo = ctx.repo();
    let item = repo.get_item("bio-1").unwrap().unwrap();
    assert_eq!(item.review.review_count, 3);
    assert_eq!(item.back, "Revised answer");
    let pending = repo.list_push_candidates(false).unwrap();
    assert_eq!(pending.len(), 1);
}

/// Test pulling twice with no remote change leaves the mirror as it was.
#[tokio::test]
async fn test_pull_is_repeatable() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;

    let puller = puller(&ctx);
    puller.run().await.unwrap();
    let first = ctx.repo().get_item("bio-1").unwrap().unwrap();
    let report = puller.run().await.unwrap();
    let second = ctx.repo().get_item("bio-1").unwrap().unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(first.review, second.review);
    assert_eq!(first.remote_id, second.remote_id);
}

/// Test a review card with interval 21 and factor 2500 mirrors stability 21 and difficulty 0.25.
#[tokio::test]
async fn test_pull_maps_interval_and_factor_to_memory_model() {
    let ctx = TestContext::new().await;
    fixtures::seed(&ctx.repo(), &[fixtures::item("bio-1", "biology", "cells")]);
    push_all(&ctx).await;
    {
        let mut fake = ctx.fake();
        let card = fake.card_for("bio-1");
        card.queue = 2;
        card.card_type = 2;
        card.interval = 21;
        card.factor = 2500;
        card.reps = 5;
        card.due = days_since_epoch(Utc::now());
    }

    puller(&ctx).run().await.unwrap();

    let state = ctx.repo().get_item("bio-1").unwrap().unwrap().review;
    assert_eq!(state.interval_days, 21.0);
    assert_eq!(state.ease_factor, 2.5);
    assert_eq!(state.stability, Some(21.0));
    assert!((state.difficulty.unwrap() - 0.25).abs() < 1e-9);
    // Due today after a 21-day interval: recall sits at the 90% point.
    assert!((state.retrievability.unwrap() - 0.9).abs() < 0.01);
}

/// Test a card with an out-of-range due value is counted and the rest still apply.
#[tokio::test]
async fn test_pull_skips_card_with_out_of_range_due() {
    let ctx = TestContext::new().await;
    fixtures::seed(
        &ctx.repo(),
        &[
            fixtures::item("bio-1", "biology", "cells"),
            fixtures::item("bio-2", "biology", "cells"),
        ],
    );
    push_all(&ctx).await;
    {
        let mut fake = ctx.fake();
        let card = fake.card_for("bio-1");
        card.queue = 2;
        card.card_type = 2;
        card.interval = 10;
        card.factor = 2500;
        card.due = 1_700_000_000;
    }

    let report = puller(&ctx).run().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.unmapped, 1);
    assert_eq!(report.updated, 1);

    let repo = ctx.repo();
    assert_eq!(repo.get_item("bio-1").unwrap().unwrap().review.status, ReviewStatus::New);
    assert!(repo.get_sync_state().unwrap().last_pull_at.is_some());
}
