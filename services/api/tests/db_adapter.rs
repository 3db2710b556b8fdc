//! Tests for `DbAdapter` against a real Postgres schema.
//!
//! Each test gets a fresh database with the service migrations applied
//! (`DATABASE_URL` must point at a server the tests may create databases on).

use api_lib::adapters::DbAdapter;
use sqlx::PgPool;
use storybook_core::domain::{Alignment, NewPage};
use storybook_core::ports::{DatabaseService, PortError};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_page(page_number: i32, text: &str) -> NewPage {
    NewPage {
        page_number,
        text_content: text.to_string(),
        image_url: Some(format!("https://placehold.co/600x400?text=page+{}", page_number)),
    }
}

fn alignment_for(text: &str) -> Alignment {
    let characters: Vec<String> = text.chars().map(|c| c.to_string()).collect();
    let n = characters.len();
    Alignment::new(
        characters,
        (0..n).map(|i| i as f64 * 0.125).collect(),
        (0..n).map(|i| (i + 1) as f64 * 0.125).collect(),
    )
    .unwrap()
}

async fn story_with_pages(db: &DbAdapter, theme: &str, numbers: &[i32]) -> Uuid {
    let user = db.ensure_user("owner@example.com", "hash").await.unwrap();
    let story = db
        .create_story(user.id, &format!("Story about {}", theme), theme)
        .await
        .unwrap();
    let pages: Vec<NewPage> = numbers
        .iter()
        .map(|n| new_page(*n, &format!("Page {} of {}.", n, theme)))
        .collect();
    db.add_pages(story.id, &pages).await.unwrap();
    story.id
}

async fn page_rows(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM pages")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Test: users
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn ensure_user_is_idempotent(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let first = db.ensure_user("owner@example.com", "hash-1").await.unwrap();
    let second = db.ensure_user("owner@example.com", "hash-2").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.email, "owner@example.com");
}

// ---------------------------------------------------------------------------
// Test: stories and pages
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn pages_come_back_ordered_by_number(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let story_id = story_with_pages(&db, "a brave dog", &[3, 1, 2, 2]).await;

    let story = db.get_story(story_id).await.unwrap();
    let numbers: Vec<i32> = story.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 2, 3]);
    assert!(story.pages.iter().all(|p| p.audio_url.is_none() && p.alignment.is_none()));
}

#[sqlx::test(migrations = "./migrations")]
async fn list_attaches_each_story_its_own_pages(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let dog = story_with_pages(&db, "a brave dog", &[1, 2, 3]).await;
    let owl = story_with_pages(&db, "a sleepy owl", &[1]).await;
    let empty = story_with_pages(&db, "a quiet night", &[]).await;

    let stories = db.list_stories().await.unwrap();
    assert_eq!(stories.len(), 3);
    let pages_of = |id: Uuid| {
        stories
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.pages.len())
            .unwrap()
    };
    assert_eq!(pages_of(dog), 3);
    assert_eq!(pages_of(owl), 1);
    assert_eq!(pages_of(empty), 0);
    assert!(stories
        .iter()
        .all(|s| s.pages.iter().all(|p| p.story_id == s.id)));
}

#[sqlx::test(migrations = "./migrations")]
async fn deleting_a_story_cascades_to_its_pages(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let kept = story_with_pages(&db, "a sleepy owl", &[1, 2, 3]).await;
    let doomed = story_with_pages(&db, "a brave dog", &[1, 2, 3]).await;
    assert_eq!(page_rows(&pool).await, 6);

    db.delete_story(doomed).await.unwrap();

    assert_eq!(page_rows(&pool).await, 3);
    assert!(matches!(db.get_story(doomed).await, Err(PortError::NotFound(_))));
    assert!(matches!(db.delete_story(doomed).await, Err(PortError::NotFound(_))));
    assert_eq!(db.get_story(kept).await.unwrap().pages.len(), 3);
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_story_is_not_found(pool: PgPool) {
    let db = DbAdapter::new(pool);
    assert!(matches!(
        db.get_story(Uuid::new_v4()).await,
        Err(PortError::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Test: narration storage
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn alignment_survives_a_round_trip(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let story_id = story_with_pages(&db, "a brave dog", &[1]).await;
    let page = db.get_story(story_id).await.unwrap().pages.remove(0);
    let alignment = alignment_for(&page.text_content);

    let attached = db
        .attach_audio(page.id, "/static/audio/one.mp3", Some(&alignment))
        .await
        .unwrap();
    assert!(attached);

    let stored = db.get_story(story_id).await.unwrap().pages.remove(0);
    assert_eq!(stored.audio_url.as_deref(), Some("/static/audio/one.mp3"));
    assert_eq!(stored.alignment, Some(alignment));
}

#[sqlx::test(migrations = "./migrations")]
async fn narrated_page_is_not_overwritten(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let story_id = story_with_pages(&db, "a brave dog", &[1]).await;
    let page = db.get_story(story_id).await.unwrap().pages.remove(0);
    let alignment = alignment_for(&page.text_content);

    assert!(db
        .attach_audio(page.id, "/static/audio/first.mp3", Some(&alignment))
        .await
        .unwrap());
    assert!(!db
        .attach_audio(page.id, "/static/audio/second.mp3", None)
        .await
        .unwrap());

    let stored = db.get_story(story_id).await.unwrap().pages.remove(0);
    assert_eq!(stored.audio_url.as_deref(), Some("/static/audio/first.mp3"));
    assert_eq!(stored.alignment, Some(alignment));
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_audio_reference_counts_as_unnarrated(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let story_id = story_with_pages(&db, "a brave dog", &[1]).await;
    let page = db.get_story(story_id).await.unwrap().pages.remove(0);
    sqlx::query("UPDATE pages SET audio_url = '' WHERE id = $1")
        .bind(page.id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(db
        .attach_audio(page.id, "/static/audio/one.mp3", None)
        .await
        .unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn attaching_audio_to_a_missing_page_is_not_found(pool: PgPool) {
    let db = DbAdapter::new(pool);
    let result = db
        .attach_audio(Uuid::new_v4(), "/static/audio/one.mp3", None)
        .await;
    assert!(matches!(result, Err(PortError::NotFound(_))));
}

#[sqlx::test(migrations = "./migrations")]
async fn mismatched_stored_alignment_reads_back_as_absent(pool: PgPool) {
    let db = DbAdapter::new(pool.clone());
    let story_id = story_with_pages(&db, "a brave dog", &[1]).await;
    let page = db.get_story(story_id).await.unwrap().pages.remove(0);
    sqlx::query(
        "UPDATE pages SET audio_url = '/static/audio/one.mp3', alignment_data = \
         '{\"characters\": [\"a\", \"b\"], \"character_start_times_seconds\": [0.0], \
         \"character_end_times_seconds\": [0.1, 0.2]}'::jsonb WHERE id = $1",
    )
    .bind(page.id)
    .execute(&pool)
    .await
    .unwrap();

    let stored = db.get_story(story_id).await.unwrap().pages.remove(0);
    assert_eq!(stored.audio_url.as_deref(), Some("/static/audio/one.mp3"));
    assert!(stored.alignment.is_none());
}
