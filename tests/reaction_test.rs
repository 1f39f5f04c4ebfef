//! Reaction ledger under concurrent writers.
//!
//! Every test finishes by checking that the stored counters match the
//! counts derived from the raw reaction rows.

use agora::content::{ContentStore, NewPost};
use agora::db;
use agora::reactions::{Polarity, ReactionCounts, ReactionLedger, Target};
use agora::state::DbPool;
use rusqlite::params;
use tempfile::TempDir;

const USERS: [&str; 4] = ["u1", "u2", "u3", "u4"];

fn create_test_db() -> (TempDir, DbPool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::create_pool(&temp_dir.path().join("test.db"), 8).unwrap();
    db::run_migrations(&pool).unwrap();

    let conn = pool.get().unwrap();
    for (i, id) in USERS.iter().enumerate() {
        conn.execute(
            "INSERT INTO users (id, username, email, created_at) VALUES (?1, ?2, ?3, 0)",
            params![id, format!("user{}", i), format!("user{}@example.com", i)],
        )
        .unwrap();
    }

    (temp_dir, pool)
}

fn seed_post(pool: &DbPool) -> (i64, i64) {
    let content = ContentStore::new(pool.clone());
    let post_id = content
        .create_post(
            "u1",
            &NewPost {
                title: "Race".into(),
                content: "Who clicks first?".into(),
                image_path: None,
                categories: vec!["General".into()],
            },
        )
        .unwrap();
    let comment_id = content.add_comment("u2", post_id, "me").unwrap();
    (post_id, comment_id)
}

fn assert_consistent(ledger: &ReactionLedger, target: Target) {
    assert_eq!(
        ledger.counts(target).unwrap(),
        ledger.derived_counts(target).unwrap(),
        "stored counters drifted for {:?}",
        target
    );
}

#[test]
fn like_then_like_leaves_no_reaction() {
    let (_tmp, pool) = create_test_db();
    let (post_id, _) = seed_post(&pool);
    let ledger = ReactionLedger::new(pool);

    ledger.set_post_reaction("u2", post_id, true).unwrap();
    let counts = ledger.set_post_reaction("u2", post_id, true).unwrap();

    assert_eq!(counts, ReactionCounts::default());
    assert_eq!(ledger.reaction_of("u2", Target::Post(post_id)).unwrap(), None);
}

#[test]
fn like_then_dislike_moves_one_count() {
    let (_tmp, pool) = create_test_db();
    let (post_id, _) = seed_post(&pool);
    let ledger = ReactionLedger::new(pool);
    ledger.set_post_reaction("u3", post_id, true).unwrap();

    let before = ledger.counts(Target::Post(post_id)).unwrap();
    ledger.set_post_reaction("u2", post_id, true).unwrap();
    let after = ledger.set_post_reaction("u2", post_id, false).unwrap();

    assert_eq!(after.likes, before.likes);
    assert_eq!(after.dislikes, before.dislikes + 1);
    assert_eq!(
        ledger.reaction_of("u2", Target::Post(post_id)).unwrap(),
        Some(Polarity::Dislike)
    );
}

#[test]
fn concurrent_users_keep_counters_consistent() {
    let (_tmp, pool) = create_test_db();
    let (post_id, comment_id) = seed_post(&pool);
    let ledger = ReactionLedger::new(pool);

    let handles: Vec<_> = USERS
        .iter()
        .enumerate()
        .map(|(i, user)| {
            let ledger = ledger.clone();
            let user = user.to_string();
            std::thread::spawn(move || {
                for round in 0..10 {
                    let like = (round + i) % 3 != 0;
                    ledger.set_post_reaction(&user, post_id, like).unwrap();
                    ledger.set_comment_reaction(&user, comment_id, !like).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_consistent(&ledger, Target::Post(post_id));
    assert_consistent(&ledger, Target::Comment(comment_id));
}

#[test]
fn same_user_racing_on_one_target_stays_consistent() {
    let (_tmp, pool) = create_test_db();
    let (post_id, _) = seed_post(&pool);
    let ledger = ReactionLedger::new(pool);

    let handles: Vec<_> = [true, false]
        .into_iter()
        .map(|like| {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    ledger.set_post_reaction("u2", post_id, like).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let counts = ledger.counts(Target::Post(post_id)).unwrap();
    assert!(counts.likes + counts.dislikes <= 1);
    assert_consistent(&ledger, Target::Post(post_id));
}

#[test]
fn rebuild_repairs_tampered_counters() {
    let (_tmp, pool) = create_test_db();
    let (post_id, _) = seed_post(&pool);
    let ledger = ReactionLedger::new(pool.clone());
    ledger.set_post_reaction("u2", post_id, true).unwrap();

    pool.get()
        .unwrap()
        .execute(
            "UPDATE posts SET likes = 99, dislikes = 7 WHERE id = ?1",
            params![post_id],
        )
        .unwrap();

    assert_eq!(ledger.rebuild_counters().unwrap(), 1);
    assert_eq!(
        ledger.counts(Target::Post(post_id)).unwrap(),
        ReactionCounts {
            likes: 1,
            dislikes: 0
        }
    );
}
