//! Reaction ledger: at most one like/dislike per (user, target), with the
//! parent's `likes`/`dislikes` counters updated in the same transaction as
//! the reaction row.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::models::to_millis;
use crate::db::StorageError;
use crate::state::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Like,
    Dislike,
}

impl From<bool> for Polarity {
    fn from(like: bool) -> Self {
        if like {
            Polarity::Like
        } else {
            Polarity::Dislike
        }
    }
}

impl Polarity {
    pub fn is_like(self) -> bool {
        self == Polarity::Like
    }

    fn counter_column(self) -> &'static str {
        match self {
            Polarity::Like => "likes",
            Polarity::Dislike => "dislikes",
        }
    }
}

/// Something a user can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Post(i64),
    Comment(i64),
}

struct Tables {
    reactions: &'static str,
    target_column: &'static str,
    flag_column: &'static str,
    parent: &'static str,
    /// Yields (author id, owning post id) for a target id
    owner_select: &'static str,
    notification_prefix: &'static str,
}

static POST_TABLES: Tables = Tables {
    reactions: "reaction",
    target_column: "post_id",
    flag_column: "\"like\"",
    parent: "posts",
    owner_select: "SELECT user_id, id FROM posts WHERE id = ?1",
    notification_prefix: "",
};

static COMMENT_TABLES: Tables = Tables {
    reactions: "comment_reaction",
    target_column: "comment_id",
    flag_column: "is_like",
    parent: "comments",
    owner_select: "SELECT user_id, post_id FROM comments WHERE id = ?1",
    notification_prefix: "comment_",
};

impl Target {
    fn tables(&self) -> &'static Tables {
        match self {
            Target::Post(_) => &POST_TABLES,
            Target::Comment(_) => &COMMENT_TABLES,
        }
    }

    fn id(&self) -> i64 {
        match *self {
            Target::Post(id) | Target::Comment(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub likes: i64,
    pub dislikes: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ReactionError {
    #[error("reaction target does not exist")]
    TargetNotFound,

    /// The (user, target) uniqueness constraint fired. Transient; the
    /// public entry points already retry once before returning this.
    #[error("conflicting reaction for the same user and target")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for ReactionError {
    fn from(e: rusqlite::Error) -> Self {
        let err = StorageError::from(e);
        if err.is_unique_violation() {
            ReactionError::Conflict
        } else {
            ReactionError::Storage(err)
        }
    }
}

impl From<r2d2::Error> for ReactionError {
    fn from(e: r2d2::Error) -> Self {
        ReactionError::Storage(e.into())
    }
}

#[derive(Clone)]
pub struct ReactionLedger {
    pool: DbPool,
}

impl ReactionLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn set_post_reaction(
        &self,
        user_id: &str,
        post_id: i64,
        like: bool,
    ) -> Result<ReactionCounts, ReactionError> {
        self.set_reaction(user_id, Target::Post(post_id), like)
    }

    pub fn set_comment_reaction(
        &self,
        user_id: &str,
        comment_id: i64,
        like: bool,
    ) -> Result<ReactionCounts, ReactionError> {
        self.set_reaction(user_id, Target::Comment(comment_id), like)
    }

    /// Toggle a user's reaction on a target and return the target's counters.
    ///
    /// No prior reaction inserts one; the same polarity again removes it; the
    /// opposite polarity flips it. A uniqueness conflict is retried once.
    pub fn set_reaction(
        &self,
        user_id: &str,
        target: Target,
        like: bool,
    ) -> Result<ReactionCounts, ReactionError> {
        retry_once_on_conflict(|attempt| {
            if attempt > 0 {
                tracing::warn!(user_id, ?target, "Reaction conflict, retrying once");
            }
            self.apply(user_id, target, like.into())
        })
    }

    fn apply(
        &self,
        user_id: &str,
        target: Target,
        polarity: Polarity,
    ) -> Result<ReactionCounts, ReactionError> {
        let t = target.tables();
        let id = target.id();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner: Option<(String, i64)> = tx
            .query_row(t.owner_select, params![id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let Some((author_id, post_id)) = owner else {
            return Err(ReactionError::TargetNotFound);
        };

        let existing: Option<bool> = tx
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE user_id = ?1 AND {} = ?2",
                    t.flag_column, t.reactions, t.target_column
                ),
                params![user_id, id],
                |row| row.get(0),
            )
            .optional()?;

        match existing.map(Polarity::from) {
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (user_id, {}, {}) VALUES (?1, ?2, ?3)",
                        t.reactions, t.target_column, t.flag_column
                    ),
                    params![user_id, id, polarity.is_like()],
                )?;
                bump_counter(&tx, t, id, polarity, 1)?;
            }
            Some(previous) if previous == polarity => {
                tx.execute(
                    &format!(
                        "DELETE FROM {} WHERE user_id = ?1 AND {} = ?2",
                        t.reactions, t.target_column
                    ),
                    params![user_id, id],
                )?;
                bump_counter(&tx, t, id, previous, -1)?;
            }
            Some(previous) => {
                tx.execute(
                    &format!(
                        "UPDATE {} SET {} = ?1 WHERE user_id = ?2 AND {} = ?3",
                        t.reactions, t.flag_column, t.target_column
                    ),
                    params![polarity.is_like(), user_id, id],
                )?;
                bump_counter(&tx, t, id, previous, -1)?;
                bump_counter(&tx, t, id, polarity, 1)?;
            }
        }

        // Only a reaction that now exists is worth telling the author about
        let removed = existing.map(Polarity::from) == Some(polarity);
        if !removed && author_id != user_id {
            let kind = format!(
                "{}{}",
                t.notification_prefix,
                match polarity {
                    Polarity::Like => "like",
                    Polarity::Dislike => "dislike",
                }
            );
            tx.execute(
                "INSERT INTO notifications (user_id, actor_id, post_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![author_id, user_id, post_id, kind, to_millis(Utc::now())],
            )?;
        }

        let counts = stored_counts(&tx, t, id)?;
        tx.commit()?;
        Ok(counts)
    }

    /// The user's current reaction on a target, if any.
    pub fn reaction_of(
        &self,
        user_id: &str,
        target: Target,
    ) -> Result<Option<Polarity>, ReactionError> {
        let t = target.tables();
        let conn = self.pool.get()?;
        let flag: Option<bool> = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE user_id = ?1 AND {} = ?2",
                    t.flag_column, t.reactions, t.target_column
                ),
                params![user_id, target.id()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.map(Polarity::from))
    }

    /// Counters as stored on the parent row.
    pub fn counts(&self, target: Target) -> Result<ReactionCounts, ReactionError> {
        let t = target.tables();
        let conn = self.pool.get()?;
        let counts = conn
            .query_row(
                &format!("SELECT likes, dislikes FROM {} WHERE id = ?1", t.parent),
                params![target.id()],
                |row| {
                    Ok(ReactionCounts {
                        likes: row.get(0)?,
                        dislikes: row.get(1)?,
                    })
                },
            )
            .optional()?;
        counts.ok_or(ReactionError::TargetNotFound)
    }

    /// Counters recomputed from the raw reaction rows.
    pub fn derived_counts(&self, target: Target) -> Result<ReactionCounts, ReactionError> {
        let t = target.tables();
        let conn = self.pool.get()?;
        let counts = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(CASE WHEN {flag} = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN {flag} = 0 THEN 1 ELSE 0 END), 0)
                 FROM {table} WHERE {col} = ?1",
                flag = t.flag_column,
                table = t.reactions,
                col = t.target_column
            ),
            params![target.id()],
            |row| {
                Ok(ReactionCounts {
                    likes: row.get(0)?,
                    dislikes: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Rewrite every stored counter that disagrees with the reaction rows.
    /// Returns how many posts and comments were corrected.
    pub fn rebuild_counters(&self) -> Result<usize, ReactionError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut fixed = 0;
        for t in [&POST_TABLES, &COMMENT_TABLES] {
            let liked = format!(
                "(SELECT COUNT(*) FROM {r} WHERE {r}.{col} = {p}.id AND {r}.{flag} = 1)",
                r = t.reactions,
                col = t.target_column,
                p = t.parent,
                flag = t.flag_column
            );
            let disliked = format!(
                "(SELECT COUNT(*) FROM {r} WHERE {r}.{col} = {p}.id AND {r}.{flag} = 0)",
                r = t.reactions,
                col = t.target_column,
                p = t.parent,
                flag = t.flag_column
            );
            fixed += tx.execute(
                &format!(
                    "UPDATE {p} SET likes = {l}, dislikes = {d} WHERE likes != {l} OR dislikes != {d}",
                    p = t.parent,
                    l = liked,
                    d = disliked
                ),
                [],
            )?;
        }
        tx.commit()?;

        if fixed > 0 {
            tracing::warn!(fixed, "Rebuilt drifted reaction counters");
        }
        Ok(fixed)
    }
}

fn bump_counter(
    tx: &Transaction<'_>,
    t: &Tables,
    id: i64,
    polarity: Polarity,
    delta: i64,
) -> Result<(), rusqlite::Error> {
    let column = polarity.counter_column();
    tx.execute(
        &format!(
            "UPDATE {} SET {col} = {col} + ?1 WHERE id = ?2",
            t.parent,
            col = column
        ),
        params![delta, id],
    )?;
    Ok(())
}

fn stored_counts(
    tx: &Transaction<'_>,
    t: &Tables,
    id: i64,
) -> Result<ReactionCounts, rusqlite::Error> {
    tx.query_row(
        &format!("SELECT likes, dislikes FROM {} WHERE id = ?1", t.parent),
        params![id],
        |row| {
            Ok(ReactionCounts {
                likes: row.get(0)?,
                dislikes: row.get(1)?,
            })
        },
    )
}

/// Runs `op` and, if it reports a uniqueness conflict, runs it exactly once
/// more. The attempt number (0 or 1) is passed in.
fn retry_once_on_conflict<T>(
    mut op: impl FnMut(u32) -> Result<T, ReactionError>,
) -> Result<T, ReactionError> {
    match op(0) {
        Err(ReactionError::Conflict) => op(1),
        other => other,
    }
}
