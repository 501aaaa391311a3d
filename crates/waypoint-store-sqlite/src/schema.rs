//! SQL schema for the Waypoint SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS user_levels (
    user_id            TEXT PRIMARY KEY,
    xp                 INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
    streak_days        INTEGER NOT NULL DEFAULT 0,
    longest_streak     INTEGER NOT NULL DEFAULT 0,
    last_activity_date TEXT              -- YYYY-MM-DD or NULL
);

-- One row per granted reward. The primary key is what makes a grant
-- exactly-once; xp in user_levels is only ever bumped after an insert here.
CREATE TABLE IF NOT EXISTS xp_awards (
    user_id    TEXT NOT NULL,
    award_key  TEXT NOT NULL,   -- 'lesson:<uuid>' | 'course:<uuid>' | 'achievement:<code>'
    amount     INTEGER NOT NULL CHECK (amount >= 0),
    awarded_at TEXT NOT NULL,
    PRIMARY KEY (user_id, award_key)
);

CREATE TABLE IF NOT EXISTS lesson_progress (
    user_id          TEXT NOT NULL,
    lesson_id        TEXT NOT NULL,
    is_completed     INTEGER NOT NULL DEFAULT 0,
    position_seconds INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT NOT NULL,
    completed_at     TEXT,
    PRIMARY KEY (user_id, lesson_id)
);

CREATE TABLE IF NOT EXISTS courses (
    course_id  TEXT PRIMARY KEY,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS course_lessons (
    course_id TEXT NOT NULL REFERENCES courses(course_id),
    lesson_id TEXT NOT NULL,
    position  INTEGER NOT NULL,
    PRIMARY KEY (course_id, lesson_id)
);

CREATE TABLE IF NOT EXISTS activity_counters (
    user_id TEXT NOT NULL,
    counter TEXT NOT NULL,   -- Counter, snake_case
    value   INTEGER NOT NULL DEFAULT 0 CHECK (value >= 0),
    PRIMARY KEY (user_id, counter)
);

CREATE TABLE IF NOT EXISTS user_achievements (
    user_id     TEXT NOT NULL,
    code        TEXT NOT NULL,
    unlocked_at TEXT NOT NULL,
    PRIMARY KEY (user_id, code)
);

CREATE TABLE IF NOT EXISTS node_completions (
    user_id      TEXT NOT NULL,
    node_id      TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (user_id, node_id)
);

CREATE INDEX IF NOT EXISTS course_lessons_lesson_idx ON course_lessons(lesson_id);
CREATE INDEX IF NOT EXISTS lesson_progress_lesson_idx ON lesson_progress(lesson_id);

PRAGMA user_version = 1;
";
