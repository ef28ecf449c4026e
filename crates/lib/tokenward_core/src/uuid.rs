// Helper for generating UUIDv7 (timestamp-sortable UUIDs)
//
// Principal ids are generated app-side so that in-memory and PostgreSQL
// stores agree on id shape and ordering.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
