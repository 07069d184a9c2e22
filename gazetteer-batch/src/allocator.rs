//! Provisional key and note sequence allocation.
//!
//! Rows created by a batch carry negative keys until the repository assigns
//! real ones. Keys start at -10 and move further negative so a new key never
//! collides with a persisted key or one allocated earlier in the same pass.

use gazetteer_core::{KeyedRecord, NoteRecord, PkId};

/// Key given to the first provisional row of a collection.
pub const FIRST_PROVISIONAL_KEY: PkId = -10;

/// Next provisional key for a collection.
pub fn allocate_child_key<T: KeyedRecord>(existing: &[T]) -> PkId {
    match existing.iter().map(KeyedRecord::pk_id).min() {
        Some(min_pk) if min_pk <= FIRST_PROVISIONAL_KEY => min_pk - 1,
        _ => FIRST_PROVISIONAL_KEY,
    }
}

/// Next note sequence number for a property.
pub fn allocate_note_sequence(notes: &[NoteRecord]) -> i32 {
    notes
        .iter()
        .map(|note| note.seq_num)
        .max()
        .map_or(1, |max_seq| max_seq + 1)
}
