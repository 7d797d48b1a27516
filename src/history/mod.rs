mod record;
mod store;

pub use record::{MealRecord, MealType};
pub use store::{
    FileSlot, HistorySlot, HistoryStore, MemorySlot, SaveOutcome, SlotError, BYTE_BUDGET,
    MAX_RECORDS, QUOTA_FALLBACK_RECORDS, SHRINK_RECORDS,
};
