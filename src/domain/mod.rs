pub mod attendance_staging;
pub mod block_staging;
pub mod calendar;
pub mod change_set;
pub mod conflicts;
pub mod effective_state;
pub mod models;
